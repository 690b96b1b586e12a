//! External program execution.
//!
//! Extraction through FFmpeg and diffing through ImageMagick shell out to
//! external binaries. They do so through the narrow [`ToolRunner`]
//! interface so the surrounding logic can be exercised against a fake that
//! records commands instead of running them. [`SystemRunner`] is the real
//! implementation on top of [`std::process::Command`].

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::{BufWriter, ErrorKind, Write},
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
};

use crate::error::ComparisonError;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Program name or path.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
}

impl ToolCommand {
    /// A command with no arguments yet.
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().display().to_string(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_string()));
        self
    }

    /// Append a path argument.
    #[must_use]
    pub fn path_arg<P: AsRef<Path>>(self, path: P) -> Self {
        let arg = path.as_ref().display().to_string();
        self.arg(arg)
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    fn spawn(&self, command: &mut Command) -> Result<Child, ComparisonError> {
        log::debug!("Running: {self}");
        command.spawn().map_err(|error| match error.kind() {
            ErrorKind::NotFound => ComparisonError::ToolNotFound {
                tool: self.program.clone(),
            },
            _ => ComparisonError::IoError(error),
        })
    }
}

impl Display for ToolCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// How an external program finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolStatus {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
}

impl ToolStatus {
    /// A process that exited with `code`.
    pub fn exited(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Turn the status into an error unless its exit code is in `accepted`.
    ///
    /// # Errors
    ///
    /// Returns [`ComparisonError::ToolFailed`] naming `command`.
    pub fn accept(self, command: &ToolCommand, accepted: &[i32]) -> Result<Self, ComparisonError> {
        match self.code {
            Some(code) if accepted.contains(&code) => Ok(self),
            _ => Err(ComparisonError::ToolFailed {
                command: command.to_string(),
                status: self.to_string(),
            }),
        }
    }
}

impl From<ExitStatus> for ToolStatus {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl Display for ToolStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// Feeds a child's standard input.
pub type StdinFeed<'a> = dyn FnMut(&mut dyn Write) -> Result<(), ComparisonError> + 'a;

/// Runs external programs.
///
/// Spawn failures because the program does not exist must surface as
/// [`ComparisonError::ToolNotFound`]; a non-zero exit is *not* an error at
/// this level and is returned as a [`ToolStatus`].
pub trait ToolRunner {
    /// Run a command to completion.
    fn run(&self, command: &ToolCommand) -> Result<ToolStatus, ComparisonError>;

    /// Run a command while `feed` writes to its standard input, then wait.
    fn run_piped(
        &self,
        command: &ToolCommand,
        feed: &mut StdinFeed<'_>,
    ) -> Result<ToolStatus, ComparisonError>;

    /// Run independent commands, returning one result per command in order.
    ///
    /// The default runs them one after another.
    fn run_batch(&self, commands: &[ToolCommand]) -> Vec<Result<ToolStatus, ComparisonError>> {
        commands.iter().map(|command| self.run(command)).collect()
    }

    /// Check that `command` can be started at all. Its exit status is
    /// ignored.
    fn probe(&self, command: &ToolCommand) -> Result<(), ComparisonError> {
        self.run(command).map(|_| ())
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, command: &ToolCommand) -> Result<ToolStatus, ComparisonError> {
        let mut child = command.spawn(command.to_command().stdin(Stdio::null()))?;
        Ok(child.wait()?.into())
    }

    fn run_piped(
        &self,
        command: &ToolCommand,
        feed: &mut StdinFeed<'_>,
    ) -> Result<ToolStatus, ComparisonError> {
        let mut child = command.spawn(command.to_command().stdin(Stdio::piped()))?;
        let Some(stdin) = child.stdin.take() else {
            child.kill()?;
            child.wait()?;
            return Err(ComparisonError::IoError(std::io::Error::other(
                "child standard input was not captured",
            )));
        };

        let mut writer = BufWriter::new(stdin);
        let fed = feed(&mut writer).and_then(|()| writer.flush().map_err(Into::into));
        drop(writer);

        match fed {
            Ok(()) => Ok(child.wait()?.into()),
            // The program quit early; its exit status says why.
            Err(ComparisonError::IoError(error)) if error.kind() == ErrorKind::BrokenPipe => {
                Ok(child.wait()?.into())
            }
            Err(error) => {
                child.kill()?;
                child.wait()?;
                Err(error)
            }
        }
    }

    /// Spawns every command before waiting on any of them.
    fn run_batch(&self, commands: &[ToolCommand]) -> Vec<Result<ToolStatus, ComparisonError>> {
        let children: Vec<Result<Child, ComparisonError>> = commands
            .iter()
            .map(|command| command.spawn(command.to_command().stdin(Stdio::null())))
            .collect();

        children
            .into_iter()
            .map(|child| Ok(child?.wait()?.into()))
            .collect()
    }

    fn probe(&self, command: &ToolCommand) -> Result<(), ComparisonError> {
        let mut child = command.spawn(
            command
                .to_command()
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null()),
        )?;
        child.wait()?;
        Ok(())
    }
}
