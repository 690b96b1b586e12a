//! Comparison upload.
//!
//! A [`ComparisonBatch`] is the complete multipart payload for one
//! comparison: collection flags followed by, for every selected frame, the
//! frame label and one named image per source. [`ComparisonHost`] submits a
//! batch and returns the comparison's identifier; [`SlowPics`] is the
//! implementation for <https://slow.pics>.
//!
//! The returned URL is also saved next to the images as an Internet
//! shortcut (`slow.pics.url`).

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use reqwest::{
    Url,
    blocking::{
        Client,
        multipart::{Form, Part},
    },
    cookie::{CookieStore, Jar},
    header::{
        ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, InvalidHeaderValue, ORIGIN, REFERER,
    },
};

use crate::{error::ComparisonError, writer::ClipImages};

/// Base URL of slow.pics.
pub const SLOW_PICS_BASE_URL: &str = "https://slow.pics";

/// File name of the shortcut written to the comparison root.
pub const SHORTCUT_FILE_NAME: &str = "slow.pics.url";

const XSRF_COOKIE: &str = "XSRF-TOKEN";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// One field of a multipart comparison form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    /// A plain text field.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// A PNG file.
    File {
        /// Field name.
        name: String,
        /// File name sent with the part.
        file_name: String,
        /// File contents.
        bytes: Vec<u8>,
    },
}

impl FormField {
    fn text<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        FormField::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The field name.
    pub fn name(&self) -> &str {
        match self {
            FormField::Text { name, .. } | FormField::File { name, .. } => name,
        }
    }
}

/// The payload of one comparison upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonBatch {
    fields: Vec<FormField>,
}

impl ComparisonBatch {
    /// Build the payload from per-source image lists.
    ///
    /// Every source must hold one image per entry of `frames`, in frame
    /// order. Source `i` and frame position `j` produce the fields
    /// `comparisons[j].images[i].name` and `comparisons[j].images[i].file`;
    /// `comparisons[j].name` carries the frame number.
    ///
    /// # Errors
    ///
    /// Returns [`ComparisonError::ImageCountMismatch`] for a source with the
    /// wrong number of images, or an I/O error if an image cannot be read.
    pub fn from_sources(
        sources: &[ClipImages],
        frames: &[u64],
        collection_name: &str,
        public: bool,
    ) -> Result<Self, ComparisonError> {
        for source in sources {
            source.expect_count(frames.len())?;
        }

        let mut fields = vec![
            FormField::text("collectionName", collection_name),
            FormField::text("public", public.to_string()),
            FormField::text("optimizeImages", "true"),
            FormField::text("hentai", "false"),
        ];

        for (position, frame) in frames.iter().enumerate() {
            fields.push(FormField::text(
                format!("comparisons[{position}].name"),
                frame.to_string(),
            ));

            for (index, source) in sources.iter().enumerate() {
                let path = &source.paths[position];
                fields.push(FormField::text(
                    format!("comparisons[{position}].images[{index}].name"),
                    source.name.clone(),
                ));
                fields.push(FormField::File {
                    name: format!("comparisons[{position}].images[{index}].file"),
                    file_name: file_name_of(path),
                    bytes: fs::read(path)?,
                });
            }
        }

        Ok(Self { fields })
    }

    /// All fields, in submission order.
    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    /// Value of the text field `name`, if present.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|field| match field {
            FormField::Text { name: field_name, value } if field_name == name => {
                Some(value.as_str())
            }
            _ => None,
        })
    }

    /// Number of file fields.
    pub fn file_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|field| matches!(field, FormField::File { .. }))
            .count()
    }

    fn to_form(&self) -> Result<Form, ComparisonError> {
        let mut form = Form::new();
        for field in &self.fields {
            form = match field {
                FormField::Text { name, value } => form.text(name.clone(), value.clone()),
                FormField::File {
                    name,
                    file_name,
                    bytes,
                } => {
                    let part = Part::bytes(bytes.clone())
                        .file_name(file_name.clone())
                        .mime_str("image/png")?;
                    form.part(name.clone(), part)
                }
            };
        }
        Ok(form)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A service that hosts image comparisons.
pub trait ComparisonHost {
    /// Submit `batch` once and return the service's comparison identifier.
    ///
    /// # Errors
    ///
    /// Transport failures and rejected uploads. Implementations do not
    /// retry.
    fn submit(&self, batch: &ComparisonBatch) -> Result<String, ComparisonError>;

    /// Public URL of the comparison `id`.
    fn comparison_url(&self, id: &str) -> String;
}

/// The slow.pics comparison service.
///
/// A session is opened with a `GET` to collect the anti-forgery cookie,
/// which is echoed back in the `X-XSRF-TOKEN` header of the upload.
#[derive(Debug, Clone)]
pub struct SlowPics {
    base_url: Url,
    client: Client,
    jar: Arc<Jar>,
}

impl SlowPics {
    /// A client for <https://slow.pics>.
    ///
    /// # Errors
    ///
    /// Returns [`ComparisonError::Http`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, ComparisonError> {
        Self::with_base_url(SLOW_PICS_BASE_URL)
    }

    /// A client for a slow.pics-compatible service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ComparisonError::Upload`] for an unparsable URL and
    /// [`ComparisonError::Http`] if the HTTP client cannot be built.
    pub fn with_base_url(base_url: &str) -> Result<Self, ComparisonError> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|error| {
            ComparisonError::Upload(format!("invalid base URL {base_url:?}: {error}"))
        })?;
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self {
            base_url,
            client,
            jar,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    fn upload_headers(&self, token: &str) -> Result<HeaderMap, ComparisonError> {
        let invalid = |error: InvalidHeaderValue| ComparisonError::Upload(format!("invalid header value: {error}"));

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(
            ORIGIN,
            HeaderValue::from_str(&self.endpoint("/")).map_err(invalid)?,
        );
        headers.insert(
            REFERER,
            HeaderValue::from_str(&self.endpoint("/comparison")).map_err(invalid)?,
        );
        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
        headers.insert("x-xsrf-token", HeaderValue::from_str(token).map_err(invalid)?);
        Ok(headers)
    }
}

impl ComparisonHost for SlowPics {
    fn submit(&self, batch: &ComparisonBatch) -> Result<String, ComparisonError> {
        let api = self.endpoint("/api/comparison");

        log::debug!("Opening session at {api}");
        self.client.get(&api).send()?.error_for_status()?;

        let token = self
            .jar
            .cookies(&self.base_url)
            .and_then(|header| {
                header
                    .to_str()
                    .ok()
                    .and_then(|cookies| cookie_value(cookies, XSRF_COOKIE))
            })
            .ok_or_else(|| {
                ComparisonError::Upload(format!("the session did not set a {XSRF_COOKIE} cookie"))
            })?;

        log::info!("Uploading {} images", batch.file_count());
        let response = self
            .client
            .post(&api)
            .headers(self.upload_headers(&token)?)
            .multipart(batch.to_form()?)
            .send()?
            .error_for_status()?;

        let id = response.text()?.trim().to_string();
        if id.is_empty() {
            return Err(ComparisonError::Upload(
                "the service returned an empty comparison id".to_string(),
            ));
        }
        Ok(id)
    }

    fn comparison_url(&self, id: &str) -> String {
        self.endpoint(&format!("/c/{id}"))
    }
}

/// Value of cookie `name` in a `Cookie` header (`a=1; b=2`).
fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Contents of an Internet shortcut pointing at `url`.
pub fn shortcut_contents(url: &str) -> String {
    format!("[InternetShortcut]\nURL={url}")
}

/// Write `slow.pics.url` into `root` and return its path.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be written.
pub fn write_shortcut(root: &Path, url: &str) -> Result<PathBuf, ComparisonError> {
    let path = root.join(SHORTCUT_FILE_NAME);
    fs::write(&path, shortcut_contents(url))?;
    Ok(path)
}
