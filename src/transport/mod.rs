//! The HTTP seam between sessions and the conversion backend.
//!
//! [`Transport`] is the only thing a session knows about the network. The
//! production implementation is [`HttpTransport`] (reqwest, multipart,
//! streamed file parts). Tests swap in a scripted implementation.
//!
//! A transport never interprets status codes: a 500 is a perfectly good
//! [`TransportResponse`]. Only failures to complete the exchange at all are
//! [`TransportError`]s.

#[cfg(any(test, feature = "mock"))]
mod mock;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::{MockTransport, Recorded};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::progress::ProgressReporter;
use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

static DISPOSITION_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"filename\*?=(?:UTF-8'')?"?([^";]+)"?"#).expect("static regex")
});

/// One multipart field.
#[derive(Clone)]
pub enum FormField {
    File {
        name: String,
        filename: String,
        content_type: String,
        bytes: Arc<[u8]>,
    },
    Text {
        name: String,
        value: String,
    },
}

impl FormField {
    pub fn name(&self) -> &str {
        match self {
            FormField::File { name, .. } | FormField::Text { name, .. } => name,
        }
    }
}

impl fmt::Debug for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormField::File {
                name,
                filename,
                content_type,
                bytes,
            } => f
                .debug_struct("File")
                .field("name", name)
                .field("filename", filename)
                .field("content_type", content_type)
                .field("len", &bytes.len())
                .finish(),
            FormField::Text { name, value } => f
                .debug_struct("Text")
                .field("name", name)
                .field("value", value)
                .finish(),
        }
    }
}

/// An ordered multipart body.
#[derive(Debug, Clone, Default)]
pub struct FormPayload {
    pub fields: Vec<FormField>,
}

impl FormPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(
        &mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Arc<[u8]>,
    ) -> &mut Self {
        self.fields.push(FormField::File {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            bytes,
        });
        self
    }

    pub fn text(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fields.push(FormField::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Sum of all file part sizes; the denominator of upload progress.
    pub fn file_bytes(&self) -> u64 {
        self.fields
            .iter()
            .map(|f| match f {
                FormField::File { bytes, .. } => bytes.len() as u64,
                FormField::Text { .. } => 0,
            })
            .sum()
    }

    /// File names of the file parts, in order.
    pub fn filenames(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter_map(|f| match f {
                FormField::File { filename, .. } => Some(filename.as_str()),
                FormField::Text { .. } => None,
            })
            .collect()
    }

    /// Value of the first text field called `name`.
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|f| match f {
            FormField::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }
}

/// A complete HTTP response, whatever its status.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Filename suggested by `Content-Disposition`, if any.
    pub filename: Option<String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Network operations a session needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a multipart `payload` to `endpoint`, reporting upload progress
    /// as the file parts are streamed.
    async fn send(
        &self,
        endpoint: &str,
        payload: FormPayload,
        progress: ProgressReporter,
    ) -> Result<TransportResponse, TransportError>;

    /// GET an absolute URL or a path relative to the backend.
    async fn fetch(&self, url: &str) -> Result<TransportResponse, TransportError>;

    /// POST a JSON body to `endpoint`.
    async fn post_json(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<TransportResponse, TransportError>;
}

/// Extract the filename from a `Content-Disposition` header value.
pub fn disposition_filename(header: &str) -> Option<String> {
    DISPOSITION_FILENAME
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Stream `bytes` in `chunk`-sized pieces. A piece is copied out of the
/// shared buffer only when the body is polled for it; `on_chunk` hears the
/// size of every piece handed out.
pub fn chunked_body(
    bytes: Arc<[u8]>,
    chunk: usize,
    mut on_chunk: impl FnMut(usize) + Send + 'static,
) -> impl futures::Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    let chunk = chunk.max(1);
    let starts = (0..bytes.len()).step_by(chunk);
    futures::stream::iter(starts).map(move |start| {
        let end = (start + chunk).min(bytes.len());
        on_chunk(end - start);
        Ok(bytes[start..end].to_vec())
    })
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.config.base_url)
            .field("timeout_secs", &self.config.timeout_secs)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| TransportError::Request {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            self.config.endpoint_url(url)
        }
    }

    fn map_error(&self, url: &str, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
                secs: self.config.timeout_secs.unwrap_or(0),
            }
        } else if e.is_builder() {
            TransportError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            }
        } else if e.is_body() || e.is_decode() {
            TransportError::Body {
                url: url.to_string(),
                reason: e.to_string(),
            }
        } else {
            TransportError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }

    async fn read_response(
        &self,
        url: &str,
        response: reqwest::Response,
    ) -> Result<TransportResponse, TransportError> {
        let status = response.status().as_u16();
        let (content_type, filename) = {
            let headers = response.headers();
            let header = |name: HeaderName| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            (
                header(CONTENT_TYPE),
                header(CONTENT_DISPOSITION).and_then(|d| disposition_filename(&d)),
            )
        };

        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_error(url, e))?
            .to_vec();

        debug!("HTTP {} from {} ({} bytes)", status, url, body.len());
        Ok(TransportResponse {
            status,
            content_type,
            filename,
            body,
        })
    }

    /// Turn one file part into a chunked body whose chunks advance `sent`.
    fn streamed_part(
        &self,
        filename: String,
        content_type: &str,
        bytes: Arc<[u8]>,
        sent: Arc<AtomicU64>,
        total: u64,
        progress: ProgressReporter,
    ) -> Result<Part, TransportError> {
        let len = bytes.len() as u64;
        let stream = chunked_body(bytes, self.config.upload_chunk, move |n| {
            let now = sent.fetch_add(n as u64, Ordering::SeqCst) + n as u64;
            progress.report(now, total);
        });

        Part::stream_with_length(reqwest::Body::wrap_stream(stream), len)
            .file_name(filename)
            .mime_str(content_type)
            .map_err(|e| TransportError::Request {
                url: self.config.base_url.clone(),
                reason: format!("invalid content type '{content_type}': {e}"),
            })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: &str,
        payload: FormPayload,
        progress: ProgressReporter,
    ) -> Result<TransportResponse, TransportError> {
        let url = self.resolve(endpoint);
        let total = payload.file_bytes();
        let sent = Arc::new(AtomicU64::new(0));

        info!(
            "POST {} ({} fields, {} file bytes)",
            url,
            payload.fields.len(),
            total
        );

        let mut form = Form::new();
        for field in payload.fields {
            form = match field {
                FormField::File {
                    name,
                    filename,
                    content_type,
                    bytes,
                } => {
                    let part = self.streamed_part(
                        filename,
                        &content_type,
                        bytes,
                        Arc::clone(&sent),
                        total,
                        progress.clone(),
                    )?;
                    form.part(name, part)
                }
                FormField::Text { name, value } => form.text(name, value),
            };
        }

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_error(&url, e))?;

        self.read_response(&url, response).await
    }

    async fn fetch(&self, url: &str) -> Result<TransportResponse, TransportError> {
        let url = self.resolve(url);
        info!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_error(&url, e))?;
        self.read_response(&url, response).await
    }

    async fn post_json(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<TransportResponse, TransportError> {
        let url = self.resolve(endpoint);
        info!("POST {} (json)", url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_error(&url, e))?;
        self.read_response(&url, response).await
    }
}
