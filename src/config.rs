//! Configuration for talking to the conversion backend.
//!
//! Every knob lives in [`ClientConfig`], built via [`ClientConfigBuilder`].
//! One config is shared by all sessions of a process; it is cheap to clone
//! because the observer sits behind an `Arc`.

use crate::error::SessionError;
use crate::events::{NoopObserver, Observer};
use crate::pretransform::{PreTransform, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_EDGE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Size of the chunks a file part is streamed in. Each chunk is one
/// progress tick.
pub const DEFAULT_UPLOAD_CHUNK: usize = 64 * 1024;

/// Configuration shared by every [`crate::session::UploadSession`].
///
/// # Example
/// ```rust
/// use fileconv_client::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .base_url("http://localhost:8000")
///     .timeout_secs(300)
///     .max_edge(1600)
///     .build()
///     .unwrap();
/// assert_eq!(config.base_url, "http://localhost:8000");
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Scheme, host and port of the backend. No trailing slash. Default:
    /// `http://127.0.0.1:8000`.
    pub base_url: String,

    /// Whole-request timeout in seconds. Default: none.
    ///
    /// Large video compressions legitimately take minutes, so the client
    /// waits as long as the server keeps the connection open unless told
    /// otherwise.
    pub timeout_secs: Option<u64>,

    /// Longest edge of pre-transformed images in pixels. Range: ≥ 16.
    /// Default: 1000.
    pub max_edge: u32,

    /// JPEG quality of pre-transformed images. Range: 1–100. Default: 70.
    pub jpeg_quality: u8,

    /// Chunk size for streamed file parts in bytes. Default: 64 KiB.
    pub upload_chunk: usize,

    /// `User-Agent` header sent with every request.
    pub user_agent: String,

    /// Receives every session event. Default: [`NoopObserver`].
    pub observer: Observer,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: None,
            max_edge: DEFAULT_MAX_EDGE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            upload_chunk: DEFAULT_UPLOAD_CHUNK,
            user_agent: concat!("fileconv/", env!("CARGO_PKG_VERSION")).to_string(),
            observer: Arc::new(NoopObserver),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_edge", &self.max_edge)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("upload_chunk", &self.upload_chunk)
            .field("user_agent", &self.user_agent)
            .field("observer", &"<dyn SessionObserver>")
            .finish()
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Pre-transform parameters derived from this config.
    pub fn pre_transform(&self) -> PreTransform {
        PreTransform {
            max_edge: self.max_edge,
            jpeg_quality: self.jpeg_quality,
        }
    }

    /// Absolute URL of an endpoint path such as `/merge-pdf/`.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

/// Builder for [`ClientConfig`].
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl fmt::Debug for ClientConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = Some(secs.max(1));
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.config.timeout_secs = None;
        self
    }

    pub fn max_edge(mut self, px: u32) -> Self {
        self.config.max_edge = px;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn upload_chunk(mut self, bytes: usize) -> Self {
        self.config.upload_chunk = bytes.max(1024);
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn observer(mut self, observer: Observer) -> Self {
        self.config.observer = observer;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, SessionError> {
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(SessionError::InvalidConfig(format!(
                "Base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(SessionError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.max_edge < 16 {
            return Err(SessionError::InvalidConfig(format!(
                "Max edge must be ≥ 16 px, got {}",
                c.max_edge
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which pages of a split result to deliver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Sorted, deduplicated 1-indexed page numbers within `1..=total_pages`.
    pub fn to_numbers(&self, total_pages: usize) -> Vec<usize> {
        let mut numbers: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![*p]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1);
                let e = (*end).min(total_pages);
                (s..=e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .copied()
                .filter(|&p| p >= 1 && p <= total_pages)
                .collect(),
        };
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }
}
