//! # fileconv-client
//!
//! Upload orchestration for a remote file-conversion service: images to PDF,
//! DOCX ⇄ PDF, PDF merge and split, smart compression, watermarking and
//! image format conversion.
//!
//! ## Why this crate?
//!
//! Every tool of the service is the same interaction: pick files, maybe
//! reorder or rotate them, upload them as one multipart request while
//! watching progress, then collect whatever came back. Instead of eight
//! copies of that flow this crate has one engine, [`UploadSession`],
//! parametrised by a [`Tool`]'s [`ToolSpec`].
//!
//! ## Flow
//!
//! ```text
//! files
//!  │
//!  ├─ 1. Select     add / remove / reorder, rotate and flip images
//!  ├─ 2. Validate   non-empty list, tool options in range (no network yet)
//!  ├─ 3. Prepare    images-to-PDF: rotate, flip, downscale, JPEG (spawn_blocking)
//!  ├─ 4. Upload     one multipart POST (or one per file), streamed with progress
//!  ├─ 5. Parse      blob │ JSON batch report │ base64 page images
//!  └─ 6. Deliver    atomic writes into an output directory, download-once
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fileconv_client::{ClientConfig, Deliverer, ManagedFile, Tool, ToolOptions, UploadSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("http://127.0.0.1:8000")
//!         .build()?;
//!     let mut session = UploadSession::connect(Tool::MergePdf, config)?;
//!     session.add_files(vec![
//!         ManagedFile::from_path("chapter1.pdf")?,
//!         ManagedFile::from_path("chapter2.pdf")?,
//!     ])?;
//!     let summary = session.submit(ToolOptions::None).await?;
//!     eprintln!("{summary}");
//!     session.deliver(&Deliverer::new("out")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fileconv` binary (clap + indicatif + anyhow + tracing-subscriber) |
//! | `mock`  | off     | Exposes [`transport::MockTransport`] for downstream tests |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fileconv-client = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod contact;
pub mod deliver;
pub mod error;
pub mod events;
pub mod file;
pub mod options;
pub mod output;
pub mod pretransform;
pub mod progress;
pub mod session;
pub mod tool;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ClientConfig, ClientConfigBuilder, PageSelection};
pub use contact::ContactMessage;
pub use deliver::Deliverer;
pub use error::{FailureKind, SessionError, TransportError};
pub use events::{
    NoopObserver, Notice, NoticeLevel, Observer, RecordingObserver, SessionEvent,
    SessionObserver,
};
pub use file::{FileId, ManagedFile, Rotation, Transform};
pub use options::{
    CompressionSettings, ImageFormatTarget, ToolOptions, WatermarkOptions, WatermarkPosition,
};
pub use output::{
    ArtifactSummary, BatchReport, BatchRow, BatchSummary, BlobArtifact, ItemStatus, PageImage,
    PageImages, ResultArtifact,
};
pub use progress::{ProgressReporter, UploadProgress};
pub use session::{SessionState, UploadSession};
pub use tool::{AcceptFilter, Multiplicity, ResponseShape, Tool, ToolSpec};
pub use transport::{FormField, FormPayload, HttpTransport, Transport, TransportResponse};
