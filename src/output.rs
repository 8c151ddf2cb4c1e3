//! Output types: what a completed submission hands back.
//!
//! The backend answers in one of three shapes (see
//! [`crate::tool::ResponseShape`]); each becomes one [`ResultArtifact`]
//! variant. Batch rows and page images are *consumed* when delivered: taking
//! one removes it from the artifact, so the same control can never download
//! it twice.

use crate::error::SessionError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One binary response body.
#[derive(Clone, PartialEq, Eq)]
pub struct BlobArtifact {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for BlobArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobArtifact")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Outcome of one file inside a compression batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemStatus {
    Success,
    /// The backend has no compressor for this file type.
    Unsupported,
    /// Compression raised; the detail is the backend's message.
    Error(String),
}

impl ItemStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemStatus::Success)
    }
}

impl From<String> for ItemStatus {
    fn from(s: String) -> Self {
        match s.trim() {
            "success" => ItemStatus::Success,
            "unsupported" => ItemStatus::Unsupported,
            other => {
                let detail = other
                    .strip_prefix("error:")
                    .or_else(|| other.strip_prefix("error"))
                    .unwrap_or(other)
                    .trim();
                ItemStatus::Error(detail.to_string())
            }
        }
    }
}

impl From<ItemStatus> for String {
    fn from(s: ItemStatus) -> Self {
        s.to_string()
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Success => f.write_str("success"),
            ItemStatus::Unsupported => f.write_str("unsupported"),
            ItemStatus::Error(d) if d.is_empty() => f.write_str("error"),
            ItemStatus::Error(d) => write!(f, "error: {d}"),
        }
    }
}

/// One row of a compression report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRow {
    /// Original upload name.
    pub file: String,
    #[serde(default)]
    pub compressed_name: Option<String>,
    #[serde(default)]
    pub original_size: Option<u64>,
    #[serde(default)]
    pub compressed_size: Option<u64>,
    #[serde(default)]
    pub saved_percent: Option<f64>,
    pub status: ItemStatus,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl BatchRow {
    /// Only successful rows with a URL expose a download.
    pub fn is_downloadable(&self) -> bool {
        self.status.is_success() && self.download_url.is_some()
    }

    /// Name the delivered file is written under.
    pub fn output_name(&self) -> &str {
        self.compressed_name.as_deref().unwrap_or(&self.file)
    }
}

/// Aggregate numbers of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub bytes_saved: u64,
}

/// Per-file compression results, still pending download.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchReport {
    #[serde(rename = "results", default)]
    pub rows: Vec<BatchRow>,
}

impl BatchReport {
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_downloads(&self) -> bool {
        self.rows.iter().any(BatchRow::is_downloadable)
    }

    /// The row at `row`, if it can be downloaded.
    pub fn downloadable(&self, row: usize) -> Result<&BatchRow, SessionError> {
        let candidate = self.rows.get(row).ok_or(SessionError::IndexOutOfRange {
            index: row,
            len: self.rows.len(),
        })?;
        if !candidate.is_downloadable() {
            return Err(SessionError::NotDownloadable {
                row,
                file: candidate.file.clone(),
                status: candidate.status.to_string(),
            });
        }
        Ok(candidate)
    }

    /// Remove and return a downloadable row. Anything else is left untouched.
    pub fn take(&mut self, row: usize) -> Result<BatchRow, SessionError> {
        self.downloadable(row)?;
        Ok(self.rows.remove(row))
    }

    /// Positions of the rows that can still be downloaded.
    pub fn downloadable_rows(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_downloadable())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn summary(&self) -> BatchSummary {
        self.rows.iter().fold(BatchSummary::default(), |mut acc, r| {
            if r.status.is_success() {
                acc.succeeded += 1;
                if let (Some(orig), Some(comp)) = (r.original_size, r.compressed_size) {
                    acc.bytes_saved += orig.saturating_sub(comp);
                }
            } else {
                acc.failed += 1;
            }
            acc
        })
    }
}

/// One rendered PDF page.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImage {
    /// 1-based page number in the source PDF; stable across removals.
    pub number: usize,
    /// Base64-encoded PNG.
    pub data: String,
}

impl PageImage {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.data.trim())
    }

    pub fn filename(&self) -> String {
        format!("page_{}.png", self.number)
    }
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageImage")
            .field("number", &self.number)
            .field("base64_len", &self.data.len())
            .finish()
    }
}

#[derive(Deserialize)]
struct PageImagesBody {
    #[serde(default)]
    images: Vec<String>,
}

/// Pages of a split PDF still pending download.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageImages {
    pub pages: Vec<PageImage>,
}

impl PageImages {
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let parsed: PageImagesBody = serde_json::from_slice(body)?;
        let pages = parsed
            .images
            .into_iter()
            .enumerate()
            .map(|(i, data)| PageImage { number: i + 1, data })
            .collect();
        Ok(Self { pages })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Remove and return the page at display position `index`.
    pub fn take(&mut self, index: usize) -> Result<PageImage, SessionError> {
        if index >= self.pages.len() {
            return Err(SessionError::IndexOutOfRange {
                index,
                len: self.pages.len(),
            });
        }
        Ok(self.pages.remove(index))
    }

    /// Display position of the page with the given 1-based number.
    pub fn position_of(&self, number: usize) -> Option<usize> {
        self.pages.iter().position(|p| p.number == number)
    }
}

/// Output of a completed submission.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultArtifact {
    /// A single converted file.
    Blob(BlobArtifact),
    /// One converted file per input, in input order.
    Blobs(Vec<BlobArtifact>),
    /// Compression report.
    Batch(BatchReport),
    /// Rendered pages of a split PDF.
    Pages(PageImages),
}

impl ResultArtifact {
    /// Nothing left to deliver.
    pub fn is_exhausted(&self) -> bool {
        match self {
            ResultArtifact::Blob(_) => false,
            ResultArtifact::Blobs(b) => b.is_empty(),
            ResultArtifact::Batch(r) => !r.has_downloads(),
            ResultArtifact::Pages(p) => p.is_empty(),
        }
    }

    pub fn summary(&self) -> ArtifactSummary {
        match self {
            ResultArtifact::Blob(b) => ArtifactSummary::Blob {
                filename: b.filename.clone(),
                bytes: b.bytes.len() as u64,
            },
            ResultArtifact::Blobs(v) => ArtifactSummary::Blobs {
                count: v.len(),
                bytes: v.iter().map(|b| b.bytes.len() as u64).sum(),
            },
            ResultArtifact::Batch(r) => ArtifactSummary::Batch(r.summary()),
            ResultArtifact::Pages(p) => ArtifactSummary::Pages { count: p.len() },
        }
    }
}

/// Compact description of an artifact, cheap to clone into events and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactSummary {
    Blob { filename: String, bytes: u64 },
    Blobs { count: usize, bytes: u64 },
    Batch(BatchSummary),
    Pages { count: usize },
}

impl fmt::Display for ArtifactSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactSummary::Blob { filename, bytes } => write!(f, "{filename} ({bytes} bytes)"),
            ArtifactSummary::Blobs { count, bytes } => write!(f, "{count} files ({bytes} bytes)"),
            ArtifactSummary::Batch(s) => write!(
                f,
                "{} compressed, {} failed, {} bytes saved",
                s.succeeded, s.failed, s.bytes_saved
            ),
            ArtifactSummary::Pages { count } => write!(f, "{count} pages"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH: &str = r#"{
        "results": [
            {"file": "a.jpg", "compressed_name": "a_compressed.jpg", "original_size": 1000,
             "compressed_size": 400, "saved_percent": 60.0, "status": "success",
             "download_url": "http://127.0.0.1:8000/download/a_compressed.jpg"},
            {"file": "b.exe", "status": "unsupported"},
            {"file": "c.pdf", "compressed_name": "c_compressed.pdf", "original_size": 2000,
             "compressed_size": 1500, "saved_percent": 25.0, "status": "success",
             "download_url": "http://127.0.0.1:8000/download/c_compressed.pdf"},
            {"file": "d.mp4", "status": "error: ffmpeg not found"}
        ]
    }"#;

    #[test]
    fn status_parsing() {
        assert_eq!(ItemStatus::from("success".to_string()), ItemStatus::Success);
        assert_eq!(ItemStatus::from("unsupported".to_string()), ItemStatus::Unsupported);
        assert_eq!(
            ItemStatus::from("error: disk full".to_string()),
            ItemStatus::Error("disk full".into())
        );
        assert_eq!(ItemStatus::Error("disk full".into()).to_string(), "error: disk full");
    }

    #[test]
    fn batch_report_parses_and_summarises() {
        let report = BatchReport::from_json(BATCH.as_bytes()).unwrap();
        assert_eq!(report.len(), 4);
        let s = report.summary();
        assert_eq!(s.succeeded, 2);
        assert_eq!(s.failed, 2);
        assert_eq!(s.bytes_saved, 600 + 500);
    }

    #[test]
    fn take_is_download_once() {
        let mut report = BatchReport::from_json(BATCH.as_bytes()).unwrap();
        let row = report.take(0).unwrap();
        assert_eq!(row.output_name(), "a_compressed.jpg");
        assert_eq!(report.len(), 3);
        assert_eq!(report.rows[0].file, "b.exe");
        assert_eq!(report.rows[1].file, "c.pdf");
    }

    #[test]
    fn take_refuses_failed_rows_without_removing() {
        let mut report = BatchReport::from_json(BATCH.as_bytes()).unwrap();
        let err = report.take(1).unwrap_err();
        assert!(matches!(err, SessionError::NotDownloadable { row: 1, .. }));
        assert_eq!(report.len(), 4);
        assert!(report.take(10).is_err());
    }

    #[test]
    fn missing_results_key_is_empty_batch() {
        let report = BatchReport::from_json(b"{}").unwrap();
        assert!(report.is_empty());
        assert!(ResultArtifact::Batch(report).is_exhausted());
    }

    #[test]
    fn pages_keep_their_numbers_after_take() {
        let body = format!(
            r#"{{"images": ["{}", "{}", "{}"]}}"#,
            STANDARD.encode(b"one"),
            STANDARD.encode(b"two"),
            STANDARD.encode(b"three")
        );
        let mut pages = PageImages::from_json(body.as_bytes()).unwrap();
        let first = pages.take(0).unwrap();
        assert_eq!(first.filename(), "page_1.png");
        assert_eq!(first.decode().unwrap(), b"one");
        assert_eq!(pages.pages[0].number, 2);
        assert_eq!(pages.position_of(3), Some(1));
        assert!(pages.take(5).is_err());
    }

    #[test]
    fn summary_display() {
        let a = ResultArtifact::Blob(BlobArtifact {
            filename: "Merged.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: vec![0; 10],
        });
        assert_eq!(a.summary().to_string(), "Merged.pdf (10 bytes)");
        assert!(!a.is_exhausted());
    }
}
