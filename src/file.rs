//! `ManagedFile`: one user-selected binary plus its pending transform.
//!
//! Files are held fully in memory. The conversion backend caps uploads far
//! below what would make that a problem, and holding the bytes lets the
//! session re-submit after a failure without touching the disk again.
//!
//! Identity is a synthetic [`FileId`] assigned at creation. Two copies of the
//! same photo with the same name and timestamp are still two distinct files.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

/// Stable, unique identity of a [`ManagedFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(Uuid);

impl FileId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Clockwise rotation applied before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Advance by +90° modulo 360.
    pub fn cycle(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Quarter turns swap the output width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Pending client-side transform of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub rotation: Rotation,
    /// Mirror horizontally (applied before the rotation).
    pub flipped: bool,
}

impl Transform {
    pub fn is_identity(&self) -> bool {
        self.rotation == Rotation::Deg0 && !self.flipped
    }
}

/// A user-selected file held by an [`crate::session::UploadSession`].
#[derive(Clone)]
pub struct ManagedFile {
    id: FileId,
    name: String,
    content_type: String,
    bytes: Arc<[u8]>,
    modified: Option<SystemTime>,
    pub(crate) transform: Transform,
}

impl ManagedFile {
    /// Wrap in-memory bytes. The MIME type is derived from `name`.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let content_type = content_type_for(&name).to_string();
        Self {
            id: FileId::new(),
            name,
            content_type,
            bytes: Arc::from(bytes.into()),
            modified: None,
            transform: Transform::default(),
        }
    }

    /// Read a file from disk, keeping its base name and modification time.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| read_error(path, e))?;
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        debug!("Loaded {} ({} bytes)", path.display(), bytes.len());

        let mut file = Self::from_bytes(name, bytes);
        file.modified = modified;
        Ok(file)
    }

    /// Override the detected MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    /// Name without its final extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }

    /// Name + last-modified millis, the key a browser drag-and-drop list
    /// would use. Distinct files can share it; never used for identity here.
    pub fn legacy_key(&self) -> String {
        let millis = self
            .modified
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("{}{}", self.name, millis)
    }
}

impl fmt::Debug for ManagedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedFile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .field("transform", &self.transform)
            .finish()
    }
}

fn read_error(path: &Path, e: std::io::Error) -> SessionError {
    let path = PathBuf::from(path);
    match e.kind() {
        std::io::ErrorKind::NotFound => SessionError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => SessionError::PermissionDenied { path },
        _ => SessionError::ReadFailed { path, source: e },
    }
}

/// Guess a MIME type from the file extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        "heic" | "heif" => "image/heif",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "html" => "text/html",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rotate_four_times_is_identity() {
        let start = Rotation::Deg90;
        let back = start.cycle().cycle().cycle().cycle();
        assert_eq!(back, start);
        assert_eq!(Rotation::Deg270.cycle(), Rotation::Deg0);
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        assert!(!Rotation::Deg0.swaps_dimensions());
        assert!(Rotation::Deg90.swaps_dimensions());
        assert!(!Rotation::Deg180.swaps_dimensions());
        assert!(Rotation::Deg270.swaps_dimensions());
    }

    #[test]
    fn content_type_detection() {
        assert_eq!(content_type_for("scan.PDF"), "application/pdf");
        assert_eq!(content_type_for("photo.jpeg"), "image/jpeg");
        assert_eq!(
            content_type_for("report.docx"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn identical_copies_get_distinct_ids() {
        let when = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let a = ManagedFile::from_bytes("dup.png", vec![1, 2, 3]).with_modified(when);
        let b = ManagedFile::from_bytes("dup.png", vec![1, 2, 3]).with_modified(when);
        assert_eq!(a.legacy_key(), b.legacy_key());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn stem_strips_last_extension() {
        let f = ManagedFile::from_bytes("holiday.photo.png", vec![0]);
        assert_eq!(f.stem(), "holiday.photo");
        assert!(f.is_image());
        assert_eq!(f.size(), 1);
    }

    #[test]
    fn missing_path_is_file_not_found() {
        let err = ManagedFile::from_path("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, SessionError::FileNotFound { .. }), "got: {err:?}");
    }

    #[test]
    fn from_path_reads_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();
        let f = ManagedFile::from_path(&path).unwrap();
        assert_eq!(f.name(), "doc.pdf");
        assert_eq!(f.bytes(), b"%PDF-1.7");
        assert_eq!(f.content_type(), "application/pdf");
        assert!(f.modified().is_some());
    }
}
