//! Writing result artifacts to disk.
//!
//! A [`Deliverer`] is the scoped stand-in for "trigger a browser download":
//! it owns a target directory and writes each artifact through a
//! [`tempfile::NamedTempFile`] created in that same directory, then persists
//! it under its final name. A failed write leaves no partial file behind,
//! and the temporary is removed on every error path when it is dropped.

use crate::error::SessionError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[/\\:*?<>|\x00-\x1f\x7f]").expect("static regex"));

/// Fallback name when nothing usable is left after sanitising.
pub const FALLBACK_NAME: &str = "download";

/// Strip everything that could escape the output directory or upset a
/// filesystem: path separators, control characters, reserved punctuation,
/// and leading dots.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(name, "_");
    let trimmed = replaced.trim().trim_start_matches('.').trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Writes artifacts into one output directory.
#[derive(Debug, Clone)]
pub struct Deliverer {
    output_dir: PathBuf,
    overwrite: bool,
}

impl Deliverer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            overwrite: false,
        }
    }

    /// Replace files that already exist instead of failing.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Final path `name` would be written to.
    pub fn target_for(&self, name: &str) -> PathBuf {
        self.output_dir.join(sanitize_filename(name))
    }

    /// Atomically write `bytes` as `name` inside the output directory.
    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, SessionError> {
        let target = self.target_for(name);
        let write_err = |source| SessionError::OutputWriteFailed {
            path: target.clone(),
            source,
        };

        std::fs::create_dir_all(&self.output_dir).map_err(write_err)?;

        if !self.overwrite && target.exists() {
            return Err(SessionError::OutputExists {
                path: target.clone(),
            });
        }

        let mut tmp = NamedTempFile::new_in(&self.output_dir).map_err(write_err)?;
        tmp.write_all(bytes).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        debug!("Staged {} bytes at {}", bytes.len(), tmp.path().display());

        let persisted = if self.overwrite {
            tmp.persist(&target)
        } else {
            tmp.persist_noclobber(&target)
        };
        persisted.map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                SessionError::OutputExists {
                    path: target.clone(),
                }
            } else {
                write_err(e.error)
            }
        })?;

        info!("Wrote {} ({} bytes)", target.display(), bytes.len());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizing_removes_separators_and_dots() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_filename("a\\b:c.pdf"), "a_b_c.pdf");
        assert_eq!(sanitize_filename("line\nbreak.png"), "line_break.png");
        assert_eq!(sanitize_filename("..."), FALLBACK_NAME);
        assert_eq!(sanitize_filename("  "), FALLBACK_NAME);
        assert_eq!(sanitize_filename("Merged.pdf"), "Merged.pdf");
    }

    #[test]
    fn write_creates_dir_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        let d = Deliverer::new(&out);
        let path = d.write("Converted.pdf", b"%PDF-1.7").unwrap();
        assert_eq!(path, out.join("Converted.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn existing_file_is_not_clobbered_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let d = Deliverer::new(dir.path());
        d.write("a.txt", b"first").unwrap();
        let err = d.write("a.txt", b"second").unwrap_err();
        assert!(matches!(err, SessionError::OutputExists { .. }), "got: {err:?}");
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"first");
    }

    #[test]
    fn overwrite_replaces_and_leaves_no_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let d = Deliverer::new(dir.path()).overwrite(true);
        d.write("a.txt", b"first").unwrap();
        d.write("a.txt", b"second").unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"second");
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
