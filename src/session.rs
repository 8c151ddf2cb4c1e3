//! `UploadSession`: the one upload engine behind every tool.
//!
//! A session holds the ordered file list of one tool, runs a submission
//! against the backend, and keeps the result until it is delivered or
//! dismissed. Every tool is the same engine parametrised by its
//! [`ToolSpec`]; nothing in here branches on a concrete [`Tool`] except the
//! split tool's retention rule.
//!
//! ```text
//!            add_files            submit               200
//!   Idle ───────────────▶ Ready ─────────▶ Submitting ─────▶ Completed
//!    ▲                      ▲                  │                 │
//!    │                      │ non-200 / error  ▼                 │ dismiss /
//!    │                      └──────────────  Failed              │ exhausted
//!    └──────────────────── reset() from anywhere ◀──────────────-┘
//! ```
//!
//! At most one submission is in flight: `submit` takes `&mut self`, and a
//! session whose previous submit future was dropped mid-flight refuses new
//! submissions until [`UploadSession::reset`].

use crate::config::{ClientConfig, PageSelection};
use crate::deliver::Deliverer;
use crate::error::{FailureKind, SessionError};
use crate::events::SessionEvent;
use crate::file::{ManagedFile, Rotation};
use crate::options::ToolOptions;
use crate::output::{
    ArtifactSummary, BatchReport, BlobArtifact, PageImages, ResultArtifact,
};
use crate::pretransform::{self, PreparedFile};
use crate::progress::{ProgressReporter, SequenceSpan, UploadProgress};
use crate::tool::{DownloadName, Multiplicity, ResponseShape, Tool, ToolSpec};
use crate::transport::{FormPayload, HttpTransport, Transport, TransportResponse};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No files, no result.
    Idle,
    /// Files selected, nothing submitted yet (or the last result is gone).
    Ready,
    Submitting { progress: u8 },
    /// A result is held.
    Completed,
    /// The last submission failed; the file list is untouched.
    Failed { kind: FailureKind, message: String },
}

/// One tool's file list, submission and result.
pub struct UploadSession {
    tool: Tool,
    spec: ToolSpec,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    files: Vec<ManagedFile>,
    state: SessionState,
    progress: UploadProgress,
    result: Option<ResultArtifact>,
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("tool", &self.tool)
            .field("files", &self.files)
            .field("state", &self.state())
            .field("result", &self.result.as_ref().map(ResultArtifact::summary))
            .finish()
    }
}

impl UploadSession {
    pub fn new(tool: Tool, config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            tool,
            spec: tool.spec(),
            config,
            transport,
            files: Vec::new(),
            state: SessionState::Idle,
            progress: UploadProgress::new(),
            result: None,
        }
    }

    /// Session talking HTTP to `config.base_url`.
    pub fn connect(tool: Tool, config: ClientConfig) -> Result<Self, SessionError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(tool, config, Arc::new(transport)))
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn files(&self) -> &[ManagedFile] {
        &self.files
    }

    pub fn state(&self) -> SessionState {
        match &self.state {
            SessionState::Submitting { .. } => SessionState::Submitting {
                progress: self.progress.get(),
            },
            other => other.clone(),
        }
    }

    /// Upload progress of the current or last submission, 0–100.
    pub fn progress(&self) -> u8 {
        self.progress.get()
    }

    pub fn result(&self) -> Option<&ResultArtifact> {
        self.result.as_ref()
    }

    fn emit(&self, event: SessionEvent) {
        self.config.observer.on_event(&event);
    }

    fn is_submitting(&self) -> bool {
        matches!(self.state, SessionState::Submitting { .. })
    }

    fn ensure_not_submitting(&self) -> Result<(), SessionError> {
        if self.is_submitting() {
            Err(SessionError::SubmitInFlight)
        } else {
            Ok(())
        }
    }

    /// Recompute the resting state from the file list and result.
    fn settle(&mut self) {
        self.state = if self.result.is_some() {
            SessionState::Completed
        } else if self.files.is_empty() {
            SessionState::Idle
        } else {
            SessionState::Ready
        };
    }

    /// Settle unless a result is on display; a failure notice is cleared by
    /// any edit of the file list.
    fn settle_after_edit(&mut self) {
        if !matches!(self.state, SessionState::Completed) {
            self.settle();
        }
    }

    fn validation_failed(&self, err: SessionError) -> SessionError {
        self.emit(SessionEvent::ValidationFailed(err.to_string()));
        err
    }

    fn check_index(&self, index: usize) -> Result<(), SessionError> {
        if index < self.files.len() {
            Ok(())
        } else {
            Err(SessionError::IndexOutOfRange {
                index,
                len: self.files.len(),
            })
        }
    }

    // ── File list ────────────────────────────────────────────────────────

    /// Append a selection in input order. Returns how many files were added.
    ///
    /// Single-file tools keep only the first file of the selection, replacing
    /// whatever was held. Files already in the session (same [`crate::file::FileId`])
    /// are skipped.
    pub fn add_files(&mut self, selection: Vec<ManagedFile>) -> Result<usize, SessionError> {
        self.ensure_not_submitting()?;
        if selection.is_empty() {
            return Err(self.validation_failed(SessionError::EmptySelection));
        }

        let added = if self.spec.multiplicity == Multiplicity::Single {
            let first = selection.into_iter().next().into_iter();
            self.files = first.collect();
            self.files.len()
        } else {
            let mut seen: HashSet<_> = self.files.iter().map(ManagedFile::id).collect();
            let before = self.files.len();
            for file in selection {
                if seen.insert(file.id()) {
                    self.files.push(file);
                } else {
                    debug!("Skipping '{}': already in the session", file.name());
                }
            }
            self.files.len() - before
        };

        if added > 0 {
            info!("{}: {} file(s) added, {} held", self.tool, added, self.files.len());
            self.emit(SessionEvent::FilesAdded(added));
        }
        self.settle_after_edit();
        Ok(added)
    }

    /// Remove and return the file at `index`.
    pub fn remove_file(&mut self, index: usize) -> Result<ManagedFile, SessionError> {
        self.ensure_not_submitting()?;
        self.check_index(index)?;
        let file = self.files.remove(index);
        self.emit(SessionEvent::FileRemoved {
            name: file.name().to_string(),
        });
        self.settle_after_edit();
        Ok(file)
    }

    /// Move the file at `from` so that it ends up at position `to`.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), SessionError> {
        self.ensure_not_submitting()?;
        self.check_index(from)?;
        self.check_index(to)?;
        let file = self.files.remove(from);
        self.files.insert(to, file);
        self.emit(SessionEvent::FilesReordered { from, to });
        self.settle_after_edit();
        Ok(())
    }

    /// Rotate the file at `index` a further 90° clockwise.
    ///
    /// Only tools with a pre-transform bake the rotation into the upload;
    /// for the others it is bookkeeping.
    pub fn rotate(&mut self, index: usize) -> Result<Rotation, SessionError> {
        self.ensure_not_submitting()?;
        self.check_index(index)?;
        let t = &mut self.files[index].transform;
        t.rotation = t.rotation.cycle();
        let rotation = t.rotation;
        self.emit(SessionEvent::TransformChanged { index });
        Ok(rotation)
    }

    /// Toggle the horizontal flip of the file at `index`.
    pub fn flip(&mut self, index: usize) -> Result<bool, SessionError> {
        self.ensure_not_submitting()?;
        self.check_index(index)?;
        let t = &mut self.files[index].transform;
        t.flipped = !t.flipped;
        let flipped = t.flipped;
        self.emit(SessionEvent::TransformChanged { index });
        Ok(flipped)
    }

    /// Drop files, result and progress. Always succeeds, even mid-flight.
    pub fn reset(&mut self) {
        self.files.clear();
        self.result = None;
        self.progress.reset();
        self.state = SessionState::Idle;
        info!("{}: session reset", self.tool);
        self.emit(SessionEvent::SessionReset);
    }

    // ── Submission ───────────────────────────────────────────────────────

    /// Upload the held files with `options` and wait for the result.
    ///
    /// Validation problems return an error and emit exactly one
    /// `ValidationFailed` without touching the network or the state.
    /// Network and server failures move the session to `Failed`, emit
    /// exactly one `UploadFailed`, and keep the file list for a retry.
    pub async fn submit(&mut self, options: ToolOptions) -> Result<ArtifactSummary, SessionError> {
        self.ensure_not_submitting()?;
        if self.files.is_empty() {
            return Err(self.validation_failed(SessionError::NoFiles { tool: self.tool }));
        }
        if !options.matches(self.tool) {
            return Err(self.validation_failed(SessionError::OptionsMismatch {
                tool: self.tool,
                options: options.kind_name(),
            }));
        }
        if let Err(e) = options.validate() {
            return Err(self.validation_failed(e));
        }

        self.result = None;
        self.progress.reset();
        self.state = SessionState::Submitting { progress: 0 };

        let bytes: u64 = self.files.iter().map(ManagedFile::size).sum();
        info!(
            "{}: submitting {} file(s), {} bytes to {}",
            self.tool,
            self.files.len(),
            bytes,
            self.spec.endpoint
        );
        self.emit(SessionEvent::UploadStarted {
            files: self.files.len(),
            bytes,
        });

        match self.run(&options).await {
            Ok(artifact) => {
                if let Some(pct) = self.progress.complete() {
                    self.emit(SessionEvent::UploadProgress(pct));
                }
                let summary = artifact.summary();
                // The split tool keeps its source until every page is taken.
                if self.tool != Tool::PdfToImages {
                    self.files.clear();
                }
                self.result = Some(artifact);
                self.state = SessionState::Completed;
                info!("{}: completed, {}", self.tool, summary);
                self.emit(SessionEvent::UploadSucceeded(summary.clone()));
                Ok(summary)
            }
            Err(e) => {
                let kind = e.kind();
                let message = e.to_string();
                warn!("{}: upload failed ({}): {}", self.tool, kind, message);
                self.state = SessionState::Failed {
                    kind,
                    message: message.clone(),
                };
                self.emit(SessionEvent::UploadFailed { kind, message });
                Err(e)
            }
        }
    }

    async fn prepare_files(&self) -> Vec<PreparedFile> {
        let mut prepared = Vec::with_capacity(self.files.len());
        for file in &self.files {
            if self.spec.pre_transform {
                prepared.push(pretransform::prepare(file, self.config.pre_transform()).await);
            } else {
                prepared.push(PreparedFile::original(file));
            }
        }
        prepared
    }

    fn reporter(&self, index: usize, count: usize) -> ProgressReporter {
        ProgressReporter::new(
            self.progress.clone(),
            SequenceSpan { index, count },
            Arc::clone(&self.config.observer),
        )
    }

    fn payload(&self, files: Vec<PreparedFile>, options: &ToolOptions) -> FormPayload {
        let mut payload = FormPayload::new();
        for f in files {
            payload.file(self.spec.file_field, f.filename, f.content_type, f.bytes);
        }
        for (name, value) in options.fields() {
            payload.text(name, value);
        }
        payload
    }

    async fn run(&self, options: &ToolOptions) -> Result<ResultArtifact, SessionError> {
        let prepared = self.prepare_files().await;
        let endpoint = self.spec.endpoint;

        if self.spec.multiplicity == Multiplicity::PerFile {
            let count = prepared.len();
            let mut blobs = Vec::with_capacity(count);
            for (index, file) in prepared.into_iter().enumerate() {
                let source = file.filename.clone();
                debug!("{}: request {}/{} for '{}'", self.tool, index + 1, count, source);
                let payload = self.payload(vec![file], options);
                let response = self
                    .transport
                    .send(endpoint, payload, self.reporter(index, count))
                    .await?;
                let response = self.expect_ok(response)?;
                blobs.push(self.blob(response, &source, options));
            }
            return Ok(ResultArtifact::Blobs(blobs));
        }

        let source = prepared
            .first()
            .map(|f| f.filename.clone())
            .unwrap_or_default();
        let payload = self.payload(prepared, options);
        let response = self.transport.send(endpoint, payload, self.reporter(0, 1)).await?;
        let response = self.expect_ok(response)?;

        match self.spec.response {
            ResponseShape::Blob => Ok(ResultArtifact::Blob(self.blob(response, &source, options))),
            ResponseShape::BatchReport => BatchReport::from_json(&response.body)
                .map(ResultArtifact::Batch)
                .map_err(|e| self.unexpected(e)),
            ResponseShape::PageImages => PageImages::from_json(&response.body)
                .map(ResultArtifact::Pages)
                .map_err(|e| self.unexpected(e)),
        }
    }

    fn expect_ok(&self, response: TransportResponse) -> Result<TransportResponse, SessionError> {
        if response.is_ok() {
            Ok(response)
        } else {
            Err(SessionError::HttpStatus {
                status: response.status,
                endpoint: self.spec.endpoint.to_string(),
            })
        }
    }

    fn unexpected(&self, e: serde_json::Error) -> SessionError {
        SessionError::UnexpectedResponse {
            endpoint: self.spec.endpoint.to_string(),
            detail: e.to_string(),
        }
    }

    fn blob(&self, response: TransportResponse, source: &str, options: &ToolOptions) -> BlobArtifact {
        BlobArtifact {
            filename: self.download_name(source, options, response.filename.as_deref()),
            content_type: response
                .content_type
                .unwrap_or_else(|| self.spec.response_type.to_string()),
            bytes: response.body,
        }
    }

    /// Name a blob is delivered under, derived from its source file name.
    fn download_name(&self, source: &str, options: &ToolOptions, suggested: Option<&str>) -> String {
        let stem = Path::new(source)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("converted");
        match self.spec.download_name {
            DownloadName::Fixed(name) => name.to_string(),
            DownloadName::SourceStem(ext) => format!("{stem}.{ext}"),
            DownloadName::TargetFormat => match options {
                ToolOptions::Format(target) => format!("{stem}.{}", target.extension()),
                _ => source.to_string(),
            },
            DownloadName::FromResponse => suggested.unwrap_or(source).to_string(),
        }
    }

    // ── Result ───────────────────────────────────────────────────────────

    /// Forget the current result.
    pub fn dismiss_result(&mut self) -> Result<(), SessionError> {
        self.ensure_not_submitting()?;
        if self.result.take().is_some() {
            debug!("{}: result dismissed", self.tool);
            if self.tool == Tool::PdfToImages {
                self.files.clear();
            }
        }
        self.settle();
        Ok(())
    }

    /// Drop the result once nothing is left to take from it.
    fn after_take(&mut self) {
        if self.result.as_ref().is_some_and(ResultArtifact::is_exhausted) {
            self.result = None;
            if self.tool == Tool::PdfToImages {
                self.files.clear();
            }
            self.settle();
        }
    }

    fn delivered(&self, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.emit(SessionEvent::ArtifactDelivered {
            name,
            path: path.to_path_buf(),
        });
    }

    /// Write everything the result still holds. Returns the written paths.
    ///
    /// Blob results are consumed. Batch reports deliver every downloadable
    /// row; pages deliver every page.
    pub async fn deliver(&mut self, deliverer: &Deliverer) -> Result<Vec<PathBuf>, SessionError> {
        self.ensure_not_submitting()?;
        match self.result.as_ref().ok_or(SessionError::NoResult)? {
            ResultArtifact::Blob(_) | ResultArtifact::Blobs(_) => self.deliver_blobs(deliverer),
            ResultArtifact::Batch(report) => {
                // Rows shift left on every take; walk from the back.
                let rows = report.downloadable_rows();
                let mut paths = Vec::with_capacity(rows.len());
                for row in rows.into_iter().rev() {
                    paths.push(self.download_batch_row(row, deliverer).await?);
                }
                paths.reverse();
                Ok(paths)
            }
            ResultArtifact::Pages(_) => self.deliver_pages(&PageSelection::All, deliverer),
        }
    }

    /// Write blobs front to back, dropping each one as soon as it is on
    /// disk so a failed write can be retried without repeating the others.
    fn deliver_blobs(&mut self, deliverer: &Deliverer) -> Result<Vec<PathBuf>, SessionError> {
        let mut paths = Vec::new();
        loop {
            let path = match self.result.as_ref() {
                Some(ResultArtifact::Blob(blob)) => deliverer.write(&blob.filename, &blob.bytes)?,
                Some(ResultArtifact::Blobs(blobs)) => match blobs.first() {
                    Some(blob) => deliverer.write(&blob.filename, &blob.bytes)?,
                    None => break,
                },
                _ => break,
            };
            if matches!(self.result, Some(ResultArtifact::Blobs(_))) {
                if let Some(ResultArtifact::Blobs(blobs)) = self.result.as_mut() {
                    blobs.remove(0);
                }
            } else {
                self.result = None;
            }
            self.delivered(&path);
            paths.push(path);
        }
        if self.result.is_some() {
            self.after_take();
        } else {
            self.settle();
        }
        Ok(paths)
    }

    /// Fetch and write one compressed file, then drop its row.
    pub async fn download_batch_row(
        &mut self,
        row: usize,
        deliverer: &Deliverer,
    ) -> Result<PathBuf, SessionError> {
        self.ensure_not_submitting()?;
        let (url, name) = match self.result.as_ref() {
            Some(ResultArtifact::Batch(report)) => {
                let r = report.downloadable(row)?;
                (
                    r.download_url.clone().unwrap_or_default(),
                    r.output_name().to_string(),
                )
            }
            _ => return Err(SessionError::NoResult),
        };

        let response = self.transport.fetch(&url).await?;
        if !response.is_ok() {
            return Err(SessionError::HttpStatus {
                status: response.status,
                endpoint: url,
            });
        }
        let path = deliverer.write(&name, &response.body)?;

        if let Some(ResultArtifact::Batch(report)) = self.result.as_mut() {
            report.take(row)?;
        }
        self.delivered(&path);
        self.after_take();
        Ok(path)
    }

    /// Decode and write the page at display position `index`, then drop it.
    pub fn download_page(&mut self, index: usize, deliverer: &Deliverer) -> Result<PathBuf, SessionError> {
        self.ensure_not_submitting()?;
        let page = match self.result.as_ref() {
            Some(ResultArtifact::Pages(pages)) => {
                pages.pages.get(index).ok_or(SessionError::IndexOutOfRange {
                    index,
                    len: pages.len(),
                })?
            }
            _ => return Err(SessionError::NoResult),
        };
        let png = page.decode().map_err(|e| SessionError::UnexpectedResponse {
            endpoint: self.spec.endpoint.to_string(),
            detail: format!("page {} is not valid base64: {e}", page.number),
        })?;
        let path = deliverer.write(&page.filename(), &png)?;

        if let Some(ResultArtifact::Pages(pages)) = self.result.as_mut() {
            pages.take(index)?;
        }
        self.delivered(&path);
        self.after_take();
        Ok(path)
    }

    /// Write the selected pages (1-based numbers) that are still held.
    pub fn deliver_pages(
        &mut self,
        selection: &PageSelection,
        deliverer: &Deliverer,
    ) -> Result<Vec<PathBuf>, SessionError> {
        let numbers: Vec<usize> = match self.result.as_ref() {
            Some(ResultArtifact::Pages(pages)) => {
                let highest = pages.pages.iter().map(|p| p.number).max().unwrap_or(0);
                selection
                    .to_numbers(highest)
                    .into_iter()
                    .filter(|n| pages.position_of(*n).is_some())
                    .collect()
            }
            _ => return Err(SessionError::NoResult),
        };

        let mut paths = Vec::with_capacity(numbers.len());
        for number in numbers {
            let position = match self.result.as_ref() {
                Some(ResultArtifact::Pages(pages)) => pages.position_of(number),
                _ => None,
            };
            if let Some(index) = position {
                paths.push(self.download_page(index, deliverer)?);
            }
        }
        Ok(paths)
    }
}
