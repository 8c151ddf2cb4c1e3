//! Upload progress as a shared, forward-only percentage.
//!
//! Transports report raw byte counts at whatever granularity the network
//! stack produces them. [`UploadProgress`] turns those into a whole-number
//! percentage and refuses to move backwards, so a late or duplicated tick can
//! never make a progress bar jump back.
//!
//! The cell is shared (`Clone` hands out another handle to the same value)
//! because the transport reports from inside the request body stream while
//! the session and its observers read it.

use crate::events::{NoopObserver, SessionEvent, SessionObserver};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Whole-number percentage of `sent` over `total`, rounded and clamped.
///
/// An empty body counts as complete.
pub fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = ((sent as f64) * 100.0 / (total as f64)).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Monotonic progress cell for one submission.
#[derive(Debug, Clone, Default)]
pub struct UploadProgress {
    value: Arc<AtomicU8>,
}

impl UploadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current percentage, 0–100.
    pub fn get(&self) -> u8 {
        self.value.load(Ordering::SeqCst)
    }

    /// Record `sent` of `total` bytes. Returns the new value if it moved.
    pub fn advance(&self, sent: u64, total: u64) -> Option<u8> {
        self.advance_to(percent(sent, total))
    }

    /// Move to `pct` (clamped) if that is forward. Returns the new value if it moved.
    pub fn advance_to(&self, pct: u8) -> Option<u8> {
        let pct = pct.min(100);
        let prev = self.value.fetch_max(pct, Ordering::SeqCst);
        (pct > prev).then_some(pct)
    }

    pub fn complete(&self) -> Option<u8> {
        self.advance_to(100)
    }

    /// Back to zero; only between submissions.
    pub(crate) fn reset(&self) {
        self.value.store(0, Ordering::SeqCst);
    }
}

/// Maps the progress of one request in a sequence onto the whole sequence.
///
/// For tools that send one request per file, file `index` of `count` covers
/// the span `[index*100/count, (index+1)*100/count]`.
#[derive(Debug, Clone, Copy)]
pub struct SequenceSpan {
    pub index: usize,
    pub count: usize,
}

impl SequenceSpan {
    pub fn overall(&self, request_pct: u8) -> u8 {
        if self.count == 0 {
            return 100;
        }
        let done = (self.index as u64) * 100 + u64::from(request_pct.min(100));
        (done / self.count as u64).min(100) as u8
    }
}

/// What a transport calls while streaming a request body.
///
/// Bundles the shared cell, the span of the current request within its
/// sequence, and the observer that hears about forward moves.
#[derive(Clone)]
pub struct ProgressReporter {
    cell: UploadProgress,
    span: SequenceSpan,
    observer: Arc<dyn SessionObserver>,
}

impl ProgressReporter {
    pub fn new(cell: UploadProgress, span: SequenceSpan, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            cell,
            span,
            observer,
        }
    }

    /// A reporter that only updates `cell`.
    pub fn silent(cell: UploadProgress) -> Self {
        Self::new(cell, SequenceSpan { index: 0, count: 1 }, Arc::new(NoopObserver))
    }

    /// `sent` of `total` bytes of the current request are on the wire.
    pub fn report(&self, sent: u64, total: u64) {
        let overall = self.span.overall(percent(sent, total));
        if let Some(pct) = self.cell.advance_to(overall) {
            self.observer.on_event(&SessionEvent::UploadProgress(pct));
        }
    }

    pub fn get(&self) -> u8 {
        self.cell.get()
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("value", &self.cell.get())
            .field("span", &self.span)
            .finish()
    }
}
