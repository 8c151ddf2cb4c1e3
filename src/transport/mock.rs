//! In-memory transport for testing.

use super::{FormPayload, Transport, TransportResponse};
use crate::error::TransportError;
use crate::progress::ProgressReporter;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A request the mock has seen.
#[derive(Debug, Clone)]
pub enum Recorded {
    Send { endpoint: String, payload: FormPayload },
    Fetch { url: String },
    PostJson { endpoint: String, body: serde_json::Value },
}

/// Scripted [`Transport`]: replays queued responses in order and records
/// every request.
///
/// `send` reports progress in four equal steps before answering, so
/// observers see a realistic progress sequence.
///
/// Enabled by the `mock` feature for downstream tests.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<Recorded>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn respond(&self, response: TransportResponse) -> &Self {
        self.push(Ok(response))
    }

    /// Queue a 200 with a binary body.
    pub fn respond_ok(&self, content_type: &str, body: impl Into<Vec<u8>>) -> &Self {
        self.respond(TransportResponse {
            status: 200,
            content_type: Some(content_type.to_string()),
            filename: None,
            body: body.into(),
        })
    }

    /// Queue a bare status with an empty body.
    pub fn respond_status(&self, status: u16) -> &Self {
        self.respond(TransportResponse {
            status,
            content_type: None,
            filename: None,
            body: Vec::new(),
        })
    }

    /// Queue a transport failure.
    pub fn fail(&self, error: TransportError) -> &Self {
        self.push(Err(error))
    }

    fn push(&self, item: Result<TransportResponse, TransportError>) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Payloads of every `send`, in order.
    pub fn sent_payloads(&self) -> Vec<FormPayload> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Send { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn record(&self, request: Recorded) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
    }

    fn next(&self, what: &str) -> Result<TransportResponse, TransportError> {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| {
                Err(TransportError::Request {
                    url: what.to_string(),
                    reason: "no scripted response left".to_string(),
                })
            })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        endpoint: &str,
        payload: FormPayload,
        progress: ProgressReporter,
    ) -> Result<TransportResponse, TransportError> {
        let total = payload.file_bytes();
        self.record(Recorded::Send {
            endpoint: endpoint.to_string(),
            payload,
        });
        for step in 1..=4u64 {
            progress.report(total * step / 4, total);
        }
        self.next(endpoint)
    }

    async fn fetch(&self, url: &str) -> Result<TransportResponse, TransportError> {
        self.record(Recorded::Fetch {
            url: url.to_string(),
        });
        self.next(url)
    }

    async fn post_json(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<TransportResponse, TransportError> {
        self.record(Recorded::PostJson {
            endpoint: endpoint.to_string(),
            body,
        });
        self.next(endpoint)
    }
}
