//! End-to-end session flows against an in-process fake backend.
//!
//! `FakeBackend` answers like the real service does per endpoint, so these
//! tests exercise the public API from file selection to files on disk
//! without a network.
//!
//! Run with:
//!   cargo test --test session_flow -- --nocapture

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fileconv_client::{
    ArtifactSummary, ClientConfig, CompressionSettings, Deliverer, FailureKind, FormField,
    FormPayload, ImageFormatTarget, ManagedFile, PageSelection, ProgressReporter,
    RecordingObserver, ResultArtifact, SessionError, SessionEvent, SessionState, Tool,
    ToolOptions, Transport, TransportError, TransportResponse, UploadSession, WatermarkOptions,
};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fake backend ─────────────────────────────────────────────────────────────

const DOWNLOAD_BASE: &str = "http://127.0.0.1:8000/download/";

/// Answers every endpoint the way the conversion service does.
#[derive(Default)]
struct FakeBackend {
    sent: Mutex<Vec<(String, FormPayload)>>,
    fetched: Mutex<Vec<String>>,
    /// Fail this many upcoming `send` calls with a 500.
    fail_next: AtomicUsize,
}

impl FakeBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn sent(&self) -> Vec<(String, FormPayload)> {
        self.sent.lock().unwrap().clone()
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    fn ok(content_type: &str, body: Vec<u8>) -> TransportResponse {
        TransportResponse {
            status: 200,
            content_type: Some(content_type.to_string()),
            filename: None,
            body,
        }
    }

    fn compress_report(payload: &FormPayload) -> Vec<u8> {
        let results: Vec<serde_json::Value> = payload
            .filenames()
            .into_iter()
            .map(|name| {
                if name.ends_with(".exe") {
                    serde_json::json!({ "file": name, "status": "unsupported" })
                } else {
                    let compressed = format!("small_{name}");
                    serde_json::json!({
                        "file": name,
                        "compressed_name": compressed,
                        "original_size": 1000,
                        "compressed_size": 250,
                        "saved_percent": 75.0,
                        "status": "success",
                        "download_url": format!("{DOWNLOAD_BASE}{compressed}"),
                    })
                }
            })
            .collect();
        serde_json::to_vec(&serde_json::json!({ "results": results })).unwrap()
    }

    fn split_pages() -> Vec<u8> {
        let images: Vec<String> = (1..=4)
            .map(|n| STANDARD.encode(format!("png page {n}")))
            .collect();
        serde_json::to_vec(&serde_json::json!({ "images": images })).unwrap()
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(
        &self,
        endpoint: &str,
        payload: FormPayload,
        progress: ProgressReporter,
    ) -> Result<TransportResponse, TransportError> {
        let total = payload.file_bytes().max(1);
        progress.report(total / 2, total);
        progress.report(total, total);
        self.sent
            .lock()
            .unwrap()
            .push((endpoint.to_string(), payload.clone()));

        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(TransportResponse {
                status: 500,
                content_type: None,
                filename: None,
                body: b"Internal Server Error".to_vec(),
            });
        }

        Ok(match endpoint {
            "/compress-file/" => Self::ok("application/json", Self::compress_report(&payload)),
            "/pdf-to-images/" => Self::ok("application/json", Self::split_pages()),
            "/image-format-converter/" => {
                let format = payload.text_value("format").unwrap_or("JPEG").to_string();
                Self::ok("application/octet-stream", format.into_bytes())
            }
            _ => Self::ok("application/pdf", b"%PDF-1.7 fake".to_vec()),
        })
    }

    async fn fetch(&self, url: &str) -> Result<TransportResponse, TransportError> {
        self.fetched.lock().unwrap().push(url.to_string());
        let name = url.rsplit('/').next().unwrap_or_default();
        Ok(Self::ok(
            "application/octet-stream",
            format!("compressed {name}").into_bytes(),
        ))
    }

    async fn post_json(
        &self,
        _endpoint: &str,
        _body: serde_json::Value,
    ) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status: 201,
            content_type: None,
            filename: None,
            body: Vec::new(),
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn session(tool: Tool) -> (UploadSession, Arc<FakeBackend>, Arc<RecordingObserver>) {
    let rec = RecordingObserver::new();
    let config = ClientConfig::builder()
        .observer(rec.clone())
        .max_edge(64)
        .build()
        .unwrap();
    let backend = FakeBackend::new();
    let s = UploadSession::new(tool, config, backend.clone());
    (s, backend, rec)
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn uploaded_files(payload: &FormPayload) -> Vec<(String, String, Vec<u8>)> {
    payload
        .fields
        .iter()
        .filter_map(|f| match f {
            FormField::File {
                name,
                filename,
                bytes,
                ..
            } => Some((name.clone(), filename.clone(), bytes.to_vec())),
            FormField::Text { .. } => None,
        })
        .collect()
}

fn assert_monotonic_to_100(rec: &RecordingObserver) {
    let values = rec.progress_values();
    assert!(!values.is_empty(), "no progress events");
    assert!(
        values.windows(2).all(|w| w[0] < w[1]),
        "progress went backwards: {values:?}"
    );
    assert_eq!(values.last(), Some(&100));
}

// ── Flows ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn images_to_pdf_prepares_orders_and_delivers() {
    let (mut s, backend, rec) = session(Tool::ImagesToPdf);
    s.add_files(vec![
        ManagedFile::from_bytes("wide.png", png(200, 100)),
        ManagedFile::from_bytes("square.png", png(50, 50)),
    ])
    .unwrap();
    s.rotate(0).unwrap();
    s.reorder(1, 0).unwrap();

    let summary = s.submit(ToolOptions::None).await.unwrap();
    assert!(matches!(summary, ArtifactSummary::Blob { .. }));
    assert_eq!(s.state(), SessionState::Completed);
    assert!(s.files().is_empty());
    assert_monotonic_to_100(&rec);

    let sent = backend.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "/images-to-pdf/");
    let files = uploaded_files(&sent[0].1);
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|(field, _, _)| field == "images"));
    assert_eq!(files[0].1, "square.png");
    assert_eq!(files[1].1, "wide.png");

    // Rotated a quarter turn and fitted to 64px: 200x100 becomes 32x64.
    let rotated = image::load_from_memory(&files[1].2).unwrap();
    assert_eq!((rotated.width(), rotated.height()), (32, 64));
    assert_eq!(&files[1].2[..2], &[0xFF, 0xD8]);

    let dir = tempfile::tempdir().unwrap();
    let written = s.deliver(&Deliverer::new(dir.path())).await.unwrap();
    assert_eq!(written, vec![dir.path().join("Converted.pdf")]);
    assert_eq!(std::fs::read(&written[0]).unwrap(), b"%PDF-1.7 fake");
    assert!(s.result().is_none());
    assert_eq!(s.state(), SessionState::Idle);
}

#[tokio::test]
async fn compress_downloads_each_successful_row_once() {
    let (mut s, backend, rec) = session(Tool::Compress);
    s.add_files(vec![
        ManagedFile::from_bytes("photo.jpg", vec![1; 1000]),
        ManagedFile::from_bytes("setup.exe", vec![2; 1000]),
        ManagedFile::from_bytes("notes.pdf", vec![3; 1000]),
    ])
    .unwrap();

    let options = ToolOptions::Compression(CompressionSettings {
        image_quality: 40,
        ..CompressionSettings::default()
    });
    let summary = s.submit(options).await.unwrap();
    match summary {
        ArtifactSummary::Batch(b) => {
            assert_eq!(b.succeeded, 2);
            assert_eq!(b.failed, 1);
            assert_eq!(b.bytes_saved, 1500);
        }
        other => panic!("expected a batch, got {other:?}"),
    }

    let payload = &backend.sent()[0].1;
    assert_eq!(payload.text_value("image_quality"), Some("40"));
    assert_eq!(payload.text_value("video_bitrate"), Some("800k"));

    let dir = tempfile::tempdir().unwrap();
    let deliverer = Deliverer::new(dir.path());

    // The unsupported row has nothing to download.
    let err = s.download_batch_row(1, &deliverer).await.unwrap_err();
    assert!(matches!(err, SessionError::NotDownloadable { .. }));

    let first = s.download_batch_row(0, &deliverer).await.unwrap();
    assert_eq!(first, dir.path().join("small_photo.jpg"));
    assert_eq!(std::fs::read(&first).unwrap(), b"compressed small_photo.jpg");
    match s.result() {
        Some(ResultArtifact::Batch(r)) => assert_eq!(r.len(), 2),
        other => panic!("expected a batch, got {other:?}"),
    }

    let rest = s.deliver(&deliverer).await.unwrap();
    assert_eq!(rest, vec![dir.path().join("small_notes.pdf")]);
    assert_eq!(
        backend.fetched(),
        vec![
            format!("{DOWNLOAD_BASE}small_photo.jpg"),
            format!("{DOWNLOAD_BASE}small_notes.pdf"),
        ]
    );
    assert_eq!(
        rec.count(|e| matches!(e, SessionEvent::ArtifactDelivered { .. })),
        2
    );
}

#[tokio::test]
async fn split_keeps_source_until_every_page_is_taken() {
    let (mut s, _, _) = session(Tool::PdfToImages);
    s.add_files(vec![ManagedFile::from_bytes("deck.pdf", b"%PDF".to_vec())])
        .unwrap();
    let summary = s.submit(ToolOptions::None).await.unwrap();
    assert_eq!(summary, ArtifactSummary::Pages { count: 4 });
    assert_eq!(s.files().len(), 1);

    let dir = tempfile::tempdir().unwrap();
    let deliverer = Deliverer::new(dir.path());
    let written = s
        .deliver_pages(&PageSelection::Range(2, 3), &deliverer)
        .unwrap();
    assert_eq!(
        written,
        vec![dir.path().join("page_2.png"), dir.path().join("page_3.png")]
    );
    assert_eq!(std::fs::read(&written[0]).unwrap(), b"png page 2");

    // Asking again for a taken page writes nothing.
    assert!(s
        .deliver_pages(&PageSelection::Single(2), &deliverer)
        .unwrap()
        .is_empty());
    assert_eq!(s.files().len(), 1);
    assert_eq!(s.state(), SessionState::Completed);

    let rest = s.deliver(&deliverer).await.unwrap();
    assert_eq!(rest.len(), 2);
    assert!(s.result().is_none());
    assert!(s.files().is_empty());
    assert_eq!(s.state(), SessionState::Idle);
}

#[tokio::test]
async fn server_error_keeps_files_for_a_retry() {
    let (mut s, backend, rec) = session(Tool::MergePdf);
    backend.fail_next.store(1, Ordering::SeqCst);
    s.add_files(vec![
        ManagedFile::from_bytes("a.pdf", b"%PDF a".to_vec()),
        ManagedFile::from_bytes("b.pdf", b"%PDF b".to_vec()),
    ])
    .unwrap();

    let err = s.submit(ToolOptions::None).await.unwrap_err();
    assert!(matches!(err, SessionError::HttpStatus { status: 500, .. }));
    assert!(matches!(
        s.state(),
        SessionState::Failed {
            kind: FailureKind::Server,
            ..
        }
    ));
    assert_eq!(s.files().len(), 2);
    assert!(s.result().is_none());
    assert_eq!(
        rec.count(|e| matches!(e, SessionEvent::UploadFailed { .. })),
        1
    );

    let summary = s.submit(ToolOptions::None).await.unwrap();
    assert_eq!(
        summary,
        ArtifactSummary::Blob {
            filename: "Merged.pdf".into(),
            bytes: 13,
        }
    );
    let order: Vec<String> = uploaded_files(&backend.sent()[1].1)
        .into_iter()
        .map(|(_, name, _)| name)
        .collect();
    assert_eq!(order, ["a.pdf", "b.pdf"]);
}

#[tokio::test]
async fn image_format_sends_one_request_per_file() {
    let (mut s, backend, rec) = session(Tool::ImageFormat);
    s.add_files(vec![
        ManagedFile::from_bytes("a.png", png(4, 4)),
        ManagedFile::from_bytes("b.bmp", png(4, 4)),
    ])
    .unwrap();

    let summary = s
        .submit(ToolOptions::Format(ImageFormatTarget::Webp))
        .await
        .unwrap();
    assert!(matches!(summary, ArtifactSummary::Blobs { count: 2, .. }));
    assert_monotonic_to_100(&rec);

    let sent = backend.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent
        .iter()
        .all(|(_, p)| p.text_value("format") == Some("WEBP")));

    let dir = tempfile::tempdir().unwrap();
    let written = s.deliver(&Deliverer::new(dir.path())).await.unwrap();
    assert_eq!(
        written,
        vec![dir.path().join("a.webp"), dir.path().join("b.webp")]
    );
}

#[tokio::test]
async fn watermark_validation_happens_before_the_network() {
    let (mut s, backend, rec) = session(Tool::Watermark);
    s.add_files(vec![ManagedFile::from_bytes("photo.jpg", vec![0; 10])])
        .unwrap();

    let bad = ToolOptions::Watermark(WatermarkOptions {
        opacity: 3.0,
        ..WatermarkOptions::default()
    });
    let err = s.submit(bad).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidOptions(_)));
    assert_eq!(err.kind(), FailureKind::Validation);
    assert!(backend.sent().is_empty());
    assert_eq!(
        rec.count(|e| matches!(e, SessionEvent::ValidationFailed(_))),
        1
    );
    assert_eq!(s.state(), SessionState::Ready);

    let good = ToolOptions::Watermark(WatermarkOptions {
        text: "© studio".into(),
        ..WatermarkOptions::default()
    });
    s.submit(good).await.unwrap();
    let payload = &backend.sent()[0].1;
    assert_eq!(payload.text_value("watermark_text"), Some("© studio"));
    assert_eq!(payload.text_value("position"), Some("bottom-right"));
}

#[tokio::test]
async fn reset_clears_everything() {
    let (mut s, _, rec) = session(Tool::DocxToPdf);
    s.add_files(vec![ManagedFile::from_bytes("a.docx", vec![1; 4])])
        .unwrap();
    s.submit(ToolOptions::None).await.unwrap();
    assert!(s.result().is_some());

    s.reset();
    assert_eq!(s.state(), SessionState::Idle);
    assert!(s.result().is_none());
    assert!(s.files().is_empty());
    assert_eq!(s.progress(), 0);
    assert_eq!(rec.count(|e| matches!(e, SessionEvent::SessionReset)), 1);
}
