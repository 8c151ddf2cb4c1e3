//! CLI binary for fileconv-client.
//!
//! A thin shim over the library crate: maps flags to `ClientConfig`,
//! tool options and file edits, runs one session, and writes the results
//! into the output directory.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fileconv_client::config::DEFAULT_BASE_URL;
use fileconv_client::{
    BatchRow, ClientConfig, CompressionSettings, ContactMessage, Deliverer, FileId, HttpTransport,
    ImageFormatTarget, ManagedFile, PageSelection, ResultArtifact, SessionEvent, SessionObserver,
    Tool, ToolOptions, UploadSession, WatermarkOptions, WatermarkPosition,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: an upload progress bar plus one line per notice.
struct CliObserver {
    /// `None` with `--no-progress` / `--json`; notices then go straight to stderr.
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl CliObserver {
    fn new(show_progress: bool, quiet: bool) -> Arc<Self> {
        let bar = show_progress.then(|| {
            let bar = ProgressBar::new(100);
            let style = ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}%  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
            bar.set_style(style);
            bar.set_prefix("Uploading");
            bar
        });
        Arc::new(Self { bar, quiet })
    }

    fn line(&self, msg: String) {
        if self.quiet {
            return;
        }
        match &self.bar {
            Some(bar) => bar.println(msg),
            None => eprintln!("{msg}"),
        }
    }
}

impl SessionObserver for CliObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::UploadStarted { files, bytes } => {
                if let Some(bar) = &self.bar {
                    bar.reset();
                    bar.enable_steady_tick(Duration::from_millis(80));
                }
                self.line(format!(
                    "{} {}",
                    cyan("◆"),
                    bold(&format!("Uploading {files} file(s), {}", human_bytes(*bytes)))
                ));
            }
            SessionEvent::UploadProgress(pct) => {
                if let Some(bar) = &self.bar {
                    bar.set_position(u64::from(*pct));
                    if *pct == 100 {
                        bar.set_prefix("Converting");
                    }
                }
            }
            SessionEvent::UploadSucceeded(summary) => {
                if let Some(bar) = &self.bar {
                    bar.finish_and_clear();
                }
                self.line(format!("{} {}", green("✔"), summary));
            }
            SessionEvent::UploadFailed { kind, message } => {
                if let Some(bar) = &self.bar {
                    bar.abandon();
                }
                // Errors are printed even in quiet mode.
                eprintln!("{} {} error: {}", red("✘"), kind, message);
            }
            SessionEvent::ValidationFailed(reason) => {
                eprintln!("{} {}", yellow("⚠"), reason);
            }
            SessionEvent::ArtifactDelivered { path, .. } => {
                self.line(format!(
                    "  {} {}",
                    green("✓"),
                    bold(&path.display().to_string())
                ));
            }
            other => {
                if let Some(notice) = other.notice() {
                    self.line(dim(&notice.message));
                }
            }
        }
    }
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Photos to one PDF, second photo rotated a quarter turn, first moved last
  fileconv images-to-pdf scan1.jpg scan2.jpg scan3.jpg --rotate 2 --move 1:3

  # Merge PDFs in the given order into ./out
  fileconv -o out merge-pdf intro.pdf body.pdf appendix.pdf

  # Word to PDF and back
  fileconv docx-to-pdf report.docx
  fileconv pdf-to-docx report.pdf

  # Compress a mixed batch, keep only the report
  fileconv compress photo.jpg clip.mp4 notes.pdf --quality 50 --no-download

  # Split pages 2-4 of a PDF into PNG files
  fileconv pdf-to-images deck.pdf --pages 2-4

  # Convert images to WEBP, one request per file
  fileconv image-format a.png b.bmp --to webp

  # Watermark a photo
  fileconv watermark photo.jpg --text "© me" --position diagonal --opacity 0.3

  # Machine-readable summary
  fileconv --json merge-pdf a.pdf b.pdf > result.json

ENVIRONMENT VARIABLES:
  FILECONV_BASE_URL     Backend address (default http://127.0.0.1:8000)
  FILECONV_OUTPUT_DIR   Where results are written (default .)
  FILECONV_TIMEOUT      Whole-request timeout in seconds (default none)
  RUST_LOG              Overrides the log filter (e.g. fileconv_client=debug)
"#;

/// Drive the file-conversion service from the terminal.
#[derive(Parser, Debug)]
#[command(
    name = "fileconv",
    version,
    about = "Convert, merge, split, compress and watermark files via a fileconv backend",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Backend base URL.
    #[arg(long, global = true, env = "FILECONV_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Directory results are written to.
    #[arg(short, long, global = true, env = "FILECONV_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Replace existing output files.
    #[arg(long, global = true, env = "FILECONV_OVERWRITE")]
    overwrite: bool,

    /// Whole-request timeout in seconds (default: wait as long as the server does).
    #[arg(long, global = true, env = "FILECONV_TIMEOUT")]
    timeout: Option<u64>,

    /// Longest edge of pre-transformed images in pixels.
    #[arg(long, global = true, env = "FILECONV_MAX_EDGE", default_value_t = 1000)]
    max_edge: u32,

    /// JPEG quality of pre-transformed images (1–100).
    #[arg(long, global = true, env = "FILECONV_JPEG_QUALITY", default_value_t = 70,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Print a JSON summary on stdout.
    #[arg(long, global = true, env = "FILECONV_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "FILECONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FILECONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FILECONV_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Combine images into one PDF (images are rotated, downscaled and re-encoded first).
    ImagesToPdf {
        #[command(flatten)]
        files: FileArgs,
        #[command(flatten)]
        edits: ImageEdits,
    },
    /// Convert Word documents to PDF.
    DocxToPdf {
        #[command(flatten)]
        files: FileArgs,
    },
    /// Convert one PDF to a Word document.
    PdfToDocx {
        /// The PDF to convert.
        file: PathBuf,
    },
    /// Merge PDFs in order.
    MergePdf {
        #[command(flatten)]
        files: FileArgs,
    },
    /// Compress images, videos, audio and documents.
    Compress {
        #[command(flatten)]
        files: FileArgs,
        /// JPEG quality for images (10–95).
        #[arg(long, default_value_t = 60)]
        quality: u8,
        /// Video bitrate, e.g. 800k.
        #[arg(long, default_value = "800k")]
        video_bitrate: String,
        /// Audio bitrate, e.g. 128k.
        #[arg(long, default_value = "128k")]
        audio_bitrate: String,
        /// Only print the report; do not download compressed files.
        #[arg(long)]
        no_download: bool,
    },
    /// Split a PDF into one PNG per page.
    PdfToImages {
        /// The PDF to split.
        file: PathBuf,
        /// Pages to write: all, 5, 3-15, or 1,3,5,7.
        #[arg(long, default_value = "all")]
        pages: String,
    },
    /// Convert images to another format, one request per file.
    ImageFormat {
        #[command(flatten)]
        files: FileArgs,
        /// Target format: jpeg, png, webp, bmp, gif, tiff, avif, heif.
        #[arg(long, default_value = "jpeg")]
        to: String,
    },
    /// Stamp a text watermark onto one image.
    Watermark {
        /// The image to watermark.
        file: PathBuf,
        #[arg(long, default_value = "fileconv")]
        text: String,
        /// top-left, top-right, center, bottom-left, bottom-right, diagonal.
        #[arg(long, default_value = "bottom-right")]
        position: String,
        #[arg(long, default_value_t = 36)]
        font_size: u32,
        /// #rrggbb
        #[arg(long, default_value = "#ffffff")]
        color: String,
        /// 0.0–1.0
        #[arg(long, default_value_t = 0.4)]
        opacity: f32,
    },
    /// Send a message to the service operators.
    Contact {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        message: String,
    },
}

#[derive(Args, Debug)]
struct FileArgs {
    /// Input files, in upload order.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Move file FROM to position TO (1-indexed), e.g. --move 3:1. Repeatable, applied in order.
    #[arg(long = "move", value_name = "FROM:TO")]
    moves: Vec<String>,
}

#[derive(Args, Debug)]
struct ImageEdits {
    /// Rotate file N (1-indexed, after moves) 90° clockwise. Repeat to rotate further.
    #[arg(long, value_name = "N")]
    rotate: Vec<usize>,

    /// Mirror file N (1-indexed, after moves) horizontally.
    #[arg(long, value_name = "N")]
    flip: Vec<usize>,
}

/// What one CLI invocation asks a session to do.
struct Job {
    tool: Tool,
    paths: Vec<PathBuf>,
    moves: Vec<String>,
    rotate: Vec<usize>,
    flip: Vec<usize>,
    options: ToolOptions,
    pages: PageSelection,
    download: bool,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    tool: Tool,
    summary: fileconv_client::ArtifactSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<&'a [BatchRow]>,
    written: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let observer = CliObserver::new(show_progress, cli.quiet || cli.json);
    let mut builder = ClientConfig::builder()
        .base_url(cli.base_url.clone())
        .max_edge(cli.max_edge)
        .jpeg_quality(cli.jpeg_quality)
        .observer(observer);
    if let Some(secs) = cli.timeout {
        builder = builder.timeout_secs(secs);
    }
    let config = builder.build().context("Invalid configuration")?;

    let job = match job_for(&cli.command)? {
        Some(job) => job,
        None => return send_contact(&cli, &config).await,
    };

    run_job(&cli, config, job).await
}

async fn send_contact(cli: &Cli, config: &ClientConfig) -> Result<()> {
    let Command::Contact {
        name,
        email,
        message,
    } = &cli.command
    else {
        anyhow::bail!("not a contact command");
    };
    let transport = HttpTransport::new(config).context("Failed to build HTTP client")?;
    ContactMessage::new(name.as_str(), email.as_str(), message.as_str())
        .send(&transport)
        .await
        .context("Failed to send message")?;
    if cli.json {
        println!("{}", serde_json::json!({ "sent": true }));
    } else if !cli.quiet {
        eprintln!("{} Message sent. Thanks!", green("✔"));
    }
    Ok(())
}

/// Map a subcommand to a job. `None` for the contact form.
fn job_for(command: &Command) -> Result<Option<Job>> {
    let plain = |tool: Tool, files: &FileArgs| Job {
        tool,
        paths: files.files.clone(),
        moves: files.moves.clone(),
        rotate: Vec::new(),
        flip: Vec::new(),
        options: ToolOptions::default_for(tool),
        pages: PageSelection::All,
        download: true,
    };
    let single = |tool: Tool, file: &PathBuf| Job {
        tool,
        paths: vec![file.clone()],
        moves: Vec::new(),
        rotate: Vec::new(),
        flip: Vec::new(),
        options: ToolOptions::default_for(tool),
        pages: PageSelection::All,
        download: true,
    };

    let job = match command {
        Command::ImagesToPdf { files, edits } => Job {
            rotate: edits.rotate.clone(),
            flip: edits.flip.clone(),
            ..plain(Tool::ImagesToPdf, files)
        },
        Command::DocxToPdf { files } => plain(Tool::DocxToPdf, files),
        Command::PdfToDocx { file } => single(Tool::PdfToDocx, file),
        Command::MergePdf { files } => plain(Tool::MergePdf, files),
        Command::Compress {
            files,
            quality,
            video_bitrate,
            audio_bitrate,
            no_download,
        } => Job {
            options: ToolOptions::Compression(CompressionSettings {
                image_quality: *quality,
                video_bitrate: video_bitrate.clone(),
                audio_bitrate: audio_bitrate.clone(),
            }),
            download: !no_download,
            ..plain(Tool::Compress, files)
        },
        Command::PdfToImages { file, pages } => Job {
            pages: parse_pages(pages)?,
            ..single(Tool::PdfToImages, file)
        },
        Command::ImageFormat { files, to } => {
            let target: ImageFormatTarget = to.parse().map_err(anyhow::Error::msg)?;
            Job {
                options: ToolOptions::Format(target),
                ..plain(Tool::ImageFormat, files)
            }
        }
        Command::Watermark {
            file,
            text,
            position,
            font_size,
            color,
            opacity,
        } => {
            let position: WatermarkPosition = position.parse().map_err(anyhow::Error::msg)?;
            Job {
                options: ToolOptions::Watermark(WatermarkOptions {
                    text: text.clone(),
                    position,
                    font_size: *font_size,
                    color: color.clone(),
                    opacity: *opacity,
                }),
                ..single(Tool::Watermark, file)
            }
        }
        Command::Contact { .. } => return Ok(None),
    };
    Ok(Some(job))
}

async fn run_job(cli: &Cli, config: ClientConfig, job: Job) -> Result<()> {
    let spec = job.tool.spec();

    // ── Pick files ───────────────────────────────────────────────────────
    let mut selected = Vec::with_capacity(job.paths.len());
    for path in &job.paths {
        selected.push(
            ManagedFile::from_path(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }
    // Positions refer to the files as given on the command line, so they
    // are resolved before anything is filtered out.
    let arranged = arrange(selected, &job.moves, &job.rotate, &job.flip)?;
    let before = arranged.files.len();
    let selected = spec.accept.filter_accepted(arranged.files);
    if selected.len() < before && !cli.quiet {
        eprintln!(
            "{} skipped {} file(s) that {} does not accept",
            yellow("⚠"),
            before - selected.len(),
            job.tool
        );
    }
    if let Some(id) = arranged
        .rotate
        .iter()
        .chain(&arranged.flip)
        .find(|id| !selected.iter().any(|f| f.id() == **id))
    {
        anyhow::bail!("A file picked by --rotate/--flip ({id}) is not accepted by {}", job.tool);
    }

    let mut session = UploadSession::connect(job.tool, config).context("Failed to set up session")?;
    session
        .add_files(selected)
        .context("Nothing to upload")?;

    for id in &arranged.rotate {
        let index = index_of(&session, *id)?;
        session.rotate(index).context("Failed to rotate")?;
    }
    for id in &arranged.flip {
        let index = index_of(&session, *id)?;
        session.flip(index).context("Failed to flip")?;
    }

    // ── Upload ───────────────────────────────────────────────────────────
    let summary = session
        .submit(job.options)
        .await
        .context("Conversion failed")?;

    // ── Deliver ──────────────────────────────────────────────────────────
    let deliverer = Deliverer::new(&cli.output_dir).overwrite(cli.overwrite);
    let rows: Option<Vec<BatchRow>> = match session.result() {
        Some(ResultArtifact::Batch(report)) => Some(report.rows.clone()),
        _ => None,
    };
    if let Some(rows) = &rows {
        if !cli.json && !cli.quiet {
            print_batch(rows);
        }
    }

    let is_pages = matches!(session.result(), Some(ResultArtifact::Pages(_)));
    let written = if session.result().is_none() || (rows.is_some() && !job.download) {
        Vec::new()
    } else if is_pages {
        session
            .deliver_pages(&job.pages, &deliverer)
            .context("Failed to write pages")?
    } else {
        session
            .deliver(&deliverer)
            .await
            .context("Failed to write results")?
    };

    if cli.json {
        let report = JsonReport {
            tool: job.tool,
            summary,
            rows: rows.as_deref(),
            written,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise output")?
        );
    } else if !cli.quiet && written.is_empty() {
        eprintln!("{}", dim("nothing written"));
    }

    Ok(())
}

fn print_batch(rows: &[BatchRow]) {
    eprintln!(
        "  {:<32} {:>10} {:>10} {:>7}  {}",
        bold("file"),
        bold("before"),
        bold("after"),
        bold("saved"),
        bold("status")
    );
    for row in rows {
        let size = |n: Option<u64>| n.map(human_bytes).unwrap_or_else(|| "-".to_string());
        let saved = row
            .saved_percent
            .map(|p| format!("{p:.0}%"))
            .unwrap_or_else(|| "-".to_string());
        let status = if row.status.is_success() {
            green(&row.status.to_string())
        } else {
            red(&row.status.to_string())
        };
        eprintln!(
            "  {:<32} {:>10} {:>10} {:>7}  {}",
            row.file,
            size(row.original_size),
            size(row.compressed_size),
            saved,
            status
        );
    }
}

/// Files in upload order plus the files picked for rotation and mirroring.
struct Arranged {
    files: Vec<ManagedFile>,
    rotate: Vec<FileId>,
    flip: Vec<FileId>,
}

/// Apply `--move` to the files as given, then resolve `--rotate` / `--flip`
/// positions (counted after the moves) to file identities.
fn arrange(
    mut files: Vec<ManagedFile>,
    moves: &[String],
    rotate: &[usize],
    flip: &[usize],
) -> Result<Arranged> {
    for m in moves {
        let (from, to) = parse_move(m)?;
        let from = position(from, files.len(), "--move")?;
        let to = position(to, files.len(), "--move")?;
        let file = files.remove(from);
        files.insert(to, file);
    }
    let pick = |positions: &[usize], flag: &str| {
        positions
            .iter()
            .map(|&n| position(n, files.len(), flag).map(|i| files[i].id()))
            .collect::<Result<Vec<_>>>()
    };
    let rotate = pick(rotate, "--rotate")?;
    let flip = pick(flip, "--flip")?;
    Ok(Arranged {
        files,
        rotate,
        flip,
    })
}

/// Turn a 1-indexed position among `len` files into an index.
fn position(n: usize, len: usize, flag: &str) -> Result<usize> {
    if n < 1 {
        anyhow::bail!("{flag}: positions are 1-indexed, minimum is 1 (got {n})");
    }
    if n > len {
        anyhow::bail!("{flag}: position {n} is out of range ({len} file(s) given)");
    }
    Ok(n - 1)
}

fn index_of(session: &UploadSession, id: FileId) -> Result<usize> {
    session
        .files()
        .iter()
        .position(|f| f.id() == id)
        .with_context(|| format!("File {id} is no longer in the session"))
}

/// Parse `--move FROM:TO` (1-indexed).
fn parse_move(s: &str) -> Result<(usize, usize)> {
    let (from, to) = s
        .split_once(':')
        .with_context(|| format!("--move expects FROM:TO, got '{s}'"))?;
    let from: usize = from.trim().parse().context("Invalid FROM in --move")?;
    let to: usize = to.trim().parse().context("Invalid TO in --move")?;
    if from < 1 || to < 1 {
        anyhow::bail!("Positions are 1-indexed, minimum is 1 (got {from}:{to})");
    }
    Ok((from, to))
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if pages.contains(&0) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got 0)");
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}
