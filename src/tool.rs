//! The tool catalogue: one [`ToolSpec`] per backend endpoint.
//!
//! Every tool screen of the conversion service is the same upload engine with
//! different parameters: which files it accepts, how many, under which
//! multipart field name, whether images are pre-transformed, and what the
//! response body looks like. [`Tool::spec`] is the single table holding those
//! parameters; [`crate::session::UploadSession`] reads nothing else.

use crate::file::ManagedFile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A conversion tool offered by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    ImagesToPdf,
    DocxToPdf,
    PdfToDocx,
    MergePdf,
    Compress,
    PdfToImages,
    ImageFormat,
    Watermark,
}

/// How many files a tool takes and how they are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// Exactly one file; selecting another replaces it.
    Single,
    /// Any number of files, all in one request.
    Many,
    /// Any number of files, one request per file, sent in order.
    PerFile,
}

/// Shape of a successful (HTTP 200) response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Raw binary body: the converted document or image.
    Blob,
    /// JSON `{ "results": [...] }` with per-file compression rows.
    BatchReport,
    /// JSON `{ "images": [base64...] }`, one PNG per PDF page.
    PageImages,
}

/// File-type filter applied by the picker layer before `add_files`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptFilter {
    Any,
    Images,
    Pdf,
    Docx,
}

impl AcceptFilter {
    pub fn accepts(&self, file: &ManagedFile) -> bool {
        match self {
            AcceptFilter::Any => true,
            AcceptFilter::Images => file.is_image(),
            AcceptFilter::Pdf => file.content_type() == "application/pdf",
            AcceptFilter::Docx => file.name().to_ascii_lowercase().ends_with(".docx"),
        }
    }

    /// Drop files this tool cannot take, keeping the order of the rest.
    pub fn filter_accepted(&self, files: Vec<ManagedFile>) -> Vec<ManagedFile> {
        files.into_iter().filter(|f| self.accepts(f)).collect()
    }
}

/// How the delivered file is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadName {
    /// Always the same name.
    Fixed(&'static str),
    /// Source file stem plus the given extension (`report.pdf` → `report.docx`).
    SourceStem(&'static str),
    /// Source file stem plus the extension of the requested target format.
    TargetFormat,
    /// Named by the backend per row / per page.
    FromResponse,
}

/// Static parameters of one tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    /// Path appended to the base URL, with trailing slash.
    pub endpoint: &'static str,
    /// Multipart field name for the file parts.
    pub file_field: &'static str,
    pub multiplicity: Multiplicity,
    pub accept: AcceptFilter,
    /// Rotate/flip/downscale/re-encode images before upload.
    pub pre_transform: bool,
    pub response: ResponseShape,
    /// Content type of a blob response.
    pub response_type: &'static str,
    pub download_name: DownloadName,
}

impl Tool {
    pub const ALL: [Tool; 8] = [
        Tool::ImagesToPdf,
        Tool::DocxToPdf,
        Tool::PdfToDocx,
        Tool::MergePdf,
        Tool::Compress,
        Tool::PdfToImages,
        Tool::ImageFormat,
        Tool::Watermark,
    ];

    pub fn spec(&self) -> ToolSpec {
        match self {
            Tool::ImagesToPdf => ToolSpec {
                endpoint: "/images-to-pdf/",
                file_field: "images",
                multiplicity: Multiplicity::Many,
                accept: AcceptFilter::Images,
                pre_transform: true,
                response: ResponseShape::Blob,
                response_type: "application/pdf",
                download_name: DownloadName::Fixed("Converted.pdf"),
            },
            Tool::DocxToPdf => ToolSpec {
                endpoint: "/docx-to-pdf/",
                file_field: "file",
                multiplicity: Multiplicity::Many,
                accept: AcceptFilter::Docx,
                pre_transform: false,
                response: ResponseShape::Blob,
                response_type: "application/pdf",
                download_name: DownloadName::Fixed("Converted.pdf"),
            },
            Tool::PdfToDocx => ToolSpec {
                endpoint: "/pdf-to-docx/",
                file_field: "pdf_file",
                multiplicity: Multiplicity::Single,
                accept: AcceptFilter::Pdf,
                pre_transform: false,
                response: ResponseShape::Blob,
                response_type:
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                download_name: DownloadName::SourceStem("docx"),
            },
            Tool::MergePdf => ToolSpec {
                endpoint: "/merge-pdf/",
                file_field: "files",
                multiplicity: Multiplicity::Many,
                accept: AcceptFilter::Pdf,
                pre_transform: false,
                response: ResponseShape::Blob,
                response_type: "application/pdf",
                download_name: DownloadName::Fixed("Merged.pdf"),
            },
            Tool::Compress => ToolSpec {
                endpoint: "/compress-file/",
                file_field: "files",
                multiplicity: Multiplicity::Many,
                accept: AcceptFilter::Any,
                pre_transform: false,
                response: ResponseShape::BatchReport,
                response_type: "application/json",
                download_name: DownloadName::FromResponse,
            },
            Tool::PdfToImages => ToolSpec {
                endpoint: "/pdf-to-images/",
                file_field: "file",
                multiplicity: Multiplicity::Single,
                accept: AcceptFilter::Pdf,
                pre_transform: false,
                response: ResponseShape::PageImages,
                response_type: "application/json",
                download_name: DownloadName::FromResponse,
            },
            Tool::ImageFormat => ToolSpec {
                endpoint: "/image-format-converter/",
                file_field: "image",
                multiplicity: Multiplicity::PerFile,
                accept: AcceptFilter::Images,
                pre_transform: false,
                response: ResponseShape::Blob,
                response_type: "application/octet-stream",
                download_name: DownloadName::TargetFormat,
            },
            Tool::Watermark => ToolSpec {
                endpoint: "/watermark/",
                file_field: "image",
                multiplicity: Multiplicity::Single,
                accept: AcceptFilter::Images,
                pre_transform: false,
                response: ResponseShape::Blob,
                response_type: "image/jpeg",
                download_name: DownloadName::Fixed("watermarked.jpg"),
            },
        }
    }

    /// Kebab-case name, matching the endpoint path and CLI subcommand.
    pub fn slug(&self) -> &'static str {
        match self {
            Tool::ImagesToPdf => "images-to-pdf",
            Tool::DocxToPdf => "docx-to-pdf",
            Tool::PdfToDocx => "pdf-to-docx",
            Tool::MergePdf => "merge-pdf",
            Tool::Compress => "compress",
            Tool::PdfToImages => "pdf-to-images",
            Tool::ImageFormat => "image-format",
            Tool::Watermark => "watermark",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Tool::ALL
            .iter()
            .copied()
            .find(|t| t.slug() == s)
            .ok_or_else(|| format!("unknown tool '{s}'"))
    }
}
