//! Tool-specific options, serialised as scalar multipart fields.
//!
//! Options are validated before any byte goes on the wire: the backend would
//! reject them anyway, but only after the whole upload finished.

use crate::error::SessionError;
use crate::tool::Tool;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static HEX_COLOUR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("static regex"));
static BITRATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+[kKmM]?$").expect("static regex"));

/// Options submitted alongside the files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolOptions {
    /// The tool takes no scalar fields.
    None,
    Compression(CompressionSettings),
    Watermark(WatermarkOptions),
    Format(ImageFormatTarget),
}

impl ToolOptions {
    /// The options a tool is submitted with when the caller sets nothing.
    pub fn default_for(tool: Tool) -> Self {
        match tool {
            Tool::Compress => ToolOptions::Compression(CompressionSettings::default()),
            Tool::Watermark => ToolOptions::Watermark(WatermarkOptions::default()),
            Tool::ImageFormat => ToolOptions::Format(ImageFormatTarget::default()),
            _ => ToolOptions::None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ToolOptions::None => "empty",
            ToolOptions::Compression(_) => "compression",
            ToolOptions::Watermark(_) => "watermark",
            ToolOptions::Format(_) => "format",
        }
    }

    /// Whether these options belong to `tool`.
    pub fn matches(&self, tool: Tool) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(&Self::default_for(tool))
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        match self {
            ToolOptions::None | ToolOptions::Format(_) => Ok(()),
            ToolOptions::Compression(c) => c.validate(),
            ToolOptions::Watermark(w) => w.validate(),
        }
    }

    /// Scalar form fields in the order they are appended after the files.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            ToolOptions::None => Vec::new(),
            ToolOptions::Compression(c) => vec![
                ("image_quality", c.image_quality.to_string()),
                ("video_bitrate", c.video_bitrate.clone()),
                ("audio_bitrate", c.audio_bitrate.clone()),
            ],
            ToolOptions::Watermark(w) => vec![
                ("watermark_text", w.text.clone()),
                ("position", w.position.as_str().to_string()),
                ("font_size", w.font_size.to_string()),
                ("color", w.color.clone()),
                ("opacity", w.opacity.to_string()),
            ],
            ToolOptions::Format(f) => vec![("format", f.as_str().to_string())],
        }
    }
}

/// Settings of the compression tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionSettings {
    /// JPEG quality for image inputs. Range: 10–95. Default: 60.
    pub image_quality: u8,
    /// ffmpeg-style video bitrate, e.g. `800k`. Default: `800k`.
    pub video_bitrate: String,
    /// ffmpeg-style audio bitrate, e.g. `128k`. Default: `128k`.
    pub audio_bitrate: String,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            image_quality: 60,
            video_bitrate: "800k".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

impl CompressionSettings {
    fn validate(&self) -> Result<(), SessionError> {
        if !(10..=95).contains(&self.image_quality) {
            return Err(SessionError::InvalidOptions(format!(
                "image quality must be 10–95, got {}",
                self.image_quality
            )));
        }
        for (label, value) in [("video", &self.video_bitrate), ("audio", &self.audio_bitrate)] {
            if !BITRATE.is_match(value) {
                return Err(SessionError::InvalidOptions(format!(
                    "{label} bitrate '{value}' is not a bitrate like 800k"
                )));
            }
        }
        Ok(())
    }
}

/// Where the watermark text is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    Center,
    BottomLeft,
    #[default]
    BottomRight,
    Diagonal,
}

impl WatermarkPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatermarkPosition::TopLeft => "top-left",
            WatermarkPosition::TopRight => "top-right",
            WatermarkPosition::Center => "center",
            WatermarkPosition::BottomLeft => "bottom-left",
            WatermarkPosition::BottomRight => "bottom-right",
            WatermarkPosition::Diagonal => "diagonal",
        }
    }
}

impl FromStr for WatermarkPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top-left" => Ok(WatermarkPosition::TopLeft),
            "top-right" => Ok(WatermarkPosition::TopRight),
            "center" | "centre" => Ok(WatermarkPosition::Center),
            "bottom-left" => Ok(WatermarkPosition::BottomLeft),
            "bottom-right" => Ok(WatermarkPosition::BottomRight),
            "diagonal" => Ok(WatermarkPosition::Diagonal),
            other => Err(format!("unknown watermark position '{other}'")),
        }
    }
}

/// Settings of the watermark tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkOptions {
    /// Text drawn onto the image. May be empty.
    pub text: String,
    pub position: WatermarkPosition,
    /// Font size in pixels. Default: 36.
    pub font_size: u32,
    /// `#rrggbb`. Default: `#ffffff`.
    pub color: String,
    /// 0.0 (invisible) to 1.0 (opaque). Default: 0.4.
    pub opacity: f32,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            text: "fileconv".to_string(),
            position: WatermarkPosition::default(),
            font_size: 36,
            color: "#ffffff".to_string(),
            opacity: 0.4,
        }
    }
}

impl WatermarkOptions {
    fn validate(&self) -> Result<(), SessionError> {
        if self.font_size == 0 {
            return Err(SessionError::InvalidOptions("font size must be ≥ 1".into()));
        }
        if !HEX_COLOUR.is_match(&self.color) {
            return Err(SessionError::InvalidOptions(format!(
                "colour must look like #rrggbb, got '{}'",
                self.color
            )));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(SessionError::InvalidOptions(format!(
                "opacity must be 0.0–1.0, got {}",
                self.opacity
            )));
        }
        Ok(())
    }
}

/// Target format of the image format converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageFormatTarget {
    #[default]
    Jpeg,
    Png,
    Webp,
    Bmp,
    Gif,
    Tiff,
    Avif,
    Heif,
}

impl ImageFormatTarget {
    /// Value of the `format` form field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormatTarget::Jpeg => "JPEG",
            ImageFormatTarget::Png => "PNG",
            ImageFormatTarget::Webp => "WEBP",
            ImageFormatTarget::Bmp => "BMP",
            ImageFormatTarget::Gif => "GIF",
            ImageFormatTarget::Tiff => "TIFF",
            ImageFormatTarget::Avif => "AVIF",
            ImageFormatTarget::Heif => "HEIF",
        }
    }

    /// File extension of the converted output.
    pub fn extension(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }

    /// MIME type of the converted output.
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormatTarget::Jpeg => "image/jpeg",
            ImageFormatTarget::Png => "image/png",
            ImageFormatTarget::Webp => "image/webp",
            ImageFormatTarget::Bmp => "image/bmp",
            ImageFormatTarget::Gif => "image/gif",
            ImageFormatTarget::Tiff => "image/tiff",
            ImageFormatTarget::Avif => "image/avif",
            ImageFormatTarget::Heif => "image/heif",
        }
    }
}

impl fmt::Display for ImageFormatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormatTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormatTarget::Jpeg),
            "png" => Ok(ImageFormatTarget::Png),
            "webp" => Ok(ImageFormatTarget::Webp),
            "bmp" => Ok(ImageFormatTarget::Bmp),
            "gif" => Ok(ImageFormatTarget::Gif),
            "tif" | "tiff" => Ok(ImageFormatTarget::Tiff),
            "avif" => Ok(ImageFormatTarget::Avif),
            "heif" | "heic" => Ok(ImageFormatTarget::Heif),
            other => Err(format!("unsupported image format '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_their_tool() {
        for tool in Tool::ALL {
            let opts = ToolOptions::default_for(tool);
            assert!(opts.matches(tool), "{tool} default options mismatch");
            assert!(opts.validate().is_ok());
        }
        assert!(!ToolOptions::None.matches(Tool::Compress));
        assert!(!ToolOptions::Format(ImageFormatTarget::Png).matches(Tool::Watermark));
    }

    #[test]
    fn compression_fields_in_order() {
        let fields = ToolOptions::default_for(Tool::Compress).fields();
        let names: Vec<&str> = fields.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["image_quality", "video_bitrate", "audio_bitrate"]);
        assert_eq!(fields[0].1, "60");
    }

    #[test]
    fn compression_quality_out_of_range_rejected() {
        let opts = ToolOptions::Compression(CompressionSettings {
            image_quality: 99,
            ..Default::default()
        });
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("10–95"), "got: {err}");
    }

    #[test]
    fn bad_bitrate_rejected() {
        let opts = ToolOptions::Compression(CompressionSettings {
            video_bitrate: "fast".into(),
            ..Default::default()
        });
        assert!(opts.validate().is_err());
    }

    #[test]
    fn watermark_fields_and_validation() {
        let opts = ToolOptions::Watermark(WatermarkOptions::default());
        let fields = opts.fields();
        assert_eq!(fields[1], ("position", "bottom-right".to_string()));
        assert_eq!(fields[4], ("opacity", "0.4".to_string()));

        let bad = ToolOptions::Watermark(WatermarkOptions {
            color: "white".into(),
            ..Default::default()
        });
        assert!(bad.validate().is_err());

        let bad = ToolOptions::Watermark(WatermarkOptions {
            opacity: 1.5,
            ..Default::default()
        });
        assert!(bad.validate().is_err());
    }

    #[test]
    fn format_target_parsing() {
        assert_eq!("jpg".parse::<ImageFormatTarget>().unwrap(), ImageFormatTarget::Jpeg);
        assert_eq!("WebP".parse::<ImageFormatTarget>().unwrap(), ImageFormatTarget::Webp);
        assert!("svg".parse::<ImageFormatTarget>().is_err());
        assert_eq!(ImageFormatTarget::Tiff.extension(), "tiff");
    }

    #[test]
    fn position_parsing() {
        assert_eq!(
            "Top-Left".parse::<WatermarkPosition>().unwrap(),
            WatermarkPosition::TopLeft
        );
        assert!("middle".parse::<WatermarkPosition>().is_err());
    }
}
