//! Client-side image pre-transform: rotate, flip, downscale, re-encode.
//!
//! Phone photos are routinely 4000 px and 5 MB. The PDF the backend builds
//! from them only needs page-width resolution, so the images are shrunk
//! before upload: longest edge capped at [`DEFAULT_MAX_EDGE`], re-encoded as
//! JPEG at [`DEFAULT_JPEG_QUALITY`]. The pending rotation and flip are baked
//! in during the same pass.
//!
//! Decoding and encoding are CPU-bound, so [`prepare`] runs them on the
//! blocking pool via `spawn_blocking`. Callers await files one at a time in
//! sequence order, which keeps the multipart field order deterministic.
//!
//! A failed transform never fails the upload: the original bytes are sent
//! unchanged and a warning is logged.

use crate::file::{ManagedFile, Rotation, Transform};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_EDGE: u32 = 1000;
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// Parameters of the pre-transform pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreTransform {
    /// Longest output edge in pixels.
    pub max_edge: u32,
    /// JPEG quality, 1–100.
    pub jpeg_quality: u8,
}

impl Default for PreTransform {
    fn default() -> Self {
        Self {
            max_edge: DEFAULT_MAX_EDGE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// A file ready to be put into a multipart payload.
#[derive(Debug, Clone)]
pub struct PreparedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Arc<[u8]>,
    /// `false` when the original was substituted.
    pub transformed: bool,
}

impl PreparedFile {
    /// The file exactly as selected.
    pub fn original(file: &ManagedFile) -> Self {
        Self {
            filename: file.name().to_string(),
            content_type: file.content_type().to_string(),
            bytes: file.shared_bytes(),
            transformed: false,
        }
    }
}

/// Output size for a `width`×`height` source: aspect ratio preserved, the
/// longest side clamped to `max_edge`, sides swapped for quarter turns.
pub fn target_dimensions(width: u32, height: u32, max_edge: u32, rotation: Rotation) -> (u32, u32) {
    let (mut w, mut h) = (width as f64, height as f64);
    let max = max_edge as f64;
    if w > max || h > max {
        if w > h {
            h *= max / w;
            w = max;
        } else {
            w *= max / h;
            h = max;
        }
    }
    let (w, h) = ((w.round() as u32).max(1), (h.round() as u32).max(1));
    if rotation.swaps_dimensions() {
        (h, w)
    } else {
        (w, h)
    }
}

/// Apply `transform` to a decoded image and scale it to fit `max_edge`.
///
/// Order matches drawing onto a canvas rotated about its centre with a
/// horizontal mirror in local coordinates: mirror first, then rotate
/// clockwise.
pub fn apply(img: DynamicImage, transform: Transform, max_edge: u32) -> DynamicImage {
    let (w, h) = target_dimensions(img.width(), img.height(), max_edge, Rotation::Deg0);
    let img = if (w, h) != (img.width(), img.height()) {
        img.resize_exact(w, h, FilterType::Triangle)
    } else {
        img
    };
    let img = if transform.flipped { img.fliph() } else { img };
    match transform.rotation {
        Rotation::Deg0 => img,
        Rotation::Deg90 => img.rotate90(),
        Rotation::Deg180 => img.rotate180(),
        Rotation::Deg270 => img.rotate270(),
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(buf)
}

/// Blocking decode → transform → encode.
pub fn transform_blocking(
    bytes: &[u8],
    transform: Transform,
    params: PreTransform,
) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    debug!(
        "Decoded {}x{} image, rotation {}°, flipped {}",
        img.width(),
        img.height(),
        transform.rotation.degrees(),
        transform.flipped
    );
    let out = apply(img, transform, params.max_edge);
    let encoded = encode_jpeg(&out, params.jpeg_quality)?;
    debug!(
        "Re-encoded → {}x{} px, {} bytes JPEG",
        out.width(),
        out.height(),
        encoded.len()
    );
    Ok(encoded)
}

/// Prepare one file for upload, substituting the original on any failure.
pub async fn prepare(file: &ManagedFile, params: PreTransform) -> PreparedFile {
    let bytes = file.shared_bytes();
    let transform = file.transform();

    let result =
        tokio::task::spawn_blocking(move || transform_blocking(&bytes, transform, params)).await;

    match result {
        Ok(Ok(encoded)) => PreparedFile {
            filename: file.name().to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: Arc::from(encoded),
            transformed: true,
        },
        Ok(Err(e)) => {
            warn!("Pre-transform of '{}' failed, sending original: {}", file.name(), e);
            PreparedFile::original(file)
        }
        Err(e) => {
            warn!("Pre-transform task for '{}' panicked, sending original: {}", file.name(), e);
            PreparedFile::original(file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        // Left half red, right half blue, so mirroring is observable.
        let img = RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn large_landscape_is_capped_on_width() {
        assert_eq!(target_dimensions(4000, 3000, 1000, Rotation::Deg0), (1000, 750));
    }

    #[test]
    fn large_portrait_is_capped_on_height() {
        assert_eq!(target_dimensions(3000, 4000, 1000, Rotation::Deg0), (750, 1000));
    }

    #[test]
    fn small_images_keep_their_size() {
        assert_eq!(target_dimensions(640, 480, 1000, Rotation::Deg0), (640, 480));
    }

    #[test]
    fn quarter_turn_swaps_target() {
        assert_eq!(target_dimensions(4000, 3000, 1000, Rotation::Deg90), (750, 1000));
        assert_eq!(target_dimensions(4000, 3000, 1000, Rotation::Deg180), (1000, 750));
    }

    #[test]
    fn transform_rotates_and_downscales() {
        let bytes = png(2000, 1000);
        let t = Transform {
            rotation: Rotation::Deg90,
            flipped: false,
        };
        let out = transform_blocking(&bytes, t, PreTransform::default()).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (500, 1000));
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn flip_mirrors_horizontally() {
        let img = image::load_from_memory(&png(20, 10)).unwrap();
        let t = Transform {
            rotation: Rotation::Deg0,
            flipped: true,
        };
        let out = apply(img, t, 1000).to_rgb8();
        // Red was on the left; after mirroring it is on the right.
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert_eq!(out.get_pixel(19, 0), &Rgb([255, 0, 0]));
    }

    #[tokio::test]
    async fn undecodable_input_falls_back_to_original() {
        let file = ManagedFile::from_bytes("broken.png", b"not an image".to_vec());
        let prepared = prepare(&file, PreTransform::default()).await;
        assert!(!prepared.transformed);
        assert_eq!(&*prepared.bytes, b"not an image");
        assert_eq!(prepared.content_type, "image/png");
        assert_eq!(prepared.filename, "broken.png");
    }

    #[tokio::test]
    async fn prepared_file_keeps_name_and_becomes_jpeg() {
        let file = ManagedFile::from_bytes("scan.png", png(30, 20));
        let prepared = prepare(&file, PreTransform::default()).await;
        assert!(prepared.transformed);
        assert_eq!(prepared.filename, "scan.png");
        assert_eq!(prepared.content_type, "image/jpeg");
    }
}
