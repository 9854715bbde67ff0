//! The external HEIC decode capability.
//!
//! The conversion core never parses the HEIC container itself — it asks a
//! [`HeicDecoder`] for decoded pixels and for the raw EXIF payload, and
//! treats both as opaque. The default backend is `libheif-rs` behind the
//! (non-default) `libheif` cargo feature, since it links the system
//! libheif library.

use anyhow::Result;
use image::DynamicImage;
use std::path::Path;

/// Decodes HEIC sources into pixels and extracts their EXIF payload.
///
/// `extract_exif` returns the bytes exactly as they should appear as a
/// JPEG APP1 payload (real files start with `Exif\0\0`); the conversion
/// core never looks inside. `Ok(None)` means the container simply carries
/// no EXIF item — callers treat extraction *errors* the same way, as a
/// warning rather than a failure.
pub trait HeicDecoder {
    /// Decode the primary image to pixels. Failure is fatal for the file.
    fn decode(&self, path: &Path) -> Result<DynamicImage>;

    /// Extract the raw EXIF payload, if the container has one.
    fn extract_exif(&self, path: &Path) -> Result<Option<Vec<u8>>>;
}

/// The decoder backend compiled into this build, if any.
#[cfg(feature = "libheif")]
pub fn default_decoder() -> Result<Box<dyn HeicDecoder>> {
    Ok(Box::new(LibheifDecoder::new()))
}

/// The decoder backend compiled into this build, if any.
#[cfg(not(feature = "libheif"))]
pub fn default_decoder() -> Result<Box<dyn HeicDecoder>> {
    anyhow::bail!(
        "this build has no HEIC decoder backend; rebuild with the `libheif` feature enabled"
    )
}

#[cfg(feature = "libheif")]
pub use libheif::LibheifDecoder;

#[cfg(feature = "libheif")]
mod libheif {
    use super::HeicDecoder;
    use anyhow::{Context, Result};
    use image::{DynamicImage, RgbImage};
    use libheif_rs::{ColorSpace, HeifContext, ItemId, LibHeif, RgbChroma};
    use std::path::Path;

    /// JPEG APP1 EXIF payloads must begin with this identifier; some HEIC
    /// writers store it before the TIFF header, some do not.
    const EXIF_IDENTIFIER: &[u8] = b"Exif\0\0";

    /// `HeicDecoder` backed by the system libheif library.
    pub struct LibheifDecoder {
        lib: LibHeif,
    }

    impl LibheifDecoder {
        pub fn new() -> Self {
            Self { lib: LibHeif::new() }
        }
    }

    impl Default for LibheifDecoder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HeicDecoder for LibheifDecoder {
        fn decode(&self, path: &Path) -> Result<DynamicImage> {
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let ctx = HeifContext::read_from_bytes(&bytes)
                .context("parsing HEIC container")?;
            let handle = ctx
                .primary_image_handle()
                .context("locating primary image")?;

            let decoded = self
                .lib
                .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
                .context("decoding HEVC tiles")?;
            let planes = decoded.planes();
            let plane = planes
                .interleaved
                .context("decoder produced no interleaved RGB plane")?;

            let width = plane.width;
            let height = plane.height;
            let row_len = width as usize * 3;

            // The plane stride may exceed width * 3; copy row by row.
            let mut buf = Vec::with_capacity(row_len * height as usize);
            for y in 0..height as usize {
                let start = y * plane.stride;
                buf.extend_from_slice(&plane.data[start..start + row_len]);
            }

            let rgb = RgbImage::from_raw(width, height, buf)
                .context("assembling RGB buffer")?;
            Ok(DynamicImage::ImageRgb8(rgb))
        }

        fn extract_exif(&self, path: &Path) -> Result<Option<Vec<u8>>> {
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let ctx = HeifContext::read_from_bytes(&bytes)
                .context("parsing HEIC container")?;
            let handle = ctx
                .primary_image_handle()
                .context("locating primary image")?;

            let mut ids: Vec<ItemId> = vec![0; 1];
            if handle.metadata_block_ids(&mut ids, b"Exif") == 0 {
                return Ok(None);
            }
            let raw = handle
                .metadata(ids[0])
                .context("reading Exif metadata item")?;

            // HEIF Exif items start with a 4-byte big-endian offset to the
            // TIFF header, measured from the end of the offset field.
            if raw.len() < 4 {
                return Ok(None);
            }
            let offset = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
            let tiff_start = 4usize
                .checked_add(offset)
                .filter(|&s| s < raw.len())
                .context("Exif item offset out of bounds")?;

            // Emit an APP1-shaped payload: keep the identifier when the
            // container stored one, otherwise prepend it.
            let payload = if raw[4..tiff_start].ends_with(EXIF_IDENTIFIER) {
                raw[tiff_start - EXIF_IDENTIFIER.len()..].to_vec()
            } else {
                let mut p = EXIF_IDENTIFIER.to_vec();
                p.extend_from_slice(&raw[tiff_start..]);
                p
            };
            Ok(Some(payload))
        }
    }
}
