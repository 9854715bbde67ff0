//! Per-file HEIC → JPEG conversion and batch file collection.
//!
//! [`convert_file`] converts exactly one source path to exactly one `.jpg`
//! next to it. Errors are per-file values — a failed file never aborts a
//! batch; the orchestrator (the CLI, or library callers) decides whether
//! to continue.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::Config;
use crate::decoder::HeicDecoder;
use crate::jpeg::{ExifPrefixedWriter, MAX_EXIF_PAYLOAD};

/// Source extensions accepted by [`collect_heic_files`], compared
/// case-insensitively.
const HEIC_EXTENSIONS: &[&str] = &["heic", "heif"];

/// Extension given to every destination file.
pub const JPEG_EXTENSION: &str = "jpg";

/// Why a single file's conversion failed.
///
/// Metadata extraction problems are deliberately absent: missing or
/// unreadable EXIF is a warning, and conversion proceeds without it.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The source pixels could not be decoded. The destination file was
    /// never created.
    #[error("failed to decode {}: {reason:#}", path.display())]
    Decode { path: PathBuf, reason: anyhow::Error },

    /// The destination file could not be created or truncated.
    #[error("failed to create destination {}: {source}", path.display())]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoding failed after the destination was created. The partial
    /// file is removed unless the config says to keep it.
    #[error("failed to encode {}: {reason:#}", path.display())]
    Encode { path: PathBuf, reason: anyhow::Error },
}

impl ConvertError {
    /// The path the error is about (source for decode failures,
    /// destination otherwise).
    pub fn path(&self) -> &Path {
        match self {
            Self::Decode { path, .. }
            | Self::CreateDestination { path, .. }
            | Self::Encode { path, .. } => path,
        }
    }
}

/// Derive the destination path: same directory, same base name, original
/// extension replaced with `.jpg`.
///
/// Two distinct sources can map to the same destination (`a.heic` and
/// `a.heif`); conversion is last-write-wins in that case, by design.
pub fn destination_path(source: &Path) -> PathBuf {
    source.with_extension(JPEG_EXTENSION)
}

/// Convert one HEIC file to a JPEG alongside it, preserving the EXIF
/// block. Returns the destination path on success.
///
/// Flow: extract EXIF (non-fatal — conversion proceeds without it on any
/// problem), decode pixels (fatal, destination untouched), create the
/// destination, encode through an [`ExifPrefixedWriter`]. On encode
/// failure the partial destination is removed unless
/// `config.output.keep_partial_on_error` is set.
///
/// # Example
///
/// ```rust,no_run
/// use heic2jpg::config::Config;
/// use heic2jpg::convert::convert_file;
/// use heic2jpg::decoder::default_decoder;
/// use std::path::Path;
///
/// # fn main() -> anyhow::Result<()> {
/// let decoder = default_decoder()?;
/// let config = Config::default();
/// let dest = convert_file(decoder.as_ref(), Path::new("IMG_0001.HEIC"), &config)?;
/// println!("wrote {}", dest.display());
/// # Ok(())
/// # }
/// ```
pub fn convert_file(
    decoder: &dyn HeicDecoder,
    source: &Path,
    config: &Config,
) -> Result<PathBuf, ConvertError> {
    let exif = match decoder.extract_exif(source) {
        Ok(Some(blob)) if blob.len() > MAX_EXIF_PAYLOAD => {
            log::warn!(
                "EXIF from {} is {} bytes, too large for one APP1 segment; converting without it",
                source.display(),
                blob.len()
            );
            None
        }
        Ok(blob) => blob,
        Err(e) => {
            log::warn!("no EXIF from {}: {e:#}", source.display());
            None
        }
    };

    // Decode fully before touching the filesystem, so a decode failure
    // leaves no destination behind.
    let img = decoder.decode(source).map_err(|e| ConvertError::Decode {
        path: source.to_path_buf(),
        reason: e,
    })?;

    let dest = destination_path(source);
    let file = File::create(&dest).map_err(|e| ConvertError::CreateDestination {
        path: dest.clone(),
        source: e,
    })?;

    match encode_jpeg(file, &img, exif.as_deref(), config.quality) {
        Ok(()) => {
            log::info!("converted {} -> {}", source.display(), dest.display());
            Ok(dest)
        }
        Err(e) => {
            if config.output.keep_partial_on_error {
                log::warn!("keeping partial output {}", dest.display());
            } else if let Err(rm) = std::fs::remove_file(&dest) {
                log::warn!("could not remove partial output {}: {rm}", dest.display());
            }
            Err(ConvertError::Encode {
                path: dest,
                reason: e,
            })
        }
    }
}

/// Encode `img` as JPEG into `file`, routed through the prefixed writer so
/// the stream opens with `SOI [APP1(EXIF)]` instead of the encoder's SOI.
fn encode_jpeg(
    file: File,
    img: &DynamicImage,
    exif: Option<&[u8]>,
    quality: u8,
) -> anyhow::Result<()> {
    use anyhow::Context;

    let mut writer = ExifPrefixedWriter::new(BufWriter::new(file), exif)
        .context("writing JPEG header prefix")?;

    // JPEG has no alpha channel; flatten whatever the decoder produced.
    let rgb = img.to_rgb8();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))
        .context("encoding JPEG")?;

    writer.flush().context("flushing destination")?;
    Ok(())
}

/// Collect HEIC files from a mix of file and directory paths.
///
/// Directories are walked recursively (following symlinks). Non-HEIC
/// files and missing paths are skipped with a warning.
pub fn collect_heic_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_heic_file(path) {
                files.push(path.clone());
            } else {
                log::warn!("Skipping non-HEIC file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_heic_file(p) {
                    files.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    files
}

/// Check if a file has a HEIC/HEIF extension, any case.
fn is_heic_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| HEIC_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use image::{Rgb, RgbImage};
    use img_parts::jpeg::Jpeg;
    use img_parts::{Bytes, ImageEXIF};
    use std::fs;
    use tempfile::TempDir;

    /// Stand-in for the external decode capability.
    struct StubDecoder {
        width: u32,
        height: u32,
        exif: Option<Vec<u8>>,
        fail_decode: bool,
        fail_exif: bool,
    }

    impl StubDecoder {
        fn plain(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                exif: None,
                fail_decode: false,
                fail_exif: false,
            }
        }

        fn with_exif(exif: Vec<u8>) -> Self {
            Self {
                exif: Some(exif),
                ..Self::plain(16, 12)
            }
        }
    }

    impl HeicDecoder for StubDecoder {
        fn decode(&self, _path: &Path) -> anyhow::Result<DynamicImage> {
            if self.fail_decode {
                bail!("stub: corrupt HEVC payload");
            }
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                self.width,
                self.height,
                Rgb([180, 90, 30]),
            )))
        }

        fn extract_exif(&self, _path: &Path) -> anyhow::Result<Option<Vec<u8>>> {
            if self.fail_exif {
                bail!("stub: no Exif item in container");
            }
            Ok(self.exif.clone())
        }
    }

    /// A minimal but well-formed EXIF payload: the `Exif\0\0` identifier
    /// followed by a little-endian TIFF with one IFD0 entry
    /// (Orientation = 1).
    fn minimal_exif_blob() -> Vec<u8> {
        let mut b = b"Exif\0\0".to_vec();
        b.extend_from_slice(b"II*\0"); // TIFF magic, little-endian
        b.extend_from_slice(&8u32.to_le_bytes()); // IFD0 offset
        b.extend_from_slice(&1u16.to_le_bytes()); // entry count
        b.extend_from_slice(&0x0112u16.to_le_bytes()); // Orientation
        b.extend_from_slice(&3u16.to_le_bytes()); // SHORT
        b.extend_from_slice(&1u32.to_le_bytes()); // count
        b.extend_from_slice(&1u16.to_le_bytes()); // value
        b.extend_from_slice(&0u16.to_le_bytes()); // value padding
        b.extend_from_slice(&0u32.to_le_bytes()); // no next IFD
        b
    }

    fn source_in(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"stub heic bytes").unwrap();
        path
    }

    // ── destination_path ─────────────────────────────────────────────

    #[test]
    fn destination_replaces_extension() {
        assert_eq!(
            destination_path(Path::new("/photos/IMG_0001.HEIC")),
            PathBuf::from("/photos/IMG_0001.jpg")
        );
        assert_eq!(
            destination_path(Path::new("trip/pic.heif")),
            PathBuf::from("trip/pic.jpg")
        );
    }

    #[test]
    fn destination_stays_in_source_directory() {
        let dest = destination_path(Path::new("/a/b/c/x.heic"));
        assert_eq!(dest.parent(), Some(Path::new("/a/b/c")));
    }

    // ── convert_file ─────────────────────────────────────────────────

    #[test]
    fn converts_and_embeds_exif() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir, "photo.heic");
        let blob = minimal_exif_blob();
        let decoder = StubDecoder::with_exif(blob.clone());

        let dest = convert_file(&decoder, &source, &Config::default()).unwrap();
        assert_eq!(dest, dir.path().join("photo.jpg"));

        let bytes = fs::read(&dest).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[2..4], &[0xFF, 0xE1]);
        let seg_len = u16::from_be_bytes([bytes[4], bytes[5]]) as usize;
        assert_eq!(seg_len, blob.len() + 2);
        assert_eq!(&bytes[6..6 + blob.len()], &blob[..]);

        // The result must still be a decodable JPEG of the same size.
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (16, 12));
    }

    #[test]
    fn exif_round_trips_through_independent_readers() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir, "photo.heic");
        let blob = minimal_exif_blob();
        let decoder = StubDecoder::with_exif(blob.clone());

        let dest = convert_file(&decoder, &source, &Config::default()).unwrap();
        let bytes = fs::read(&dest).unwrap();

        // img-parts strips the Exif\0\0 identifier and hands back the TIFF.
        let jpeg = Jpeg::from_bytes(Bytes::from(bytes)).unwrap();
        let tiff = jpeg.exif().expect("APP1 EXIF segment present");
        assert_eq!(&tiff[..], &blob[6..]);

        // nom-exif parses the same file as a regular JPEG with EXIF.
        let mut parser = nom_exif::MediaParser::new();
        let ms = nom_exif::MediaSource::file_path(&dest).unwrap();
        let iter: nom_exif::ExifIter = parser.parse(ms).unwrap();
        let exif: nom_exif::Exif = iter.into();
        assert!(exif.get(nom_exif::ExifTag::Orientation).is_some());
    }

    #[test]
    fn missing_exif_produces_plain_jpeg() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir, "bare.heic");
        let decoder = StubDecoder::plain(8, 8);

        let dest = convert_file(&decoder, &source, &Config::default()).unwrap();
        let bytes = fs::read(&dest).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        // No APP1 EXIF segment: next marker is whatever the encoder emits.
        assert_ne!(&bytes[2..4], &[0xFF, 0xE1]);
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    #[test]
    fn exif_extraction_failure_is_nonfatal() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir, "warn.heic");
        let decoder = StubDecoder {
            fail_exif: true,
            ..StubDecoder::plain(8, 8)
        };

        let dest = convert_file(&decoder, &source, &Config::default()).unwrap();
        assert!(dest.exists());
    }

    #[test]
    fn oversized_exif_is_dropped_with_warning() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir, "big.heic");
        let decoder = StubDecoder::with_exif(vec![0xAA; MAX_EXIF_PAYLOAD + 1]);

        let dest = convert_file(&decoder, &source, &Config::default()).unwrap();
        let bytes = fs::read(&dest).unwrap();
        assert_ne!(&bytes[2..4], &[0xFF, 0xE1]);
    }

    #[test]
    fn decode_failure_leaves_no_destination() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir, "corrupt.heic");
        let decoder = StubDecoder {
            fail_decode: true,
            ..StubDecoder::plain(8, 8)
        };

        let err = convert_file(&decoder, &source, &Config::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Decode { .. }));
        assert_eq!(err.path(), source.as_path());
        assert!(!dir.path().join("corrupt.jpg").exists());
    }

    #[test]
    fn destination_create_failure_reported() {
        let dir = TempDir::new().unwrap();
        // Make the destination path unusable by occupying it with a directory.
        let source = source_in(&dir, "blocked.heic");
        fs::create_dir(dir.path().join("blocked.jpg")).unwrap();
        let decoder = StubDecoder::plain(4, 4);

        let err = convert_file(&decoder, &source, &Config::default()).unwrap_err();
        assert!(matches!(err, ConvertError::CreateDestination { .. }));
    }

    #[test]
    fn encode_failure_removes_partial_destination() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir, "wide.heic");
        // JPEG caps dimensions at 65535; the encoder itself fails here.
        let decoder = StubDecoder::plain(70_000, 1);

        let err = convert_file(&decoder, &source, &Config::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Encode { .. }));
        assert!(!dir.path().join("wide.jpg").exists());
    }

    #[test]
    fn encode_failure_can_keep_partial_destination() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir, "kept.heic");
        let decoder = StubDecoder::plain(70_000, 1);
        let mut config = Config::default();
        config.output.keep_partial_on_error = true;

        let err = convert_file(&decoder, &source, &config).unwrap_err();
        assert!(matches!(err, ConvertError::Encode { .. }));
        assert!(dir.path().join("kept.jpg").exists());
    }

    #[test]
    fn colliding_destinations_are_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let first = source_in(&dir, "shot.heic");
        let second = source_in(&dir, "shot.HEIF");

        convert_file(&StubDecoder::plain(10, 10), &first, &Config::default()).unwrap();
        convert_file(&StubDecoder::plain(20, 20), &second, &Config::default()).unwrap();

        let bytes = fs::read(dir.path().join("shot.jpg")).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (20, 20));
    }

    // ── collect_heic_files ───────────────────────────────────────────

    #[test]
    fn collects_single_file() {
        let dir = TempDir::new().unwrap();
        let heic = source_in(&dir, "a.heic");

        let files = collect_heic_files(&[heic.clone()]);
        assert_eq!(files, vec![heic]);
    }

    #[test]
    fn skips_non_heic_files() {
        let dir = TempDir::new().unwrap();
        let jpg = source_in(&dir, "done.jpg");

        assert!(collect_heic_files(&[jpg]).is_empty());
    }

    #[test]
    fn walks_directories_recursively() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("trip");
        fs::create_dir(&sub).unwrap();
        source_in(&dir, "a.heic");
        fs::write(sub.join("b.HEIC"), b"x").unwrap();
        fs::write(sub.join("c.heif"), b"x").unwrap();
        fs::write(sub.join("notes.txt"), b"x").unwrap();

        let files = collect_heic_files(&[dir.path().to_path_buf()]);
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn missing_path_yields_nothing() {
        assert!(collect_heic_files(&[PathBuf::from("/nonexistent/path")]).is_empty());
    }

    #[test]
    fn extension_matching_is_case_insensitive() {
        assert!(is_heic_file(Path::new("x.HEIC")));
        assert!(is_heic_file(Path::new("x.Heif")));
        assert!(!is_heic_file(Path::new("x.jpg")));
        assert!(!is_heic_file(Path::new("noext")));
    }
}
