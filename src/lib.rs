//! # heic2jpg
//!
//! Convert HEIC images to JPEG files while preserving the original EXIF
//! metadata block.
//!
//! HEIC stores its EXIF in a container item; JPEG expects it in an APP1
//! marker segment right after the Start-Of-Image marker. This crate
//! re-assembles the JPEG stream at the byte level: it feeds the JPEG
//! encoder a wrapped sink ([`jpeg::ExifPrefixedWriter`]) that discards the
//! encoder's own leading SOI and substitutes a composed
//! `SOI + APP1(EXIF)` prefix, so the finished file opens with
//! `FF D8 FF E1 <len> <exif bytes> …`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heic2jpg::config::Config;
//! use heic2jpg::convert::{collect_heic_files, convert_file};
//! use heic2jpg::decoder::default_decoder;
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let decoder = default_decoder()?;
//!
//!     for path in collect_heic_files(&[PathBuf::from("./photos")]) {
//!         match convert_file(decoder.as_ref(), &path, &config) {
//!             Ok(dest) => println!("{} -> {}", path.display(), dest.display()),
//!             Err(err) => eprintln!("{err}"),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! Each file converts independently: EXIF extraction problems are logged
//! warnings (the file still converts, without metadata), while decode and
//! encode problems come back as per-file [`convert::ConvertError`] values
//! that never abort a batch.
//!
//! ## Lower-Level Usage
//!
//! The writer works with any `io::Write` sink and any encoder that emits a
//! baseline JPEG stream:
//!
//! ```rust,no_run
//! use heic2jpg::jpeg::ExifPrefixedWriter;
//! use image::codecs::jpeg::JpegEncoder;
//!
//! # fn main() -> anyhow::Result<()> {
//! let img = image::open("decoded.png")?.to_rgb8();
//! let exif: Vec<u8> = std::fs::read("metadata.bin")?;
//!
//! let mut writer = ExifPrefixedWriter::new(Vec::new(), Some(&exif))?;
//! img.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, 90))?;
//! let jpeg_with_exif = writer.into_inner();
//! # let _ = jpeg_with_exif;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`jpeg`] — JPEG marker constants and the EXIF-prefixed writer
//! - [`convert`] — per-file conversion driver and batch file collection
//! - [`decoder`] — the HEIC decode capability trait and the `libheif` backend
//! - [`config`] — configuration types and loading/saving

pub mod config;
pub mod convert;
pub mod decoder;
pub mod jpeg;
