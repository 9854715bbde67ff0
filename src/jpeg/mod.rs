//! JPEG marker constants and EXIF-preserving stream assembly.
//!
//! The one non-trivial piece of this crate lives here:
//! [`ExifPrefixedWriter`], a byte sink handed to a JPEG encoder that
//! replaces the encoder's own leading SOI marker with a composed
//! `SOI + APP1(EXIF)` prefix, so the finished file carries the source
//! image's metadata block.

mod writer;

pub use writer::{ExifPrefixedWriter, APP1_MARKER, MAX_EXIF_PAYLOAD, SOI_MARKER};
