use std::io::{self, Write};

/// JPEG Start-Of-Image marker. Every baseline JPEG stream begins with
/// exactly these two bytes, which is what lets the writer below discard
/// the encoder's copy by length alone.
pub const SOI_MARKER: [u8; 2] = [0xFF, 0xD8];

/// APP1 marker byte — the segment conventionally carrying EXIF.
pub const APP1_MARKER: u8 = 0xE1;

/// Largest EXIF payload a single APP1 segment can carry. The 16-bit
/// big-endian length field covers itself plus the payload.
pub const MAX_EXIF_PAYLOAD: usize = u16::MAX as usize - 2;

/// A write sink for a JPEG encoder that substitutes the stream header.
///
/// On construction it writes `SOI` and, when an EXIF payload is supplied,
/// an `APP1` segment (`FF E1`, big-endian length `payload + 2`, payload)
/// straight to the underlying sink. It then suppresses exactly the first
/// two bytes the encoder writes — the encoder's own SOI — and forwards
/// everything else unmodified, however the encoder chunks its writes.
///
/// The suppressed bytes are reported as consumed so the encoder never
/// sees a short write.
///
/// # Example
///
/// ```rust
/// use heic2jpg::jpeg::ExifPrefixedWriter;
/// use std::io::Write;
///
/// let exif = b"Exif\0\0fake-tiff-data";
/// let mut w = ExifPrefixedWriter::new(Vec::new(), Some(exif)).unwrap();
/// w.write_all(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap(); // encoder output
/// let out = w.into_inner();
/// assert_eq!(&out[..2], &[0xFF, 0xD8]); // our SOI
/// assert_eq!(&out[2..4], &[0xFF, 0xE1]); // our APP1
/// assert_eq!(&out[out.len() - 2..], &[0xFF, 0xE0]); // encoder SOI gone
/// ```
#[derive(Debug)]
pub struct ExifPrefixedWriter<W: Write> {
    sink: W,
    bytes_to_skip: usize,
}

impl<W: Write> ExifPrefixedWriter<W> {
    /// Wrap `sink`, immediately writing the `SOI [APP1]` prefix to it.
    ///
    /// An empty or absent `exif` produces a bare SOI with no APP1 segment.
    /// A payload larger than [`MAX_EXIF_PAYLOAD`] is refused with
    /// [`io::ErrorKind::InvalidInput`] — the length field must never wrap.
    pub fn new(mut sink: W, exif: Option<&[u8]>) -> io::Result<Self> {
        let exif = exif.filter(|e| !e.is_empty());
        if let Some(exif) = exif {
            if exif.len() > MAX_EXIF_PAYLOAD {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "EXIF payload of {} bytes exceeds the {} byte APP1 segment limit",
                        exif.len(),
                        MAX_EXIF_PAYLOAD
                    ),
                ));
            }
        }

        sink.write_all(&SOI_MARKER)?;

        if let Some(exif) = exif {
            let segment_len = (exif.len() + 2) as u16;
            let header = [
                0xFF,
                APP1_MARKER,
                (segment_len >> 8) as u8,
                (segment_len & 0xFF) as u8,
            ];
            sink.write_all(&header)?;
            sink.write_all(exif)?;
        }

        Ok(Self {
            sink,
            bytes_to_skip: SOI_MARKER.len(),
        })
    }

    /// Unwrap the underlying sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write> Write for ExifPrefixedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.bytes_to_skip == 0 {
            return self.sink.write(buf);
        }

        // Still inside the encoder's SOI: swallow the chunk whole.
        if buf.len() < self.bytes_to_skip {
            self.bytes_to_skip -= buf.len();
            return Ok(buf.len());
        }

        // Chunk crosses the skip boundary: drop the prefix, forward the rest.
        // The dropped bytes count as consumed from the encoder's view.
        let skip = self.bytes_to_skip;
        let written = self.sink.write(&buf[skip..])?;
        self.bytes_to_skip = 0;
        Ok(skip + written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
