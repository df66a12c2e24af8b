use bytes::{Bytes, BytesMut};
use tracing::warn;

const SOI: &[u8] = &[0xFF, 0xD8];
const EOI: &[u8] = &[0xFF, 0xD9];

/// Result of walking the marker structure of a buffered JPEG.
#[derive(Debug, PartialEq, Eq)]
enum Scan {
    /// A full image of this many bytes is buffered.
    Complete(usize),
    /// More bytes are needed.
    Incomplete,
    /// The marker structure is broken.
    Malformed,
}

/// Splits a concatenated JPEG byte stream (ffmpeg `image2pipe` + `mjpeg`)
/// into individual images.
///
/// Images are delimited by walking the JPEG marker segments rather than by
/// searching for the first EOI, so EOI-looking bytes inside segment
/// payloads do not cut an image short.
#[derive(Default)]
pub struct JpegSplitter {
    buffer: BytesMut,
}

impl JpegSplitter {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(512 * 1024),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes buffered but not yet returned as an image.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete image, if one is buffered.
    pub fn next_image(&mut self) -> Option<Bytes> {
        // Discard anything before the start-of-image marker
        match find_subsequence(&self.buffer, SOI) {
            Some(0) => {}
            Some(pos) => {
                warn!(skipped = pos, "discarding bytes before JPEG start marker");
                let _ = self.buffer.split_to(pos);
            }
            None => {
                // Keep a trailing 0xFF in case the marker spans chunks
                let keep = usize::from(self.buffer.last() == Some(&0xFF));
                let drop = self.buffer.len() - keep;
                let _ = self.buffer.split_to(drop);
                return None;
            }
        }

        let len = match scan_jpeg(&self.buffer) {
            Scan::Complete(len) => len,
            Scan::Incomplete => return None,
            Scan::Malformed => {
                // Fall back to the next EOI; a bad image is rejected when decoded.
                let end = find_subsequence(&self.buffer[SOI.len()..], EOI)?;
                SOI.len() + end + EOI.len()
            }
        };
        Some(self.buffer.split_to(len).freeze())
    }
}

/// Walk the marker segments of a JPEG that starts at `buf[0]`.
fn scan_jpeg(buf: &[u8]) -> Scan {
    let mut i = SOI.len();
    loop {
        if i >= buf.len() {
            return Scan::Incomplete;
        }
        if buf[i] != 0xFF {
            return Scan::Malformed;
        }
        // Any number of 0xFF fill bytes may precede a marker
        while i < buf.len() && buf[i] == 0xFF {
            i += 1;
        }
        if i >= buf.len() {
            return Scan::Incomplete;
        }
        let marker = buf[i];
        i += 1;

        match marker {
            0xD9 => return Scan::Complete(i),
            // Standalone markers carry no length
            0x01 | 0xD0..=0xD8 => continue,
            0x00 => return Scan::Malformed,
            _ => {
                if i + 2 > buf.len() {
                    return Scan::Incomplete;
                }
                let seg_len = u16::from_be_bytes([buf[i], buf[i + 1]]) as usize;
                if seg_len < 2 {
                    return Scan::Malformed;
                }
                i += seg_len;

                if marker == 0xDA {
                    // Entropy-coded data follows the scan header up to the next
                    // marker that is neither stuffing (FF00) nor a restart.
                    match skip_entropy_data(buf, i) {
                        Some(next) => i = next,
                        None => return Scan::Incomplete,
                    }
                }
            }
        }
    }
}

/// Returns the offset of the marker that ends the entropy-coded segment
/// starting at `start`, or `None` if it is not buffered yet.
fn skip_entropy_data(buf: &[u8], start: usize) -> Option<usize> {
    let mut j = start;
    while j + 1 < buf.len() {
        if buf[j] != 0xFF {
            j += 1;
            continue;
        }
        match buf[j + 1] {
            0x00 | 0xD0..=0xD7 => j += 2,
            0xFF => j += 1,
            _ => return Some(j),
        }
    }
    None
}

/// Find the first occurrence of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{GrayImage, Luma};

    fn jpeg(shade: u8, size: u32) -> Vec<u8> {
        let img = GrayImage::from_fn(size, size, |x, y| Luma([shade.wrapping_add((x * y) as u8)]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode_image(&img)
            .unwrap();
        out
    }

    #[test]
    fn splits_concatenated_stream_in_small_chunks() {
        let a = jpeg(10, 32);
        let b = jpeg(200, 48);
        let mut stream = a.clone();
        stream.extend_from_slice(&b);

        let mut splitter = JpegSplitter::new();
        let mut images = Vec::new();
        for chunk in stream.chunks(7) {
            splitter.push(chunk);
            while let Some(img) = splitter.next_image() {
                images.push(img);
            }
        }

        assert_eq!(images.len(), 2);
        assert_eq!(images[0].as_ref(), a.as_slice());
        assert_eq!(images[1].as_ref(), b.as_slice());
        assert_eq!(splitter.pending(), 0);
    }

    #[test]
    fn incomplete_image_waits_for_more_bytes() {
        let a = jpeg(50, 32);
        let mut splitter = JpegSplitter::new();
        splitter.push(&a[..a.len() - 1]);
        assert!(splitter.next_image().is_none());
        splitter.push(&a[a.len() - 1..]);
        assert_eq!(splitter.next_image().unwrap().as_ref(), a.as_slice());
    }

    #[test]
    fn leading_garbage_discarded() {
        let a = jpeg(90, 16);
        let mut splitter = JpegSplitter::new();
        splitter.push(b"frame=  1 fps=0.0");
        splitter.push(&a);
        assert_eq!(splitter.next_image().unwrap().as_ref(), a.as_slice());
    }

    #[test]
    fn eoi_bytes_inside_segment_do_not_split() {
        // APP1 segment whose payload contains FF D9.
        let a = jpeg(120, 16);
        let mut patched = a[..2].to_vec();
        patched.extend_from_slice(&[0xFF, 0xE1, 0x00, 0x06, 0xFF, 0xD9, 0xFF, 0xD9]);
        patched.extend_from_slice(&a[2..]);

        let mut splitter = JpegSplitter::new();
        splitter.push(&patched);
        assert_eq!(splitter.next_image().unwrap().len(), patched.len());
    }

    #[test]
    fn scan_reports_states() {
        let a = jpeg(1, 8);
        assert_eq!(scan_jpeg(&a), Scan::Complete(a.len()));
        assert_eq!(scan_jpeg(&a[..a.len() / 2]), Scan::Incomplete);
        assert_eq!(scan_jpeg(&[0xFF, 0xD8, 0x12, 0x34]), Scan::Malformed);
    }
}
