use bytes::Bytes;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::borrow::Cow;
use std::io::Cursor;
use std::time::Duration;

/// The image carried inside a frame.
#[derive(Debug, Clone)]
pub enum FramePayload {
    /// Encoded still (JPEG from the sampler). Kept as-is so retained slides
    /// are written out without re-encoding.
    Encoded(Bytes),
    /// Already decoded pixels.
    Decoded(DynamicImage),
}

/// One candidate still produced by the sampler.
#[derive(Debug, Clone)]
pub struct Frame {
    pub payload: FramePayload,
    /// Zero-based position in the candidate stream.
    pub seq: u64,
    /// Presentation time in the source video, when known.
    pub pts: Option<Duration>,
}

impl Frame {
    pub fn encoded(data: impl Into<Bytes>, seq: u64, pts: Option<Duration>) -> Self {
        Self {
            payload: FramePayload::Encoded(data.into()),
            seq,
            pts,
        }
    }

    pub fn decoded(image: DynamicImage, seq: u64, pts: Option<Duration>) -> Self {
        Self {
            payload: FramePayload::Decoded(image),
            seq,
            pts,
        }
    }

    /// Decode the payload. Decoded payloads are borrowed, encoded ones are
    /// decoded with format sniffing.
    pub fn image(&self) -> Result<Cow<'_, DynamicImage>, FrameError> {
        match &self.payload {
            FramePayload::Decoded(img) => Ok(Cow::Borrowed(img)),
            FramePayload::Encoded(data) => {
                let img = ImageReader::new(Cursor::new(data.as_ref()))
                    .with_guessed_format()
                    .map_err(|e| FrameError::Decode(e.to_string()))?
                    .decode()
                    .map_err(|e| FrameError::Decode(e.to_string()))?;
                Ok(Cow::Owned(img))
            }
        }
    }

    /// File extension matching how [`Frame::to_file_bytes`] encodes the frame.
    pub fn extension(&self) -> &'static str {
        match &self.payload {
            FramePayload::Encoded(data) => match image::guess_format(data) {
                Ok(ImageFormat::Png) => "png",
                Ok(ImageFormat::Bmp) => "bmp",
                _ => "jpg",
            },
            FramePayload::Decoded(_) => "png",
        }
    }

    /// Bytes to write for a retained slide. Encoded payloads pass through untouched.
    pub fn to_file_bytes(&self) -> Result<Cow<'_, [u8]>, FrameError> {
        match &self.payload {
            FramePayload::Encoded(data) => Ok(Cow::Borrowed(data.as_ref())),
            FramePayload::Decoded(img) => {
                let mut buf = Cursor::new(Vec::new());
                img.write_to(&mut buf, ImageFormat::Png)
                    .map_err(|e| FrameError::Encode(e.to_string()))?;
                Ok(Cow::Owned(buf.into_inner()))
            }
        }
    }

    /// Returns the size of the encoded payload, or 0 for decoded frames.
    pub fn payload_size(&self) -> usize {
        match &self.payload {
            FramePayload::Encoded(data) => data.len(),
            FramePayload::Decoded(_) => 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to decode frame image: {0}")]
    Decode(String),
    #[error("failed to encode frame image: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn encoded_frame_decodes() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 9, Luma([200])));
        let frame = Frame::encoded(png_bytes(&img), 3, Some(Duration::from_millis(1500)));
        let decoded = frame.image().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 9));
        assert_eq!(frame.extension(), "png");
        assert_eq!(frame.seq, 3);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let frame = Frame::encoded(vec![0xFF, 0xD8, 0x00, 0x01], 0, None);
        assert!(matches!(frame.image(), Err(FrameError::Decode(_))));
        assert_eq!(frame.extension(), "jpg");
    }

    #[test]
    fn encoded_bytes_pass_through() {
        let data = vec![0xFF, 0xD8, 0xFF, 0xD9];
        let frame = Frame::encoded(data.clone(), 0, None);
        assert_eq!(frame.to_file_bytes().unwrap().as_ref(), data.as_slice());
        assert_eq!(frame.payload_size(), 4);
    }

    #[test]
    fn decoded_frame_writes_png() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([10])));
        let frame = Frame::decoded(img, 0, None);
        let bytes = frame.to_file_bytes().unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        assert_eq!(frame.extension(), "png");
    }
}
