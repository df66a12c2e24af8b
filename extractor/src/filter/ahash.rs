use image::imageops::{self, FilterType};
use image::DynamicImage;
use slidereel_common::frame::Frame;
use std::fmt;

/// Side length of the downscaled grid. 8x8 samples give a 64-bit fingerprint.
pub const HASH_SIZE: u32 = 8;

/// 64-bit average hash of a frame.
///
/// Fingerprints are only ever compared by Hamming distance so that frames
/// differing by encoder noise still count as the same slide.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub const BITS: u32 = HASH_SIZE * HASH_SIZE;

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// Number of differing bits.
    pub fn distance(self, other: Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A fingerprint together with the dimensions of the image it came from.
#[derive(Debug, Clone, Copy)]
pub struct HashedFrame {
    pub fingerprint: Fingerprint,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("unreadable frame {seq}: {reason}")]
    Decode { seq: u64, reason: String },
}

/// Compute the aHash (average hash) of an image.
///
/// Algorithm:
/// 1. Convert to 8-bit luminance
/// 2. Resize to 8x8 with a triangle (bilinear) filter
/// 3. Compute the mean of the 64 samples
/// 4. Bit i (row-major, i = y*8 + x) is set when sample i >= mean
pub fn compute_ahash(img: &DynamicImage) -> Fingerprint {
    let gray = img.to_luma8();
    let small = imageops::resize(&gray, HASH_SIZE, HASH_SIZE, FilterType::Triangle);

    let sum: u32 = small.pixels().map(|p| p.0[0] as u32).sum();
    let count = Fingerprint::BITS;

    // sample >= sum / count, kept in integers
    let mut bits = 0u64;
    for (i, p) in small.pixels().enumerate() {
        if p.0[0] as u32 * count >= sum {
            bits |= 1 << i;
        }
    }
    Fingerprint(bits)
}

/// Decode a frame and hash it.
pub fn hash_frame(frame: &Frame) -> Result<HashedFrame, HashError> {
    let img = frame.image().map_err(|e| HashError::Decode {
        seq: frame.seq,
        reason: e.to_string(),
    })?;
    Ok(HashedFrame {
        fingerprint: compute_ahash(&img),
        width: img.width(),
        height: img.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{GrayImage, Luma, RgbImage, Rgb};

    fn checkerboard(size: u32, block: u32) -> DynamicImage {
        let img = GrayImage::from_fn(size, size, |x, y| {
            if (x / block + y / block) % 2 == 0 {
                Luma([240])
            } else {
                Luma([20])
            }
        });
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn deterministic() {
        let img = checkerboard(64, 8);
        let a = compute_ahash(&img);
        let b = compute_ahash(&img);
        assert_eq!(a.bits(), b.bits());
        assert_eq!(a.distance(b), 0);
    }

    #[test]
    fn uniform_image_sets_every_bit() {
        // Every sample equals the mean, and equal counts as "at or above".
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 32, Luma([77])));
        assert_eq!(compute_ahash(&img).bits(), u64::MAX);
    }

    #[test]
    fn raster_order() {
        // Dark left half, bright right half: columns 4..8 set in every row.
        let img = GrayImage::from_fn(64, 64, |x, _| if x < 32 { Luma([0]) } else { Luma([255]) });
        let fp = compute_ahash(&DynamicImage::ImageLuma8(img));
        assert_eq!(fp.bits(), 0xF0F0_F0F0_F0F0_F0F0);
    }

    #[test]
    fn color_converted_to_luminance() {
        let img = RgbImage::from_fn(64, 64, |_, y| {
            if y < 32 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 40])
            }
        });
        let fp = compute_ahash(&DynamicImage::ImageRgb8(img));
        // Top four rows bright.
        assert_eq!(fp.bits(), 0x0000_0000_FFFF_FFFF);
    }

    #[test]
    fn stable_under_jpeg_reencode() {
        let img = checkerboard(128, 16);
        let original = compute_ahash(&img);

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 75)
            .encode_image(&img.to_luma8())
            .unwrap();
        let reencoded = image::load_from_memory(&jpeg).unwrap();

        assert!(original.distance(compute_ahash(&reencoded)) <= 2);
    }

    #[test]
    fn hamming_distance() {
        let a = Fingerprint::from_bits(0b0000);
        let b = Fingerprint::from_bits(0b1111);
        assert_eq!(a.distance(a), 0);
        assert_eq!(a.distance(b), 4);
        assert_eq!(Fingerprint::from_bits(0).distance(Fingerprint::from_bits(u64::MAX)), 64);
    }

    #[test]
    fn hash_frame_reports_dimensions() {
        let frame = Frame::decoded(checkerboard(48, 6), 0, None);
        let hashed = hash_frame(&frame).unwrap();
        assert_eq!((hashed.width, hashed.height), (48, 48));
    }

    #[test]
    fn unreadable_frame_is_error() {
        let frame = Frame::encoded(vec![1, 2, 3, 4], 9, None);
        match hash_frame(&frame) {
            Err(HashError::Decode { seq, .. }) => assert_eq!(seq, 9),
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}
