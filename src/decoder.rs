//! Image decoding into the canonical RGBA8 pixel layout.

use image::{DynamicImage, GenericImageView, ImageError};

use crate::error::DecodeError;

/// In-memory pixel layout handed to the device adapter.
///
/// Every decoder normalizes to [`PixelFormat::Rgba8Unorm`], so the device
/// adapter has a single upload path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Rgba8Unorm,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Rgba8Unorm => 4,
        }
    }
}

/// Decoded pixels ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl DecodedImage {
    /// Bytes in one row of pixels.
    pub fn row_pitch(&self) -> u32 {
        self.width * self.format.bytes_per_pixel()
    }

    /// Bytes the dimensions call for.
    pub fn expected_len(&self) -> u64 {
        u64::from(self.width)
            .saturating_mul(u64::from(self.format.bytes_per_pixel()))
            .saturating_mul(u64::from(self.height))
    }

    /// Check that the pixel buffer length agrees with the dimensions.
    pub fn is_consistent(&self) -> bool {
        self.pixels.len() as u64 == self.expected_len()
    }

    /// Create a 1x1 texture of a single color.
    pub fn solid_color(color: [u8; 4]) -> Self {
        Self {
            pixels: color.to_vec(),
            width: 1,
            height: 1,
            format: PixelFormat::Rgba8Unorm,
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255])
    }

    /// Build an RGBA8 image by evaluating `pixel` at every `(x, y)`.
    ///
    /// Returns `None` when the pixel buffer would not fit in memory.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut pixel: impl FnMut(u32, u32) -> [u8; 4],
    ) -> Option<Self> {
        let len = usize::try_from(width)
            .ok()?
            .checked_mul(usize::try_from(height).ok()?)?
            .checked_mul(4)?;
        let mut pixels = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&pixel(x, y));
            }
        }

        Some(Self {
            pixels,
            width,
            height,
            format: PixelFormat::Rgba8Unorm,
        })
    }
}

/// Turns an encoded image file into raw pixels.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, DecodeError>;
}

/// Decoder backed by the `image` crate (PNG, JPEG, BMP, TGA, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDecoder;

impl StandardDecoder {
    pub fn new() -> Self {
        Self
    }

    fn from_image(img: DynamicImage) -> DecodedImage {
        let (width, height) = img.dimensions();
        let pixels = img.to_rgba8().into_raw();

        DecodedImage {
            pixels,
            width,
            height,
            format: PixelFormat::Rgba8Unorm,
        }
    }
}

impl ImageDecoder for StandardDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Unreadable("file is empty".to_string()));
        }

        let format = image::guess_format(bytes)
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

        let img = image::load_from_memory_with_format(bytes, format).map_err(|e| match e {
            ImageError::Unsupported(_) => DecodeError::UnsupportedFormat(e.to_string()),
            ImageError::IoError(_) => DecodeError::Unreadable(e.to_string()),
            _ => DecodeError::Corrupt(e.to_string()),
        })?;

        let decoded = Self::from_image(img);
        log::trace!(
            "StandardDecoder: decoded {:?} image {}x{}",
            format,
            decoded.width,
            decoded.height
        );
        Ok(decoded)
    }
}
