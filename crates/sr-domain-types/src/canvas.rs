// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Bitmap representation of drawing surfaces
//!
//! Bitmaps travel as base64 PNG next to their declared dimensions. Decoding
//! checks the declared size against [`MAX_DIMENSION`] and [`MAX_PIXELS`]
//! before any pixel memory is allocated.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::{self, FilterType};
use image::{ImageFormat, ImageReader, Limits, Rgba, RgbaImage};
use serde::{Deserialize, Serialize, Serializer};
use std::io::Cursor;
use thiserror::Error;

/// Largest accepted width or height
pub const MAX_DIMENSION: u32 = 8192;

/// Largest accepted pixel count
pub const MAX_PIXELS: u64 = 4096 * 4096;

const BYTES_PER_PIXEL: u64 = 4;

#[derive(Debug, Error, PartialEq)]
pub enum BitmapError {
    #[error("bitmap of {width}x{height} needs {expected} bytes, got {actual}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("bitmap of {width}x{height} exceeds the decode size limit")]
    TooLarge { width: u32, height: u32 },

    #[error("declared {declared_width}x{declared_height} but image is {width}x{height}")]
    DimensionMismatch {
        declared_width: u32,
        declared_height: u32,
        width: u32,
        height: u32,
    },

    #[error("invalid base64: {0}")]
    Base64(String),

    #[error("image codec: {0}")]
    Codec(String),
}

impl From<image::ImageError> for BitmapError {
    fn from(err: image::ImageError) -> Self {
        BitmapError::Codec(err.to_string())
    }
}

/// Reject sizes past the decode limits
pub fn check_dimensions(width: u32, height: u32) -> Result<(), BitmapError> {
    if width > MAX_DIMENSION
        || height > MAX_DIMENSION
        || u64::from(width) * u64::from(height) > MAX_PIXELS
    {
        return Err(BitmapError::TooLarge { width, height });
    }
    Ok(())
}

/// RGBA bitmap captured from a canvas element
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WireBitmap")]
pub struct Bitmap {
    image: RgbaImage,
}

#[derive(Serialize, Deserialize)]
struct WireBitmap {
    width: u32,
    height: u32,
    png: String,
}

impl Bitmap {
    /// Bitmap from row-major RGBA bytes
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, BitmapError> {
        check_dimensions(width, height)?;
        let expected = (u64::from(width) * u64::from(height) * BYTES_PER_PIXEL) as usize;
        if pixels.len() != expected {
            return Err(BitmapError::SizeMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        let image = RgbaImage::from_raw(width, height, pixels).ok_or(BitmapError::SizeMismatch {
            width,
            height,
            expected,
            actual: 0,
        })?;
        Ok(Self { image })
    }

    /// Bitmap filled with a single RGBA colour
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba(rgba)),
        }
    }

    /// Decode a PNG whose dimensions must match the declared ones
    pub fn from_png(width: u32, height: u32, png: &[u8]) -> Result<Self, BitmapError> {
        check_dimensions(width, height)?;
        if png.is_empty() && (width == 0 || height == 0) {
            return Ok(Self::filled(width, height, [0, 0, 0, 0]));
        }

        let mut limits = Limits::default();
        limits.max_image_width = Some(width);
        limits.max_image_height = Some(height);
        limits.max_alloc = Some(MAX_PIXELS * BYTES_PER_PIXEL * 2);

        let mut reader = ImageReader::with_format(Cursor::new(png), ImageFormat::Png);
        reader.limits(limits);
        let image = reader.decode()?.into_rgba8();

        if image.dimensions() != (width, height) {
            return Err(BitmapError::DimensionMismatch {
                declared_width: width,
                declared_height: height,
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(Self { image })
    }

    /// PNG encoding; empty for a zero-sized bitmap
    pub fn to_png(&self) -> Result<Vec<u8>, BitmapError> {
        let mut png = Vec::new();
        if self.is_empty() {
            return Ok(png);
        }
        self.image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(png)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.get_pixel_checked(x, y).map(|px| px.0)
    }

    /// Nearest-neighbour resample to the given dimensions
    pub fn resized(&self, width: u32, height: u32) -> Result<Self, BitmapError> {
        check_dimensions(width, height)?;
        if (width, height) == self.image.dimensions() {
            return Ok(self.clone());
        }
        if self.is_empty() || width == 0 || height == 0 {
            return Ok(Self::filled(width, height, [0, 0, 0, 0]));
        }
        Ok(Self {
            image: imageops::resize(&self.image, width, height, FilterType::Nearest),
        })
    }
}

impl TryFrom<WireBitmap> for Bitmap {
    type Error = BitmapError;

    fn try_from(wire: WireBitmap) -> Result<Self, Self::Error> {
        check_dimensions(wire.width, wire.height)?;
        let png = STANDARD
            .decode(wire.png.as_bytes())
            .map_err(|err| BitmapError::Base64(err.to_string()))?;
        Bitmap::from_png(wire.width, wire.height, &png)
    }
}

impl Serialize for Bitmap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let png = self.to_png().map_err(serde::ser::Error::custom)?;
        WireBitmap {
            width: self.width(),
            height: self.height(),
            png: STANDARD.encode(png),
        }
        .serialize(serializer)
    }
}
