//! Minimal RGB raster used for the surface and vehicle textures.
//!
//! The protocol treats images as opaque blobs; this module only knows enough
//! to load binary PPM files from disk and to check that the pixel buffer
//! matches the declared dimensions.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("cannot read image: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported image: {0}")]
    Format(String),

    #[error("{width}x{height} image needs {size} bytes on the wire, the limit is {max}")]
    TooLarge {
        width: u32,
        height: u32,
        size: u64,
        max: u64,
    },
}

/// An RGB image. Deserializing goes through [`Image::new`], so an image
/// received off the wire always has as many pixels as its dimensions say.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawImage")]
pub struct Image {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB triples.
    pub pixels: Vec<u8>,
}

#[derive(Deserialize)]
struct RawImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TryFrom<RawImage> for Image {
    type Error = ImageError;

    fn try_from(raw: RawImage) -> Result<Self, Self::Error> {
        Image::new(raw.width, raw.height, raw.pixels)
    }
}

impl Image {
    /// Builds an image, checking that `pixels` holds exactly
    /// `width * height` RGB triples.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ImageError> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(ImageError::Format(format!(
                "{}x{} image needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();

        Self {
            width,
            height,
            pixels,
        }
    }

    /// Loads a binary (P6) PPM file with a max value of 255.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let bytes = fs::read(path)?;
        Self::from_ppm(&bytes)
    }

    pub fn from_ppm(bytes: &[u8]) -> Result<Self, ImageError> {
        let mut cursor = 0;
        let magic = next_token(bytes, &mut cursor)?;
        if magic != b"P6" {
            return Err(ImageError::Format("only binary P6 PPM is supported".into()));
        }

        let width = parse_number(next_token(bytes, &mut cursor)?)?;
        let height = parse_number(next_token(bytes, &mut cursor)?)?;
        let max_value = parse_number(next_token(bytes, &mut cursor)?)?;
        if max_value != 255 {
            return Err(ImageError::Format(format!(
                "max value {} is not supported",
                max_value
            )));
        }

        // Exactly one whitespace byte separates the header from the raster.
        let data = bytes.get(cursor + 1..).unwrap_or_default();
        let expected = width as usize * height as usize * 3;
        if data.len() < expected {
            return Err(ImageError::Format("truncated pixel data".into()));
        }

        Self::new(width, height, data[..expected].to_vec())
    }
}

fn next_token<'a>(bytes: &'a [u8], cursor: &mut usize) -> Result<&'a [u8], ImageError> {
    loop {
        match bytes.get(*cursor) {
            Some(b'#') => {
                while let Some(&b) = bytes.get(*cursor) {
                    *cursor += 1;
                    if b == b'\n' {
                        break;
                    }
                }
            }
            Some(b) if b.is_ascii_whitespace() => *cursor += 1,
            Some(_) => break,
            None => return Err(ImageError::Format("truncated header".into())),
        }
    }

    let start = *cursor;
    while bytes
        .get(*cursor)
        .is_some_and(|b| !b.is_ascii_whitespace())
    {
        *cursor += 1;
    }
    Ok(&bytes[start..*cursor])
}

fn parse_number(token: &[u8]) -> Result<u32, ImageError> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ImageError::Format("bad header number".into()))
}
