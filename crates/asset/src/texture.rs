//! RGBA8 image data ready for GPU upload.

use std::path::Path;

use anyhow::{Context, Result, ensure};

/// Texture data in CPU-friendly format before GPU upload.
/// Rows are stored top to bottom, as decoders produce them.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Supported texture formats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextureFormat {
    Rgba8,
}

impl TextureData {
    /// Wrap raw RGBA8 pixels; the byte length must match `width * height * 4`.
    pub fn new_rgba8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        ensure!(
            data.len() == expected,
            "RGBA8 data for {}x{} must be {} bytes, got {}",
            width,
            height,
            expected,
            data.len()
        );
        Ok(Self {
            data,
            width,
            height,
            format: TextureFormat::Rgba8,
        })
    }

    /// 1x1 texture of a single color.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            data: rgba.to_vec(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8,
        }
    }

    /// Load texture from PNG file.
    pub fn load_png<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading texture from {:?}", path);

        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
        Self::load_png_from_memory(&bytes).with_context(|| format!("Failed to decode {:?}", path))
    }

    /// Decode PNG bytes into RGBA8.
    pub fn load_png_from_memory(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .context("PNG decode failed")?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let data = rgba.into_raw();

        log::info!("Decoded texture {}x{} with {} bytes", width, height, data.len());

        Self::new_rgba8(width, height, data)
    }

    /// Copy with row order reversed (bottom row first).
    pub fn flipped_vertically(&self) -> Self {
        let row = self.row_bytes();
        let mut data = Vec::with_capacity(self.data.len());
        if row > 0 {
            for chunk in self.data.chunks_exact(row).rev() {
                data.extend_from_slice(chunk);
            }
        }
        Self {
            data,
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }

    /// Get the number of bytes per pixel for the format.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self.format {
            TextureFormat::Rgba8 => 4,
        }
    }

    /// Bytes in one unpadded row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel() as usize
    }

    /// Check if the texture data is valid.
    pub fn is_valid(&self) -> bool {
        let expected_size = self.row_bytes() * self.height as usize;
        self.data.len() == expected_size && self.width > 0 && self.height > 0
    }
}
