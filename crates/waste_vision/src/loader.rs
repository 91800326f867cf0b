use std::{
    fs,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use image::{GrayImage, RgbImage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{algorithms::to_gray, error::Result};

/// Anything that can be read and rewound.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Where image bytes come from.
pub enum ImageSource<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
    /// An open stream; its cursor position is restored after reading.
    Stream(&'a mut dyn ReadSeek),
}

impl<'a> From<&'a Path> for ImageSource<'a> {
    fn from(path: &'a Path) -> Self {
        Self::Path(path)
    }
}

impl<'a> From<&'a [u8]> for ImageSource<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Bytes(bytes)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ImageMeta {
    /// Byte size of the encoded image, 0 when it cannot be determined
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
}

/// A decoded image normalized to 8-bit RGB.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub raster: RgbImage,
    pub meta: ImageMeta,
}

impl LoadedImage {
    pub fn from_rgb(raster: RgbImage, file_size: u64) -> Self {
        let meta = ImageMeta {
            file_size,
            width: raster.width(),
            height: raster.height(),
        };
        Self { raster, meta }
    }

    /// BT.601 grayscale derivative, computed on each call.
    pub fn gray(&self) -> GrayImage {
        to_gray(&self.raster)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageLoader;

impl ImageLoader {
    pub fn load(&self, source: ImageSource<'_>) -> Result<LoadedImage> {
        let (bytes, file_size) = match source {
            ImageSource::Path(path) => {
                let bytes = fs::read(path)?;
                let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                (bytes, size)
            }
            ImageSource::Bytes(bytes) => (bytes.to_vec(), bytes.len() as u64),
            ImageSource::Stream(stream) => read_stream(stream)?,
        };

        let decoded = image::load_from_memory(&bytes)?;
        let image = LoadedImage::from_rgb(decoded.to_rgb8(), file_size);
        debug!(
            width = image.meta.width,
            height = image.meta.height,
            file_size,
            "decoded image"
        );
        Ok(image)
    }

    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<LoadedImage> {
        self.load(ImageSource::Path(path.as_ref()))
    }
}

fn read_stream(stream: &mut dyn ReadSeek) -> Result<(Vec<u8>, u64)> {
    let position = stream.stream_position().ok();
    if position.is_some() {
        stream.seek(SeekFrom::Start(0))?;
    }

    let mut bytes = Vec::new();
    let read = stream.read_to_end(&mut bytes);

    if let Some(position) = position {
        stream.seek(SeekFrom::Start(position))?;
    }
    read?;

    let size = bytes.len() as u64;
    Ok((bytes, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let image = RgbaImage::from_pixel(8, 6, Rgba([10, 20, 30, 128]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).expect("Should encode");
        out.into_inner()
    }

    #[test]
    fn test_bytes_are_normalized_to_rgb() {
        let bytes = png_bytes();
        let loaded = ImageLoader.load(ImageSource::Bytes(&bytes)).expect("Should decode");
        assert_eq!(loaded.meta.width, 8);
        assert_eq!(loaded.meta.height, 6);
        assert_eq!(loaded.meta.file_size, bytes.len() as u64);
        assert_eq!(*loaded.raster.get_pixel(0, 0), Rgb([10, 20, 30]));
    }

    #[test]
    fn test_stream_cursor_is_restored() {
        let bytes = png_bytes();
        let mut cursor = Cursor::new(bytes.clone());
        cursor.set_position(5);
        let loaded = ImageLoader.load(ImageSource::Stream(&mut cursor)).expect("Should decode");
        assert_eq!(cursor.position(), 5);
        assert_eq!(loaded.meta.file_size, bytes.len() as u64);
    }

    #[test]
    fn test_path_source_reports_file_size() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("bin.png");
        let bytes = png_bytes();
        std::fs::write(&path, &bytes).expect("Should write");
        let loaded = ImageLoader.load_path(&path).expect("Should decode");
        assert_eq!(loaded.meta.file_size, bytes.len() as u64);
    }

    #[test]
    fn test_invalid_bytes_fail_to_decode() {
        let err = ImageLoader.load(ImageSource::Bytes(b"not an image")).unwrap_err();
        assert!(matches!(err, crate::AnalysisError::Decode(_)));
    }
}
