//! Image files as source rasters.
//!
//! Decodes PNG, JPEG and TIFF files with the `image` crate. Each channel
//! becomes a band: 8-bit images map to Byte, 16-bit to UInt16 and 32-bit
//! float to Float32. Other pixel formats are expanded to 8-bit RGBA.

use std::path::Path;

use image::DynamicImage;

use super::memory::MemRaster;
use crate::error::RasterError;
use crate::types::DataType;

/// Decode an image file into an in-memory raster.
pub fn open_image(path: &Path) -> Result<MemRaster, RasterError> {
    let img = image::open(path).map_err(|e| RasterError::Open {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(image_to_raster(img))
}

/// Convert a decoded image into a raster with one band per channel.
pub fn image_to_raster(img: DynamicImage) -> MemRaster {
    let width = img.width() as usize;
    let height = img.height() as usize;

    match img {
        DynamicImage::ImageLuma8(buf) => from_samples(width, height, 1, DataType::Byte, &buf),
        DynamicImage::ImageLumaA8(buf) => from_samples(width, height, 2, DataType::Byte, &buf),
        DynamicImage::ImageRgb8(buf) => from_samples(width, height, 3, DataType::Byte, &buf),
        DynamicImage::ImageRgba8(buf) => from_samples(width, height, 4, DataType::Byte, &buf),
        DynamicImage::ImageLuma16(buf) => from_samples(width, height, 1, DataType::UInt16, &buf),
        DynamicImage::ImageLumaA16(buf) => from_samples(width, height, 2, DataType::UInt16, &buf),
        DynamicImage::ImageRgb16(buf) => from_samples(width, height, 3, DataType::UInt16, &buf),
        DynamicImage::ImageRgba16(buf) => from_samples(width, height, 4, DataType::UInt16, &buf),
        DynamicImage::ImageRgb32F(buf) => from_samples(width, height, 3, DataType::Float32, &buf),
        DynamicImage::ImageRgba32F(buf) => {
            from_samples(width, height, 4, DataType::Float32, &buf)
        }
        other => from_samples(width, height, 4, DataType::Byte, &other.to_rgba8()),
    }
}

/// Spread pixel-interleaved samples into band planes.
fn from_samples<T>(
    width: usize,
    height: usize,
    channels: usize,
    data_type: DataType,
    samples: &[T],
) -> MemRaster
where
    T: Copy + Into<f64>,
{
    let mut raster = MemRaster::new(width, height, channels, data_type);
    for (i, &value) in samples.iter().enumerate() {
        let pixel = i / channels;
        raster.set(i % channels, pixel % width, pixel / width, value.into());
    }
    raster
}
