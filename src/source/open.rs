//! Opening the source named by an `Input` section.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::image_file::open_image;
use super::memory::MemRaster;
use super::raster::{Interleave, RasterSource};
use super::unscale::UnscaledSource;
use crate::error::ConfigError;
use crate::pipeline::{InlineRaster, InputConfig};

/// Open the source raster described by `input`.
///
/// Relative file names are resolved against `base_dir` when given.
pub fn open_input(
    input: &InputConfig,
    base_dir: Option<&Path>,
) -> Result<Arc<dyn RasterSource>, ConfigError> {
    let raster = match (&input.filename, &input.inline) {
        (Some(filename), None) => {
            let path = resolve_path(filename, base_dir);
            debug!(path = %path.display(), "Opening image source");
            open_image(&path)?
        }
        (None, Some(inline)) => build_inline(inline)?,
        (Some(_), Some(_)) => {
            return Err(ConfigError::InvalidValue {
                field: "Input",
                value: "both Filename and Inline given".to_string(),
            })
        }
        (None, None) => {
            return Err(ConfigError::MissingSection(
                "Input.Filename or Input.Inline".to_string(),
            ))
        }
    };

    let raster = if input.overviews.is_empty() {
        raster
    } else {
        raster.with_overviews(&input.overviews)
    };

    let source: Arc<dyn RasterSource> = Arc::new(raster);
    if input.unscale && UnscaledSource::is_needed(source.as_ref()) {
        debug!("Unscaling source bands");
        return Ok(Arc::new(UnscaledSource::new(source)));
    }
    Ok(source)
}

fn resolve_path(filename: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(filename);
    match base_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

/// Build an in-memory raster from an inline description.
pub fn build_inline(inline: &InlineRaster) -> Result<MemRaster, ConfigError> {
    if inline.width == 0 || inline.height == 0 || inline.band_count == 0 {
        return Err(ConfigError::InvalidValue {
            field: "Inline",
            value: format!(
                "{}x{} with {} band(s)",
                inline.width, inline.height, inline.band_count
            ),
        });
    }

    let mut raster = MemRaster::new(
        inline.width,
        inline.height,
        inline.band_count,
        inline.data_type,
    );

    if let (Some(bx), Some(by)) = (inline.block_x_size, inline.block_y_size) {
        raster = raster.with_block_size(bx, by);
    }

    match inline.interleave.as_deref() {
        None => {}
        Some(s) if s.eq_ignore_ascii_case("PIXEL") => {
            raster = raster.with_interleave(Interleave::Pixel);
        }
        Some(s) if s.eq_ignore_ascii_case("BAND") => {
            raster = raster.with_interleave(Interleave::Band);
        }
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                field: "Inline.Interleave",
                value: other.to_string(),
            })
        }
    }

    if let Some(gt) = inline.geo_transform {
        raster = raster.with_geo_transform(gt);
    }

    if !inline.fill.is_empty() {
        if inline.fill.len() != inline.band_count {
            return Err(ConfigError::InvalidValue {
                field: "Inline.Fill",
                value: format!("{} values for {} bands", inline.fill.len(), inline.band_count),
            });
        }
        for (band, &value) in inline.fill.iter().enumerate() {
            raster = raster.filled(band, value);
        }
    }

    if !inline.values.is_empty() {
        let plane = inline.width * inline.height;
        if inline.values.len() != plane * inline.band_count {
            return Err(ConfigError::InvalidValue {
                field: "Inline.Values",
                value: format!(
                    "{} values for {} bands of {} pixels",
                    inline.values.len(),
                    inline.band_count,
                    plane
                ),
            });
        }
        for (band, chunk) in inline.values.chunks(plane).enumerate() {
            raster = raster.with_band_values(band, chunk)?;
        }
    }

    for band in 0..inline.band_count {
        let offset = inline.offsets.get(band).copied().unwrap_or(0.0);
        let scale = inline.scales.get(band).copied().unwrap_or(1.0);
        raster = raster
            .with_nodata(band, inline.no_data)
            .with_offset_scale(band, offset, scale);
    }

    Ok(raster)
}
