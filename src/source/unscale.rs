//! Adapter exposing the unscaled values of a source.

use std::sync::Arc;

use super::raster::{BandInfo, Interleave, RasterSource, ReadRequest};
use crate::error::RasterError;
use crate::types::{copy_words, DataType, GeoTransform};

/// Wraps a source whose bands carry offset/scale and exposes Float64 bands
/// holding `value * scale + offset`.
///
/// No-data sentinels are unscaled the same way, so pixels equal to the
/// source no-data stay recognisable. Reported offset and scale become the
/// identity.
pub struct UnscaledSource {
    inner: Arc<dyn RasterSource>,
}

impl UnscaledSource {
    pub fn new(inner: Arc<dyn RasterSource>) -> Self {
        Self { inner }
    }

    /// Whether any band of `source` needs unscaling.
    pub fn is_needed(source: &dyn RasterSource) -> bool {
        (0..source.band_count())
            .filter_map(|b| source.band_info(b))
            .any(|info| info.is_scaled())
    }
}

impl RasterSource for UnscaledSource {
    fn width(&self) -> usize {
        self.inner.width()
    }

    fn height(&self) -> usize {
        self.inner.height()
    }

    fn band_count(&self) -> usize {
        self.inner.band_count()
    }

    fn band_info(&self, band: usize) -> Option<BandInfo> {
        let info = self.inner.band_info(band)?;
        Some(BandInfo {
            data_type: DataType::Float64,
            nodata: info.nodata.map(|nd| nd * info.scale + info.offset),
            offset: 0.0,
            scale: 1.0,
            ..info
        })
    }

    fn interleave(&self) -> Interleave {
        self.inner.interleave()
    }

    fn geo_transform(&self) -> Option<GeoTransform> {
        self.inner.geo_transform()
    }

    fn overview_count(&self) -> usize {
        self.inner.overview_count()
    }

    fn overview(&self, index: usize) -> Option<Arc<dyn RasterSource>> {
        let ov = self.inner.overview(index)?;
        Some(Arc::new(UnscaledSource::new(ov)))
    }

    fn read(&self, request: &ReadRequest, buffer: &mut [u8]) -> Result<(), RasterError> {
        request.validate(self.width(), self.height(), self.band_count(), buffer.len())?;

        // Read each band as Float64 band-sequential, unscale, then place into
        // the caller's layout.
        let staging_request = ReadRequest {
            data_type: DataType::Float64,
            ..request.clone()
        }
        .with_buffer_size(request.buffer_width, request.buffer_height);
        let mut staging = zeroed(staging_request.required_len())?;
        self.inner.read(&staging_request, &mut staging)?;

        let plane_len = request.buffer_width * request.buffer_height;
        for (i, &band) in request.bands.iter().enumerate() {
            let info = self
                .inner
                .band_info(band)
                .ok_or(RasterError::InvalidBand {
                    band,
                    band_count: self.band_count(),
                })?;
            let plane = &mut staging[i * plane_len * 8..(i + 1) * plane_len * 8];
            for chunk in plane.chunks_exact_mut(8) {
                let v = DataType::Float64.read_f64(chunk);
                DataType::Float64.write_f64(v * info.scale + info.offset, chunk);
            }

            for by in 0..request.buffer_height {
                let s = (by * request.buffer_width) * 8;
                let d = i * request.spacing.band + by * request.spacing.line;
                copy_words(
                    &plane[s..],
                    DataType::Float64,
                    8,
                    &mut buffer[d..],
                    request.data_type,
                    request.spacing.pixel,
                    request.buffer_width,
                );
            }
        }

        Ok(())
    }
}

/// Allocate a zero-filled buffer, reporting allocation failure.
fn zeroed(len: usize) -> Result<Vec<u8>, RasterError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| RasterError::OutOfMemory { bytes: len })?;
    buffer.resize(len, 0);
    Ok(buffer)
}
