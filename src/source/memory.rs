//! In-memory raster.
//!
//! `MemRaster` holds one plane of samples per band and serves windowed reads
//! with any buffer layout. It is the backing store for inline rasters and
//! decoded images, and the workhorse of the test suite.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::raster::{BandInfo, Interleave, RasterSource, ReadRequest};
use crate::error::RasterError;
use crate::types::{copy_words, DataType, GeoTransform, Window};

/// Default natural block edge, in pixels.
pub const DEFAULT_MEM_BLOCK_SIZE: usize = 256;

#[derive(Debug, Clone)]
struct MemBand {
    data: Vec<u8>,
    nodata: Option<f64>,
    offset: f64,
    scale: f64,
}

/// A raster whose bands live in memory.
///
/// Builder methods taking a band index ignore bands that do not exist.
#[derive(Debug)]
pub struct MemRaster {
    width: usize,
    height: usize,
    data_type: DataType,
    bands: Vec<MemBand>,
    block_width: usize,
    block_height: usize,
    interleave: Interleave,
    geo_transform: Option<GeoTransform>,
    overviews: Vec<Arc<MemRaster>>,
    reads: AtomicUsize,
}

impl MemRaster {
    /// Create a zero-filled raster.
    pub fn new(width: usize, height: usize, band_count: usize, data_type: DataType) -> Self {
        let band = MemBand {
            data: vec![0u8; width * height * data_type.size()],
            nodata: None,
            offset: 0.0,
            scale: 1.0,
        };
        Self {
            width,
            height,
            data_type,
            bands: vec![band; band_count],
            block_width: width.clamp(1, DEFAULT_MEM_BLOCK_SIZE),
            block_height: height.clamp(1, DEFAULT_MEM_BLOCK_SIZE),
            interleave: Interleave::Pixel,
            geo_transform: None,
            overviews: Vec::new(),
            reads: AtomicUsize::new(0),
        }
    }

    /// Set the natural block size reported for every band.
    pub fn with_block_size(mut self, width: usize, height: usize) -> Self {
        self.block_width = width.max(1);
        self.block_height = height.max(1);
        self
    }

    pub fn with_interleave(mut self, interleave: Interleave) -> Self {
        self.interleave = interleave;
        self
    }

    pub fn with_geo_transform(mut self, geo_transform: GeoTransform) -> Self {
        self.geo_transform = Some(geo_transform);
        self
    }

    pub fn with_nodata(mut self, band: usize, nodata: Option<f64>) -> Self {
        if let Some(b) = self.bands.get_mut(band) {
            b.nodata = nodata;
        }
        self
    }

    pub fn with_offset_scale(mut self, band: usize, offset: f64, scale: f64) -> Self {
        if let Some(b) = self.bands.get_mut(band) {
            b.offset = offset;
            b.scale = scale;
        }
        self
    }

    /// Fill a band with a constant value.
    pub fn filled(mut self, band: usize, value: f64) -> Self {
        self.fill(band, value);
        self
    }

    /// Fill a band from a function of `(column, row)`.
    pub fn with_band_fn(mut self, band: usize, f: impl Fn(usize, usize) -> f64) -> Self {
        for y in 0..self.height {
            for x in 0..self.width {
                self.set(band, x, y, f(x, y));
            }
        }
        self
    }

    /// Replace a band's samples with `values` in row-major order.
    pub fn with_band_values(mut self, band: usize, values: &[f64]) -> Result<Self, RasterError> {
        if values.len() != self.width * self.height {
            return Err(RasterError::Unsupported(format!(
                "band {} expects {} values, got {}",
                band,
                self.width * self.height,
                values.len()
            )));
        }
        for (i, v) in values.iter().enumerate() {
            self.set(band, i % self.width, i / self.width, *v);
        }
        Ok(self)
    }

    /// Build nearest-neighbour overviews for each decimation factor.
    ///
    /// Factors below 2 are skipped; overviews are built from the current
    /// band content. An empty raster gets no overviews.
    pub fn with_overviews(mut self, factors: &[usize]) -> Self {
        let mut overviews = Vec::new();
        if self.width == 0 || self.height == 0 {
            self.overviews = overviews;
            return self;
        }
        for &factor in factors.iter().filter(|&&f| f >= 2) {
            overviews.push(Arc::new(self.decimate(factor)));
        }
        self.overviews = overviews;
        self
    }

    pub fn fill(&mut self, band: usize, value: f64) {
        let size = self.data_type.size();
        let mut sample = vec![0u8; size];
        self.data_type.write_f64(value, &mut sample);
        if let Some(b) = self.bands.get_mut(band) {
            for chunk in b.data.chunks_exact_mut(size) {
                chunk.copy_from_slice(&sample);
            }
        }
    }

    pub fn set(&mut self, band: usize, x: usize, y: usize, value: f64) {
        let size = self.data_type.size();
        let offset = (y * self.width + x) * size;
        if let Some(b) = self.bands.get_mut(band) {
            self.data_type.write_f64(value, &mut b.data[offset..offset + size]);
        }
    }

    /// Sample value at `(x, y)` of a band.
    pub fn get(&self, band: usize, x: usize, y: usize) -> Option<f64> {
        let size = self.data_type.size();
        let offset = (y * self.width + x) * size;
        let b = self.bands.get(band)?;
        b.data
            .get(offset..offset + size)
            .map(|bytes| self.data_type.read_f64(bytes))
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Number of `read` calls served so far, overviews excluded.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn decimate(&self, factor: usize) -> MemRaster {
        let width = self.width.div_ceil(factor).max(1);
        let height = self.height.div_ceil(factor).max(1);
        let size = self.data_type.size();
        let last_col = self.width.saturating_sub(1);
        let last_row = self.height.saturating_sub(1);
        let src_col = |x: usize| {
            (((x as f64 + 0.5) * self.width as f64 / width as f64) as usize).min(last_col)
        };
        let src_row = |y: usize| {
            (((y as f64 + 0.5) * self.height as f64 / height as f64) as usize).min(last_row)
        };

        let bands = self
            .bands
            .iter()
            .map(|band| {
                let mut data = vec![0u8; width * height * size];
                for y in 0..height {
                    let sy = src_row(y);
                    for x in 0..width {
                        let s = (sy * self.width + src_col(x)) * size;
                        let d = (y * width + x) * size;
                        data[d..d + size].copy_from_slice(&band.data[s..s + size]);
                    }
                }
                MemBand {
                    data,
                    nodata: band.nodata,
                    offset: band.offset,
                    scale: band.scale,
                }
            })
            .collect();

        MemRaster {
            width,
            height,
            data_type: self.data_type,
            bands,
            block_width: self.block_width.min(width),
            block_height: self.block_height.min(height),
            interleave: self.interleave,
            geo_transform: self.geo_transform.map(|gt| {
                gt.scaled(
                    self.width as f64 / width as f64,
                    self.height as f64 / height as f64,
                )
            }),
            overviews: Vec::new(),
            reads: AtomicUsize::new(0),
        }
    }
}

impl RasterSource for MemRaster {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn band_info(&self, band: usize) -> Option<BandInfo> {
        let b = self.bands.get(band)?;
        Some(BandInfo {
            data_type: self.data_type,
            nodata: b.nodata,
            offset: b.offset,
            scale: b.scale,
            block_width: self.block_width,
            block_height: self.block_height,
        })
    }

    fn interleave(&self) -> Interleave {
        self.interleave
    }

    fn geo_transform(&self) -> Option<GeoTransform> {
        self.geo_transform
    }

    fn overview_count(&self) -> usize {
        self.overviews.len()
    }

    fn overview(&self, index: usize) -> Option<Arc<dyn RasterSource>> {
        self.overviews
            .get(index)
            .map(|ov| Arc::clone(ov) as Arc<dyn RasterSource>)
    }

    fn read(&self, request: &ReadRequest, buffer: &mut [u8]) -> Result<(), RasterError> {
        request.validate(self.width, self.height, self.bands.len(), buffer.len())?;
        self.reads.fetch_add(1, Ordering::SeqCst);

        let size = self.data_type.size();
        let Window { x_off, width, .. } = request.window;
        let native = request.is_native_resolution();

        for (i, &band) in request.bands.iter().enumerate() {
            let plane = &self.bands[band].data;
            for by in 0..request.buffer_height {
                let sy = request.source_row(by);
                let row_base = i * request.spacing.band + by * request.spacing.line;

                if native {
                    let s = (sy * self.width + x_off) * size;
                    copy_words(
                        &plane[s..],
                        self.data_type,
                        size,
                        &mut buffer[row_base..],
                        request.data_type,
                        request.spacing.pixel,
                        width,
                    );
                    continue;
                }

                for bx in 0..request.buffer_width {
                    let s = (sy * self.width + request.source_column(bx)) * size;
                    let d = row_base + bx * request.spacing.pixel;
                    copy_words(
                        &plane[s..],
                        self.data_type,
                        size,
                        &mut buffer[d..],
                        request.data_type,
                        size,
                        1,
                    );
                }
            }
        }

        Ok(())
    }
}
