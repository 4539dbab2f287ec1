//! The contract a source raster must fulfil to feed a pipeline.
//!
//! The engine only needs windowed reads with explicit band mapping, strides
//! and pixel type, plus a handful of per-band queries. Anything that can
//! answer these (an in-memory grid, a decoded image, another virtual raster)
//! can be used as input.

use std::sync::Arc;

use crate::error::RasterError;
use crate::types::{DataType, GeoTransform, Window};

// =============================================================================
// Band Information
// =============================================================================

/// Static description of one source band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandInfo {
    /// Native pixel type
    pub data_type: DataType,

    /// No-data sentinel, if any
    pub nodata: Option<f64>,

    /// Offset applied when unscaling (`value * scale + offset`)
    pub offset: f64,

    /// Scale applied when unscaling
    pub scale: f64,

    /// Natural block width in pixels
    pub block_width: usize,

    /// Natural block height in pixels
    pub block_height: usize,
}

impl BandInfo {
    pub fn new(data_type: DataType, block_width: usize, block_height: usize) -> Self {
        Self {
            data_type,
            nodata: None,
            offset: 0.0,
            scale: 1.0,
            block_width,
            block_height,
        }
    }

    /// Whether the band carries a non-identity offset or scale.
    pub fn is_scaled(&self) -> bool {
        self.offset != 0.0 || self.scale != 1.0
    }
}

/// Physical organisation hint of a multi-band source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interleave {
    /// All bands of a pixel are stored together
    #[default]
    Pixel,
    /// Each band is stored as its own plane
    Band,
}

// =============================================================================
// Read Requests
// =============================================================================

/// Byte distances between neighbouring samples in a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spacing {
    /// Bytes between two horizontally adjacent pixels
    pub pixel: usize,
    /// Bytes between two rows
    pub line: usize,
    /// Bytes between two bands of the same pixel
    pub band: usize,
}

/// A windowed read.
///
/// When the buffer size differs from the window size, samples are picked by
/// nearest neighbour.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    /// Region of the raster to read
    pub window: Window,

    /// Buffer width in pixels
    pub buffer_width: usize,

    /// Buffer height in pixels
    pub buffer_height: usize,

    /// Data type samples are converted to
    pub data_type: DataType,

    /// 0-based band indices, in buffer order
    pub bands: Vec<usize>,

    /// Buffer strides in bytes
    pub spacing: Spacing,
}

impl ReadRequest {
    /// Pixel-interleaved request at native resolution for `bands`.
    pub fn pixel_interleaved(window: Window, data_type: DataType, bands: Vec<usize>) -> Self {
        let size = data_type.size();
        let pixel = size * bands.len();
        Self {
            window,
            buffer_width: window.width,
            buffer_height: window.height,
            data_type,
            spacing: Spacing {
                pixel,
                line: pixel * window.width,
                band: size,
            },
            bands,
        }
    }

    /// Band-sequential request at native resolution for `bands`.
    pub fn band_sequential(window: Window, data_type: DataType, bands: Vec<usize>) -> Self {
        let size = data_type.size();
        Self {
            window,
            buffer_width: window.width,
            buffer_height: window.height,
            data_type,
            spacing: Spacing {
                pixel: size,
                line: size * window.width,
                band: size * window.pixel_count(),
            },
            bands,
        }
    }

    /// Resample into a buffer of a different size, keeping a band-sequential
    /// layout.
    pub fn with_buffer_size(mut self, width: usize, height: usize) -> Self {
        let size = self.data_type.size();
        self.buffer_width = width;
        self.buffer_height = height;
        self.spacing = Spacing {
            pixel: size,
            line: size * width,
            band: size * width * height,
        };
        self
    }

    /// Override the buffer strides.
    pub fn with_spacing(mut self, spacing: Spacing) -> Self {
        self.spacing = spacing;
        self
    }

    /// Whether the buffer has the same size as the window.
    pub fn is_native_resolution(&self) -> bool {
        self.buffer_width == self.window.width && self.buffer_height == self.window.height
    }

    /// Minimum buffer length in bytes for this request.
    pub fn required_len(&self) -> usize {
        if self.buffer_width == 0 || self.buffer_height == 0 || self.bands.is_empty() {
            return 0;
        }
        (self.buffer_height - 1) * self.spacing.line
            + (self.buffer_width - 1) * self.spacing.pixel
            + (self.bands.len() - 1) * self.spacing.band
            + self.data_type.size()
    }

    /// Check the request against a raster's dimensions and a buffer length.
    pub fn validate(
        &self,
        raster_width: usize,
        raster_height: usize,
        band_count: usize,
        buffer_len: usize,
    ) -> Result<(), RasterError> {
        if !self.window.fits_in(raster_width, raster_height) {
            return Err(RasterError::WindowOutOfBounds {
                x_off: self.window.x_off,
                y_off: self.window.y_off,
                width: self.window.width,
                height: self.window.height,
                raster_width,
                raster_height,
            });
        }
        if let Some(&band) = self.bands.iter().find(|&&b| b >= band_count) {
            return Err(RasterError::InvalidBand { band, band_count });
        }
        let required = self.required_len();
        if buffer_len < required {
            return Err(RasterError::BufferTooSmall {
                required,
                actual: buffer_len,
            });
        }
        Ok(())
    }

    /// Source column sampled for buffer column `bx`.
    pub fn source_column(&self, bx: usize) -> usize {
        self.window.x_off + nearest(bx, self.window.width, self.buffer_width)
    }

    /// Source row sampled for buffer row `by`.
    pub fn source_row(&self, by: usize) -> usize {
        self.window.y_off + nearest(by, self.window.height, self.buffer_height)
    }
}

/// Nearest-neighbour mapping of buffer index `i` (out of `buf`) onto `src`
/// source pixels, sampling pixel centres.
fn nearest(i: usize, src: usize, buf: usize) -> usize {
    if buf == src {
        return i;
    }
    let pos = ((i as f64 + 0.5) * src as f64 / buf as f64) as usize;
    pos.min(src.saturating_sub(1))
}

// =============================================================================
// RasterSource Trait
// =============================================================================

/// A raster that can be read by window.
///
/// Implementations must be safe to share between threads; reads take `&self`.
pub trait RasterSource: Send + Sync {
    /// Width in pixels.
    fn width(&self) -> usize;

    /// Height in pixels.
    fn height(&self) -> usize;

    /// Number of bands.
    fn band_count(&self) -> usize;

    /// Description of a 0-based band, or `None` if out of range.
    fn band_info(&self, band: usize) -> Option<BandInfo>;

    /// Physical layout hint.
    fn interleave(&self) -> Interleave {
        Interleave::Pixel
    }

    /// Georeferencing, if known.
    fn geo_transform(&self) -> Option<GeoTransform> {
        None
    }

    /// Number of decimated overviews.
    fn overview_count(&self) -> usize {
        0
    }

    /// A decimated view of this raster.
    fn overview(&self, _index: usize) -> Option<Arc<dyn RasterSource>> {
        None
    }

    /// Read a window into `buffer` according to `request`.
    fn read(&self, request: &ReadRequest, buffer: &mut [u8]) -> Result<(), RasterError>;
}
