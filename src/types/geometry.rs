//! Pixel windows and affine georeferencing.

use serde::{Deserialize, Serialize};

// =============================================================================
// Window
// =============================================================================

/// A rectangular region of a raster, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Window {
    /// Column of the top-left pixel
    pub x_off: usize,
    /// Row of the top-left pixel
    pub y_off: usize,
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
}

impl Window {
    pub fn new(x_off: usize, y_off: usize, width: usize, height: usize) -> Self {
        Self {
            x_off,
            y_off,
            width,
            height,
        }
    }

    /// Window covering a whole raster of the given size.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the window lies inside a raster of `width` x `height`.
    pub fn fits_in(&self, width: usize, height: usize) -> bool {
        self.x_off
            .checked_add(self.width)
            .is_some_and(|right| right <= width)
            && self
                .y_off
                .checked_add(self.height)
                .is_some_and(|bottom| bottom <= height)
    }

    /// Split into a top and bottom half. The top half gets `height / 2` rows.
    pub fn split_rows(&self) -> (Window, Window) {
        let top = self.height / 2;
        (
            Window::new(self.x_off, self.y_off, self.width, top),
            Window::new(self.x_off, self.y_off + top, self.width, self.height - top),
        )
    }

    /// Split into a left and right half. The left half gets `width / 2` columns.
    pub fn split_columns(&self) -> (Window, Window) {
        let left = self.width / 2;
        (
            Window::new(self.x_off, self.y_off, left, self.height),
            Window::new(self.x_off + left, self.y_off, self.width - left, self.height),
        )
    }
}

// =============================================================================
// GeoTransform
// =============================================================================

/// Affine transformation from pixel to georeferenced coordinates.
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height,
        }
    }

    /// Build from the usual six-coefficient array
    /// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Georeferenced coordinates of the top-left corner of a pixel.
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Transform of a raster decimated by `ratio_x` columns and `ratio_y`
    /// rows per output pixel.
    pub fn scaled(&self, ratio_x: f64, ratio_y: f64) -> Self {
        Self {
            origin_x: self.origin_x,
            pixel_width: self.pixel_width * ratio_x,
            row_rotation: self.row_rotation * ratio_y,
            origin_y: self.origin_y,
            col_rotation: self.col_rotation * ratio_x,
            pixel_height: self.pixel_height * ratio_y,
        }
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(coeffs: [f64; 6]) -> Self {
        Self::from_gdal(coeffs)
    }
}

impl From<GeoTransform> for [f64; 6] {
    fn from(gt: GeoTransform) -> Self {
        gt.to_gdal()
    }
}
