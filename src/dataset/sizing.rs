//! Working block sizing and the shared split policy.

use crate::pipeline::Step;

/// Which dimension of a region to halve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitAxis {
    /// Halve the height
    Rows,
    /// Halve the width
    Columns,
}

impl SplitAxis {
    /// Pick the dimension to halve for a `width` x `height` region of a
    /// raster `raster_width` pixels wide.
    ///
    /// Height is halved when the region spans the full raster width or is at
    /// least as tall as it is wide; width otherwise. A dimension of 1 is never
    /// chosen while the other can still be halved.
    pub fn choose(width: usize, height: usize, raster_width: usize) -> SplitAxis {
        let preferred = if width >= raster_width || height >= width {
            SplitAxis::Rows
        } else {
            SplitAxis::Columns
        };
        match preferred {
            SplitAxis::Rows if height < 2 && width >= 2 => SplitAxis::Columns,
            SplitAxis::Columns if width < 2 && height >= 2 => SplitAxis::Rows,
            axis => axis,
        }
    }
}

/// Worst-case bytes per pixel live at once: the largest step input plus the
/// largest step output.
pub fn working_bytes_per_pixel(steps: &[Step]) -> usize {
    let input = steps.iter().map(Step::input_pixel_size).max().unwrap_or(0);
    let output = steps.iter().map(Step::output_pixel_size).max().unwrap_or(0);
    input + output
}

/// Whether a `width` x `height` region fits `budget` bytes.
pub fn fits_budget(width: usize, height: usize, bytes_per_pixel: usize, budget: u64) -> bool {
    (width as u128) * (height as u128) * (bytes_per_pixel as u128) <= budget as u128
}

/// Shrink `natural` (clamped to the raster) until it fits `budget`.
///
/// Stops at 1x1 even if a single pixel exceeds the budget.
pub fn choose_block_size(
    natural: (usize, usize),
    raster: (usize, usize),
    bytes_per_pixel: usize,
    budget: u64,
) -> (usize, usize) {
    let (raster_width, raster_height) = raster;
    let mut width = natural.0.clamp(1, raster_width.max(1));
    let mut height = natural.1.clamp(1, raster_height.max(1));

    while !fits_budget(width, height, bytes_per_pixel, budget) && (width >= 2 || height >= 2) {
        match SplitAxis::choose(width, height, raster_width) {
            SplitAxis::Rows => height /= 2,
            SplitAxis::Columns => width /= 2,
        }
    }

    (width, height)
}
