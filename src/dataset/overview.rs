//! Overview levels of a processed dataset.
//!
//! Each overview of the source gets its own processed dataset running the
//! same steps (with fresh working state) against the decimated source.

use tracing::{debug, warn};

use super::ProcessedDataset;
use crate::algorithm::AlgorithmRegistry;
use crate::error::ConfigError;
use crate::source::ReadRequest;
use crate::types::Window;

impl ProcessedDataset {
    /// Build one child per source overview. Children get no overviews of
    /// their own.
    pub(super) fn build_overviews(
        &mut self,
        registry: &AlgorithmRegistry,
        cache_blocks: usize,
    ) -> Result<(), ConfigError> {
        for index in 0..self.source.overview_count() {
            let Some(source) = self.source.overview(index) else {
                warn!(overview = index, "Source reports an overview it cannot open");
                continue;
            };
            if source.width() == 0 || source.height() == 0 {
                warn!(overview = index, "Skipping empty overview");
                continue;
            }

            let ratio_x = self.width() as f64 / source.width() as f64;
            let ratio_y = self.height() as f64 / source.height() as f64;
            let geo_transform = source
                .geo_transform()
                .or_else(|| self.geo_transform.map(|gt| gt.scaled(ratio_x, ratio_y)));

            let child = Self::build(
                source,
                &self.config,
                registry,
                self.ram_budget,
                cache_blocks,
                geo_transform,
            )?;
            debug!(
                overview = index,
                width = child.width(),
                height = child.height(),
                "Built overview"
            );
            self.overviews.push(child);
        }
        Ok(())
    }

    pub fn overview_count(&self) -> usize {
        self.overviews.len()
    }

    pub fn overview(&self, index: usize) -> Option<&ProcessedDataset> {
        self.overviews.get(index)
    }

    pub fn overview_mut(&mut self, index: usize) -> Option<&mut ProcessedDataset> {
        self.overviews.get_mut(index)
    }

    /// Decimation factor of overview `index` along x and y.
    fn overview_factors(&self, index: usize) -> (f64, f64) {
        let overview = &self.overviews[index];
        (
            self.width() as f64 / overview.width() as f64,
            self.height() as f64 / overview.height() as f64,
        )
    }

    /// The overview with the largest decimation not exceeding the request's.
    pub(super) fn select_overview(&self, request: &ReadRequest) -> Option<usize> {
        let wanted = f64::min(
            request.window.width as f64 / request.buffer_width as f64,
            request.window.height as f64 / request.buffer_height as f64,
        );

        (0..self.overviews.len())
            .map(|i| {
                let (fx, fy) = self.overview_factors(i);
                (i, fx.min(fy))
            })
            .filter(|&(_, factor)| factor > 1.0 && factor <= wanted * (1.0 + 1e-9))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// `request` expressed in the pixel space of overview `index`.
    pub(super) fn overview_request(&self, index: usize, request: &ReadRequest) -> ReadRequest {
        let overview = &self.overviews[index];
        let (fx, fy) = self.overview_factors(index);
        let (x_off, width) = map_span(
            request.window.x_off,
            request.window.width,
            fx,
            overview.width(),
        );
        let (y_off, height) = map_span(
            request.window.y_off,
            request.window.height,
            fy,
            overview.height(),
        );
        ReadRequest {
            window: Window::new(x_off, y_off, width, height),
            ..request.clone()
        }
    }
}

/// Map `[offset, offset + len)` by `factor`, covering every partially
/// touched pixel and staying inside `limit`.
fn map_span(offset: usize, len: usize, factor: f64, limit: usize) -> (usize, usize) {
    let start = ((offset as f64 / factor).floor() as usize).min(limit.saturating_sub(1));
    let end = (((offset + len) as f64 / factor).ceil() as usize).clamp(start + 1, limit);
    (start, end - start)
}
