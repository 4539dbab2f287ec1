//! Processed datasets: a pipeline bound to a source raster.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    ProcessedDataset                      │
//! │                                                          │
//! │  read(request) ──┬─ decimated? ──▶ overview[i].read()    │
//! │                  │                                       │
//! │                  ├─ other layout ─▶ per-block path       │
//! │                  │                   └▶ BlockCache (LRU) │
//! │                  │                                       │
//! │                  └─ recognised ───▶ split to budget      │
//! │                                      └▶ process_region   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The working block size and the per-pixel footprint are fixed at open
//! time. Every read runs on the calling thread; a dataset must not be read
//! from two threads at once, but distinct datasets (overviews included) are
//! independent.

mod block_cache;
mod dispatch;
mod overview;
mod sizing;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::algorithm::AlgorithmRegistry;
use crate::config::{default_ram_budget, DEFAULT_BLOCK_CACHE_BLOCKS};
use crate::error::{ConfigError, RasterError};
use crate::pipeline::{resolve_pipeline, ProcessedConfig, Step, WorkBuffers};
use crate::source::{open_input, RasterSource};
use crate::types::{DataType, GeoTransform, Window};

pub use block_cache::BlockCache;
pub use dispatch::BufferLayout;
pub use sizing::{choose_block_size, fits_budget, working_bytes_per_pixel, SplitAxis};

// =============================================================================
// Options
// =============================================================================

/// Settings used when opening a processed dataset.
#[derive(Debug, Clone)]
pub struct OpenOptions<'a> {
    /// Registry algorithms are looked up in
    pub registry: &'a AlgorithmRegistry,

    /// RAM budget in bytes; see [`crate::config`] for the default
    pub ram_budget: Option<u64>,

    /// Cached blocks per output band
    pub block_cache_blocks: usize,

    /// Directory relative input file names are resolved against
    pub base_dir: Option<PathBuf>,
}

impl Default for OpenOptions<'static> {
    fn default() -> Self {
        Self {
            registry: AlgorithmRegistry::global(),
            ram_budget: None,
            block_cache_blocks: DEFAULT_BLOCK_CACHE_BLOCKS,
            base_dir: None,
        }
    }
}

impl OpenOptions<'static> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a> OpenOptions<'a> {
    pub fn with_registry<'b>(self, registry: &'b AlgorithmRegistry) -> OpenOptions<'b> {
        OpenOptions {
            registry,
            ram_budget: self.ram_budget,
            block_cache_blocks: self.block_cache_blocks,
            base_dir: self.base_dir,
        }
    }

    pub fn with_ram_budget(mut self, bytes: u64) -> Self {
        self.ram_budget = Some(bytes);
        self
    }

    pub fn with_block_cache(mut self, blocks: usize) -> Self {
        self.block_cache_blocks = blocks;
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }
}

// =============================================================================
// Output Bands
// =============================================================================

/// One band exposed by a processed dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputBand {
    pub data_type: DataType,
    pub nodata: Option<f64>,
    pub block_width: usize,
    pub block_height: usize,
}

// =============================================================================
// ProcessedDataset
// =============================================================================

/// A raster computed on demand by a chain of algorithms.
pub struct ProcessedDataset {
    source: Arc<dyn RasterSource>,
    config: ProcessedConfig,
    steps: Vec<Step>,
    bands: Vec<OutputBand>,
    block_width: usize,
    block_height: usize,
    ram_budget: u64,
    bytes_per_pixel: usize,
    geo_transform: Option<GeoTransform>,
    buffers: WorkBuffers,
    cache: BlockCache,
    overviews: Vec<ProcessedDataset>,
}

impl ProcessedDataset {
    /// Open the dataset described by `config`, opening its `Input` source.
    pub fn open(config: &ProcessedConfig, options: &OpenOptions<'_>) -> Result<Self, ConfigError> {
        config.validate()?;
        let input = config
            .input
            .as_ref()
            .ok_or_else(|| ConfigError::MissingSection("Input".to_string()))?;
        let source = open_input(input, options.base_dir.as_deref())?;
        Self::from_source(source, config, options)
    }

    /// Bind the processing steps of `config` to an already opened source.
    ///
    /// The `Input` section of `config`, if any, is ignored.
    pub fn from_source(
        source: Arc<dyn RasterSource>,
        config: &ProcessedConfig,
        options: &OpenOptions<'_>,
    ) -> Result<Self, ConfigError> {
        let ram_budget = options.ram_budget.unwrap_or_else(default_ram_budget);
        let geo_transform = source.geo_transform();
        let mut dataset = Self::build(
            source,
            config,
            options.registry,
            ram_budget,
            options.block_cache_blocks,
            geo_transform,
        )?;
        dataset.build_overviews(options.registry, options.block_cache_blocks)?;
        Ok(dataset)
    }

    /// Resolve the pipeline and size the working block, without overviews.
    fn build(
        source: Arc<dyn RasterSource>,
        config: &ProcessedConfig,
        registry: &AlgorithmRegistry,
        ram_budget: u64,
        cache_blocks: usize,
        geo_transform: Option<GeoTransform>,
    ) -> Result<Self, ConfigError> {
        if source.band_count() == 0 || source.width() == 0 || source.height() == 0 {
            return Err(ConfigError::Source(RasterError::Unsupported(format!(
                "empty source raster ({}x{}, {} bands)",
                source.width(),
                source.height(),
                source.band_count()
            ))));
        }

        let pipeline = resolve_pipeline(config, source.as_ref(), registry)?;
        let (steps, shapes) = pipeline.into_parts();
        let bytes_per_pixel = working_bytes_per_pixel(&steps);

        let natural = source
            .band_info(0)
            .map(|info| (info.block_width, info.block_height))
            .unwrap_or((source.width(), 1));
        let natural = (
            config.block_x_size.unwrap_or(natural.0),
            config.block_y_size.unwrap_or(natural.1),
        );
        let (block_width, block_height) = choose_block_size(
            natural,
            (source.width(), source.height()),
            bytes_per_pixel,
            ram_budget,
        );

        debug!(
            width = source.width(),
            height = source.height(),
            natural_block = ?natural,
            block_width,
            block_height,
            bytes_per_pixel,
            ram_budget,
            "Chose working block size"
        );

        let bands: Vec<OutputBand> = shapes
            .iter()
            .map(|shape| OutputBand {
                data_type: shape.data_type,
                nodata: shape.nodata,
                block_width,
                block_height,
            })
            .collect();
        let cache = BlockCache::new(bands.len(), cache_blocks);

        Ok(Self {
            source,
            config: config.clone(),
            steps,
            bands,
            block_width,
            block_height,
            ram_budget,
            bytes_per_pixel,
            geo_transform,
            buffers: WorkBuffers::new(),
            cache,
            overviews: Vec::new(),
        })
    }

    pub fn width(&self) -> usize {
        self.source.width()
    }

    pub fn height(&self) -> usize {
        self.source.height()
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Output band `index` (0-based).
    pub fn band(&self, index: usize) -> Option<&OutputBand> {
        self.bands.get(index)
    }

    pub fn bands(&self) -> &[OutputBand] {
        &self.bands
    }

    /// Data type shared by all output bands.
    pub fn data_type(&self) -> DataType {
        self.bands[0].data_type
    }

    /// Working block width and height.
    pub fn block_size(&self) -> (usize, usize) {
        (self.block_width, self.block_height)
    }

    /// Number of blocks across and down.
    pub fn block_counts(&self) -> (usize, usize) {
        (
            self.width().div_ceil(self.block_width),
            self.height().div_ceil(self.block_height),
        )
    }

    pub fn ram_budget(&self) -> u64 {
        self.ram_budget
    }

    /// Worst-case bytes per pixel held by the working buffers.
    pub fn working_bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn geo_transform(&self) -> Option<GeoTransform> {
        self.geo_transform
    }

    pub fn source(&self) -> &Arc<dyn RasterSource> {
        &self.source
    }

    /// The configuration this dataset was opened with.
    pub fn config(&self) -> &ProcessedConfig {
        &self.config
    }

    /// Number of blocks cached for `band`.
    pub fn cached_blocks(&self, band: usize) -> usize {
        self.cache.len(band)
    }

    /// Drop every cached block, here and in all overviews.
    pub fn flush_cache(&mut self) {
        self.cache.clear();
        for overview in &mut self.overviews {
            overview.flush_cache();
        }
    }

    /// Source window covered by block (`block_x`, `block_y`).
    fn block_window(&self, block_x: usize, block_y: usize) -> Window {
        let x_off = block_x * self.block_width;
        let y_off = block_y * self.block_height;
        Window::new(
            x_off,
            y_off,
            self.block_width.min(self.width() - x_off),
            self.block_height.min(self.height() - y_off),
        )
    }
}

impl std::fmt::Debug for ProcessedDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedDataset")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("bands", &self.bands)
            .field("block_size", &self.block_size())
            .field("ram_budget", &self.ram_budget)
            .field("steps", &self.steps.len())
            .field("overviews", &self.overviews.len())
            .finish()
    }
}
