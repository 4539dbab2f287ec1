//! Source rasters feeding a pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            ProcessedDataset             │
//! └────────────────────┬────────────────────┘
//!                      │ windowed reads
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           RasterSource Trait            │
//! └────────────────────┬────────────────────┘
//!          ┌───────────┼───────────────┐
//!          ▼           ▼               ▼
//! ┌──────────────┐ ┌──────────┐ ┌────────────────┐
//! │  MemRaster   │ │image_file│ │ UnscaledSource │
//! └──────────────┘ └──────────┘ └────────────────┘
//! ```

mod image_file;
mod memory;
mod open;
mod raster;
mod unscale;

pub use image_file::{image_to_raster, open_image};
pub use memory::{MemRaster, DEFAULT_MEM_BLOCK_SIZE};
pub use open::{build_inline, open_input};
pub use raster::{BandInfo, Interleave, RasterSource, ReadRequest, Spacing};
pub use unscale::UnscaledSource;
