//! Pipeline configuration, resolution and execution.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌────────────────────┐
//! │ ProcessedConfig  │────▶│  resolve_pipeline  │◀──── AlgorithmRegistry
//! └──────────────────┘     └─────────┬──────────┘
//!                                    │ Vec<Step>
//!                                    ▼
//!                          ┌────────────────────┐
//!   RasterSource ─────────▶│   process_region   │────▶ WorkBuffers::current
//!                          └────────────────────┘
//! ```
//!
//! Resolution threads the (data type, band count, no-data) shape from the
//! source through every step at open time, so execution never has to guess
//! buffer sizes.

mod progress;
mod region;
mod resolve;
mod schema;
mod step;

pub use progress::Progress;
pub use region::{process_region, WorkBuffers};
pub use resolve::{is_chain_consistent, resolve_pipeline, BandShape, Pipeline, Provenance};
pub use schema::{
    BandConfig, InlineRaster, InputConfig, OutputBandsConfig, ProcessedConfig, RawArgument,
    StepConfig,
};
pub use step::{resolve_step, ResolveContext, RunningState, Step};

pub(crate) use region::ensure_len;
