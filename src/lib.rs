//! # processed-raster
//!
//! Virtual rasters whose pixels are computed on demand by running a source
//! raster through an ordered chain of pluggable pixel algorithms.
//!
//! Each processing step may change the pixel data type, the band count and
//! the no-data semantics. The shape flowing through the chain is resolved
//! once when the dataset is opened; reads then execute the chain under a RAM
//! budget, splitting large requests, and coarse reads are served by overview
//! instances of the same pipeline bound to decimated inputs.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`algorithm`] - Algorithm descriptors and the process-wide registry
//! - [`pipeline`] - Configuration schema, step resolution and region execution
//! - [`dataset`] - RAM-bounded read dispatch, block cache and overviews
//! - [`source`] - Source raster contract and implementations
//! - [`types`] - Pixel data types, windows and geotransforms
//! - [`config`] - Engine settings and CLI types
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use processed_raster::{
//!     AlgorithmDescriptor, AlgorithmRegistry, DataType, MemRaster, OpenOptions,
//!     ProcessedConfig, ProcessedDataset, ReadRequest, StepConfig, Window,
//! };
//!
//! let registry = AlgorithmRegistry::new();
//! registry
//!     .register(
//!         AlgorithmDescriptor::builder("double")
//!             .process(|ctx| {
//!                 for p in 0..ctx.pixel_count() {
//!                     let v = ctx.input_value(p, 0);
//!                     ctx.set_output_value(p, 0, v * 2.0);
//!                 }
//!                 Ok(())
//!             })
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let source = MemRaster::new(4, 4, 1, DataType::Float32).filled(0, 1.5);
//! let config = ProcessedConfig {
//!     processing_steps: vec![StepConfig::new("double")],
//!     ..Default::default()
//! };
//! let options = OpenOptions::new().with_registry(&registry);
//! let mut dataset = ProcessedDataset::from_source(Arc::new(source), &config, &options).unwrap();
//!
//! let request = ReadRequest::pixel_interleaved(Window::full(4, 4), DataType::Float32, vec![0]);
//! let mut buffer = vec![0u8; request.required_len()];
//! dataset.read(&request, &mut buffer, None).unwrap();
//! assert_eq!(DataType::Float32.read_f64(&buffer[..4]), 3.0);
//! ```

pub mod algorithm;
pub mod config;
pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use algorithm::{
    register_algorithm, AlgorithmDescriptor, AlgorithmRegistry, ArgKind, ArgValue,
    ArgumentSchema, ArgumentSpec, Builtin, InitContext, InitOutput, ProcessContext,
    StepArguments,
};
pub use config::{parse_memory_size, Cli, Command, Settings};
pub use dataset::{BufferLayout, OpenOptions, OutputBand, ProcessedDataset, SplitAxis};
pub use error::{AlgorithmError, ConfigError, ProcessError, RasterError, RegistryError};
pub use pipeline::{
    process_region, resolve_pipeline, Pipeline, ProcessedConfig, Progress, Provenance, Step,
    StepConfig, WorkBuffers,
};
pub use source::{
    open_image, BandInfo, Interleave, MemRaster, RasterSource, ReadRequest, Spacing,
    UnscaledSource,
};
pub use types::{DataType, GeoTransform, Window};
