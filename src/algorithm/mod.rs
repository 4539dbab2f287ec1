//! Pluggable pixel algorithms.
//!
//! External providers describe an algorithm once with an
//! [`AlgorithmDescriptor`] and register it by name. Pipelines then refer to
//! algorithms by that name in their processing steps.
//!
//! # Example
//!
//! ```
//! use processed_raster::algorithm::{AlgorithmDescriptor, AlgorithmRegistry, ArgKind, ArgumentSpec};
//!
//! let registry = AlgorithmRegistry::new();
//! let invert = AlgorithmDescriptor::builder("invert")
//!     .argument(ArgumentSpec::optional("max", ArgKind::Double))
//!     .process(|ctx| {
//!         let max = ctx.arguments.get_double("max").unwrap_or(255.0);
//!         for pixel in 0..ctx.pixel_count() {
//!             for band in 0..ctx.input_band_count {
//!                 let v = ctx.input_value(pixel, band);
//!                 ctx.set_output_value(pixel, band, max - v);
//!             }
//!         }
//!         Ok(())
//!     })
//!     .build();
//! registry.register(invert).unwrap();
//! assert!(registry.lookup("invert").is_some());
//! ```

mod arguments;
mod descriptor;
mod registry;
mod state;

pub use arguments::{ArgValue, StepArguments};
pub use descriptor::{
    AlgorithmBuilder, AlgorithmDescriptor, ArgKind, ArgumentSchema, ArgumentSpec, Builtin,
    FreeFn, InitContext, InitFn, InitOutput, ProcessContext, ProcessFn, UserData,
    BAND_PLACEHOLDER,
};
pub use registry::{register_algorithm, AlgorithmRegistry};
pub use state::WorkingState;

pub(crate) use descriptor::band_suffix;
