//! Test utilities for integration tests.
//!
//! This module provides small algorithms covering each part of the algorithm
//! contract, together with helpers to build sources, open datasets and read
//! them back.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use processed_raster::pipeline::OutputBandsConfig;
use processed_raster::{
    AlgorithmDescriptor, AlgorithmError, AlgorithmRegistry, ArgKind, ArgumentSpec, Builtin,
    ConfigError, DataType, InitOutput, MemRaster, OpenOptions, ProcessContext, ProcessedConfig,
    ProcessedDataset, RasterSource, ReadRequest, StepConfig, Window,
};

// =============================================================================
// Algorithms
// =============================================================================

/// Multiply every sample by the `factor` argument, leaving no-data alone.
fn multiply(ctx: &mut ProcessContext<'_>) -> Result<(), AlgorithmError> {
    let factor = ctx
        .arguments
        .get_double("factor")
        .ok_or_else(|| AlgorithmError::new("factor is not set"))?;
    let nodata = ctx.arguments.get_double("nodata");

    for p in 0..ctx.pixel_count() {
        for b in 0..ctx.input_band_count {
            let v = ctx.input_value(p, b);
            let skip = match nodata {
                Some(nd) => v == nd || (v.is_nan() && nd.is_nan()),
                None => false,
            };
            ctx.set_output_value(p, b, if skip { v } else { v * factor });
        }
    }
    Ok(())
}

/// Copy the input to the output unchanged.
fn copy_through(ctx: &mut ProcessContext<'_>) -> Result<(), AlgorithmError> {
    let len = ctx.output.len();
    ctx.output.copy_from_slice(&ctx.input[..len]);
    Ok(())
}

/// `double`: multiply by the constant factor 2, no-data aware.
pub fn doubling() -> AlgorithmDescriptor {
    AlgorithmDescriptor::builder("double")
        .constant("factor", "2")
        .builtin(Builtin::NoData)
        .process(multiply)
        .build()
}

/// `scale`: multiply by a required `factor`.
pub fn scaling() -> AlgorithmDescriptor {
    AlgorithmDescriptor::builder("scale")
        .argument(ArgumentSpec::required("factor", ArgKind::Double))
        .process(multiply)
        .build()
}

/// `mean`: average all bands into one band of the input type.
pub fn band_mean() -> AlgorithmDescriptor {
    AlgorithmDescriptor::builder("mean")
        .init(|ctx| Ok(InitOutput::new(1, ctx.input_data_type)))
        .process(|ctx| {
            let bands = ctx.input_band_count as f64;
            for p in 0..ctx.pixel_count() {
                let sum: f64 = (0..ctx.input_band_count)
                    .map(|b| ctx.input_value(p, b))
                    .sum();
                ctx.set_output_value(p, 0, sum / bands);
            }
            Ok(())
        })
        .build()
}

/// `expand4`: three bands in, the same three plus their sum out, as UInt16.
pub fn expand_to_four() -> AlgorithmDescriptor {
    AlgorithmDescriptor::builder("expand4")
        .supported_input_band_counts(&[3])
        .init(|_| Ok(InitOutput::new(4, DataType::UInt16)))
        .process(|ctx| {
            for p in 0..ctx.pixel_count() {
                let mut sum = 0.0;
                for b in 0..3 {
                    let v = ctx.input_value(p, b);
                    sum += v;
                    ctx.set_output_value(p, b, v);
                }
                ctx.set_output_value(p, 3, sum);
            }
            Ok(())
        })
        .build()
}

/// `identity`: pass pixels through untouched.
pub fn identity() -> AlgorithmDescriptor {
    AlgorithmDescriptor::builder("identity")
        .process(copy_through)
        .build()
}

/// `position`: one Float64 band holding `column + 1000 * row` of each
/// source pixel, ignoring the input values.
pub fn position() -> AlgorithmDescriptor {
    AlgorithmDescriptor::builder("position")
        .init(|_| Ok(InitOutput::new(1, DataType::Float64)))
        .process(|ctx| {
            let window = ctx.window;
            for p in 0..ctx.pixel_count() {
                let column = window.x_off + p % window.width;
                let row = window.y_off + p / window.width;
                ctx.set_output_value(p, 0, (column + 1000 * row) as f64);
            }
            Ok(())
        })
        .build()
}

/// Switch making [`flaky`] fail while it is on.
#[derive(Debug, Clone, Default)]
pub struct FailSwitch(pub Arc<AtomicBool>);

impl FailSwitch {
    pub fn set(&self, failing: bool) {
        self.0.store(failing, Ordering::SeqCst);
    }
}

/// `flaky`: identity that fails while its switch is on.
pub fn flaky(switch: FailSwitch) -> AlgorithmDescriptor {
    AlgorithmDescriptor::builder("flaky")
        .user_data(switch)
        .process(|ctx| {
            let failing = ctx
                .user_data::<FailSwitch>()
                .is_some_and(|s| s.0.load(Ordering::SeqCst));
            if failing {
                return Err(AlgorithmError::new("switched off"));
            }
            copy_through(ctx)
        })
        .build()
}

/// Lifecycle counters shared with [`counted`].
#[derive(Debug, Default)]
pub struct Counters {
    pub inits: AtomicUsize,
    pub frees: AtomicUsize,
    pub runs: AtomicUsize,
}

impl Counters {
    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

/// `counted`: identity with working state, counting init, free and process
/// calls.
pub fn counted(counters: Arc<Counters>) -> AlgorithmDescriptor {
    AlgorithmDescriptor::builder("counted")
        .user_data(counters)
        .init(|ctx| {
            if let Some(counters) = ctx.user_data::<Arc<Counters>>() {
                counters.inits.fetch_add(1, Ordering::SeqCst);
            }
            Ok(InitOutput::new(ctx.input_band_count, ctx.input_data_type)
                .with_nodata(ctx.input_nodata.to_vec())
                .with_state(0usize))
        })
        .free(|user_data, _state| {
            if let Some(counters) = user_data.and_then(|u| u.downcast_ref::<Arc<Counters>>()) {
                counters.frees.fetch_add(1, Ordering::SeqCst);
            }
        })
        .process(|ctx| {
            if let Some(calls) = ctx.state_mut::<usize>() {
                *calls += 1;
            }
            if let Some(counters) = ctx.user_data::<Arc<Counters>>() {
                counters.runs.fetch_add(1, Ordering::SeqCst);
            }
            copy_through(ctx)
        })
        .build()
}

/// A registry holding every stateless test algorithm.
pub fn test_registry() -> AlgorithmRegistry {
    let registry = AlgorithmRegistry::new();
    for descriptor in [
        doubling(),
        scaling(),
        band_mean(),
        expand_to_four(),
        identity(),
        position(),
    ] {
        registry.register(descriptor).unwrap();
    }
    registry
}

// =============================================================================
// Sources and Configurations
// =============================================================================

/// Deterministic test pattern: sample of `band` at (`x`, `y`).
pub fn pattern(band: usize, x: usize, y: usize) -> f64 {
    ((x * 3 + y * 7 + band * 13) % 251) as f64
}

/// A raster filled with [`pattern`] on every band.
pub fn pattern_source(
    width: usize,
    height: usize,
    band_count: usize,
    data_type: DataType,
) -> MemRaster {
    let mut raster = MemRaster::new(width, height, band_count, data_type);
    for band in 0..band_count {
        raster = raster.with_band_fn(band, |x, y| pattern(band, x, y));
    }
    raster
}

/// A configuration with the given steps and no `Input` section.
pub fn steps_config(steps: Vec<StepConfig>) -> ProcessedConfig {
    ProcessedConfig {
        processing_steps: steps,
        ..Default::default()
    }
}

/// Take the band count and data type of the output from the last step.
pub fn from_last_step(mut config: ProcessedConfig) -> ProcessedConfig {
    config.output_bands = Some(OutputBandsConfig {
        count: Some("FROM_LAST_STEP".into()),
        data_type: Some("FROM_LAST_STEP".to_string()),
    });
    config
}

/// Open `config` over `source` with `registry` and a RAM budget.
pub fn open_with_budget(
    source: Arc<dyn RasterSource>,
    config: &ProcessedConfig,
    registry: &AlgorithmRegistry,
    ram_budget: u64,
) -> Result<ProcessedDataset, ConfigError> {
    let options = OpenOptions::new()
        .with_registry(registry)
        .with_ram_budget(ram_budget);
    ProcessedDataset::from_source(source, config, &options)
}

// =============================================================================
// Reading
// =============================================================================

/// Read `window` of every band as a pixel-interleaved buffer of the
/// dataset's data type.
pub fn read_window(dataset: &mut ProcessedDataset, window: Window) -> Vec<u8> {
    let request = ReadRequest::pixel_interleaved(
        window,
        dataset.data_type(),
        (0..dataset.band_count()).collect(),
    );
    let mut buffer = vec![0u8; request.required_len()];
    dataset.read(&request, &mut buffer, None).unwrap();
    buffer
}

/// Read the whole dataset, pixel-interleaved.
pub fn read_all(dataset: &mut ProcessedDataset) -> Vec<u8> {
    let window = Window::full(dataset.width(), dataset.height());
    read_window(dataset, window)
}

/// Decode a buffer of `data_type` samples.
pub fn samples(buffer: &[u8], data_type: DataType) -> Vec<f64> {
    buffer
        .chunks_exact(data_type.size())
        .map(|chunk| data_type.read_f64(chunk))
        .collect()
}
