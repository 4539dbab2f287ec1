//! Binding one step configuration to a registered algorithm.

use std::sync::Arc;

use tracing::{debug, warn};

use super::schema::StepConfig;
use crate::algorithm::{
    band_suffix, AlgorithmDescriptor, AlgorithmRegistry, ArgValue, Builtin, InitContext,
    ProcessContext, StepArguments, WorkingState,
};
use crate::error::{ConfigError, ProcessError};
use crate::source::RasterSource;
use crate::types::{DataType, GeoTransform, Window};

// =============================================================================
// Running State
// =============================================================================

/// Pixel shape carried from one step to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningState {
    pub data_type: DataType,
    pub band_count: usize,
    /// One entry per band
    pub nodata: Vec<Option<f64>>,
}

impl RunningState {
    /// Shape of a source raster: first band type, band count and per-band
    /// no-data.
    pub fn from_source(source: &dyn RasterSource) -> Self {
        let band_count = source.band_count();
        let data_type = source
            .band_info(0)
            .map(|info| info.data_type)
            .unwrap_or(DataType::Byte);
        let nodata = (0..band_count)
            .map(|b| source.band_info(b).and_then(|info| info.nodata))
            .collect();
        Self {
            data_type,
            band_count,
            nodata,
        }
    }

    /// The no-data value shared by every band, if all bands define the
    /// same one.
    fn shared_nodata(&self) -> Option<f64> {
        let first = (*self.nodata.first()?)?;
        let same = self.nodata.iter().all(|nd| match nd {
            Some(v) => v == &first || (v.is_nan() && first.is_nan()),
            None => false,
        });
        same.then_some(first)
    }
}

/// What the resolver needs besides the step itself.
pub struct ResolveContext<'a> {
    pub registry: &'a AlgorithmRegistry,
    pub source: &'a dyn RasterSource,
    /// No-data declared on the output bands, handed to the last step
    pub declared_output_nodata: Option<&'a [Option<f64>]>,
}

// =============================================================================
// Step
// =============================================================================

/// One resolved stage of a pipeline.
#[derive(Debug)]
pub struct Step {
    /// Configured name, or the 1-based position
    pub label: String,
    pub arguments: StepArguments,
    pub input_type: DataType,
    pub output_type: DataType,
    pub input_band_count: usize,
    pub output_band_count: usize,
    pub input_nodata: Vec<Option<f64>>,
    pub output_nodata: Vec<Option<f64>>,
    algorithm: Arc<AlgorithmDescriptor>,
    state: WorkingState,
}

impl Step {
    pub fn algorithm(&self) -> &AlgorithmDescriptor {
        &self.algorithm
    }

    pub fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    /// Whether `init` allocated working state for this step.
    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    /// Shape handed to the following step.
    pub fn output_state(&self) -> RunningState {
        RunningState {
            data_type: self.output_type,
            band_count: self.output_band_count,
            nodata: self.output_nodata.clone(),
        }
    }

    /// Bytes per pixel of the input and output buffers.
    pub fn input_pixel_size(&self) -> usize {
        self.input_type.size() * self.input_band_count
    }

    pub fn output_pixel_size(&self) -> usize {
        self.output_type.size() * self.output_band_count
    }

    /// Run the algorithm over one window.
    pub(crate) fn run(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        window: Window,
        geo_transform: Option<&GeoTransform>,
    ) -> Result<(), ProcessError> {
        let process = self
            .algorithm
            .process()
            .ok_or_else(|| ProcessError::Algorithm {
                algorithm: self.algorithm.name().to_string(),
                message: "no process callback".to_string(),
            })?;

        let mut ctx = ProcessContext {
            algorithm: self.algorithm.name(),
            user_data: self.algorithm.user_data(),
            state: self.state.get_mut(),
            input,
            input_data_type: self.input_type,
            input_band_count: self.input_band_count,
            input_nodata: &self.input_nodata,
            output,
            output_data_type: self.output_type,
            output_band_count: self.output_band_count,
            output_nodata: &self.output_nodata,
            window,
            geo_transform,
            arguments: &self.arguments,
        };

        process(&mut ctx).map_err(|e| ProcessError::Algorithm {
            algorithm: self.algorithm.name().to_string(),
            message: e.0,
        })
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Bind `config` (the step at `index`) to its algorithm, given the shape
/// left by the previous step.
pub fn resolve_step(
    config: &StepConfig,
    index: usize,
    is_last: bool,
    running: &RunningState,
    ctx: &ResolveContext<'_>,
) -> Result<Step, ConfigError> {
    let label = config.label(index);
    let name = config.algorithm.as_deref().unwrap_or_default();

    let algorithm = ctx
        .registry
        .lookup(name)
        .ok_or_else(|| ConfigError::UnknownAlgorithm {
            step: label.clone(),
            algorithm: name.to_string(),
        })?;

    let allowed_types = algorithm.supported_input_types();
    if !allowed_types.is_empty() && !allowed_types.contains(&running.data_type) {
        return Err(ConfigError::UnsupportedInputType {
            step: label,
            algorithm: name.to_string(),
            requested: running.data_type,
            allowed: allowed_types.to_vec(),
        });
    }
    let allowed_counts = algorithm.supported_input_band_counts();
    if !allowed_counts.is_empty() && !allowed_counts.contains(&running.band_count) {
        return Err(ConfigError::UnsupportedBandCount {
            step: label,
            algorithm: name.to_string(),
            requested: running.band_count,
            allowed: allowed_counts.to_vec(),
        });
    }

    let input_type = algorithm
        .requested_input_type()
        .unwrap_or(running.data_type);
    let input_band_count = running.band_count;

    let arguments = bind_arguments(config, &label, &algorithm, running, ctx.source)?;

    let (output_band_count, output_type, output_nodata, state) = match algorithm.init() {
        Some(init) => {
            let init_ctx = InitContext {
                algorithm: name,
                user_data: algorithm.user_data(),
                input_band_count,
                input_data_type: input_type,
                input_nodata: &running.nodata,
                declared_output_nodata: if is_last {
                    ctx.declared_output_nodata
                } else {
                    None
                },
                arguments: &arguments,
            };
            let out = init(&init_ctx).map_err(|e| ConfigError::AlgorithmInit {
                step: label.clone(),
                algorithm: name.to_string(),
                message: e.0,
            })?;

            let nodata = match out.nodata {
                Some(nodata) if nodata.len() == out.band_count => nodata,
                Some(nodata) => {
                    return Err(ConfigError::AlgorithmInit {
                        step: label,
                        algorithm: name.to_string(),
                        message: format!(
                            "returned {} no-data value(s) for {} output band(s)",
                            nodata.len(),
                            out.band_count
                        ),
                    })
                }
                None => vec![None; out.band_count],
            };
            let state = WorkingState::new(
                out.state,
                algorithm.free().cloned(),
                algorithm.user_data_arc(),
            );
            (out.band_count, out.data_type, nodata, state)
        }
        None => (
            input_band_count,
            input_type,
            running.nodata.clone(),
            WorkingState::default(),
        ),
    };

    if output_band_count == 0 {
        return Err(ConfigError::AlgorithmInit {
            step: label,
            algorithm: name.to_string(),
            message: "zero output bands".to_string(),
        });
    }

    debug!(
        step = %label,
        algorithm = name,
        input_type = %input_type,
        input_bands = input_band_count,
        output_type = %output_type,
        output_bands = output_band_count,
        "Resolved step"
    );

    Ok(Step {
        label,
        arguments,
        input_type,
        output_type,
        input_band_count,
        output_band_count,
        input_nodata: running.nodata.clone(),
        output_nodata,
        algorithm,
        state,
    })
}

/// Build the argument table: constants, then builtins, then the explicit
/// arguments of the configuration validated against the schema.
fn bind_arguments(
    config: &StepConfig,
    label: &str,
    algorithm: &AlgorithmDescriptor,
    running: &RunningState,
    source: &dyn RasterSource,
) -> Result<StepArguments, ConfigError> {
    let mut arguments = StepArguments::new();
    let Some(schema) = algorithm.schema() else {
        for (name, raw) in &config.arguments {
            arguments.insert(name, raw.as_str(), ArgValue::Str(raw.0.clone()));
        }
        return Ok(arguments);
    };

    for (name, raw) in &schema.constants {
        let value = schema
            .find(name)
            .and_then(|spec| spec.kind.parse(raw))
            .unwrap_or_else(|| ArgValue::Str(raw.clone()));
        arguments.insert(name, raw, value);
    }

    for builtin in &schema.builtins {
        match builtin {
            Builtin::NoData => {
                if let Some(nodata) = running.shared_nodata() {
                    arguments.insert("nodata", format_double(nodata), ArgValue::Double(nodata));
                }
            }
            Builtin::OffsetPerBand | Builtin::ScalePerBand => {
                for band in 0..running.band_count {
                    let Some(info) = source.band_info(band) else {
                        continue;
                    };
                    let (prefix, value) = if *builtin == Builtin::OffsetPerBand {
                        ("offset", info.offset)
                    } else {
                        ("scale", info.scale)
                    };
                    arguments.insert(
                        format!("{}_{}", prefix, band + 1),
                        format_double(value),
                        ArgValue::Double(value),
                    );
                }
            }
        }
    }

    for (name, raw) in &config.arguments {
        let raw = raw.as_str();
        if let Some(spec) = schema.find(name) {
            let value = spec
                .kind
                .parse(raw)
                .ok_or_else(|| ConfigError::InvalidArgument {
                    step: label.to_string(),
                    name: name.clone(),
                    value: raw.to_string(),
                    kind: spec.kind,
                })?;
            arguments.insert(name, raw, value);
        } else if schema.is_builtin(name) {
            let value = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidArgument {
                    step: label.to_string(),
                    name: name.clone(),
                    value: raw.to_string(),
                    kind: crate::algorithm::ArgKind::Double,
                })?;
            arguments.insert(name, raw, ArgValue::Double(value));
        } else {
            if !schema.is_constant(name) {
                warn!(
                    step = label,
                    algorithm = algorithm.name(),
                    argument = %name,
                    "Unknown argument"
                );
            }
            arguments.insert(name, raw, ArgValue::Str(raw.to_string()));
        }
    }

    for spec in schema.arguments.iter().filter(|s| s.required) {
        let supplied = match spec.name.strip_suffix(crate::algorithm::BAND_PLACEHOLDER) {
            Some(prefix) => arguments
                .names()
                .any(|n| n == spec.name || band_suffix(n, prefix).is_some()),
            None => arguments.contains(&spec.name),
        };
        if !supplied {
            return Err(ConfigError::MissingArgument {
                step: label.to_string(),
                name: spec.name.clone(),
            });
        }
    }

    Ok(arguments)
}

fn format_double(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        value.to_string()
    }
}
