//! Resolving a whole processing chain and its output shape.

use std::fmt;

use tracing::debug;

use super::schema::{OutputBandsConfig, ProcessedConfig};
use super::step::{resolve_step, ResolveContext, RunningState, Step};
use crate::algorithm::AlgorithmRegistry;
use crate::error::ConfigError;
use crate::source::RasterSource;
use crate::types::DataType;

const FROM_SOURCE: &str = "FROM_SOURCE";
const FROM_LAST_STEP: &str = "FROM_LAST_STEP";

/// Where the final band count or data type comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance<T> {
    /// Dictated by the pre-declared output bands
    DeclaredBands,
    /// Same as the source raster
    Source,
    /// Whatever the last step produces
    LastStep,
    /// Given explicitly in the configuration
    Explicit(T),
}

impl<T: fmt::Display> fmt::Display for Provenance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::DeclaredBands => f.write_str("FROM_BANDS"),
            Provenance::Source => f.write_str(FROM_SOURCE),
            Provenance::LastStep => f.write_str(FROM_LAST_STEP),
            Provenance::Explicit(v) => write!(f, "{}", v),
        }
    }
}

/// Resolved shape of one output band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandShape {
    pub data_type: DataType,
    pub nodata: Option<f64>,
}

/// An ordered, non-empty chain of resolved steps and its output shape.
#[derive(Debug)]
pub struct Pipeline {
    steps: Vec<Step>,
    band_count_provenance: Provenance<usize>,
    data_type_provenance: Provenance<DataType>,
    bands: Vec<BandShape>,
}

impl Pipeline {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn band_count_provenance(&self) -> Provenance<usize> {
        self.band_count_provenance
    }

    pub fn data_type_provenance(&self) -> Provenance<DataType> {
        self.data_type_provenance
    }

    /// Output bands, in order.
    pub fn bands(&self) -> &[BandShape] {
        &self.bands
    }

    pub fn into_parts(self) -> (Vec<Step>, Vec<BandShape>) {
        (self.steps, self.bands)
    }
}

/// Check that every step consumes what the previous one produces.
///
/// Band counts must match. Data types may differ only when the next step
/// requests its input type, in which case the region processor converts
/// the samples before running it.
pub fn is_chain_consistent(steps: &[Step]) -> bool {
    steps.windows(2).all(|pair| {
        let (prev, next) = (&pair[0], &pair[1]);
        let type_ok = prev.output_type == next.input_type
            || next.algorithm().requested_input_type() == Some(next.input_type);
        type_ok && prev.output_band_count == next.input_band_count
    })
}

/// Resolve every processing step of `config` against `source`.
pub fn resolve_pipeline(
    config: &ProcessedConfig,
    source: &dyn RasterSource,
    registry: &AlgorithmRegistry,
) -> Result<Pipeline, ConfigError> {
    if config.processing_steps.is_empty() {
        return Err(ConfigError::MissingSection("ProcessingSteps".to_string()));
    }

    let (band_count_provenance, data_type_provenance) = parse_provenance(config)?;

    let declared_nodata: Vec<Option<f64>> = config.bands.iter().map(|b| b.no_data).collect();
    let ctx = ResolveContext {
        registry,
        source,
        declared_output_nodata: (!declared_nodata.is_empty()).then_some(&declared_nodata[..]),
    };

    let mut running = RunningState::from_source(source);
    let last = config.processing_steps.len() - 1;
    let mut steps = Vec::with_capacity(config.processing_steps.len());
    for (index, step_config) in config.processing_steps.iter().enumerate() {
        let step = resolve_step(step_config, index, index == last, &running, &ctx)?;
        running = step.output_state();
        steps.push(step);
    }

    let source_type = source
        .band_info(0)
        .map(|info| info.data_type)
        .unwrap_or(DataType::Byte);

    let expected_count = match band_count_provenance {
        Provenance::DeclaredBands => config.bands.len(),
        Provenance::Source => source.band_count(),
        Provenance::LastStep => running.band_count,
        Provenance::Explicit(n) => n,
    };
    if expected_count != running.band_count {
        return Err(ConfigError::BandCountMismatch {
            expected: expected_count,
            actual: running.band_count,
        });
    }

    let expected_type = match data_type_provenance {
        Provenance::DeclaredBands => config
            .bands
            .iter()
            .find_map(|b| b.data_type)
            .unwrap_or(source_type),
        Provenance::Source => source_type,
        Provenance::LastStep => running.data_type,
        Provenance::Explicit(dt) => dt,
    };
    if expected_type != running.data_type {
        return Err(ConfigError::DataTypeMismatch {
            expected: expected_type,
            actual: running.data_type,
        });
    }

    // Declared bands must agree with the result unless they get rebuilt
    if !config.bands.is_empty() {
        if band_count_provenance != Provenance::LastStep && config.bands.len() != running.band_count
        {
            return Err(ConfigError::BandCountMismatch {
                expected: config.bands.len(),
                actual: running.band_count,
            });
        }
        if data_type_provenance != Provenance::LastStep {
            if let Some(dt) = config
                .bands
                .iter()
                .filter_map(|b| b.data_type)
                .find(|dt| *dt != running.data_type)
            {
                return Err(ConfigError::DataTypeMismatch {
                    expected: dt,
                    actual: running.data_type,
                });
            }
        }
    }

    let bands = (0..running.band_count)
        .map(|b| BandShape {
            data_type: running.data_type,
            nodata: config
                .bands
                .get(b)
                .and_then(|declared| declared.no_data)
                .or_else(|| running.nodata.get(b).copied().flatten()),
        })
        .collect();

    debug!(
        steps = steps.len(),
        bands = running.band_count,
        data_type = %running.data_type,
        count_provenance = %band_count_provenance,
        type_provenance = %data_type_provenance,
        "Resolved pipeline"
    );

    Ok(Pipeline {
        steps,
        band_count_provenance,
        data_type_provenance,
        bands,
    })
}

fn parse_provenance(
    config: &ProcessedConfig,
) -> Result<(Provenance<usize>, Provenance<DataType>), ConfigError> {
    let Some(OutputBandsConfig { count, data_type }) = &config.output_bands else {
        return Ok(if config.bands.is_empty() {
            (Provenance::Source, Provenance::Source)
        } else {
            (Provenance::DeclaredBands, Provenance::DeclaredBands)
        });
    };

    let count = match count.as_ref().map(|c| c.as_str().trim()) {
        None => Provenance::Source,
        Some(s) if s.eq_ignore_ascii_case(FROM_SOURCE) => Provenance::Source,
        Some(s) if s.eq_ignore_ascii_case(FROM_LAST_STEP) => Provenance::LastStep,
        Some(s) => match s.parse::<usize>() {
            Ok(n) if n > 0 => Provenance::Explicit(n),
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "OutputBands.Count",
                    value: s.to_string(),
                })
            }
        },
    };

    let data_type = match data_type.as_deref().map(str::trim) {
        None => Provenance::Source,
        Some(s) if s.eq_ignore_ascii_case(FROM_SOURCE) => Provenance::Source,
        Some(s) if s.eq_ignore_ascii_case(FROM_LAST_STEP) => Provenance::LastStep,
        Some(s) => match DataType::from_name(s) {
            Some(dt) => Provenance::Explicit(dt),
            None => {
                return Err(ConfigError::InvalidValue {
                    field: "OutputBands.DataType",
                    value: s.to_string(),
                })
            }
        },
    };

    Ok((count, data_type))
}
