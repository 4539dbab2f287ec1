//! Declarative description of a processed raster.
//!
//! The configuration is JSON with PascalCase keys:
//!
//! ```json
//! {
//!   "Input": { "Filename": "dem.png", "Unscale": false },
//!   "OutputBands": { "Count": "FROM_LAST_STEP", "DataType": "Float32" },
//!   "ProcessingSteps": [
//!     { "Name": "double", "Algorithm": "scale", "Arguments": { "factor": 2 } }
//!   ]
//! }
//! ```
//!
//! Argument values may be written as strings, numbers, booleans or arrays of
//! numbers; they are normalised to the raw strings algorithms are validated
//! against.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{DataType, GeoTransform};

// =============================================================================
// Top Level
// =============================================================================

/// A processed raster description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessedConfig {
    /// Source raster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputConfig>,

    /// Output band count and data type provenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_bands: Option<OutputBandsConfig>,

    /// Pre-declared output bands
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bands: Vec<BandConfig>,

    /// Ordered processing steps
    #[serde(default)]
    pub processing_steps: Vec<StepConfig>,

    /// Working block width override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_x_size: Option<usize>,

    /// Working block height override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_y_size: Option<usize>,
}

impl ProcessedConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Parse(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Serialise back to pretty JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Check the mandatory sections are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input.is_none() {
            return Err(ConfigError::MissingSection("Input".to_string()));
        }
        if self.processing_steps.is_empty() {
            return Err(ConfigError::MissingSection("ProcessingSteps".to_string()));
        }
        for (i, step) in self.processing_steps.iter().enumerate() {
            if step.algorithm.as_deref().map_or(true, |a| a.trim().is_empty()) {
                return Err(ConfigError::MissingSection(format!(
                    "Algorithm in step '{}'",
                    step.label(i)
                )));
            }
        }
        if matches!(self.block_x_size, Some(0)) || matches!(self.block_y_size, Some(0)) {
            return Err(ConfigError::InvalidValue {
                field: "BlockXSize/BlockYSize",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Input
// =============================================================================

/// The `Input` section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InputConfig {
    /// Image file, relative to the configuration file's directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Inline raster description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<InlineRaster>,

    /// Expose unscaled Float64 values of bands carrying offset/scale
    #[serde(default)]
    pub unscale: bool,

    /// Decimation factors of overviews to build on the source
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overviews: Vec<usize>,
}

/// Inline raster description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InlineRaster {
    pub width: usize,
    pub height: usize,

    #[serde(default = "default_band_count")]
    pub band_count: usize,

    #[serde(default = "default_data_type")]
    pub data_type: DataType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_data: Option<f64>,

    /// Constant value per band
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fill: Vec<f64>,

    /// All samples, band-sequential, row-major
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub offsets: Vec<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scales: Vec<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_x_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_y_size: Option<usize>,

    /// `PIXEL` or `BAND`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interleave: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_transform: Option<GeoTransform>,
}

fn default_band_count() -> usize {
    1
}

fn default_data_type() -> DataType {
    DataType::Byte
}

// =============================================================================
// Output Bands
// =============================================================================

/// The `OutputBands` section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutputBandsConfig {
    /// Integer, `FROM_SOURCE` or `FROM_LAST_STEP`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<RawArgument>,

    /// Data type name, `FROM_SOURCE` or `FROM_LAST_STEP`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

/// A pre-declared output band.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BandConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_data: Option<f64>,
}

// =============================================================================
// Steps
// =============================================================================

/// One entry of `ProcessingSteps`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StepConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, RawArgument>,
}

impl StepConfig {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            name: None,
            algorithm: Some(algorithm.into()),
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments
            .insert(name.into(), RawArgument(value.into()));
        self
    }

    /// Name used in messages: the configured name, else the 1-based position.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| (index + 1).to_string())
    }
}

/// An argument value as written in the configuration, normalised to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "String")]
pub struct RawArgument(pub String);

impl RawArgument {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<serde_json::Value> for RawArgument {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        let text = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Number(n) => Ok(n.to_string()),
                    Value::String(s) => Ok(s),
                    other => Err(format!("unsupported list item {}", other)),
                })
                .collect::<Result<Vec<_>, _>>()?
                .join(","),
            other => return Err(format!("unsupported argument value {}", other)),
        };
        Ok(RawArgument(text))
    }
}

impl From<RawArgument> for String {
    fn from(value: RawArgument) -> Self {
        value.0
    }
}

impl From<&str> for RawArgument {
    fn from(value: &str) -> Self {
        RawArgument(value.to_string())
    }
}
