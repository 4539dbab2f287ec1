use thiserror::Error;

use crate::algorithm::ArgKind;
use crate::types::DataType;

/// Errors raised when registering an algorithm
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The algorithm name is empty
    #[error("Algorithm name must not be empty")]
    EmptyName,

    /// Another algorithm already uses this name
    #[error("Algorithm '{0}' is already registered")]
    Duplicate(String),

    /// The descriptor lacks the mandatory process callback
    #[error("Algorithm '{0}' has no process callback")]
    MissingProcess(String),
}

/// Errors from the source-raster contract
#[derive(Debug, Clone, Error)]
pub enum RasterError {
    /// Requested window lies outside the raster
    #[error("Window {x_off},{y_off} {width}x{height} is outside raster of {raster_width}x{raster_height}")]
    WindowOutOfBounds {
        x_off: usize,
        y_off: usize,
        width: usize,
        height: usize,
        raster_width: usize,
        raster_height: usize,
    },

    /// Band index does not exist
    #[error("Invalid band index {band} (raster has {band_count} bands)")]
    InvalidBand { band: usize, band_count: usize },

    /// Caller buffer cannot hold the request
    #[error("Buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall { required: usize, actual: usize },

    /// Source could not be opened or decoded
    #[error("Cannot open '{path}': {message}")]
    Open { path: String, message: String },

    /// Source content is not supported
    #[error("Unsupported raster: {0}")]
    Unsupported(String),

    /// Staging memory could not be allocated
    #[error("Out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },
}

/// Configuration errors detected while opening a dataset.
///
/// Any of these makes the whole open fail; no partial dataset is exposed.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A mandatory section or element is absent
    #[error("Missing {0}")]
    MissingSection(String),

    /// Configuration text is not valid
    #[error("Invalid configuration: {0}")]
    Parse(String),

    /// Configuration cannot be written back as JSON
    #[error("Cannot serialise configuration: {0}")]
    Serialize(String),

    /// A value in the configuration cannot be interpreted
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    /// Step references an algorithm that is not registered
    #[error("Step '{step}' refers to unregistered algorithm '{algorithm}'")]
    UnknownAlgorithm { step: String, algorithm: String },

    /// Running data type is not accepted by the algorithm
    #[error("Step '{step}' ({algorithm}) does not support input data type {requested}; supported: {}", join_types(.allowed))]
    UnsupportedInputType {
        step: String,
        algorithm: String,
        requested: DataType,
        allowed: Vec<DataType>,
    },

    /// Running band count is not accepted by the algorithm
    #[error("Step '{step}' ({algorithm}) does not support {requested} input band(s); supported: {allowed:?}")]
    UnsupportedBandCount {
        step: String,
        algorithm: String,
        requested: usize,
        allowed: Vec<usize>,
    },

    /// Argument value does not match its declared kind
    #[error("Step '{step}': argument '{name}' = '{value}' is not a valid {kind}")]
    InvalidArgument {
        step: String,
        name: String,
        value: String,
        kind: ArgKind,
    },

    /// Required argument was not supplied
    #[error("Step '{step}': required argument '{name}' is missing")]
    MissingArgument { step: String, name: String },

    /// Algorithm init callback refused the step
    #[error("Step '{step}': initialization of '{algorithm}' failed: {message}")]
    AlgorithmInit {
        step: String,
        algorithm: String,
        message: String,
    },

    /// Final band count disagrees with the expected output
    #[error("Final step outputs {actual} band(s) whereas {expected} are expected")]
    BandCountMismatch { expected: usize, actual: usize },

    /// Final data type disagrees with the expected output
    #[error("Final step outputs {actual} whereas {expected} is expected")]
    DataTypeMismatch { expected: DataType, actual: DataType },

    /// Source raster error while opening
    #[error("Source error: {0}")]
    Source(#[from] RasterError),
}

/// Runtime errors of a read.
///
/// These abort only the in-flight request; the dataset stays usable.
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    /// A working buffer could not be allocated
    #[error("Out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    /// An algorithm's process callback failed
    #[error("Algorithm '{algorithm}' failed: {message}")]
    Algorithm { algorithm: String, message: String },

    /// The progress callback asked to stop
    #[error("Interrupted by progress callback")]
    Interrupted,

    /// The request itself is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Reading the source failed
    #[error("Source error: {0}")]
    Source(#[from] RasterError),
}

/// Error message returned by algorithm callbacks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct AlgorithmError(pub String);

impl AlgorithmError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for AlgorithmError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for AlgorithmError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

fn join_types(types: &[DataType]) -> String {
    types
        .iter()
        .map(|dt| dt.name())
        .collect::<Vec<_>>()
        .join(", ")
}
