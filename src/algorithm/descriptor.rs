//! Capability descriptors for pixel algorithms.
//!
//! A descriptor tells the engine everything it needs to bind a step to an
//! algorithm: which arguments exist and how to type them, which input pixel
//! types and band counts the algorithm accepts, and the callbacks that
//! negotiate the output shape and transform pixels.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::arguments::{ArgValue, StepArguments};
use crate::error::AlgorithmError;
use crate::types::{DataType, GeoTransform, Window};

/// Opaque context shared by every step using an algorithm.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Negotiates the output shape of a step and may allocate working state.
pub type InitFn =
    Arc<dyn Fn(&InitContext<'_>) -> Result<InitOutput, AlgorithmError> + Send + Sync>;

/// Releases working state allocated by [`InitFn`].
pub type FreeFn = Arc<dyn Fn(Option<&(dyn Any + Send + Sync)>, Box<dyn Any + Send>) + Send + Sync>;

/// Transforms one window of pixels.
pub type ProcessFn =
    Arc<dyn Fn(&mut ProcessContext<'_>) -> Result<(), AlgorithmError> + Send + Sync>;

// =============================================================================
// Argument Schema
// =============================================================================

/// Suffix marking a schema entry that applies to every band.
pub const BAND_PLACEHOLDER: &str = "_{band}";

/// Declared kind of an argument value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Boolean,
    Integer,
    Double,
    DoubleList,
    String,
}

impl ArgKind {
    /// Parse a raw value according to this kind.
    ///
    /// Booleans accept `true`/`false` in any case; lists are comma-separated.
    pub fn parse(self, raw: &str) -> Option<ArgValue> {
        let text = raw.trim();
        match self {
            ArgKind::Boolean => {
                if text.eq_ignore_ascii_case("true") {
                    Some(ArgValue::Bool(true))
                } else if text.eq_ignore_ascii_case("false") {
                    Some(ArgValue::Bool(false))
                } else {
                    None
                }
            }
            ArgKind::Integer => text.parse().ok().map(ArgValue::Int),
            ArgKind::Double => text.parse().ok().map(ArgValue::Double),
            ArgKind::DoubleList => text
                .split(',')
                .map(|item| item.trim().parse::<f64>().ok())
                .collect::<Option<Vec<_>>>()
                .map(ArgValue::DoubleList),
            ArgKind::String => Some(ArgValue::Str(raw.to_string())),
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgKind::Boolean => "boolean",
            ArgKind::Integer => "integer",
            ArgKind::Double => "double",
            ArgKind::DoubleList => "double list",
            ArgKind::String => "string",
        };
        f.write_str(name)
    }
}

/// One entry of an algorithm's argument schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentSpec {
    /// Argument name, possibly ending in `_{band}`
    pub name: String,
    pub kind: ArgKind,
    pub required: bool,
}

impl ArgumentSpec {
    pub fn optional(name: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }

    pub fn required(name: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    /// Whether the entry is templated on the band index.
    pub fn is_templated(&self) -> bool {
        self.name.ends_with(BAND_PLACEHOLDER)
    }

    /// Whether `name` is covered by this entry, exactly or through the band
    /// template.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.matches_template(name)
    }

    /// Whether `name` is `<prefix>_<N>` with `N` a positive integer.
    pub fn matches_template(&self, name: &str) -> bool {
        match self.name.strip_suffix(BAND_PLACEHOLDER) {
            Some(prefix) => band_suffix(name, prefix).is_some(),
            None => false,
        }
    }
}

/// Parse the 1-based band index after `<prefix>_`.
pub(crate) fn band_suffix(name: &str, prefix: &str) -> Option<usize> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('_')?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok().filter(|&n: &usize| n >= 1)
}

/// Arguments the engine derives by itself when binding a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `nodata`: the shared no-data value of the input bands
    NoData,
    /// `offset_{band}`: per-band offset of the source raster
    OffsetPerBand,
    /// `scale_{band}`: per-band scale of the source raster
    ScalePerBand,
}

impl Builtin {
    /// Argument name as it appears in the step table.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::NoData => "nodata",
            Builtin::OffsetPerBand => "offset_{band}",
            Builtin::ScalePerBand => "scale_{band}",
        }
    }

    /// Whether `name` is an argument this builtin produces.
    pub fn matches(self, name: &str) -> bool {
        match self {
            Builtin::NoData => name == "nodata",
            Builtin::OffsetPerBand => band_suffix(name, "offset").is_some(),
            Builtin::ScalePerBand => band_suffix(name, "scale").is_some(),
        }
    }
}

/// Everything an algorithm declares about its arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentSchema {
    /// Fixed values injected into every step
    pub constants: Vec<(String, String)>,
    /// Values the engine derives
    pub builtins: Vec<Builtin>,
    /// Arguments a step configuration may supply
    pub arguments: Vec<ArgumentSpec>,
}

impl ArgumentSchema {
    /// The schema entry covering `name`, preferring an exact match.
    pub fn find(&self, name: &str) -> Option<&ArgumentSpec> {
        self.arguments
            .iter()
            .find(|spec| spec.name == name)
            .or_else(|| self.arguments.iter().find(|spec| spec.matches_template(name)))
    }

    pub fn is_constant(&self, name: &str) -> bool {
        self.constants.iter().any(|(n, _)| n == name)
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.iter().any(|b| b.matches(name))
    }
}

// =============================================================================
// Callback Contexts
// =============================================================================

/// Inputs handed to an algorithm's `init` callback.
pub struct InitContext<'a> {
    pub algorithm: &'a str,
    pub user_data: Option<&'a (dyn Any + Send + Sync)>,
    pub input_band_count: usize,
    pub input_data_type: DataType,
    pub input_nodata: &'a [Option<f64>],
    /// No-data already declared on the output bands, for the last step only
    pub declared_output_nodata: Option<&'a [Option<f64>]>,
    pub arguments: &'a StepArguments,
}

impl<'a> InitContext<'a> {
    /// Downcast the algorithm's user data.
    pub fn user_data<T: Any>(&self) -> Option<&'a T> {
        self.user_data?.downcast_ref::<T>()
    }
}

/// Output shape negotiated by `init`.
pub struct InitOutput {
    pub band_count: usize,
    pub data_type: DataType,
    /// Per-band output no-data; `None` means no value on every band
    pub nodata: Option<Vec<Option<f64>>>,
    pub state: Option<Box<dyn Any + Send>>,
}

impl InitOutput {
    pub fn new(band_count: usize, data_type: DataType) -> Self {
        Self {
            band_count,
            data_type,
            nodata: None,
            state: None,
        }
    }

    pub fn with_nodata(mut self, nodata: Vec<Option<f64>>) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_state<T: Any + Send>(mut self, state: T) -> Self {
        self.state = Some(Box::new(state));
        self
    }
}

impl fmt::Debug for InitOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitOutput")
            .field("band_count", &self.band_count)
            .field("data_type", &self.data_type)
            .field("nodata", &self.nodata)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

/// Everything a `process` callback sees for one window.
///
/// Buffers are pixel-interleaved: sample `band` of pixel `i` sits at element
/// `i * band_count + band`.
pub struct ProcessContext<'a> {
    pub algorithm: &'a str,
    pub user_data: Option<&'a (dyn Any + Send + Sync)>,
    pub state: Option<&'a mut (dyn Any + Send)>,

    pub input: &'a [u8],
    pub input_data_type: DataType,
    pub input_band_count: usize,
    pub input_nodata: &'a [Option<f64>],

    pub output: &'a mut [u8],
    pub output_data_type: DataType,
    pub output_band_count: usize,
    pub output_nodata: &'a [Option<f64>],

    /// Window of the source raster being processed
    pub window: Window,
    pub geo_transform: Option<&'a GeoTransform>,
    pub arguments: &'a StepArguments,
}

impl<'a> ProcessContext<'a> {
    /// Number of pixels in the window.
    pub fn pixel_count(&self) -> usize {
        self.window.pixel_count()
    }

    pub fn user_data<T: Any>(&self) -> Option<&'a T> {
        self.user_data?.downcast_ref::<T>()
    }

    /// Downcast the step's working state.
    pub fn state_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.state.as_deref_mut()?.downcast_mut::<T>()
    }

    /// Input sample `band` of pixel `pixel` as `f64`.
    pub fn input_value(&self, pixel: usize, band: usize) -> f64 {
        let size = self.input_data_type.size();
        let at = (pixel * self.input_band_count + band) * size;
        self.input_data_type.read_f64(&self.input[at..at + size])
    }

    /// Store output sample `band` of pixel `pixel`, converting from `f64`.
    pub fn set_output_value(&mut self, pixel: usize, band: usize, value: f64) {
        let size = self.output_data_type.size();
        let at = (pixel * self.output_band_count + band) * size;
        self.output_data_type
            .write_f64(value, &mut self.output[at..at + size]);
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// The registered contract of a named algorithm.
///
/// Descriptors are immutable once registered and shared as `Arc`.
#[derive(Clone)]
pub struct AlgorithmDescriptor {
    pub(super) name: String,
    pub(super) user_data: Option<UserData>,
    pub(super) schema: Option<ArgumentSchema>,
    pub(super) requested_input_type: Option<DataType>,
    pub(super) supported_input_types: Vec<DataType>,
    pub(super) supported_input_band_counts: Vec<usize>,
    pub(super) init: Option<InitFn>,
    pub(super) free: Option<FreeFn>,
    pub(super) process: Option<ProcessFn>,
}

impl AlgorithmDescriptor {
    pub fn builder(name: impl Into<String>) -> AlgorithmBuilder {
        AlgorithmBuilder {
            descriptor: AlgorithmDescriptor {
                name: name.into(),
                user_data: None,
                schema: None,
                requested_input_type: None,
                supported_input_types: Vec::new(),
                supported_input_band_counts: Vec::new(),
                init: None,
                free: None,
                process: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn user_data(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.user_data.as_deref()
    }

    pub(crate) fn user_data_arc(&self) -> Option<UserData> {
        self.user_data.clone()
    }

    /// The argument schema, if the algorithm declared one.
    pub fn schema(&self) -> Option<&ArgumentSchema> {
        self.schema.as_ref()
    }

    pub fn requested_input_type(&self) -> Option<DataType> {
        self.requested_input_type
    }

    /// Accepted input types; empty means any.
    pub fn supported_input_types(&self) -> &[DataType] {
        &self.supported_input_types
    }

    /// Accepted input band counts; empty means any.
    pub fn supported_input_band_counts(&self) -> &[usize] {
        &self.supported_input_band_counts
    }

    pub fn init(&self) -> Option<&InitFn> {
        self.init.as_ref()
    }

    pub fn free(&self) -> Option<&FreeFn> {
        self.free.as_ref()
    }

    pub fn process(&self) -> Option<&ProcessFn> {
        self.process.as_ref()
    }
}

impl fmt::Debug for AlgorithmDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmDescriptor")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("requested_input_type", &self.requested_input_type)
            .field("supported_input_types", &self.supported_input_types)
            .field(
                "supported_input_band_counts",
                &self.supported_input_band_counts,
            )
            .field("has_init", &self.init.is_some())
            .field("has_free", &self.free.is_some())
            .field("has_process", &self.process.is_some())
            .finish()
    }
}

/// Builder for [`AlgorithmDescriptor`].
pub struct AlgorithmBuilder {
    descriptor: AlgorithmDescriptor,
}

impl AlgorithmBuilder {
    pub fn user_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.descriptor.user_data = Some(Arc::new(data));
        self
    }

    /// Replace the whole argument schema.
    pub fn schema(mut self, schema: ArgumentSchema) -> Self {
        self.descriptor.schema = Some(schema);
        self
    }

    pub fn constant(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.schema_mut()
            .constants
            .push((name.into(), value.into()));
        self
    }

    pub fn builtin(mut self, builtin: Builtin) -> Self {
        self.schema_mut().builtins.push(builtin);
        self
    }

    pub fn argument(mut self, spec: ArgumentSpec) -> Self {
        self.schema_mut().arguments.push(spec);
        self
    }

    pub fn requested_input_type(mut self, data_type: DataType) -> Self {
        self.descriptor.requested_input_type = Some(data_type);
        self
    }

    pub fn supported_input_types(mut self, types: &[DataType]) -> Self {
        self.descriptor.supported_input_types = types.to_vec();
        self
    }

    pub fn supported_input_band_counts(mut self, counts: &[usize]) -> Self {
        self.descriptor.supported_input_band_counts = counts.to_vec();
        self
    }

    pub fn init<F>(mut self, f: F) -> Self
    where
        F: Fn(&InitContext<'_>) -> Result<InitOutput, AlgorithmError> + Send + Sync + 'static,
    {
        self.descriptor.init = Some(Arc::new(f));
        self
    }

    pub fn free<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&(dyn Any + Send + Sync)>, Box<dyn Any + Send>) + Send + Sync + 'static,
    {
        self.descriptor.free = Some(Arc::new(f));
        self
    }

    pub fn process<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ProcessContext<'_>) -> Result<(), AlgorithmError> + Send + Sync + 'static,
    {
        self.descriptor.process = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> AlgorithmDescriptor {
        self.descriptor
    }

    fn schema_mut(&mut self) -> &mut ArgumentSchema {
        self.descriptor.schema.get_or_insert_with(ArgumentSchema::default)
    }
}
