//! Pixel data types and strided sample conversion.
//!
//! Every buffer handled by the engine is a plain byte slice tagged with a
//! [`DataType`]. Conversions between types go through [`copy_words`], which
//! walks source and destination with independent byte strides so the same
//! routine serves contiguous copies, band transposition and scatter into a
//! caller's buffer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// Data Type
// =============================================================================

/// Pixel data type of a band or of a working buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    Byte,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    /// All supported data types, narrowest first.
    pub const ALL: [DataType; 10] = [
        DataType::Byte,
        DataType::Int8,
        DataType::UInt16,
        DataType::Int16,
        DataType::UInt32,
        DataType::Int32,
        DataType::UInt64,
        DataType::Int64,
        DataType::Float32,
        DataType::Float64,
    ];

    /// Size of one sample in bytes.
    pub const fn size(self) -> usize {
        match self {
            DataType::Byte | DataType::Int8 => 1,
            DataType::UInt16 | DataType::Int16 => 2,
            DataType::UInt32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::UInt64 | DataType::Int64 | DataType::Float64 => 8,
        }
    }

    /// Canonical name, as accepted in configuration files.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::Byte => "Byte",
            DataType::Int8 => "Int8",
            DataType::UInt16 => "UInt16",
            DataType::Int16 => "Int16",
            DataType::UInt32 => "UInt32",
            DataType::Int32 => "Int32",
            DataType::UInt64 => "UInt64",
            DataType::Int64 => "Int64",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
        }
    }

    /// Whether samples of this type are floating point.
    pub const fn is_float(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Look up a data type by name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|dt| dt.name().eq_ignore_ascii_case(name))
    }

    /// Inclusive integer range of an integer type.
    fn int_range(self) -> (i128, i128) {
        match self {
            DataType::Byte => (u8::MIN as i128, u8::MAX as i128),
            DataType::Int8 => (i8::MIN as i128, i8::MAX as i128),
            DataType::UInt16 => (u16::MIN as i128, u16::MAX as i128),
            DataType::Int16 => (i16::MIN as i128, i16::MAX as i128),
            DataType::UInt32 => (u32::MIN as i128, u32::MAX as i128),
            DataType::Int32 => (i32::MIN as i128, i32::MAX as i128),
            DataType::UInt64 => (u64::MIN as i128, u64::MAX as i128),
            DataType::Int64 => (i64::MIN as i128, i64::MAX as i128),
            DataType::Float32 | DataType::Float64 => (i128::MIN, i128::MAX),
        }
    }

    /// Read one sample as `f64`.
    ///
    /// `bytes` must hold at least [`DataType::size`] bytes.
    pub fn read_f64(self, bytes: &[u8]) -> f64 {
        match read_sample(self, bytes) {
            Sample::Int(v) => v as f64,
            Sample::Float(v) => v,
        }
    }

    /// Write one sample from an `f64`, rounding and saturating for integer
    /// types.
    pub fn write_f64(self, value: f64, out: &mut [u8]) {
        write_sample(self, Sample::Float(value), out);
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown data type '{}'", s))
    }
}

impl TryFrom<String> for DataType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.name().to_string()
    }
}

// =============================================================================
// Sample Conversion
// =============================================================================

/// A single decoded sample.
///
/// Integers are kept as `i128` so 64-bit integer round trips stay exact.
#[derive(Debug, Clone, Copy)]
enum Sample {
    Int(i128),
    Float(f64),
}

fn read_sample(dt: DataType, bytes: &[u8]) -> Sample {
    let bytes = &bytes[..dt.size()];
    match dt {
        DataType::Byte => Sample::Int(bytes[0] as i128),
        DataType::Int8 => Sample::Int(bytes[0] as i8 as i128),
        DataType::UInt16 => Sample::Int(bytemuck::pod_read_unaligned::<u16>(bytes) as i128),
        DataType::Int16 => Sample::Int(bytemuck::pod_read_unaligned::<i16>(bytes) as i128),
        DataType::UInt32 => Sample::Int(bytemuck::pod_read_unaligned::<u32>(bytes) as i128),
        DataType::Int32 => Sample::Int(bytemuck::pod_read_unaligned::<i32>(bytes) as i128),
        DataType::UInt64 => Sample::Int(bytemuck::pod_read_unaligned::<u64>(bytes) as i128),
        DataType::Int64 => Sample::Int(bytemuck::pod_read_unaligned::<i64>(bytes) as i128),
        DataType::Float32 => Sample::Float(bytemuck::pod_read_unaligned::<f32>(bytes) as f64),
        DataType::Float64 => Sample::Float(bytemuck::pod_read_unaligned::<f64>(bytes)),
    }
}

/// Convert a sample to an integer of type `dt`: round to nearest, saturate,
/// NaN becomes zero.
fn to_int(dt: DataType, sample: Sample) -> i128 {
    let (min, max) = dt.int_range();
    match sample {
        Sample::Int(v) => v.clamp(min, max),
        Sample::Float(v) if v.is_nan() => 0,
        Sample::Float(v) => {
            let v = v.round();
            if v <= min as f64 {
                min
            } else if v >= max as f64 {
                max
            } else {
                v as i128
            }
        }
    }
}

fn write_sample(dt: DataType, sample: Sample, out: &mut [u8]) {
    let out = &mut out[..dt.size()];
    match dt {
        DataType::Byte => out[0] = to_int(dt, sample) as u8,
        DataType::Int8 => out[0] = to_int(dt, sample) as i8 as u8,
        DataType::UInt16 => out.copy_from_slice(bytemuck::bytes_of(&(to_int(dt, sample) as u16))),
        DataType::Int16 => out.copy_from_slice(bytemuck::bytes_of(&(to_int(dt, sample) as i16))),
        DataType::UInt32 => out.copy_from_slice(bytemuck::bytes_of(&(to_int(dt, sample) as u32))),
        DataType::Int32 => out.copy_from_slice(bytemuck::bytes_of(&(to_int(dt, sample) as i32))),
        DataType::UInt64 => out.copy_from_slice(bytemuck::bytes_of(&(to_int(dt, sample) as u64))),
        DataType::Int64 => out.copy_from_slice(bytemuck::bytes_of(&(to_int(dt, sample) as i64))),
        DataType::Float32 => {
            let v = match sample {
                Sample::Int(v) => v as f32,
                Sample::Float(v) => v as f32,
            };
            out.copy_from_slice(bytemuck::bytes_of(&v));
        }
        DataType::Float64 => {
            let v = match sample {
                Sample::Int(v) => v as f64,
                Sample::Float(v) => v,
            };
            out.copy_from_slice(bytemuck::bytes_of(&v));
        }
    }
}

/// Copy `count` samples from `src` to `dst`, converting between data types.
///
/// Element `i` is read at byte offset `i * src_stride` of `src` and written
/// at `i * dst_stride` of `dst`. Both slices start at their first element.
///
/// # Panics
///
/// Panics if either slice is too short for `count` strided elements.
pub fn copy_words(
    src: &[u8],
    src_type: DataType,
    src_stride: usize,
    dst: &mut [u8],
    dst_type: DataType,
    dst_stride: usize,
    count: usize,
) {
    if count == 0 {
        return;
    }

    let src_size = src_type.size();
    let dst_size = dst_type.size();

    if src_type == dst_type {
        if src_stride == src_size && dst_stride == dst_size {
            let len = count * src_size;
            dst[..len].copy_from_slice(&src[..len]);
            return;
        }
        for i in 0..count {
            let s = i * src_stride;
            let d = i * dst_stride;
            dst[d..d + dst_size].copy_from_slice(&src[s..s + src_size]);
        }
        return;
    }

    for i in 0..count {
        let s = i * src_stride;
        let d = i * dst_stride;
        let sample = read_sample(src_type, &src[s..s + src_size]);
        write_sample(dst_type, sample, &mut dst[d..d + dst_size]);
    }
}

/// Convert a contiguous buffer of samples into a new buffer of `dst_type`.
pub fn convert_buffer(src: &[u8], src_type: DataType, dst: &mut [u8], dst_type: DataType) {
    let count = src.len() / src_type.size();
    copy_words(
        src,
        src_type,
        src_type.size(),
        dst,
        dst_type,
        dst_type.size(),
        count,
    );
}

// =============================================================================
// Tests
// =============================================================================
