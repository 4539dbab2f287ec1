//! Core value types shared by every layer: pixel data types, windows and
//! georeferencing.

mod data_type;
mod geometry;

pub use data_type::{convert_buffer, copy_words, DataType};
pub use geometry::{GeoTransform, Window};
