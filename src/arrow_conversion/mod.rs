//! Arrow data format conversion utilities.
//!
//! This module handles conversion of row buffers received from the engine
//! into Apache Arrow columnar format.

mod builders;
mod converter;

pub use builders::build_array;
pub use converter::ArrowConverter;
