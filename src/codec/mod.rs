//! Row encoding and decoding.
//!
//! [`RowEncoder`] turns framed row bytes into [`Record`]s according to the
//! active [`EncodingSettings`], and turns host values back into row bytes for
//! loading. [`ArchiveWriter`] and [`ArchiveReader`] store exported rows with
//! their schema.

pub mod archive;
mod encoder;
pub mod settings;
mod text;
mod value;

pub(crate) use encoder::decode_fields;
pub use archive::{ArchiveReader, ArchiveWriter};
pub use encoder::{RowEncoder, Rows};
pub use settings::{DatetimeMode, DecimalMode, EncodingSettings, RowMode};
pub use text::{DEFAULT_DELIMITER, DEFAULT_NULL_TEXT};
pub use value::{Decimal, ParseDecimalError, Record, Value};
