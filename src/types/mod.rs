//! Remote column types and schemas.

mod mapping;
mod schema;

pub use mapping::{decimal_width, TypeCode, TypeMapper};
pub use schema::{Column, ColumnDescriptor, ColumnSchema};
