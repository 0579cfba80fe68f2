//! Column metadata for the current statement or target table.

use crate::error::SchemaError;
use crate::types::mapping::{decimal_width, resolve_wire_code, TypeCode, TypeMapper};
use arrow::datatypes::{Field, Schema};
use serde::{Deserialize, Serialize};
use std::ops::Index;
use std::sync::Arc;

/// One column as described by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub type_code: TypeCode,
    /// Declared length in bytes (maximum length for VARCHAR/VARBYTE)
    pub byte_length: u32,
    pub nullable: bool,
    /// Display format, e.g. `YYYY-MM-DD`
    pub format: String,
    pub precision: u8,
    pub scale: u8,
}

impl Column {
    /// Create a nullable column of the given type and byte length.
    pub fn new(name: impl Into<String>, type_code: TypeCode, byte_length: u32) -> Self {
        Self {
            name: name.into(),
            type_code,
            byte_length,
            nullable: true,
            format: String::new(),
            precision: 0,
            scale: 0,
        }
    }

    pub fn byteint(name: impl Into<String>) -> Self {
        Self::new(name, TypeCode::ByteInt, 1)
    }

    pub fn smallint(name: impl Into<String>) -> Self {
        Self::new(name, TypeCode::SmallInt, 2)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, TypeCode::Integer, 4)
    }

    pub fn bigint(name: impl Into<String>) -> Self {
        Self::new(name, TypeCode::BigInt, 8)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, TypeCode::Float, 8)
    }

    pub fn decimal(name: impl Into<String>, precision: u8, scale: u8) -> Self {
        let mut column = Self::new(name, TypeCode::Decimal, decimal_width(precision) as u32);
        column.precision = precision;
        column.scale = scale;
        column
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, TypeCode::Date, 4).with_format("YYYY-MM-DD")
    }

    /// TIME(n), transmitted as `HH:MM:SS[.f{n}]` text.
    pub fn time(name: impl Into<String>, fraction_digits: u8) -> Self {
        let width = 8 + fraction_width(fraction_digits);
        let mut column = Self::new(name, TypeCode::Time, width);
        column.precision = fraction_digits;
        column
    }

    /// TIMESTAMP(n), transmitted as `YYYY-MM-DD HH:MM:SS[.f{n}]` text.
    pub fn timestamp(name: impl Into<String>, fraction_digits: u8) -> Self {
        let width = 19 + fraction_width(fraction_digits);
        let mut column = Self::new(name, TypeCode::Timestamp, width);
        column.precision = fraction_digits;
        column
    }

    pub fn char(name: impl Into<String>, length: u32) -> Self {
        Self::new(name, TypeCode::Char, length)
    }

    pub fn varchar(name: impl Into<String>, max_length: u32) -> Self {
        Self::new(name, TypeCode::VarChar, max_length)
    }

    pub fn byte(name: impl Into<String>, length: u32) -> Self {
        Self::new(name, TypeCode::Byte, length)
    }

    pub fn varbyte(name: impl Into<String>, max_length: u32) -> Self {
        Self::new(name, TypeCode::VarByte, max_length)
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Bytes the field occupies in a row, excluding the length prefix of
    /// variable-length types.
    pub fn field_width(&self) -> usize {
        match self.type_code {
            TypeCode::Decimal => decimal_width(self.precision),
            ty => ty
                .intrinsic_width()
                .unwrap_or(self.byte_length as usize),
        }
    }

    /// SQL-style type description, e.g. `DECIMAL(18,2)` or `VARCHAR(20)`.
    pub fn type_description(&self) -> String {
        match self.type_code {
            TypeCode::Decimal => format!("DECIMAL({},{})", self.precision, self.scale),
            TypeCode::Char | TypeCode::VarChar | TypeCode::Byte | TypeCode::VarByte => {
                format!("{}({})", self.type_code, self.byte_length)
            }
            TypeCode::Time | TypeCode::Timestamp => {
                format!("{}({})", self.type_code, self.precision)
            }
            ty => ty.to_string(),
        }
    }
}

fn fraction_width(digits: u8) -> u32 {
    if digits == 0 {
        0
    } else {
        1 + u32::from(digits.min(6))
    }
}

/// Column description as sent by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    pub type_code: u16,
    pub length: u32,
    #[serde(default)]
    pub precision: u8,
    #[serde(default)]
    pub scale: u8,
    #[serde(default)]
    pub format: String,
}

impl TryFrom<ColumnDescriptor> for Column {
    type Error = SchemaError;

    fn try_from(desc: ColumnDescriptor) -> Result<Self, Self::Error> {
        let (type_code, nullable) = resolve_wire_code(&desc.name, desc.type_code)?;
        Ok(Column {
            name: desc.name,
            type_code,
            byte_length: desc.length,
            nullable,
            format: desc.format,
            precision: desc.precision,
            scale: desc.scale,
        })
    }
}

impl From<&Column> for ColumnDescriptor {
    fn from(column: &Column) -> Self {
        ColumnDescriptor {
            name: column.name.clone(),
            type_code: column.type_code.wire_code(column.nullable),
            length: column.byte_length,
            precision: column.precision,
            scale: column.scale,
            format: column.format.clone(),
        }
    }
}

/// Ordered, immutable column metadata for one statement or target.
///
/// Cloning is cheap; clones share the same column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Arc<[Column]>,
}

impl ColumnSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns: columns.into(),
        }
    }

    /// Build a schema from engine column descriptions.
    pub fn from_descriptors(descriptors: Vec<ColumnDescriptor>) -> Result<Self, SchemaError> {
        let columns = descriptors
            .into_iter()
            .map(Column::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(columns))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Index of the column with the given name (case-insensitive).
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Column names joined by the delimiter.
    pub fn header(&self, delimiter: &str) -> String {
        self.names().join(delimiter)
    }

    /// Bytes of null-indicator bits at the start of every row.
    pub fn null_indicator_len(&self) -> usize {
        self.columns.len().div_ceil(8)
    }

    pub fn descriptors(&self) -> Vec<ColumnDescriptor> {
        self.columns.iter().map(ColumnDescriptor::from).collect()
    }

    /// Equivalent Arrow schema, with remote type information kept in the
    /// field metadata.
    pub fn to_arrow(&self) -> Schema {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|col| {
                let data_type = TypeMapper::to_arrow(col.type_code, col.precision, col.scale);
                Field::new(&col.name, data_type, col.nullable)
                    .with_metadata(TypeMapper::field_metadata(col.type_code, col.byte_length))
            })
            .collect();
        Schema::new(fields)
    }
}

impl Index<usize> for ColumnSchema {
    type Output = Column;

    fn index(&self, index: usize) -> &Self::Output {
        &self.columns[index]
    }
}

impl<'a> IntoIterator for &'a ColumnSchema {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
