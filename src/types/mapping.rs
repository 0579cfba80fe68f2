//! Remote type codes and their mapping to Apache Arrow data types.

use crate::error::SchemaError;
use arrow::datatypes::{DataType, TimeUnit};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Remote column type.
///
/// On the wire each type has a pair of codes: the even code for NOT NULL
/// columns and the odd code (even + 1) for nullable ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TypeCode {
    ByteInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Decimal,
    Date,
    Time,
    Timestamp,
    Char,
    VarChar,
    Byte,
    VarByte,
}

impl TypeCode {
    /// Even (NOT NULL) wire code.
    pub fn base_code(&self) -> u16 {
        match self {
            TypeCode::VarChar => 448,
            TypeCode::Char => 452,
            TypeCode::Float => 480,
            TypeCode::Decimal => 484,
            TypeCode::Integer => 496,
            TypeCode::SmallInt => 500,
            TypeCode::BigInt => 600,
            TypeCode::VarByte => 688,
            TypeCode::Byte => 692,
            TypeCode::Date => 752,
            TypeCode::ByteInt => 756,
            TypeCode::Time => 760,
            TypeCode::Timestamp => 764,
        }
    }

    /// Wire code for this type with the given nullability.
    pub fn wire_code(&self, nullable: bool) -> u16 {
        self.base_code() | u16::from(nullable)
    }

    /// Decode a wire code into the type and its nullability.
    pub fn from_wire_code(code: u16) -> Option<(TypeCode, bool)> {
        let nullable = code & 1 == 1;
        let ty = match code & !1 {
            448 => TypeCode::VarChar,
            452 => TypeCode::Char,
            480 => TypeCode::Float,
            484 => TypeCode::Decimal,
            496 => TypeCode::Integer,
            500 => TypeCode::SmallInt,
            600 => TypeCode::BigInt,
            688 => TypeCode::VarByte,
            692 => TypeCode::Byte,
            752 => TypeCode::Date,
            756 => TypeCode::ByteInt,
            760 => TypeCode::Time,
            764 => TypeCode::Timestamp,
            _ => return None,
        };
        Some((ty, nullable))
    }

    /// Whether fields of this type carry a 2-byte length prefix.
    pub fn is_variable_length(&self) -> bool {
        matches!(self, TypeCode::VarChar | TypeCode::VarByte)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeCode::ByteInt | TypeCode::SmallInt | TypeCode::Integer | TypeCode::BigInt
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, TypeCode::Float | TypeCode::Decimal)
    }

    /// Character types carry text; TIME and TIMESTAMP travel as text too.
    pub fn is_character(&self) -> bool {
        matches!(self, TypeCode::Char | TypeCode::VarChar)
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, TypeCode::Byte | TypeCode::VarByte)
    }

    /// SQL name, used in error messages.
    pub fn sql_name(&self) -> &'static str {
        match self {
            TypeCode::ByteInt => "BYTEINT",
            TypeCode::SmallInt => "SMALLINT",
            TypeCode::Integer => "INTEGER",
            TypeCode::BigInt => "BIGINT",
            TypeCode::Float => "FLOAT",
            TypeCode::Decimal => "DECIMAL",
            TypeCode::Date => "DATE",
            TypeCode::Time => "TIME",
            TypeCode::Timestamp => "TIMESTAMP",
            TypeCode::Char => "CHAR",
            TypeCode::VarChar => "VARCHAR",
            TypeCode::Byte => "BYTE",
            TypeCode::VarByte => "VARBYTE",
        }
    }

    /// Fixed width in bytes for types whose width does not depend on the
    /// declared length.
    pub fn intrinsic_width(&self) -> Option<usize> {
        match self {
            TypeCode::ByteInt => Some(1),
            TypeCode::SmallInt => Some(2),
            TypeCode::Integer | TypeCode::Date => Some(4),
            TypeCode::BigInt | TypeCode::Float => Some(8),
            _ => None,
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// Bytes used by a DECIMAL of the given precision.
pub fn decimal_width(precision: u8) -> usize {
    match precision {
        0..=2 => 1,
        3..=4 => 2,
        5..=9 => 4,
        10..=18 => 8,
        _ => 16,
    }
}

/// Look up a wire code, reporting the column on failure.
pub fn resolve_wire_code(column: &str, code: u16) -> Result<(TypeCode, bool), SchemaError> {
    TypeCode::from_wire_code(code).ok_or_else(|| SchemaError::UnsupportedType {
        column: column.to_string(),
        type_code: code,
    })
}

/// Type mapper for converting remote types to Arrow types.
pub struct TypeMapper;

impl TypeMapper {
    /// Convert a remote type to an Arrow DataType.
    ///
    /// TIME columns map to `Time64(Microsecond)` and TIMESTAMP to a
    /// timezone-less microsecond timestamp.
    pub fn to_arrow(type_code: TypeCode, precision: u8, scale: u8) -> DataType {
        match type_code {
            TypeCode::ByteInt => DataType::Int8,
            TypeCode::SmallInt => DataType::Int16,
            TypeCode::Integer => DataType::Int32,
            TypeCode::BigInt => DataType::Int64,
            TypeCode::Float => DataType::Float64,
            TypeCode::Decimal => DataType::Decimal128(precision.max(1), scale as i8),
            TypeCode::Date => DataType::Date32,
            TypeCode::Time => DataType::Time64(TimeUnit::Microsecond),
            TypeCode::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            TypeCode::Char | TypeCode::VarChar => DataType::Utf8,
            TypeCode::Byte | TypeCode::VarByte => DataType::Binary,
        }
    }

    /// Arrow field metadata preserving the remote type information.
    pub fn field_metadata(type_code: TypeCode, byte_length: u32) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("td:type".to_string(), type_code.sql_name().to_string());
        metadata.insert("td:length".to_string(), byte_length.to_string());
        metadata
    }
}
