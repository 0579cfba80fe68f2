//! Array builders for converting decoded field values to Arrow arrays.
//!
//! Values are expected in their parsed form: integers as `Int`, decimals as
//! exact `Decimal`, dates and times as chrono values.

use crate::codec::Value;
use crate::error::ConversionError;
use crate::types::{Column, TypeCode};
use arrow::array::{
    ArrayRef, BinaryBuilder, Date32Builder, Decimal128Builder, Float64Builder, Int16Builder,
    Int32Builder, Int64Builder, Int8Builder, PrimitiveBuilder, StringBuilder,
    Time64MicrosecondBuilder, TimestampMicrosecondBuilder,
};
use arrow::datatypes::ArrowPrimitiveType;
use chrono::{Datelike, Timelike};
use std::sync::Arc;

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Build an Arrow array from one column of decoded values.
///
/// # Arguments
/// * `column` - The remote column description
/// * `values` - Column of values (one per row)
/// * `index` - Column index for error reporting
pub fn build_array(
    column: &Column,
    values: &[Value],
    index: usize,
) -> Result<ArrayRef, ConversionError> {
    let mut convert = Converter { column, index };
    match column.type_code {
        TypeCode::ByteInt => convert.primitive(Int8Builder::new(), values, |v| {
            v.as_i64().and_then(|i| i8::try_from(i).ok())
        }),
        TypeCode::SmallInt => convert.primitive(Int16Builder::new(), values, |v| {
            v.as_i64().and_then(|i| i16::try_from(i).ok())
        }),
        TypeCode::Integer => convert.primitive(Int32Builder::new(), values, |v| {
            v.as_i64().and_then(|i| i32::try_from(i).ok())
        }),
        TypeCode::BigInt => convert.primitive(Int64Builder::new(), values, Value::as_i64),
        TypeCode::Float => convert.primitive(Float64Builder::new(), values, |v| match v {
            Value::Float(f) => Some(*f),
            _ => None,
        }),
        TypeCode::Decimal => {
            let scale = column.scale;
            let builder = Decimal128Builder::new()
                .with_precision_and_scale(column.precision.max(1), scale as i8)
                .map_err(|e| ConversionError::ArrowError(e.to_string()))?;
            convert.primitive(builder, values, |v| match v {
                Value::Decimal(d) => d.rescale(scale).map(|d| d.unscaled),
                _ => None,
            })
        }
        TypeCode::Date => convert.primitive(Date32Builder::new(), values, |v| match v {
            Value::Date(d) => Some(d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
            _ => None,
        }),
        TypeCode::Time => {
            convert.primitive(Time64MicrosecondBuilder::new(), values, |v| match v {
                Value::Time(t) => Some(
                    i64::from(t.num_seconds_from_midnight()) * 1_000_000
                        + i64::from(t.nanosecond() / 1_000),
                ),
                _ => None,
            })
        }
        TypeCode::Timestamp => {
            convert.primitive(TimestampMicrosecondBuilder::new(), values, |v| match v {
                Value::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
                _ => None,
            })
        }
        TypeCode::Char | TypeCode::VarChar => convert.strings(values),
        TypeCode::Byte | TypeCode::VarByte => convert.binary(values),
    }
}

struct Converter<'a> {
    column: &'a Column,
    index: usize,
}

impl Converter<'_> {
    fn mismatch(&self, row: usize, value: &Value) -> ConversionError {
        ConversionError::ValueConversionFailed {
            row,
            column: self.index,
            message: format!(
                "Expected {} for '{}', got {}",
                self.column.type_description(),
                self.column.name,
                value.type_name()
            ),
        }
    }

    fn primitive<T, F>(
        &mut self,
        mut builder: PrimitiveBuilder<T>,
        values: &[Value],
        convert: F,
    ) -> Result<ArrayRef, ConversionError>
    where
        T: ArrowPrimitiveType,
        F: Fn(&Value) -> Option<T::Native>,
    {
        for (row, value) in values.iter().enumerate() {
            if value.is_null() {
                builder.append_null();
                continue;
            }
            match convert(value) {
                Some(native) => builder.append_value(native),
                None => return Err(self.mismatch(row, value)),
            }
        }
        Ok(Arc::new(builder.finish()))
    }

    fn strings(&mut self, values: &[Value]) -> Result<ArrayRef, ConversionError> {
        let bytes: usize = values.iter().filter_map(Value::as_str).map(str::len).sum();
        let mut builder = StringBuilder::with_capacity(values.len(), bytes);

        for (row, value) in values.iter().enumerate() {
            match value {
                Value::Null => builder.append_null(),
                Value::String(s) => builder.append_value(s),
                other => return Err(self.mismatch(row, other)),
            }
        }
        Ok(Arc::new(builder.finish()))
    }

    fn binary(&mut self, values: &[Value]) -> Result<ArrayRef, ConversionError> {
        let mut builder = BinaryBuilder::new();

        for (row, value) in values.iter().enumerate() {
            match value {
                Value::Null => builder.append_null(),
                Value::Bytes(b) => builder.append_value(b),
                other => return Err(self.mismatch(row, other)),
            }
        }
        Ok(Arc::new(builder.finish()))
    }
}
