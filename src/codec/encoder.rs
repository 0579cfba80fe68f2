//! Row encoder: converts between framed row bytes and host values.
//!
//! A row body is a run of null-indicator bytes (one bit per column, most
//! significant bit first, set means NULL) followed by every field in column
//! order. NULL fields still occupy their slot: fixed-width types keep their
//! full width and variable-length types carry a zero length.

use crate::channel::{Frame, Frames, RowBuffer, FRAME_SIZE};
use crate::codec::settings::{DatetimeMode, DecimalMode, EncodingSettings, RowMode};
use crate::codec::text::{
    format_time, format_timestamp, join_fields, parse_date, parse_time, parse_timestamp,
    split_fields, DEFAULT_DELIMITER, DEFAULT_NULL_TEXT,
};
use crate::codec::value::{decode_hex, Decimal, Record, Value};
use crate::error::{ConfigurationError, DataError, ProtocolError};
use crate::types::{Column, ColumnSchema, TypeCode};
use chrono::{Datelike, NaiveDate};

/// Encodes and decodes rows for one session.
///
/// Holds the active [`EncodingSettings`], the null sentinel and the text
/// delimiter. The schema last bound with [`RowEncoder::bind_schema`] is only
/// used to validate new null sentinels; every encode and decode call takes
/// its schema explicitly.
#[derive(Debug, Clone)]
pub struct RowEncoder {
    settings: EncodingSettings,
    null: Value,
    delimiter: String,
    schema: Option<ColumnSchema>,
}

impl Default for RowEncoder {
    fn default() -> Self {
        Self {
            settings: EncodingSettings::default(),
            null: Value::Null,
            delimiter: DEFAULT_DELIMITER.to_string(),
            schema: None,
        }
    }
}

impl RowEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&self) -> EncodingSettings {
        self.settings
    }

    /// Merge an encoding mask into the current settings.
    ///
    /// Only the partitions the mask touches change. On error nothing changes.
    pub fn set_encoding(&mut self, mask: u32) -> Result<(), ConfigurationError> {
        self.settings = self.settings.merge(mask)?;
        Ok(())
    }

    pub fn set_settings(&mut self, settings: EncodingSettings) {
        self.settings = settings;
    }

    pub fn null(&self) -> &Value {
        &self.null
    }

    /// Text written for NULL fields in delimited rows.
    pub fn null_text(&self) -> String {
        match &self.null {
            Value::Null => DEFAULT_NULL_TEXT.to_string(),
            other => other.to_string(),
        }
    }

    /// Set the value NULL fields decode to, and that encodes as NULL.
    ///
    /// Accepts NULL, a string or a number. A numeric sentinel is rejected if
    /// the bound schema has non-numeric columns.
    pub fn set_null(&mut self, value: impl Into<Value>) -> Result<(), ConfigurationError> {
        let value = value.into();
        match &value {
            Value::Null => {}
            Value::String(s) => {
                if !s.is_empty() && s.contains(self.delimiter.as_str()) {
                    return Err(ConfigurationError::EncodingConfig(format!(
                        "null text '{}' contains the delimiter '{}'",
                        s, self.delimiter
                    )));
                }
            }
            v if v.is_numeric() => {
                let conflict = self
                    .schema
                    .as_ref()
                    .and_then(|schema| schema.iter().find(|c| !c.type_code.is_numeric()));
                if let Some(column) = conflict {
                    return Err(ConfigurationError::EncodingConfig(format!(
                        "numeric null sentinel {} is incompatible with {} column '{}'",
                        v, column.type_code, column.name
                    )));
                }
            }
            other => {
                return Err(ConfigurationError::EncodingConfig(format!(
                    "{} values cannot be used as the null sentinel",
                    other.type_name()
                )))
            }
        }
        self.null = value;
        Ok(())
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Set the field delimiter for text rows.
    ///
    /// Must be a non-empty string (or char) without line breaks.
    pub fn set_delimiter(&mut self, value: impl Into<Value>) -> Result<(), ConfigurationError> {
        match value.into() {
            Value::String(s) if !s.is_empty() && !s.contains(['\n', '\r']) => {
                self.delimiter = s;
                Ok(())
            }
            Value::String(s) => Err(ConfigurationError::EncodingConfig(format!(
                "delimiter {:?} must be non-empty and cannot contain a line break",
                s
            ))),
            other => Err(ConfigurationError::EncodingConfig(format!(
                "delimiter must be a string, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn bind_schema(&mut self, schema: ColumnSchema) {
        self.schema = Some(schema);
    }

    pub fn unbind_schema(&mut self) {
        self.schema = None;
    }

    pub fn schema(&self) -> Option<&ColumnSchema> {
        self.schema.as_ref()
    }

    /// Lazily decode every row of a buffer.
    ///
    /// Rows are yielded in order. At the first framing or field error the
    /// iterator yields that error and stops; earlier rows stay valid.
    /// Decoding the same buffer again restarts from the first row.
    pub fn decode<'a>(&'a self, buffer: &'a RowBuffer, schema: &'a ColumnSchema) -> Rows<'a> {
        Rows {
            encoder: self,
            schema,
            frames: buffer.frames(),
            failed: false,
        }
    }

    /// Decode one framed row into a record shaped by the row mode.
    pub fn decode_row(
        &self,
        frame: &Frame<'_>,
        schema: &ColumnSchema,
    ) -> Result<Record, ProtocolError> {
        if self.settings.row == RowMode::Raw {
            return Ok(Record::Raw(frame.framed.to_vec()));
        }

        let values = decode_fields(
            frame.body,
            frame.offset,
            schema,
            self.settings.datetime,
            self.settings.decimal,
        )?;

        Ok(match self.settings.row {
            RowMode::List => Record::Values(self.substitute_null(values)),
            RowMode::Dict => Record::Dict(
                schema
                    .iter()
                    .map(|c| c.name.clone())
                    .zip(self.substitute_null(values))
                    .collect(),
            ),
            RowMode::Text => Record::Text(self.render_text(&values)),
            RowMode::Raw => Record::Raw(frame.framed.to_vec()),
        })
    }

    fn substitute_null(&self, values: Vec<Value>) -> Vec<Value> {
        if self.null.is_null() {
            return values;
        }
        values
            .into_iter()
            .map(|v| if v.is_null() { self.null.clone() } else { v })
            .collect()
    }

    /// Render values as one delimited line, writing NULL as the null text.
    pub fn render_text(&self, values: &[Value]) -> String {
        let null_text = self.null_text();
        join_fields(
            values.iter().map(|v| match v {
                Value::Null => null_text.clone(),
                v => v.to_string(),
            }),
            &self.delimiter,
        )
    }

    /// Encode one row of values into a row body (without length prefix).
    ///
    /// # Errors
    /// Returns `DataError::TypeMismatch` if the field count differs from the
    /// schema, a field cannot be coerced to its column type, or NULL is given
    /// for a NOT NULL column. Returns `DataError::ValueTooLarge` if a character
    /// or byte field exceeds the column length.
    pub fn encode(&self, row: &[Value], schema: &ColumnSchema) -> Result<Vec<u8>, DataError> {
        if row.len() != schema.len() {
            return Err(DataError::TypeMismatch {
                column: "<row>".to_string(),
                expected: format!("{} fields", schema.len()),
                got: format!("{} fields", row.len()),
            });
        }

        let indicator_len = schema.null_indicator_len();
        let mut out = vec![0u8; indicator_len];
        for (i, (column, value)) in schema.iter().zip(row).enumerate() {
            let is_null = value.is_null() || (!self.null.is_null() && *value == self.null);
            if is_null {
                if !column.nullable {
                    return Err(DataError::TypeMismatch {
                        column: column.name.clone(),
                        expected: format!("non-null {}", column.type_description()),
                        got: "null".to_string(),
                    });
                }
                out[i / 8] |= 0x80 >> (i % 8);
                write_null(column, &mut out);
            } else {
                encode_field(column, value, &mut out)?;
            }
        }
        Ok(out)
    }

    /// Encode one delimited text line. Fields equal to the null text are NULL;
    /// everything else is parsed according to the column type.
    pub fn encode_text(&self, line: &str, schema: &ColumnSchema) -> Result<Vec<u8>, DataError> {
        let null_text = self.null_text();
        let values: Vec<Value> = split_fields(line, &self.delimiter)
            .into_iter()
            .map(|field| {
                if field == null_text {
                    Value::Null
                } else {
                    Value::String(field.to_string())
                }
            })
            .collect();
        self.encode(&values, schema)
    }

    /// Encode any record shape.
    ///
    /// `Dict` fields are matched to columns by name; missing columns are
    /// NULL. `Raw` records must be a single length-prefixed row.
    pub fn encode_record(
        &self,
        record: &Record,
        schema: &ColumnSchema,
    ) -> Result<Vec<u8>, DataError> {
        match record {
            Record::Values(values) => self.encode(values, schema),
            Record::Text(line) => self.encode_text(line, schema),
            Record::Dict(fields) => {
                let mut values = vec![Value::Null; schema.len()];
                for (name, value) in fields {
                    let idx = schema.position(name).ok_or_else(|| DataError::TypeMismatch {
                        column: name.clone(),
                        expected: "a column of the target".to_string(),
                        got: "unknown column".to_string(),
                    })?;
                    values[idx] = value.clone();
                }
                self.encode(&values, schema)
            }
            Record::Raw(framed) => {
                let body = framed.get(FRAME_SIZE..).unwrap_or_default();
                let declared = framed
                    .get(..FRAME_SIZE)
                    .map(|p| usize::from(u16::from_le_bytes([p[0], p[1]])));
                if declared != Some(body.len()) {
                    return Err(DataError::TypeMismatch {
                        column: "<row>".to_string(),
                        expected: "length-prefixed row".to_string(),
                        got: format!("{} bytes with a mismatched prefix", framed.len()),
                    });
                }
                Ok(body.to_vec())
            }
        }
    }
}

/// Iterator returned by [`RowEncoder::decode`].
#[derive(Debug)]
pub struct Rows<'a> {
    encoder: &'a RowEncoder,
    schema: &'a ColumnSchema,
    frames: Frames<'a>,
    failed: bool,
}

impl Iterator for Rows<'_> {
    type Item = Result<Record, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = match self.frames.next()? {
            Ok(frame) => self.encoder.decode_row(&frame, self.schema),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn take(&mut self, n: usize, column: &str) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let bytes = &self.data[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(ProtocolError::CorruptBuffer {
                offset: self.offset(),
                message: format!(
                    "field '{}' needs {} bytes but the row has {} left",
                    column,
                    n,
                    self.data.len() - self.pos
                ),
            }),
        }
    }
}

/// Decode the fields of one row body. NULL fields come back as `Value::Null`.
pub(crate) fn decode_fields(
    body: &[u8],
    offset: usize,
    schema: &ColumnSchema,
    datetime: DatetimeMode,
    decimal: DecimalMode,
) -> Result<Vec<Value>, ProtocolError> {
    let mut cursor = Cursor {
        data: body,
        pos: 0,
        base: offset,
    };
    let indicators = cursor.take(schema.null_indicator_len(), "<null indicators>")?;

    let mut values = Vec::with_capacity(schema.len());
    for (i, column) in schema.iter().enumerate() {
        let field_offset = cursor.offset();
        let bytes = if column.type_code.is_variable_length() {
            let prefix = cursor.take(2, &column.name)?;
            let len = usize::from(u16::from_le_bytes([prefix[0], prefix[1]]));
            cursor.take(len, &column.name)?
        } else {
            cursor.take(column.field_width(), &column.name)?
        };

        let is_null = indicators[i / 8] & (0x80 >> (i % 8)) != 0;
        if is_null {
            values.push(Value::Null);
        } else {
            values.push(decode_field(column, bytes, field_offset, datetime, decimal)?);
        }
    }

    if cursor.pos != body.len() {
        return Err(ProtocolError::CorruptBuffer {
            offset: cursor.offset(),
            message: format!(
                "row has {} bytes beyond its declared fields",
                body.len() - cursor.pos
            ),
        });
    }
    Ok(values)
}

fn decode_field(
    column: &Column,
    bytes: &[u8],
    offset: usize,
    datetime: DatetimeMode,
    decimal: DecimalMode,
) -> Result<Value, ProtocolError> {
    let corrupt = |message: String| ProtocolError::CorruptBuffer { offset, message };

    let value = match column.type_code {
        TypeCode::ByteInt => Value::Int(i64::from(i8::from_le_bytes([bytes[0]]))),
        TypeCode::SmallInt => Value::Int(i64::from(i16::from_le_bytes([bytes[0], bytes[1]]))),
        TypeCode::Integer => Value::Int(i64::from(i32::from_le_bytes(fixed(bytes)))),
        TypeCode::BigInt => Value::Int(i64::from_le_bytes(fixed(bytes))),
        TypeCode::Float => Value::Float(f64::from_le_bytes(fixed(bytes))),
        TypeCode::Decimal => {
            let d = Decimal::new(read_signed(bytes), column.scale);
            match decimal {
                DecimalMode::Decimal => Value::Decimal(d),
                DecimalMode::Float => Value::Float(d.to_f64()),
                DecimalMode::String => Value::String(d.to_string()),
            }
        }
        TypeCode::Date => {
            let raw = i32::from_le_bytes(fixed(bytes));
            let date = date_from_wire(raw).ok_or_else(|| {
                corrupt(format!("invalid date value {} in '{}'", raw, column.name))
            })?;
            match datetime {
                DatetimeMode::Parsed => Value::Date(date),
                DatetimeMode::String => Value::String(date.format("%Y-%m-%d").to_string()),
            }
        }
        TypeCode::Time | TypeCode::Timestamp => {
            let text = utf8(bytes, column, offset)?;
            let text = text.trim();
            match datetime {
                DatetimeMode::String => Value::String(text.to_string()),
                DatetimeMode::Parsed if column.type_code == TypeCode::Time => parse_time(text)
                    .map(Value::Time)
                    .ok_or_else(|| corrupt(format!("invalid time '{}' in '{}'", text, column.name)))?,
                DatetimeMode::Parsed => parse_timestamp(text)
                    .map(Value::Timestamp)
                    .ok_or_else(|| {
                        corrupt(format!("invalid timestamp '{}' in '{}'", text, column.name))
                    })?,
            }
        }
        TypeCode::Char => Value::String(utf8(bytes, column, offset)?.trim_end_matches(' ').to_string()),
        TypeCode::VarChar => Value::String(utf8(bytes, column, offset)?.to_string()),
        TypeCode::Byte | TypeCode::VarByte => Value::Bytes(bytes.to_vec()),
    };
    Ok(value)
}

fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn utf8<'a>(bytes: &'a [u8], column: &Column, offset: usize) -> Result<&'a str, ProtocolError> {
    std::str::from_utf8(bytes).map_err(|e| ProtocolError::CorruptBuffer {
        offset: offset + e.valid_up_to(),
        message: format!("invalid UTF-8 in '{}'", column.name),
    })
}

/// Sign-extend a little-endian integer of up to 16 bytes.
fn read_signed(bytes: &[u8]) -> i128 {
    let negative = bytes.last().is_some_and(|b| b & 0x80 != 0);
    let mut buf = if negative { [0xffu8; 16] } else { [0u8; 16] };
    buf[..bytes.len()].copy_from_slice(bytes);
    i128::from_le_bytes(buf)
}

pub(crate) fn date_from_wire(raw: i32) -> Option<NaiveDate> {
    let day = raw.rem_euclid(100) as u32;
    let month = raw.div_euclid(100).rem_euclid(100) as u32;
    let year = raw.div_euclid(10_000) + 1900;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `None` outside the engine's year range 1..=9999.
pub(crate) fn date_to_wire(date: &NaiveDate) -> Option<i32> {
    if !(1..=9999).contains(&date.year()) {
        return None;
    }
    Some((date.year() - 1900) * 10_000 + date.month() as i32 * 100 + date.day() as i32)
}

fn write_null(column: &Column, out: &mut Vec<u8>) {
    if column.type_code.is_variable_length() {
        out.extend_from_slice(&[0, 0]);
    } else {
        out.resize(out.len() + column.field_width(), 0);
    }
}

fn mismatch(column: &Column, got: impl Into<String>) -> DataError {
    DataError::TypeMismatch {
        column: column.name.clone(),
        expected: column.type_description(),
        got: got.into(),
    }
}

fn too_large(column: &Column) -> DataError {
    DataError::ValueTooLarge {
        column: column.name.clone(),
        limit: column.byte_length as usize,
    }
}

fn encode_field(column: &Column, value: &Value, out: &mut Vec<u8>) -> Result<(), DataError> {
    let wrong_type = || mismatch(column, value.type_name());

    match column.type_code {
        ty if ty.is_integer() => {
            let v = match value {
                Value::Int(v) => *v,
                Value::Decimal(d) => d
                    .rescale(0)
                    .and_then(|d| i64::try_from(d.unscaled).ok())
                    .ok_or_else(|| mismatch(column, format!("decimal {}", d)))?,
                Value::String(s) => s
                    .trim()
                    .parse()
                    .map_err(|_| mismatch(column, format!("string '{}'", s)))?,
                _ => return Err(wrong_type()),
            };
            let out_of_range = || mismatch(column, format!("integer {} out of range", v));
            match ty {
                TypeCode::ByteInt => {
                    out.extend_from_slice(&i8::try_from(v).map_err(|_| out_of_range())?.to_le_bytes())
                }
                TypeCode::SmallInt => out
                    .extend_from_slice(&i16::try_from(v).map_err(|_| out_of_range())?.to_le_bytes()),
                TypeCode::Integer => out
                    .extend_from_slice(&i32::try_from(v).map_err(|_| out_of_range())?.to_le_bytes()),
                _ => out.extend_from_slice(&v.to_le_bytes()),
            }
        }
        TypeCode::Float => {
            let v = match value {
                Value::Int(v) => *v as f64,
                Value::Float(v) => *v,
                Value::Decimal(d) => d.to_f64(),
                Value::String(s) => s
                    .trim()
                    .parse()
                    .map_err(|_| mismatch(column, format!("string '{}'", s)))?,
                _ => return Err(wrong_type()),
            };
            out.extend_from_slice(&v.to_le_bytes());
        }
        TypeCode::Decimal => {
            let d = match value {
                Value::Int(v) => Decimal::new(i128::from(*v), 0).rescale(column.scale),
                Value::Float(v) => Decimal::from_f64(*v, column.scale),
                Value::Decimal(d) => d.rescale(column.scale),
                Value::String(s) => s
                    .parse::<Decimal>()
                    .ok()
                    .and_then(|d| d.rescale(column.scale)),
                _ => return Err(wrong_type()),
            }
            .ok_or_else(|| mismatch(column, format!("{} {} at scale {}", value.type_name(), value, column.scale)))?;

            if column.precision > 0 && d.digits() > u32::from(column.precision) {
                return Err(mismatch(
                    column,
                    format!("decimal {} with {} digits", d, d.digits()),
                ));
            }
            let width = column.field_width();
            if width < 16 {
                let bound = 1i128 << (width * 8 - 1);
                if d.unscaled < -bound || d.unscaled >= bound {
                    return Err(mismatch(column, format!("decimal {} out of range", d)));
                }
            }
            out.extend_from_slice(&d.unscaled.to_le_bytes()[..width]);
        }
        TypeCode::Date => {
            let date = match value {
                Value::Date(d) => *d,
                Value::String(s) => {
                    parse_date(s).ok_or_else(|| mismatch(column, format!("string '{}'", s)))?
                }
                _ => return Err(wrong_type()),
            };
            let raw = date_to_wire(&date)
                .ok_or_else(|| mismatch(column, format!("date {} out of range", date)))?;
            out.extend_from_slice(&raw.to_le_bytes());
        }
        TypeCode::Time => {
            let time = match value {
                Value::Time(t) => *t,
                Value::String(s) => {
                    parse_time(s).ok_or_else(|| mismatch(column, format!("string '{}'", s)))?
                }
                _ => return Err(wrong_type()),
            };
            write_padded(column, format_time(&time, column.precision).as_bytes(), b' ', out)?;
        }
        TypeCode::Timestamp => {
            let ts = match value {
                Value::Timestamp(ts) => *ts,
                Value::Date(d) => d.and_hms_opt(0, 0, 0).ok_or_else(wrong_type)?,
                Value::String(s) => {
                    parse_timestamp(s).ok_or_else(|| mismatch(column, format!("string '{}'", s)))?
                }
                _ => return Err(wrong_type()),
            };
            write_padded(column, format_timestamp(&ts, column.precision).as_bytes(), b' ', out)?;
        }
        TypeCode::Char => match value {
            Value::String(s) => write_padded(column, s.as_bytes(), b' ', out)?,
            _ => return Err(wrong_type()),
        },
        TypeCode::VarChar => match value {
            Value::String(s) => write_variable(column, s.as_bytes(), out)?,
            _ => return Err(wrong_type()),
        },
        TypeCode::Byte => {
            let bytes = binary(column, value)?;
            write_padded(column, &bytes, 0, out)?;
        }
        TypeCode::VarByte => {
            let bytes = binary(column, value)?;
            write_variable(column, &bytes, out)?;
        }
        // integer types are handled by the guard above
        _ => return Err(wrong_type()),
    }
    Ok(())
}

fn binary(column: &Column, value: &Value) -> Result<Vec<u8>, DataError> {
    match value {
        Value::Bytes(b) => Ok(b.clone()),
        Value::String(s) => {
            decode_hex(s).ok_or_else(|| mismatch(column, format!("non-hex string '{}'", s)))
        }
        other => Err(mismatch(column, other.type_name())),
    }
}

fn write_padded(
    column: &Column,
    bytes: &[u8],
    pad: u8,
    out: &mut Vec<u8>,
) -> Result<(), DataError> {
    let width = column.field_width();
    if bytes.len() > width {
        return Err(DataError::ValueTooLarge {
            column: column.name.clone(),
            limit: width,
        });
    }
    out.extend_from_slice(bytes);
    out.resize(out.len() + width - bytes.len(), pad);
    Ok(())
}

fn write_variable(column: &Column, bytes: &[u8], out: &mut Vec<u8>) -> Result<(), DataError> {
    if bytes.len() > column.byte_length as usize || bytes.len() > usize::from(u16::MAX) {
        return Err(too_large(column));
    }
    out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::BufferBuilder;
    use crate::codec::settings::{
        DATETIME_AS_STRING, DECIMAL_AS_FLOAT, DECIMAL_AS_STRING, ROW_ENCODING_DICT,
        ROW_ENCODING_RAW, ROW_ENCODING_STRING,
    };
    use chrono::{NaiveDateTime, NaiveTime};

    fn dbcinfo() -> ColumnSchema {
        ColumnSchema::new(vec![
            Column::varchar("InfoKey", 30).not_null(),
            Column::varchar("InfoData", 16384),
        ])
    }

    fn wide() -> ColumnSchema {
        ColumnSchema::new(vec![
            Column::byteint("b"),
            Column::smallint("s"),
            Column::integer("i"),
            Column::bigint("bi"),
            Column::float("f"),
            Column::decimal("d", 18, 2),
            Column::date("dt"),
            Column::time("t", 0),
            Column::timestamp("ts", 6),
            Column::char("c", 4),
            Column::varchar("vc", 10),
            Column::byte("by", 2),
            Column::varbyte("vb", 4),
        ])
    }

    fn wide_row() -> Vec<Value> {
        vec![
            Value::Int(-5),
            Value::Int(300),
            Value::Int(70000),
            Value::Int(1 << 40),
            Value::Float(2.5),
            Value::Decimal(Decimal::new(-12345, 2)),
            Value::Date(NaiveDate::from_ymd_opt(1899, 12, 31).unwrap()),
            Value::Time(NaiveTime::from_hms_opt(7, 30, 0).unwrap()),
            Value::Timestamp(
                NaiveDateTime::parse_from_str("2024-05-01 10:11:12.000250", "%Y-%m-%d %H:%M:%S%.f")
                    .unwrap(),
            ),
            Value::from("ab"),
            Value::from("hello"),
            Value::Bytes(vec![1, 2]),
            Value::Bytes(vec![9]),
        ]
    }

    fn buffer(rows: &[Vec<u8>]) -> RowBuffer {
        let mut builder = BufferBuilder::new(64260);
        for row in rows {
            assert!(builder.push(row));
        }
        builder.finish()
    }

    #[test]
    fn test_encode_varchar_layout() {
        let encoder = RowEncoder::new();
        let row = encoder
            .encode(&[Value::from("VERSION"), Value::Null], &dbcinfo())
            .unwrap();

        let mut expected = vec![0b0100_0000, 7, 0];
        expected.extend_from_slice(b"VERSION");
        expected.extend_from_slice(&[0, 0]);
        assert_eq!(row, expected);
    }

    #[test]
    fn test_round_trip_all_types() {
        let encoder = RowEncoder::new();
        let schema = wide();
        let row = wide_row();
        let buf = buffer(&[encoder.encode(&row, &schema).unwrap()]);

        let records: Vec<Record> = encoder
            .decode(&buf, &schema)
            .collect::<Result<_, _>>()
            .unwrap();
        let mut expected = row;
        expected[9] = Value::from("ab");
        assert_eq!(records, vec![Record::Values(expected)]);
    }

    #[test]
    fn test_round_trip_nulls() {
        let encoder = RowEncoder::new();
        let schema = wide();
        let row = vec![Value::Null; schema.len()];
        let body = encoder.encode(&row, &schema).unwrap();

        assert_eq!(&body[..2], &[0xff, 0xf8]);
        let buf = buffer(&[body]);
        let records: Vec<Record> = encoder.decode(&buf, &schema).collect::<Result<_, _>>().unwrap();
        assert_eq!(records, vec![Record::Values(row)]);
    }

    #[test]
    fn test_decimal_modes() {
        let schema = ColumnSchema::new(vec![Column::decimal("amount", 9, 2)]);
        let mut encoder = RowEncoder::new();
        let buf = buffer(&[encoder.encode(&[Value::from("12.50")], &schema).unwrap()]);

        let first = |e: &RowEncoder| e.decode(&buf, &schema).next().unwrap().unwrap();
        assert_eq!(
            first(&encoder),
            Record::Values(vec![Value::Decimal(Decimal::new(1250, 2))])
        );

        encoder.set_encoding(DECIMAL_AS_FLOAT).unwrap();
        assert_eq!(first(&encoder), Record::Values(vec![Value::Float(12.5)]));

        encoder.set_encoding(DECIMAL_AS_STRING).unwrap();
        assert_eq!(first(&encoder), Record::Values(vec![Value::from("12.50")]));
    }

    #[test]
    fn test_datetime_as_string() {
        let schema = ColumnSchema::new(vec![Column::date("d"), Column::timestamp("ts", 0)]);
        let mut encoder = RowEncoder::new();
        encoder.set_encoding(DATETIME_AS_STRING).unwrap();

        let body = encoder
            .encode(&[Value::from("2021-07-04"), Value::from("2021-07-04 12:00:00")], &schema)
            .unwrap();
        let buf = buffer(&[body]);
        let record = encoder.decode(&buf, &schema).next().unwrap().unwrap();
        assert_eq!(
            record,
            Record::Values(vec![
                Value::from("2021-07-04"),
                Value::from("2021-07-04 12:00:00")
            ])
        );
    }

    #[test]
    fn test_dict_and_text_modes() {
        let schema = dbcinfo();
        let mut encoder = RowEncoder::new();
        let buf = buffer(&[
            encoder.encode(&[Value::from("VERSION"), Value::from("16.20")], &schema).unwrap(),
            encoder.encode(&[Value::from("LANGUAGE"), Value::Null], &schema).unwrap(),
        ]);

        encoder.set_encoding(ROW_ENCODING_DICT).unwrap();
        let records: Vec<Record> = encoder.decode(&buf, &schema).collect::<Result<_, _>>().unwrap();
        assert_eq!(records[0].get("infodata"), Some(&Value::from("16.20")));

        encoder.set_encoding(ROW_ENCODING_STRING).unwrap();
        encoder.set_delimiter('\t').unwrap();
        let lines: Vec<Record> = encoder.decode(&buf, &schema).collect::<Result<_, _>>().unwrap();
        assert_eq!(
            lines,
            vec![
                Record::Text("VERSION\t16.20".to_string()),
                Record::Text("LANGUAGE\tNULL".to_string())
            ]
        );
    }

    #[test]
    fn test_raw_mode_passes_frames_through() {
        let schema = dbcinfo();
        let mut encoder = RowEncoder::new();
        let body = encoder.encode(&[Value::from("K"), Value::from("V")], &schema).unwrap();
        let buf = buffer(&[body.clone()]);

        encoder.set_encoding(ROW_ENCODING_RAW).unwrap();
        let record = encoder.decode(&buf, &schema).next().unwrap().unwrap();
        let Record::Raw(framed) = &record else {
            panic!("expected raw record");
        };
        assert_eq!(&framed[2..], body.as_slice());
        assert_eq!(encoder.encode_record(&record, &schema).unwrap(), body);
    }

    #[test]
    fn test_null_sentinel() {
        let schema = dbcinfo();
        let mut encoder = RowEncoder::new();
        encoder.set_null("").unwrap();

        let body = encoder.encode(&[Value::from("K"), Value::from("")], &schema).unwrap();
        assert_eq!(body[0], 0b0100_0000);

        let buf = buffer(&[body]);
        let record = encoder.decode(&buf, &schema).next().unwrap().unwrap();
        assert_eq!(record, Record::Values(vec![Value::from("K"), Value::from("")]));
    }

    #[test]
    fn test_numeric_null_rejected_for_character_schema() {
        let mut encoder = RowEncoder::new();
        encoder.bind_schema(dbcinfo());
        assert!(matches!(
            encoder.set_null(0),
            Err(ConfigurationError::EncodingConfig(_))
        ));

        encoder.bind_schema(ColumnSchema::new(vec![Column::integer("n")]));
        assert!(encoder.set_null(-1).is_ok());
        assert_eq!(encoder.null_text(), "-1");
    }

    #[test]
    fn test_invalid_sentinels_and_delimiters() {
        let mut encoder = RowEncoder::new();
        assert!(encoder.set_null(Value::Bytes(vec![0])).is_err());
        assert!(encoder.set_null("a|b").is_err());
        assert!(encoder.set_delimiter("").is_err());
        assert!(encoder.set_delimiter("\n").is_err());
        assert!(encoder.set_delimiter(5).is_err());
        assert_eq!(encoder.delimiter(), "|");
        assert!(encoder.null().is_null());
    }

    #[test]
    fn test_encode_text_line() {
        let schema = ColumnSchema::new(vec![
            Column::integer("id").not_null(),
            Column::varchar("name", 20),
            Column::decimal("price", 9, 2),
            Column::date("since"),
        ]);
        let encoder = RowEncoder::new();
        let from_text = encoder.encode_text("7|widget|NULL|2020-01-31\n", &schema).unwrap();
        let from_values = encoder
            .encode(
                &[
                    Value::Int(7),
                    Value::from("widget"),
                    Value::Null,
                    Value::Date(NaiveDate::from_ymd_opt(2020, 1, 31).unwrap()),
                ],
                &schema,
            )
            .unwrap();
        assert_eq!(from_text, from_values);
    }

    #[test]
    fn test_encode_errors() {
        let schema = dbcinfo();
        let encoder = RowEncoder::new();

        assert!(matches!(
            encoder.encode(&[Value::from("only one")], &schema),
            Err(DataError::TypeMismatch { column, .. }) if column == "<row>"
        ));
        assert!(matches!(
            encoder.encode(&[Value::Null, Value::Null], &schema),
            Err(DataError::TypeMismatch { column, got, .. }) if column == "InfoKey" && got == "null"
        ));
        assert!(matches!(
            encoder.encode(&[Value::from("x".repeat(31)), Value::Null], &schema),
            Err(DataError::ValueTooLarge { limit: 30, .. })
        ));
        assert!(matches!(
            encoder.encode(&[Value::Int(1), Value::Null], &schema),
            Err(DataError::TypeMismatch { got, .. }) if got == "integer"
        ));
    }

    #[test]
    fn test_integer_range_and_decimal_precision() {
        let encoder = RowEncoder::new();
        let small = ColumnSchema::new(vec![Column::byteint("b")]);
        assert!(encoder.encode(&[Value::Int(127)], &small).is_ok());
        assert!(encoder.encode(&[Value::Int(128)], &small).is_err());

        let dec = ColumnSchema::new(vec![Column::decimal("d", 4, 2)]);
        assert!(encoder.encode(&[Value::from("99.99")], &dec).is_ok());
        assert!(encoder.encode(&[Value::from("100.00")], &dec).is_err());
        assert!(encoder.encode(&[Value::from("1.234")], &dec).is_err());
    }

    #[test]
    fn test_decode_truncated_field() {
        let encoder = RowEncoder::new();
        let schema = ColumnSchema::new(vec![Column::integer("n")]);
        let buf = buffer(&[vec![0, 1, 0]]);
        let results: Vec<_> = encoder.decode(&buf, &schema).collect();

        assert_eq!(results.len(), 1);
        assert!(matches!(
            &results[0],
            Err(ProtocolError::CorruptBuffer { offset: 5, .. })
        ));
    }

    #[test]
    fn test_decode_extra_bytes_in_row() {
        let encoder = RowEncoder::new();
        let schema = ColumnSchema::new(vec![Column::byteint("n")]);
        let buf = buffer(&[vec![0, 1, 0xaa]]);
        assert!(matches!(
            encoder.decode(&buf, &schema).next(),
            Some(Err(ProtocolError::CorruptBuffer { message, .. })) if message.contains("beyond")
        ));
    }

    #[test]
    fn test_decode_stops_after_error() {
        let encoder = RowEncoder::new();
        let schema = ColumnSchema::new(vec![Column::byteint("n")]);
        let buf = buffer(&[vec![0, 1], vec![0], vec![0, 3]]);
        let results: Vec<_> = encoder.decode(&buf, &schema).collect();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Ok(Record::Values(vec![Value::Int(1)])));
        assert!(results[1].is_err());
    }

    #[test]
    fn test_date_wire_format() {
        let date = NaiveDate::from_ymd_opt(2017, 2, 28).unwrap();
        assert_eq!(date_to_wire(&date), Some(1_170_228));
        assert_eq!(date_from_wire(1_170_228), Some(date));

        let old = NaiveDate::from_ymd_opt(1850, 6, 15).unwrap();
        assert_eq!(date_to_wire(&old).and_then(date_from_wire), Some(old));
        assert_eq!(date_from_wire(1_171_332), None);
    }

    #[test]
    fn test_date_outside_engine_range_is_mismatch() {
        let schema = ColumnSchema::new(vec![Column::date("d")]);
        let encoder = RowEncoder::new();

        for date in [
            NaiveDate::from_ymd_opt(250_000, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(-250_000, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(10_000, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(0, 12, 31).unwrap(),
        ] {
            let err = encoder.encode(&[Value::Date(date)], &schema).unwrap_err();
            assert!(matches!(
                err,
                DataError::TypeMismatch { ref column, ref got, .. }
                    if column == "d" && got.contains("out of range")
            ));
        }

        let last = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap();
        assert!(encoder.encode(&[Value::Date(last)], &schema).is_ok());
    }

    #[test]
    fn test_dict_record_encode() {
        let schema = dbcinfo();
        let encoder = RowEncoder::new();
        let record = Record::Dict(vec![("infokey".to_string(), Value::from("K"))]);
        let expected = encoder.encode(&[Value::from("K"), Value::Null], &schema).unwrap();
        assert_eq!(encoder.encode_record(&record, &schema).unwrap(), expected);

        let unknown = Record::Dict(vec![("nope".to_string(), Value::Null)]);
        assert!(encoder.encode_record(&unknown, &schema).is_err());
    }
}
