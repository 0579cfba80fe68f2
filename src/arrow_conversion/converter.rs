//! Conversion of row buffers to Arrow record batches.

use crate::arrow_conversion::builders::build_array;
use crate::channel::RowBuffer;
use crate::codec::{decode_fields, DatetimeMode, DecimalMode, Value};
use crate::error::{ConversionError, TransferError};
use crate::types::ColumnSchema;
use arrow::array::ArrayRef;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;

/// Converts row buffers to Arrow `RecordBatch`es.
///
/// Fields are always decoded in parsed form regardless of the session's
/// encoding settings.
pub struct ArrowConverter;

impl ArrowConverter {
    /// Convert every row in a buffer into one batch.
    ///
    /// # Errors
    /// Returns `TransferError::Protocol` if the buffer is malformed and
    /// `TransferError::Conversion` if a value does not fit its Arrow type.
    pub fn to_record_batch(
        buffer: &RowBuffer,
        schema: &ColumnSchema,
    ) -> Result<RecordBatch, TransferError> {
        let mut columns: Vec<Vec<Value>> = vec![Vec::new(); schema.len()];
        let mut rows = 0;

        for frame in buffer.frames() {
            let frame = frame?;
            let values = decode_fields(
                frame.body,
                frame.offset,
                schema,
                DatetimeMode::Parsed,
                DecimalMode::Decimal,
            )?;
            for (column, value) in columns.iter_mut().zip(values) {
                column.push(value);
            }
            rows += 1;
        }

        let arrays = schema
            .iter()
            .zip(&columns)
            .enumerate()
            .map(|(index, (column, values))| build_array(column, values, index))
            .collect::<Result<Vec<ArrayRef>, _>>()?;

        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        RecordBatch::try_new_with_options(Arc::new(schema.to_arrow()), arrays, &options)
            .map_err(|e| ConversionError::ArrowError(e.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::BufferBuilder;
    use crate::codec::{Decimal, RowEncoder};
    use crate::error::ProtocolError;
    use crate::types::Column;
    use arrow::array::{Array, Decimal128Array, Int32Array, StringArray};

    fn schema() -> ColumnSchema {
        ColumnSchema::new(vec![
            Column::integer("id").not_null(),
            Column::varchar("name", 20),
            Column::decimal("price", 9, 2),
        ])
    }

    fn buffer(rows: &[Vec<Value>]) -> RowBuffer {
        let encoder = RowEncoder::new();
        let mut builder = BufferBuilder::new(1024);
        for row in rows {
            assert!(builder.push(&encoder.encode(row, &schema()).unwrap()));
        }
        builder.finish()
    }

    #[test]
    fn test_buffer_to_batch() {
        let buffer = buffer(&[
            vec![
                Value::Int(1),
                Value::from("widget"),
                Value::Decimal(Decimal::new(999, 2)),
            ],
            vec![Value::Int(2), Value::Null, Value::Null],
        ]);

        let batch = ArrowConverter::to_record_batch(&buffer, &schema()).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 3);
        assert_eq!(batch.schema().field(0).name(), "id");
        assert!(!batch.schema().field(0).is_nullable());

        let ids = batch.column(0).as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(ids.value(0), 1);
        assert_eq!(ids.value(1), 2);

        let names = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(names.value(0), "widget");
        assert!(names.is_null(1));

        let prices = batch
            .column(2)
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        assert_eq!(prices.value(0), 999);
        assert!(prices.is_null(1));
    }

    #[test]
    fn test_empty_buffer() {
        let batch = ArrowConverter::to_record_batch(&buffer(&[]), &schema()).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 3);
    }

    #[test]
    fn test_corrupt_buffer() {
        let mut bytes = buffer(&[vec![Value::Int(1), Value::from("x"), Value::Null]]).into_bytes();
        bytes.truncate(bytes.len() - 1);

        let err = ArrowConverter::to_record_batch(&RowBuffer::from_bytes(bytes), &schema())
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::Protocol(ProtocolError::CorruptBuffer { .. })
        ));
    }
}
