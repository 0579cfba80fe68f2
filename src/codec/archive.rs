//! Export archives: a schema header followed by raw rows.
//!
//! Layout, little-endian throughout: the magic bytes `TDBA`, a u16 format
//! version, a u32 header length and the column descriptors as JSON. Every row
//! follows exactly as framed in a buffer (u16 length, then the row body)
//! until end of input.

use crate::channel::{Frame, FRAME_SIZE};
use crate::codec::{Record, RowEncoder};
use crate::error::ArchiveError;
use crate::types::{ColumnDescriptor, ColumnSchema};
use std::io::{self, Read, Write};

pub const ARCHIVE_MAGIC: &[u8; 4] = b"TDBA";
pub const ARCHIVE_VERSION: u16 = 1;

const PREAMBLE_LEN: u64 = 4 + 2 + 4;

/// Writes an archive for one schema.
#[derive(Debug)]
pub struct ArchiveWriter<W: Write> {
    writer: W,
    offset: u64,
    rows: u64,
}

impl<W: Write> ArchiveWriter<W> {
    /// Write the preamble and schema header.
    pub fn new(mut writer: W, schema: &ColumnSchema) -> Result<Self, ArchiveError> {
        let header = serde_json::to_vec(&schema.descriptors())
            .map_err(|e| ArchiveError::Header(e.to_string()))?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| ArchiveError::Header("schema header too large".to_string()))?;

        writer.write_all(ARCHIVE_MAGIC)?;
        writer.write_all(&ARCHIVE_VERSION.to_le_bytes())?;
        writer.write_all(&header_len.to_le_bytes())?;
        writer.write_all(&header)?;
        Ok(Self {
            writer,
            offset: PREAMBLE_LEN + u64::from(header_len),
            rows: 0,
        })
    }

    /// Append one length-prefixed row.
    pub fn write_row(&mut self, framed: &[u8]) -> Result<(), ArchiveError> {
        let declared = framed
            .get(..FRAME_SIZE)
            .map(|p| usize::from(u16::from_le_bytes([p[0], p[1]])));
        if declared != Some(framed.len().saturating_sub(FRAME_SIZE)) {
            return Err(ArchiveError::Corrupt {
                offset: self.offset,
                message: format!("row of {} bytes has a mismatched length prefix", framed.len()),
            });
        }
        self.writer.write_all(framed)?;
        self.offset += framed.len() as u64;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, ArchiveError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Reads an archive written by [`ArchiveWriter`].
#[derive(Debug)]
pub struct ArchiveReader<R: Read> {
    reader: R,
    schema: ColumnSchema,
    offset: u64,
    rows: u64,
}

impl<R: Read> ArchiveReader<R> {
    /// Validate the preamble and parse the schema header.
    pub fn open(mut reader: R) -> Result<Self, ArchiveError> {
        let mut magic = [0u8; 4];
        if read_full(&mut reader, &mut magic)? < magic.len() || &magic != ARCHIVE_MAGIC {
            return Err(ArchiveError::BadMagic);
        }

        let mut version = [0u8; 2];
        let mut header_len = [0u8; 4];
        if read_full(&mut reader, &mut version)? < version.len()
            || read_full(&mut reader, &mut header_len)? < header_len.len()
        {
            return Err(ArchiveError::Header("truncated preamble".to_string()));
        }
        let version = u16::from_le_bytes(version);
        if version != ARCHIVE_VERSION {
            return Err(ArchiveError::UnsupportedVersion(version));
        }

        let header_len = u32::from_le_bytes(header_len);
        let mut header = vec![0u8; header_len as usize];
        if read_full(&mut reader, &mut header)? < header.len() {
            return Err(ArchiveError::Header(format!(
                "expected {} header bytes",
                header_len
            )));
        }
        let descriptors: Vec<ColumnDescriptor> =
            serde_json::from_slice(&header).map_err(|e| ArchiveError::Header(e.to_string()))?;
        let schema = ColumnSchema::from_descriptors(descriptors)
            .map_err(|e| ArchiveError::Header(e.to_string()))?;

        Ok(Self {
            reader,
            schema,
            offset: PREAMBLE_LEN + u64::from(header_len),
            rows: 0,
        })
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn rows_read(&self) -> u64 {
        self.rows
    }

    /// Next length-prefixed row, or `None` at a clean end of input.
    pub fn next_row(&mut self) -> Result<Option<Vec<u8>>, ArchiveError> {
        let mut prefix = [0u8; FRAME_SIZE];
        match read_full(&mut self.reader, &mut prefix)? {
            0 => return Ok(None),
            FRAME_SIZE => {}
            _ => {
                return Err(ArchiveError::Corrupt {
                    offset: self.offset,
                    message: "truncated row length".to_string(),
                })
            }
        }

        let len = usize::from(u16::from_le_bytes(prefix));
        let mut framed = vec![0u8; FRAME_SIZE + len];
        framed[..FRAME_SIZE].copy_from_slice(&prefix);
        let got = read_full(&mut self.reader, &mut framed[FRAME_SIZE..])?;
        if got < len {
            return Err(ArchiveError::Corrupt {
                offset: self.offset,
                message: format!("row declares {} bytes, {} remain", len, got),
            });
        }

        self.offset += framed.len() as u64;
        self.rows += 1;
        Ok(Some(framed))
    }

    /// Next row decoded with the encoder's settings.
    pub fn next_record(&mut self, encoder: &RowEncoder) -> Result<Option<Record>, ArchiveError> {
        let offset = self.offset;
        let framed = match self.next_row()? {
            Some(framed) => framed,
            None => return Ok(None),
        };
        let frame = Frame {
            index: self.rows.saturating_sub(1) as usize,
            offset: offset as usize + FRAME_SIZE,
            body: &framed[FRAME_SIZE..],
            framed: &framed,
        };
        Ok(Some(encoder.decode_row(&frame, &self.schema)?))
    }
}

/// Read until `buf` is full or the input ends; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;
    use crate::types::Column;

    fn schema() -> ColumnSchema {
        ColumnSchema::new(vec![Column::integer("id").not_null(), Column::varchar("name", 10)])
    }

    fn framed(body: &[u8]) -> Vec<u8> {
        let mut out = (body.len() as u16).to_le_bytes().to_vec();
        out.extend_from_slice(body);
        out
    }

    fn archive_of(rows: &[Vec<Value>]) -> Vec<u8> {
        let encoder = RowEncoder::new();
        let mut writer = ArchiveWriter::new(Vec::new(), &schema()).unwrap();
        for row in rows {
            writer.write_row(&framed(&encoder.encode(row, &schema()).unwrap())).unwrap();
        }
        assert_eq!(writer.rows(), rows.len() as u64);
        writer.finish().unwrap()
    }

    #[test]
    fn test_read_back_rows() {
        let rows = vec![
            vec![Value::Int(1), Value::from("Alice")],
            vec![Value::Int(2), Value::Null],
        ];
        let bytes = archive_of(&rows);
        assert_eq!(&bytes[..4], b"TDBA");

        let mut reader = ArchiveReader::open(bytes.as_slice()).unwrap();
        assert_eq!(reader.schema(), &schema());

        let encoder = RowEncoder::new();
        let mut read = Vec::new();
        while let Some(record) = reader.next_record(&encoder).unwrap() {
            read.push(record.into_values().unwrap());
        }
        assert_eq!(read, rows);
        assert_eq!(reader.rows_read(), 2);
    }

    #[test]
    fn test_rejects_foreign_input() {
        assert!(matches!(
            ArchiveReader::open(&b"PK\x03\x04rest"[..]),
            Err(ArchiveError::BadMagic)
        ));
        assert!(matches!(ArchiveReader::open(&b"TD"[..]), Err(ArchiveError::BadMagic)));

        let mut bytes = archive_of(&[]);
        bytes[4] = 9;
        assert!(matches!(
            ArchiveReader::open(bytes.as_slice()),
            Err(ArchiveError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_rejects_damaged_header() {
        let mut bytes = archive_of(&[]);
        let last = bytes.len() - 1;
        bytes[last] = b'}';
        assert!(matches!(
            ArchiveReader::open(bytes.as_slice()),
            Err(ArchiveError::Header(_))
        ));

        let short = &archive_of(&[])[..12];
        assert!(matches!(ArchiveReader::open(short), Err(ArchiveError::Header(_))));
    }

    #[test]
    fn test_truncated_row() {
        let mut bytes = archive_of(&[vec![Value::Int(7), Value::from("x")]]);
        bytes.pop();

        let mut reader = ArchiveReader::open(bytes.as_slice()).unwrap();
        assert!(matches!(
            reader.next_row(),
            Err(ArchiveError::Corrupt { message, .. }) if message.contains("remain")
        ));
    }

    #[test]
    fn test_writer_rejects_unframed_row() {
        let mut writer = ArchiveWriter::new(Vec::new(), &schema()).unwrap();
        assert!(matches!(
            writer.write_row(&[5, 0, 1]),
            Err(ArchiveError::Corrupt { .. })
        ));
        assert!(matches!(writer.write_row(&[1]), Err(ArchiveError::Corrupt { .. })));
        assert_eq!(writer.rows(), 0);
    }
}
