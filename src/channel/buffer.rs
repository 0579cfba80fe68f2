//! Row buffer framing.
//!
//! A buffer is a 2-byte little-endian row count followed by that many rows,
//! each prefixed with its own 2-byte little-endian length.

use crate::error::ProtocolError;

/// Size of the buffer header and of each row length prefix.
pub const FRAME_SIZE: usize = 2;

/// One framed buffer of rows, as exchanged with the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBuffer {
    data: Vec<u8>,
}

impl RowBuffer {
    /// Wrap bytes received from the engine. Framing is checked lazily while
    /// iterating.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row count announced by the header.
    pub fn declared_rows(&self) -> Result<usize, ProtocolError> {
        match self.data.get(..FRAME_SIZE) {
            Some(header) => Ok(usize::from(u16::from_le_bytes([header[0], header[1]]))),
            None => Err(ProtocolError::CorruptBuffer {
                offset: 0,
                message: format!("buffer of {} bytes has no row header", self.data.len()),
            }),
        }
    }

    /// Iterate over the framed rows.
    pub fn frames(&self) -> Frames<'_> {
        Frames {
            data: &self.data,
            pos: FRAME_SIZE,
            index: 0,
            declared: None,
            done: false,
        }
    }
}

/// One row within a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Position of the row within its buffer
    pub index: usize,
    /// Byte offset of the row body within the buffer
    pub offset: usize,
    /// Row body without its length prefix
    pub body: &'a [u8],
    /// Row including its length prefix
    pub framed: &'a [u8],
}

/// Iterator over the rows of a [`RowBuffer`].
///
/// Yields an error at the first framing violation and then stops.
#[derive(Debug)]
pub struct Frames<'a> {
    data: &'a [u8],
    pos: usize,
    index: usize,
    declared: Option<usize>,
    done: bool,
}

impl<'a> Frames<'a> {
    fn fail(&mut self, offset: usize, message: String) -> Option<Result<Frame<'a>, ProtocolError>> {
        self.done = true;
        Some(Err(ProtocolError::CorruptBuffer { offset, message }))
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<Frame<'a>, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let declared = match self.declared {
            Some(n) => n,
            None => {
                if self.data.len() < FRAME_SIZE {
                    let message =
                        format!("buffer of {} bytes has no row header", self.data.len());
                    return self.fail(0, message);
                }
                let n = usize::from(u16::from_le_bytes([self.data[0], self.data[1]]));
                self.declared = Some(n);
                n
            }
        };

        let remaining = self.data.len() - self.pos;
        if remaining == 0 {
            self.done = true;
            if self.index != declared {
                let message = format!(
                    "header declares {} rows but buffer holds {}",
                    declared, self.index
                );
                return self.fail(self.pos, message);
            }
            return None;
        }

        if self.index >= declared {
            let message = format!(
                "{} trailing bytes after the {} declared rows",
                remaining, declared
            );
            return self.fail(self.pos, message);
        }
        if remaining < FRAME_SIZE {
            let message = format!("truncated length prefix for row {}", self.index);
            return self.fail(self.pos, message);
        }

        let start = self.pos;
        let row_len = usize::from(u16::from_le_bytes([self.data[start], self.data[start + 1]]));
        let body_start = start + FRAME_SIZE;
        if self.data.len() - body_start < row_len {
            let message = format!(
                "row {} needs {} bytes but only {} remain",
                self.index,
                row_len,
                self.data.len() - body_start
            );
            return self.fail(body_start, message);
        }

        let end = body_start + row_len;
        let frame = Frame {
            index: self.index,
            offset: body_start,
            body: &self.data[body_start..end],
            framed: &self.data[start..end],
        };
        self.pos = end;
        self.index += 1;
        Some(Ok(frame))
    }
}

/// Packs encoded rows into buffers no larger than a maximum size.
#[derive(Debug)]
pub struct BufferBuilder {
    data: Vec<u8>,
    rows: usize,
    max_size: usize,
}

impl BufferBuilder {
    pub fn new(max_size: usize) -> Self {
        let mut data = Vec::with_capacity(max_size.min(64 * 1024));
        data.extend_from_slice(&[0, 0]);
        Self {
            data,
            rows: 0,
            max_size,
        }
    }

    /// Largest row body that fits in an otherwise empty buffer.
    pub fn max_row_len(max_size: usize) -> usize {
        max_size
            .saturating_sub(2 * FRAME_SIZE)
            .min(usize::from(u16::MAX))
    }

    /// Whether a row body of `row_len` bytes fits in this buffer.
    pub fn fits(&self, row_len: usize) -> bool {
        row_len <= usize::from(u16::MAX)
            && self.rows < usize::from(u16::MAX)
            && self.data.len() + FRAME_SIZE + row_len <= self.max_size
    }

    /// Append a row body. Returns false, leaving the buffer unchanged, if it
    /// does not fit.
    pub fn push(&mut self, row: &[u8]) -> bool {
        if !self.fits(row.len()) {
            return false;
        }
        self.data
            .extend_from_slice(&(row.len() as u16).to_le_bytes());
        self.data.extend_from_slice(row);
        self.rows += 1;
        true
    }

    /// Append a row that already carries its length prefix.
    pub fn push_framed(&mut self, framed: &[u8]) -> bool {
        match framed.get(FRAME_SIZE..) {
            Some(body) if usize::from(u16::from_le_bytes([framed[0], framed[1]])) == body.len() => {
                self.push(body)
            }
            _ => false,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Seal the buffer, writing the row count into its header.
    pub fn finish(mut self) -> RowBuffer {
        let count = (self.rows as u16).to_le_bytes();
        self.data[..FRAME_SIZE].copy_from_slice(&count);
        RowBuffer { data: self.data }
    }
}
