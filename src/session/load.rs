//! Load session: packs caller rows into buffers and submits them to a target
//! table.

use crate::channel::{BufferBuilder, BufferReceiver, RowBuffer};
use crate::codec::{Record, RowEncoder, Value};
use crate::connection::SessionAttributes;
use crate::error::{
    ConfigurationError, DataError, ReportError, SchemaError, StatementError, TransferError,
};
use crate::session::completion::{JobSummary, LoadSummary};
use crate::session::lifecycle::{BulkSession, SchemaSource, SessionCore};
use crate::session::state::SessionState;
use crate::session::statement::{StatementExecutor, OBJECT_DOES_NOT_EXIST};
use crate::transport::{Operator, PutReply, TransferProtocol, WebSocketTransport};
use crate::types::ColumnSchema;
use async_trait::async_trait;
use std::io::Write;
use tracing::{debug, info, warn};

/// Result of one submission.
///
/// Rejections are row-scoped; the session keeps going.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutcome {
    /// Rows accepted by this call
    pub accepted: u64,
    /// `DataError::RowRejected` entries of this call, ordered by row index
    pub rejected: Vec<DataError>,
    /// Rows accepted so far by the session, this call included
    pub total_accepted: u64,
    /// Rows rejected so far by the session, this call included
    pub total_rejected: u64,
}

impl PutOutcome {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    /// Indices of the rejected rows.
    pub fn rejected_rows(&self) -> Vec<usize> {
        self.rejected
            .iter()
            .filter_map(|e| match e {
                DataError::RowRejected { row_index, .. } => Some(*row_index),
                _ => None,
            })
            .collect()
    }
}

/// Names of the engine tables that collect rows a load job refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorTables {
    /// Rows refused while acquiring data
    pub acquisition: String,
    /// Rows refused while applying data to the target
    pub application: String,
}

impl ErrorTables {
    fn for_target(target: &str) -> Self {
        Self {
            acquisition: format!("{}_e1", target),
            application: format!("{}_e2", target),
        }
    }
}

/// Bulk load into one target table.
pub struct LoadSession<T: TransferProtocol = WebSocketTransport> {
    core: SessionCore<T>,
    target: Option<String>,
    totals: LoadSummary,
}

impl LoadSession<WebSocketTransport> {
    pub fn new() -> Self {
        Self::with_transport(WebSocketTransport::new())
    }
}

impl Default for LoadSession<WebSocketTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TransferProtocol> LoadSession<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            core: SessionCore::new(transport, Operator::Load),
            target: None,
            totals: LoadSummary::default(),
        }
    }

    /// Configure and initiate in one step.
    pub async fn open(transport: T, attrs: SessionAttributes) -> Result<Self, TransferError> {
        let mut session = Self::with_transport(transport);
        session.configure(attrs)?;
        session.initiate().await?;
        Ok(session)
    }

    pub fn configure(&mut self, attrs: SessionAttributes) -> Result<(), TransferError> {
        self.core.configure(attrs)
    }

    pub fn configure_options<I, K, V>(&mut self, opts: I) -> Result<(), TransferError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let attrs = SessionAttributes::from_options(opts)?;
        self.core.configure(attrs)
    }

    pub async fn apply(&mut self) -> Result<(), TransferError> {
        self.core.apply().await
    }

    pub async fn initiate(&mut self) -> Result<(), TransferError> {
        self.core.initiate().await
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    pub fn sessions(&self) -> u32 {
        self.core.sessions()
    }

    pub fn columns(&self) -> Result<&ColumnSchema, SchemaError> {
        self.core.columns()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn encoder(&self) -> &RowEncoder {
        self.core.encoder()
    }

    pub fn set_encoding(&mut self, mask: u32) -> Result<(), ConfigurationError> {
        self.core.set_encoding(mask)
    }

    pub fn set_null(&mut self, value: impl Into<Value>) -> Result<(), ConfigurationError> {
        self.core.set_null(value.into())
    }

    pub fn set_delimiter(&mut self, value: impl Into<Value>) -> Result<(), ConfigurationError> {
        self.core.set_delimiter(value.into())
    }

    /// Rows accepted and rejected so far.
    pub fn summary(&self) -> LoadSummary {
        self.totals.clone()
    }

    /// Set the target table and fetch its schema.
    pub async fn set_target(&mut self, table: &str) -> Result<&ColumnSchema, TransferError> {
        let table = table.trim();
        if table.is_empty() {
            return Err(SchemaError::EmptyStatement.into());
        }
        self.target = None;
        self.core.set_schema(SchemaSource::Table(table)).await?;
        self.target = Some(table.to_string());
        Ok(self.core.columns()?)
    }

    /// Submit a caller-built buffer. Rejection indices are relative to the
    /// buffer.
    pub async fn put_buffer(&mut self, buffer: RowBuffer) -> Result<PutOutcome, TransferError> {
        let reply = self.core.put_buffer(buffer).await?;
        let mut outcome = PutOutcome::default();
        self.absorb(reply, |i| i, &mut outcome);
        Ok(self.with_totals(outcome))
    }

    /// Encode and submit rows of values.
    ///
    /// Rows are packed into as many buffers as needed. A row that cannot be
    /// encoded, or does not fit in a buffer on its own, is rejected locally.
    /// Rejection indices are relative to `rows`.
    pub async fn put_rows(&mut self, rows: &[Vec<Value>]) -> Result<PutOutcome, TransferError> {
        let schema = self.core.columns()?.clone();
        let encoder = self.core.encoder();
        let encoded: Vec<_> = rows.iter().map(|row| encoder.encode(row, &schema)).collect();
        self.put_encoded(encoded).await
    }

    /// Encode and submit delimited text lines.
    pub async fn put_text<I, S>(&mut self, lines: I) -> Result<PutOutcome, TransferError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let schema = self.core.columns()?.clone();
        let encoder = self.core.encoder();
        let encoded: Vec<_> = lines
            .into_iter()
            .map(|line| encoder.encode_text(line.as_ref(), &schema))
            .collect();
        self.put_encoded(encoded).await
    }

    /// Encode and submit records of any shape.
    pub async fn put_records(&mut self, records: &[Record]) -> Result<PutOutcome, TransferError> {
        let schema = self.core.columns()?.clone();
        let encoder = self.core.encoder();
        let encoded: Vec<_> = records
            .iter()
            .map(|record| encoder.encode_record(record, &schema))
            .collect();
        self.put_encoded(encoded).await
    }

    async fn put_encoded(
        &mut self,
        encoded: Vec<Result<Vec<u8>, DataError>>,
    ) -> Result<PutOutcome, TransferError> {
        let max_size = self
            .core
            .attributes()
            .map(|a| a.buffer_max_size as usize)
            .unwrap_or(crate::connection::params::ROW_MAX_SIZE as usize);
        let max_row = BufferBuilder::max_row_len(max_size);

        let mut outcome = PutOutcome::default();
        let mut builder = BufferBuilder::new(max_size);
        // input index of every row in the current buffer
        let mut indices = Vec::new();

        for (row_index, result) in encoded.into_iter().enumerate() {
            let body = match result {
                Ok(body) if body.len() > max_row => {
                    self.reject_locally(
                        &mut outcome,
                        row_index,
                        format!(
                            "row of {} bytes exceeds the buffer limit of {}",
                            body.len(),
                            max_row
                        ),
                    );
                    continue;
                }
                Ok(body) => body,
                Err(e) => {
                    self.reject_locally(&mut outcome, row_index, e.to_string());
                    continue;
                }
            };

            if !builder.push(&body) {
                let full = std::mem::replace(&mut builder, BufferBuilder::new(max_size));
                self.submit(full, std::mem::take(&mut indices), &mut outcome)
                    .await?;
                builder.push(&body);
            }
            indices.push(row_index);
        }

        if !builder.is_empty() {
            self.submit(builder, indices, &mut outcome).await?;
        }

        outcome.rejected.sort_by_key(|e| match e {
            DataError::RowRejected { row_index, .. } => *row_index,
            _ => usize::MAX,
        });
        Ok(self.with_totals(outcome))
    }

    fn with_totals(&self, mut outcome: PutOutcome) -> PutOutcome {
        outcome.total_accepted = self.totals.accepted;
        outcome.total_rejected = self.totals.rejected;
        outcome
    }

    async fn submit(
        &mut self,
        builder: BufferBuilder,
        indices: Vec<usize>,
        outcome: &mut PutOutcome,
    ) -> Result<(), TransferError> {
        let reply = self.core.put_buffer(builder.finish()).await?;
        self.absorb(
            reply,
            |i| indices.get(i).copied().unwrap_or(i),
            outcome,
        );
        Ok(())
    }

    fn absorb(&mut self, reply: PutReply, index: impl Fn(usize) -> usize, outcome: &mut PutOutcome) {
        outcome.accepted += reply.accepted;
        self.totals.accepted += reply.accepted;
        for rejection in reply.rejected {
            let row_index = index(rejection.row_index);
            debug!(row_index, code = rejection.code, "row rejected by server");
            self.totals.rejected += 1;
            outcome.rejected.push(DataError::RowRejected {
                row_index,
                reason: format!("{} (code {})", rejection.reason, rejection.code),
            });
        }
    }

    fn reject_locally(&mut self, outcome: &mut PutOutcome, row_index: usize, reason: String) {
        debug!(row_index, reason = %reason, "row rejected before submission");
        self.totals.rejected += 1;
        self.core.summary_mut().rejected += 1;
        outcome.rejected.push(DataError::RowRejected { row_index, reason });
    }

    /// Submit every buffer received until all senders are dropped.
    pub async fn drain(&mut self, mut receiver: BufferReceiver) -> Result<LoadSummary, TransferError> {
        let mut buffers = 0u64;
        while let Some(buffer) = receiver.recv().await {
            self.put_buffer(buffer).await?;
            buffers += 1;
        }
        info!(buffers, accepted = self.totals.accepted, rejected = self.totals.rejected, "load drained");
        Ok(self.summary())
    }

    /// Error tables of the current target.
    pub fn error_tables(&self) -> Result<ErrorTables, SchemaError> {
        self.target
            .as_deref()
            .map(ErrorTables::for_target)
            .ok_or(SchemaError::NotSet)
    }

    /// Write the contents of both error tables as delimited text.
    ///
    /// Tables the engine did not create are skipped. Returns the number of
    /// rows written.
    pub async fn print_error_table<E, W>(
        &self,
        executor: &mut E,
        writer: &mut W,
    ) -> Result<usize, ReportError>
    where
        E: StatementExecutor,
        W: Write,
    {
        let tables = self.error_tables()?;
        let encoder = self.core.encoder();
        let mut written = 0;

        for table in [&tables.acquisition, &tables.application] {
            let result = match executor.query(&format!("select * from {}", table)).await {
                Ok(result) => result,
                Err(StatementError { code, .. }) if code == OBJECT_DOES_NOT_EXIST => {
                    debug!(table = %table, "error table does not exist");
                    continue;
                }
                Err(e) => {
                    warn!(table = %table, error = %e, "failed to read error table");
                    return Err(e.into());
                }
            };

            writeln!(writer, "{}", table)?;
            writeln!(writer, "{}", result.columns.join(encoder.delimiter()))?;
            for row in &result.rows {
                writeln!(writer, "{}", encoder.render_text(row))?;
                written += 1;
            }
        }
        Ok(written)
    }

    /// Terminate the job and report its completion code.
    pub async fn close(&mut self) -> Result<JobSummary, TransferError> {
        self.core.close().await
    }
}

#[async_trait]
impl<T: TransferProtocol> BulkSession for LoadSession<T> {
    fn state(&self) -> SessionState {
        self.core.state()
    }

    fn columns(&self) -> Result<&ColumnSchema, SchemaError> {
        self.core.columns()
    }

    async fn initiate(&mut self) -> Result<(), TransferError> {
        self.core.initiate().await
    }

    async fn close(&mut self) -> Result<JobSummary, TransferError> {
        self.core.close().await
    }
}
