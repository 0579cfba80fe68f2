//! Export session: runs a statement on the engine and streams the result
//! rows back as buffers.

use crate::arrow_conversion::ArrowConverter;
use crate::channel::{BufferSender, RowBuffer};
use crate::codec::settings::{
    DATETIME_AS_STRING, DECIMAL_AS_FLOAT, DECIMAL_AS_STRING, ROW_ENCODING_DICT,
    ROW_ENCODING_LIST, ROW_ENCODING_RAW, ROW_ENCODING_STRING,
};
use crate::codec::{ArchiveWriter, Record, RowEncoder, Rows, Value};
use crate::connection::SessionAttributes;
use crate::error::{ArchiveError, ConfigurationError, SchemaError, TransferError};
use crate::session::completion::JobSummary;
use crate::session::lifecycle::{BulkSession, SchemaSource, SessionCore};
use crate::session::state::SessionState;
use crate::transport::{Operator, TransferProtocol, WebSocketTransport};
use crate::types::ColumnSchema;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::io::Write;
use tracing::{debug, info, warn};

/// Bulk export of one or more statements over a single job.
///
/// # Example
///
/// ```no_run
/// # use tdbulk::{ExportSession, SessionAttributes};
/// # async fn example() -> Result<(), tdbulk::TransferError> {
/// let attrs = SessionAttributes::builder()
///     .host("tdprod")
///     .username("dbc")
///     .password("dbc")
///     .build()?;
///
/// let mut export = ExportSession::new();
/// export.configure(attrs)?;
/// export.initiate().await?;
/// export.set_query("select * from dbc.dbcinfo").await?;
///
/// while let Some(records) = export.next_records().await? {
///     for record in records {
///         println!("{:?}", record);
///     }
/// }
/// export.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct ExportSession<T: TransferProtocol = WebSocketTransport> {
    core: SessionCore<T>,
    query: Option<String>,
    coerce_floats: bool,
}

impl ExportSession<WebSocketTransport> {
    pub fn new() -> Self {
        Self::with_transport(WebSocketTransport::new())
    }
}

impl Default for ExportSession<WebSocketTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TransferProtocol> ExportSession<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            core: SessionCore::new(transport, Operator::Export),
            query: None,
            coerce_floats: false,
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

    /// Configure from string options; see [`SessionAttributes::from_options`].
    pub fn configure_options<I, K, V>(&mut self, opts: I) -> Result<(), TransferError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let attrs = SessionAttributes::from_options(opts)?;
        self.core.configure(attrs)
    }

    /// Negotiate attributes without starting the job.
    pub async fn apply(&mut self) -> Result<(), TransferError> {
        self.core.apply().await
    }

    pub async fn initiate(&mut self) -> Result<(), TransferError> {
        self.core.initiate().await
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    /// Number of sessions the engine allocated.
    pub fn sessions(&self) -> u32 {
        self.core.sessions()
    }

    pub fn columns(&self) -> Result<&ColumnSchema, SchemaError> {
        self.core.columns()
    }

    /// Normalized text of the current statement.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
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

    /// Column names joined by the current delimiter.
    pub fn header(&self) -> Result<String, SchemaError> {
        let schema = self.core.columns()?;
        Ok(schema.header(self.core.encoder().delimiter()))
    }

    pub fn summary(&self) -> &JobSummary {
        self.core.summary()
    }

    /// Return decimals as floats from [`fetch_values`](Self::fetch_values),
    /// [`fetch_dicts`](Self::fetch_dicts) and [`fetch_json`](Self::fetch_json).
    pub fn set_coerce_floats(&mut self, coerce: bool) {
        self.coerce_floats = coerce;
    }

    pub fn coerce_floats(&self) -> bool {
        self.coerce_floats
    }

    /// Set the statement to export and fetch its schema.
    ///
    /// Setting the statement that is already active does nothing.
    pub async fn set_query(&mut self, sql: &str) -> Result<&ColumnSchema, TransferError> {
        let statement = normalize_statement(sql)?;
        let unchanged = self.query.as_deref() == Some(statement.as_str())
            && self.core.columns().is_ok();
        if !unchanged {
            debug!(statement = %statement, "setting export statement");
            self.query = None;
            self.core
                .set_schema(SchemaSource::Query(&statement))
                .await?;
            self.query = Some(statement);
        }
        Ok(self.core.columns()?)
    }

    /// Next raw buffer, or `None` at end of data.
    pub async fn get_buffer(&mut self) -> Result<Option<RowBuffer>, TransferError> {
        self.core.get_buffer().await
    }

    /// Lazily decode a buffer with the current encoding settings.
    pub fn decode<'a>(&'a self, buffer: &'a RowBuffer) -> Result<Rows<'a>, SchemaError> {
        let schema = self.core.columns()?;
        Ok(self.core.encoder().decode(buffer, schema))
    }

    /// Fetch and decode the next buffer.
    ///
    /// A buffer that fails to decode fails the session.
    pub async fn next_records(&mut self) -> Result<Option<Vec<Record>>, TransferError> {
        let buffer = match self.core.get_buffer().await? {
            Some(buffer) => buffer,
            None => return Ok(None),
        };
        let decoded = self.decode(&buffer)?.collect::<Result<Vec<_>, _>>();
        match decoded {
            Ok(records) => Ok(Some(records)),
            Err(e) => Err(self.core.fail(e)),
        }
    }

    /// Decode every remaining row of the current statement.
    pub async fn fetch_all(&mut self) -> Result<Vec<Record>, TransferError> {
        let mut all = Vec::new();
        while let Some(records) = self.next_records().await? {
            all.extend(records);
        }
        Ok(all)
    }

    fn shape_rows(&mut self, row_mode: u32) -> Result<(), ConfigurationError> {
        let mask = if self.coerce_floats {
            row_mode | DECIMAL_AS_FLOAT
        } else {
            row_mode
        };
        self.core.set_encoding(mask)
    }

    /// Every remaining row as positional values.
    pub async fn fetch_values(&mut self) -> Result<Vec<Vec<Value>>, TransferError> {
        self.shape_rows(ROW_ENCODING_LIST)?;
        let records = self.fetch_all().await?;
        Ok(records.into_iter().filter_map(Record::into_values).collect())
    }

    /// Every remaining row as `Dict` records.
    pub async fn fetch_dicts(&mut self) -> Result<Vec<Record>, TransferError> {
        self.shape_rows(ROW_ENCODING_DICT)?;
        self.fetch_all().await
    }

    /// Every remaining row as a JSON object keyed by column name.
    pub async fn fetch_json(&mut self) -> Result<Vec<serde_json::Value>, TransferError> {
        let records = self.fetch_dicts().await?;
        Ok(records.iter().map(Record::to_json).collect())
    }

    /// Every remaining row as delimited text, every field in its text form.
    pub async fn fetch_strings(&mut self) -> Result<Vec<String>, TransferError> {
        self.core
            .set_encoding(ROW_ENCODING_STRING | DATETIME_AS_STRING | DECIMAL_AS_STRING)?;
        let records = self.fetch_all().await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                Record::Text(line) => Some(line),
                _ => None,
            })
            .collect())
    }

    /// Write every remaining row, undecoded, to an archive with the schema.
    ///
    /// The encoding settings in effect before the call are restored
    /// afterwards. Returns the number of rows written.
    pub async fn archive<W: Write>(&mut self, writer: W) -> Result<u64, ArchiveError> {
        let schema = self.core.columns().map_err(TransferError::from)?.clone();
        let mut archive = ArchiveWriter::new(writer, &schema)?;
        let previous = self.core.encoder().settings();
        self.core
            .set_encoding(ROW_ENCODING_RAW)
            .map_err(TransferError::from)?;

        let written = self.write_archive(&mut archive).await;
        self.core.restore_settings(previous);
        written?;

        let rows = archive.rows();
        archive.finish()?;
        info!(rows, "archive written");
        Ok(rows)
    }

    async fn write_archive<W: Write>(
        &mut self,
        archive: &mut ArchiveWriter<W>,
    ) -> Result<(), ArchiveError> {
        while let Some(records) = self.next_records().await? {
            for record in records {
                if let Record::Raw(framed) = record {
                    archive.write_row(&framed)?;
                }
            }
        }
        Ok(())
    }

    /// Fetch the next buffer as an Arrow batch.
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>, TransferError> {
        let buffer = match self.core.get_buffer().await? {
            Some(buffer) => buffer,
            None => return Ok(None),
        };
        let result = ArrowConverter::to_record_batch(&buffer, self.core.columns()?);
        match result {
            Ok(batch) => Ok(Some(batch)),
            Err(e @ TransferError::Protocol(_)) => Err(self.core.fail(e)),
            Err(e) => Err(e),
        }
    }

    /// Forward every remaining buffer into a channel.
    ///
    /// Waits whenever the channel is full. Stops early, without error, if the
    /// receiver goes away. Returns the number of buffers forwarded.
    pub async fn pump(&mut self, sender: BufferSender) -> Result<u64, TransferError> {
        let mut forwarded = 0;
        while let Some(buffer) = self.core.get_buffer().await? {
            if sender.send(buffer).await.is_err() {
                warn!(forwarded, "buffer receiver dropped, stopping export");
                break;
            }
            forwarded += 1;
        }
        info!(forwarded, "export pump finished");
        Ok(forwarded)
    }

    /// Terminate the job and report its completion code.
    pub async fn close(&mut self) -> Result<JobSummary, TransferError> {
        self.query = None;
        self.core.close().await
    }
}

#[async_trait]
impl<T: TransferProtocol> BulkSession for ExportSession<T> {
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
        ExportSession::close(self).await
    }
}

/// Normalize caller statement text before it is sent.
///
/// Curly quotes are straightened and surrounding whitespace and semicolons
/// removed. Only the first statement is kept. A bare table name becomes
/// `select * from <name>`.
pub fn normalize_statement(sql: &str) -> Result<String, SchemaError> {
    let straightened: String = sql
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            c => c,
        })
        .collect();

    let (first, rest) = split_first_statement(&straightened);
    if !rest.trim_matches(|c: char| c == ';' || c.is_whitespace()).is_empty() {
        warn!("multiple statements given, only the first is exported");
    }

    let statement = first.trim();
    if statement.is_empty() {
        return Err(SchemaError::EmptyStatement);
    }

    if statement.split_whitespace().nth(1).is_none() && !is_select_keyword(statement) {
        return Ok(format!("select * from {}", statement));
    }
    Ok(statement.to_string())
}

fn is_select_keyword(word: &str) -> bool {
    word.eq_ignore_ascii_case("select") || word.eq_ignore_ascii_case("sel")
}

/// Split at the first `;` outside quotes and comments.
fn split_first_statement(sql: &str) -> (&str, &str) {
    let bytes = sql.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'-' if bytes.get(i + 1) == Some(&b'-') => {
                    while i < bytes.len() && bytes[i] != b'\n' {
                        i += 1;
                    }
                    continue;
                }
                b';' => return (&sql[..i], &sql[i + 1..]),
                _ => {}
            },
        }
        i += 1;
    }
    (sql, "")
}
