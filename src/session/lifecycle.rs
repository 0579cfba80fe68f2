//! State machine shared by export and load sessions.

use crate::channel::RowBuffer;
use crate::codec::{EncodingSettings, RowEncoder, Value};
use crate::connection::SessionAttributes;
use crate::error::{
    ConfigurationError, NegotiationError, ProtocolError, SchemaError, TransferError,
};
use crate::session::completion::{CompletionCode, JobSummary};
use crate::session::state::SessionState;
use crate::transport::{
    ConnectionParams, InitiateReply, NegotiationReply, Operator, PutReply, SchemaReply,
    TransferProtocol,
};
use crate::types::ColumnSchema;
use async_trait::async_trait;
use tokio::time::{sleep, timeout, timeout_at, Duration, Instant};
use tracing::{debug, error, info, warn};

/// What a schema request names.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SchemaSource<'a> {
    Query(&'a str),
    Table(&'a str),
}

/// Operations common to every session direction.
#[async_trait]
pub trait BulkSession: Send {
    fn state(&self) -> SessionState;

    /// Schema of the current statement or target.
    fn columns(&self) -> Result<&ColumnSchema, SchemaError>;

    /// Negotiate attributes and start the job.
    async fn initiate(&mut self) -> Result<(), TransferError>;

    /// Terminate the job. Idempotent.
    async fn close(&mut self) -> Result<JobSummary, TransferError>;
}

pub(crate) struct SessionCore<T: TransferProtocol> {
    transport: T,
    operator: Operator,
    state: SessionState,
    attributes: Option<SessionAttributes>,
    negotiated: bool,
    encoder: RowEncoder,
    schema: Option<ColumnSchema>,
    sessions: u32,
    end_of_data: bool,
    closed: bool,
    summary: JobSummary,
}

impl<T: TransferProtocol> SessionCore<T> {
    pub fn new(transport: T, operator: Operator) -> Self {
        Self {
            transport,
            operator,
            state: SessionState::Created,
            attributes: None,
            negotiated: false,
            encoder: RowEncoder::new(),
            schema: None,
            sessions: 0,
            end_of_data: false,
            closed: false,
            summary: JobSummary::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attributes(&self) -> Option<&SessionAttributes> {
        self.attributes.as_ref()
    }

    pub fn sessions(&self) -> u32 {
        self.sessions
    }

    pub fn summary(&self) -> &JobSummary {
        &self.summary
    }

    pub fn summary_mut(&mut self) -> &mut JobSummary {
        &mut self.summary
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn encoder(&self) -> &RowEncoder {
        &self.encoder
    }

    pub fn columns(&self) -> Result<&ColumnSchema, SchemaError> {
        self.schema.as_ref().ok_or(SchemaError::NotSet)
    }

    fn tenacity_hours(&self) -> u32 {
        self.attributes.as_ref().map_or(1, |a| a.tenacity_hours)
    }

    /// Longest wait for any single engine reply.
    fn tenacity_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.tenacity_hours()) * 3600)
    }

    /// Abort a transport that stopped answering and fail the session.
    fn stalled(&mut self, operation: &'static str) -> TransferError {
        let hours = self.tenacity_hours();
        self.transport.abort();
        self.fail(ProtocolError::Stalled { operation, hours })
    }

    fn reject(&self, operation: &'static str) -> ConfigurationError {
        ConfigurationError::InvalidStateTransition {
            operation,
            state: self.state,
        }
    }

    /// Move to `Failed`, returning the error that caused it.
    pub fn fail(&mut self, err: impl Into<TransferError>) -> TransferError {
        let err = err.into();
        error!(error = %err, state = %self.state, "session failed");
        self.state = SessionState::Failed;
        err
    }

    pub fn configure(&mut self, attrs: SessionAttributes) -> Result<(), TransferError> {
        if !matches!(self.state, SessionState::Created | SessionState::Configured) {
            return Err(self.reject("configure attributes").into());
        }
        attrs.validate()?;

        if self.transport.is_connected() {
            // reconnect on the next apply, possibly to a different host
            self.transport.abort();
        }
        info!(attributes = %attrs, operator = self.operator.as_str(), "session configured");
        self.attributes = Some(attrs);
        self.negotiated = false;
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Connect if needed and negotiate every attribute in one step.
    ///
    /// A rejected attribute leaves the session `Configured` so it can be
    /// reconfigured and retried.
    pub async fn apply(&mut self) -> Result<(), TransferError> {
        if self.state != SessionState::Configured {
            return Err(self.reject("apply attributes").into());
        }
        if self.negotiated {
            return Ok(());
        }
        let attrs = match &self.attributes {
            Some(attrs) => attrs,
            None => return Err(self.reject("apply attributes").into()),
        };

        let unreachable = |message: String| NegotiationError::Unreachable {
            host: attrs.host.clone(),
            port: attrs.port,
            message,
        };

        if !self.transport.is_connected() {
            let params = ConnectionParams::new(attrs.host.clone(), attrs.port);
            self.transport
                .connect(&params)
                .await
                .map_err(|e| unreachable(e.to_string()))?;
        }

        let attributes = attrs.negotiation_attributes();
        debug!(?attributes, "negotiating session attributes");
        match self.transport.negotiate(self.operator, &attributes).await {
            Ok(NegotiationReply::Accepted) => {
                info!(host = %attrs.host, "attributes accepted");
                self.negotiated = true;
                Ok(())
            }
            Ok(NegotiationReply::Rejected { wire_name, code }) => {
                let key = attributes
                    .iter()
                    .find(|a| a.wire_name.eq_ignore_ascii_case(&wire_name))
                    .map(|a| a.key.to_string())
                    .unwrap_or(wire_name);
                warn!(key = %key, code, "attribute rejected by server");
                Err(NegotiationError::AttributeRejected {
                    key,
                    remote_code: code,
                }
                .into())
            }
            Err(e) => {
                let err = unreachable(e.to_string());
                self.transport.abort();
                Err(err.into())
            }
        }
    }

    /// Start the job, waiting out queueing within the tenacity window.
    pub async fn initiate(&mut self) -> Result<(), TransferError> {
        if self.state != SessionState::Configured {
            return Err(self.reject("initiate").into());
        }
        self.apply().await?;

        let (host, port, hours, pause, min, max) = match &self.attributes {
            Some(a) => (
                a.host.clone(),
                a.port,
                a.tenacity_hours,
                Duration::from_secs(u64::from(a.tenacity_sleep_seconds)),
                a.min_sessions,
                a.max_sessions,
            ),
            None => return Err(self.reject("initiate").into()),
        };
        let deadline = Instant::now() + self.tenacity_window();

        loop {
            let reply = match timeout_at(deadline, self.transport.initiate()).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    // lost the engine before a job existed; retry from Configured
                    warn!(error = %e, "connection lost during initiation");
                    self.transport.abort();
                    self.negotiated = false;
                    return Err(NegotiationError::Unreachable {
                        host,
                        port,
                        message: e.to_string(),
                    }
                    .into());
                }
                Err(_) => {
                    self.transport.abort();
                    return Err(self.fail(NegotiationError::TenacityExhausted { hours }));
                }
            };
            match reply {
                InitiateReply::Ready { sessions } => {
                    if sessions < min || sessions > max {
                        return Err(self.fail(ProtocolError::SessionPoolOutOfBounds {
                            allocated: sessions,
                            min,
                            max,
                        }));
                    }
                    info!(sessions, operator = self.operator.as_str(), "job initiated");
                    self.sessions = sessions;
                    self.state = SessionState::Initiated;
                    return Ok(());
                }
                InitiateReply::Queued => {
                    if Instant::now() + pause > deadline {
                        return Err(self.fail(NegotiationError::TenacityExhausted { hours }));
                    }
                    debug!(retry_in = ?pause, "job queued");
                    sleep(pause).await;
                }
                InitiateReply::Rejected { code, message } => {
                    return Err(self.fail(NegotiationError::InitiationError {
                        remote_code: code,
                        message,
                    }));
                }
            }
        }
    }

    /// Fetch the schema for a statement or target, replacing any previous one.
    pub async fn set_schema(
        &mut self,
        source: SchemaSource<'_>,
    ) -> Result<&ColumnSchema, TransferError> {
        if !self.state.can_set_schema() {
            return Err(self.reject("set a statement or target").into());
        }

        let window = self.tenacity_window();
        let result = match source {
            SchemaSource::Query(sql) => timeout(window, self.transport.set_query(sql)).await,
            SchemaSource::Table(table) => timeout(window, self.transport.set_target(table)).await,
        };
        let reply = match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(self.fail(e)),
            Err(_) => return Err(self.stalled("fetch a schema")),
        };

        match reply {
            SchemaReply::Ready(schema) => {
                info!(columns = schema.len(), "schema ready");
                self.encoder.bind_schema(schema.clone());
                self.state = SessionState::SchemaReady;
                self.end_of_data = false;
                Ok(&*self.schema.insert(schema))
            }
            SchemaReply::Rejected { code, message } => {
                self.schema = None;
                self.encoder.unbind_schema();
                self.state = SessionState::Initiated;
                let err = match source {
                    SchemaSource::Query(_) => SchemaError::InvalidStatement {
                        remote_code: code,
                        message,
                    },
                    SchemaSource::Table(table) => SchemaError::InvalidTarget {
                        table: table.to_string(),
                        remote_code: code,
                        message,
                    },
                };
                warn!(error = %err, "schema request rejected");
                Err(err.into())
            }
        }
    }

    fn require_transfer(&self, operation: &'static str) -> Result<(), TransferError> {
        match self.state {
            SessionState::SchemaReady | SessionState::Transferring => Ok(()),
            SessionState::Initiated => Err(SchemaError::NotSet.into()),
            _ => Err(self.reject(operation).into()),
        }
    }

    pub async fn get_buffer(&mut self) -> Result<Option<RowBuffer>, TransferError> {
        self.require_transfer("get a buffer")?;
        if self.end_of_data {
            return Ok(None);
        }

        let reply = match timeout(self.tenacity_window(), self.transport.get_buffer()).await {
            Ok(reply) => reply,
            Err(_) => return Err(self.stalled("get a buffer")),
        };
        match reply {
            Ok(Some(buffer)) => {
                let rows = match buffer.declared_rows() {
                    Ok(rows) => rows,
                    Err(e) => return Err(self.fail(e)),
                };
                self.state = SessionState::Transferring;
                self.summary.buffers += 1;
                self.summary.rows += rows as u64;
                debug!(bytes = buffer.len(), rows, "buffer received");
                Ok(Some(buffer))
            }
            Ok(None) => {
                info!(
                    buffers = self.summary.buffers,
                    rows = self.summary.rows,
                    "end of data"
                );
                self.end_of_data = true;
                self.state = SessionState::SchemaReady;
                Ok(None)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub async fn put_buffer(&mut self, buffer: RowBuffer) -> Result<PutReply, TransferError> {
        self.require_transfer("put a buffer")?;
        let rows = buffer.frames().try_fold(0usize, |n, frame| frame.map(|_| n + 1))?;

        self.state = SessionState::Transferring;
        let bytes = buffer.len();
        let reply = match timeout(self.tenacity_window(), self.transport.put_buffer(buffer)).await {
            Ok(reply) => reply,
            Err(_) => return Err(self.stalled("put a buffer")),
        };
        match reply {
            Ok(reply) => {
                let answered = reply.accepted + reply.rejected.len() as u64;
                if answered != rows as u64 || reply.rejected.iter().any(|r| r.row_index >= rows) {
                    return Err(self.fail(ProtocolError::Desync(format!(
                        "server answered for {} rows ({} accepted) of a {}-row buffer",
                        answered, reply.accepted, rows
                    ))));
                }
                self.summary.buffers += 1;
                self.summary.rows += reply.accepted;
                self.summary.rejected += reply.rejected.len() as u64;
                debug!(
                    bytes,
                    rows,
                    accepted = reply.accepted,
                    rejected = reply.rejected.len(),
                    "buffer submitted"
                );
                Ok(reply)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn require_mutable_encoding(&self, operation: &'static str) -> Result<(), ConfigurationError> {
        if self.state == SessionState::Transferring {
            return Err(self.reject(operation));
        }
        Ok(())
    }

    pub fn set_encoding(&mut self, mask: u32) -> Result<(), ConfigurationError> {
        self.require_mutable_encoding("set encoding")?;
        self.encoder.set_encoding(mask)
    }

    /// Put back settings saved before an internal mode switch.
    pub fn restore_settings(&mut self, settings: EncodingSettings) {
        self.encoder.set_settings(settings);
    }

    pub fn set_null(&mut self, value: Value) -> Result<(), ConfigurationError> {
        self.require_mutable_encoding("set null")?;
        self.encoder.set_null(value)
    }

    pub fn set_delimiter(&mut self, value: Value) -> Result<(), ConfigurationError> {
        self.require_mutable_encoding("set delimiter")?;
        self.encoder.set_delimiter(value)
    }

    fn outcome(&self) -> Result<JobSummary, TransferError> {
        match self.summary.code {
            Some(code) if !code.is_success() => Err(TransferError::JobFailed { code }),
            _ => Ok(self.summary.clone()),
        }
    }

    /// Terminate the remote job.
    ///
    /// The first call decides the outcome; later calls return it again.
    pub async fn close(&mut self) -> Result<JobSummary, TransferError> {
        if self.closed {
            return self.outcome();
        }
        self.closed = true;

        let initiated = self.state.is_active() || self.state == SessionState::Failed;
        if initiated && self.transport.is_connected() {
            match timeout(self.tenacity_window(), self.transport.terminate()).await {
                Ok(Ok(code)) => {
                    let code = CompletionCode::from_code(code);
                    info!(%code, "job terminated");
                    self.summary.code = Some(code);
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "failed to terminate session cleanly");
                    self.transport.abort();
                }
                Err(_) => {
                    warn!("no reply to terminate, aborting");
                    self.transport.abort();
                }
            }
        } else if self.transport.is_connected() {
            self.transport.abort();
        }

        self.schema = None;
        self.encoder.unbind_schema();
        if self.state != SessionState::Failed {
            self.state = SessionState::Closed;
        }
        self.outcome()
    }
}

impl<T: TransferProtocol> Drop for SessionCore<T> {
    fn drop(&mut self) {
        if !self.closed && self.transport.is_connected() {
            warn!(state = %self.state, "session dropped without close, aborting");
            self.transport.abort();
        }
    }
}
