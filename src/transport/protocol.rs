//! Transport protocol abstraction trait.
//!
//! This module defines the `TransferProtocol` trait that abstracts the
//! conversation with the engine's bulk-transfer endpoint. Sessions drive the
//! trait; the WebSocket implementation and test fixtures implement it.

use crate::channel::RowBuffer;
use crate::connection::NegotiatedAttribute;
use crate::error::TransportError;
use crate::types::ColumnSchema;
use async_trait::async_trait;

/// Connection parameters for establishing a transport connection.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Engine host
    pub host: String,
    /// Engine port
    pub port: u16,
    /// Use TLS/SSL
    pub use_tls: bool,
    /// Connection timeout in milliseconds
    pub timeout_ms: u64,
}

impl ConnectionParams {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            use_tls: false,
            timeout_ms: 30_000,
        }
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Build the WebSocket URL from parameters.
    pub fn to_websocket_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        if self.host.contains(':') {
            format!("{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

/// Which direction the job moves rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Export,
    Load,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Export => "EXPORT",
            Operator::Load => "LOAD",
        }
    }
}

/// Engine reply to the negotiation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationReply {
    Accepted,
    /// The engine refused the attribute with this wire name
    Rejected { wire_name: String, code: i32 },
}

/// Engine reply to one initiation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiateReply {
    /// Job started with this many sessions
    Ready { sessions: u32 },
    /// Job is queued behind others; try again later
    Queued,
    Rejected { code: i32, message: String },
}

/// Engine reply to a statement or target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaReply {
    Ready(ColumnSchema),
    Rejected { code: i32, message: String },
}

/// One row the engine refused, indexed within its buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRejection {
    pub row_index: usize,
    pub code: i32,
    pub reason: String,
}

/// Engine acknowledgement of one submitted buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutReply {
    pub accepted: u64,
    pub rejected: Vec<RemoteRejection>,
}

/// Transport protocol trait for the bulk-transfer conversation.
///
/// Calls are issued strictly in order: `connect`, `negotiate`, `initiate`
/// (repeated while queued), `set_query`/`set_target`, any number of
/// `get_buffer`/`put_buffer`, then `terminate`.
#[async_trait]
pub trait TransferProtocol: Send + Sync {
    /// Connect to the engine.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if connection fails.
    async fn connect(&mut self, params: &ConnectionParams) -> Result<(), TransportError>;

    /// Send every attribute as one negotiation step.
    async fn negotiate(
        &mut self,
        operator: Operator,
        attributes: &[NegotiatedAttribute],
    ) -> Result<NegotiationReply, TransportError>;

    /// Ask the engine to start the job.
    async fn initiate(&mut self) -> Result<InitiateReply, TransportError>;

    /// Submit an export statement and receive its column schema.
    async fn set_query(&mut self, sql: &str) -> Result<SchemaReply, TransportError>;

    /// Name the load target table and receive its column schema.
    async fn set_target(&mut self, table: &str) -> Result<SchemaReply, TransportError>;

    /// Next export buffer, or `None` at end of data.
    async fn get_buffer(&mut self) -> Result<Option<RowBuffer>, TransportError>;

    /// Submit one load buffer.
    async fn put_buffer(&mut self, buffer: RowBuffer) -> Result<PutReply, TransportError>;

    /// End the job and return the engine's completion code.
    async fn terminate(&mut self) -> Result<u16, TransportError>;

    /// Drop the connection immediately without a termination exchange.
    fn abort(&mut self);

    /// Check if the connection is still active.
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_params_url() {
        let params = ConnectionParams::new("tdprod".to_string(), 1025);
        assert_eq!(params.to_websocket_url(), "ws://tdprod:1025");

        let params = params.with_tls(true).with_timeout(5_000);
        assert_eq!(params.to_websocket_url(), "wss://tdprod:1025");
        assert_eq!(params.timeout_ms, 5_000);

        let params = ConnectionParams::new("::1".to_string(), 1025);
        assert_eq!(params.to_websocket_url(), "ws://[::1]:1025");
    }

    #[test]
    fn test_operator_names() {
        assert_eq!(Operator::Export.as_str(), "EXPORT");
        assert_eq!(Operator::Load.as_str(), "LOAD");
    }

    #[test]
    fn test_put_reply_default() {
        let reply = PutReply::default();
        assert_eq!(reply.accepted, 0);
        assert!(reply.rejected.is_empty());
    }
}
