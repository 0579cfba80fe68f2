//! Transport layer for the bulk-transfer protocol.
//!
//! The transport layer is organized into:
//! - `protocol` - Transport protocol trait definition
//! - `messages` - Protocol message types
//! - `websocket` - WebSocket transport implementation
//!
//! Sessions only talk to [`TransferProtocol`], so tests can substitute an
//! in-memory engine.

pub mod messages;
pub mod protocol;
pub mod websocket;

pub use protocol::{
    ConnectionParams, InitiateReply, NegotiationReply, Operator, PutReply, RemoteRejection,
    SchemaReply, TransferProtocol,
};
pub use websocket::WebSocketTransport;
