//! WebSocket message types for the bulk-transfer protocol.
//!
//! Control messages are JSON text frames. Row buffers travel as binary frames
//! right after a `getBuffer` reply that is not end-of-data, or right after a
//! `putBuffer` command.

use crate::connection::NegotiatedAttribute;
use crate::types::ColumnDescriptor;
use serde::{Deserialize, Serialize};

/// Request carrying nothing but its command name.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRequest {
    pub command: &'static str,
}

impl CommandRequest {
    pub fn initiate() -> Self {
        Self {
            command: "initiate",
        }
    }

    pub fn get_buffer() -> Self {
        Self {
            command: "getBuffer",
        }
    }

    pub fn terminate() -> Self {
        Self {
            command: "terminate",
        }
    }
}

/// Negotiation request with every attribute keyed by its wire name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateRequest {
    pub command: &'static str,
    pub operator: &'static str,
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl NegotiateRequest {
    pub fn new(operator: &'static str, attributes: &[NegotiatedAttribute]) -> Self {
        Self {
            command: "negotiate",
            operator,
            attributes: attributes
                .iter()
                .map(|a| (a.wire_name.to_string(), a.value.to_wire()))
                .collect(),
        }
    }
}

/// Export statement request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetQueryRequest {
    pub command: &'static str,
    pub sql_text: String,
}

impl SetQueryRequest {
    pub fn new(sql: String) -> Self {
        Self {
            command: "setQuery",
            sql_text: sql,
        }
    }
}

/// Load target request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTargetRequest {
    pub command: &'static str,
    pub table: String,
}

impl SetTargetRequest {
    pub fn new(table: String) -> Self {
        Self {
            command: "setTarget",
            table,
        }
    }
}

/// Announces the binary buffer frame that follows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutBufferRequest {
    pub command: &'static str,
    pub num_bytes: usize,
}

impl PutBufferRequest {
    pub fn new(num_bytes: usize) -> Self {
        Self {
            command: "putBuffer",
            num_bytes,
        }
    }
}

/// Reply status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Queued,
    Error,
}

/// Reply envelope shared by every command.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response<T> {
    pub status: Status,
    pub response_data: Option<T>,
    pub exception: Option<ExceptionInfo>,
}

/// Error details from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExceptionInfo {
    pub code: i32,
    pub text: String,
}

impl ExceptionInfo {
    pub fn unknown() -> Self {
        Self {
            code: -1,
            text: "Unknown error".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateData {
    /// Wire name of the refused attribute
    pub rejected_attribute: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateData {
    pub sessions: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaData {
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBufferData {
    pub end_of_data: bool,
    #[serde(default)]
    pub num_bytes: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutBufferData {
    pub accepted: u64,
    #[serde(default)]
    pub rejected: Vec<RejectedRow>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRow {
    pub row_index: usize,
    pub code: i32,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateData {
    pub completion_code: u16,
}
