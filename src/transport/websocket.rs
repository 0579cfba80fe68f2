//! WebSocket transport implementation.
//!
//! This module provides a WebSocket-based transport for the bulk-transfer
//! protocol: JSON control messages in text frames, row buffers in binary
//! frames.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::channel::RowBuffer;
use crate::connection::NegotiatedAttribute;
use crate::error::TransportError;
use crate::types::ColumnSchema;

use super::messages::{
    CommandRequest, ExceptionInfo, GetBufferData, InitiateData, NegotiateData, NegotiateRequest,
    PutBufferData, PutBufferRequest, Response, SchemaData, SetQueryRequest, SetTargetRequest,
    Status, TerminateData,
};
use super::protocol::{
    ConnectionParams, InitiateReply, NegotiationReply, Operator, PutReply, RemoteRejection,
    SchemaReply, TransferProtocol,
};

/// WebSocket transport implementation.
pub struct WebSocketTransport {
    /// WebSocket connection (None if not connected)
    ws_stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    state: ConnectionState,
}

/// Connection state tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connected,
    Closed,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            ws_stream: None,
            state: ConnectionState::Disconnected,
        }
    }

    fn stream(
        &mut self,
    ) -> Result<&mut WebSocketStream<MaybeTlsStream<TcpStream>>, TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        self.ws_stream.as_mut().ok_or(TransportError::NotConnected)
    }

    async fn send(&mut self, message: Message) -> Result<(), TransportError> {
        self.stream()?
            .send(message)
            .await
            .map_err(|e| TransportError::SendError(e.to_string()))
    }

    /// Next text or binary frame, skipping control frames.
    async fn receive(&mut self) -> Result<Message, TransportError> {
        let ws_stream = self.stream()?;
        loop {
            let message = ws_stream
                .next()
                .await
                .ok_or_else(|| TransportError::ReceiveError("Connection closed".to_string()))?
                .map_err(|e| TransportError::ReceiveError(e.to_string()))?;
            match message {
                Message::Text(_) | Message::Binary(_) => return Ok(message),
                Message::Close(_) => {
                    return Err(TransportError::ReceiveError(
                        "Connection closed by server".to_string(),
                    ))
                }
                _ => continue,
            }
        }
    }

    /// Send a JSON message and receive a JSON response.
    async fn send_receive<T, R>(&mut self, request: &T) -> Result<Response<R>, TransportError>
    where
        T: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let request_json = serde_json::to_string(request)?;
        self.send(Message::Text(request_json)).await?;
        self.receive_json().await
    }

    async fn receive_json<R>(&mut self) -> Result<Response<R>, TransportError>
    where
        R: serde::de::DeserializeOwned,
    {
        match self.receive().await? {
            Message::Text(text) => Ok(serde_json::from_str(&text)?),
            _ => Err(TransportError::InvalidResponse(
                "Expected a text frame, got binary".to_string(),
            )),
        }
    }

    async fn receive_binary(&mut self) -> Result<Vec<u8>, TransportError> {
        match self.receive().await? {
            Message::Binary(data) => Ok(data),
            _ => Err(TransportError::InvalidResponse(
                "Expected a binary buffer frame, got text".to_string(),
            )),
        }
    }

    async fn schema_request<T: serde::Serialize>(
        &mut self,
        request: &T,
    ) -> Result<SchemaReply, TransportError> {
        let response: Response<SchemaData> = self.send_receive(request).await?;
        match response.status {
            Status::Ok => {
                let data = required(response.response_data)?;
                let schema = ColumnSchema::from_descriptors(data.columns)
                    .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
                Ok(SchemaReply::Ready(schema))
            }
            _ => {
                let exception = response.exception.unwrap_or_else(ExceptionInfo::unknown);
                Ok(SchemaReply::Rejected {
                    code: exception.code,
                    message: exception.text,
                })
            }
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn required<T>(data: Option<T>) -> Result<T, TransportError> {
    data.ok_or_else(|| TransportError::InvalidResponse("Missing response data".to_string()))
}

/// Treat anything but `ok` as a transport-level failure.
fn expect_ok<T>(response: Response<T>) -> Result<Option<T>, TransportError> {
    match response.status {
        Status::Ok => Ok(response.response_data),
        _ => {
            let exception = response.exception.unwrap_or_else(ExceptionInfo::unknown);
            Err(TransportError::InvalidResponse(format!(
                "{} (code: {})",
                exception.text, exception.code
            )))
        }
    }
}

#[async_trait]
impl TransferProtocol for WebSocketTransport {
    async fn connect(&mut self, params: &ConnectionParams) -> Result<(), TransportError> {
        if self.state == ConnectionState::Connected {
            return Err(TransportError::WebSocketError(
                "Already connected".to_string(),
            ));
        }

        let url = params.to_websocket_url();
        debug!(url = %url, "connecting");

        let connect_future = connect_async(&url);
        let (ws_stream, _) = tokio::time::timeout(
            tokio::time::Duration::from_millis(params.timeout_ms),
            connect_future,
        )
        .await
        .map_err(|_| {
            TransportError::WebSocketError(format!(
                "Connection timeout after {}ms",
                params.timeout_ms
            ))
        })??;

        self.ws_stream = Some(ws_stream);
        self.state = ConnectionState::Connected;

        Ok(())
    }

    async fn negotiate(
        &mut self,
        operator: Operator,
        attributes: &[NegotiatedAttribute],
    ) -> Result<NegotiationReply, TransportError> {
        let request = NegotiateRequest::new(operator.as_str(), attributes);
        let response: Response<NegotiateData> = self.send_receive(&request).await?;

        match response.status {
            Status::Ok => Ok(NegotiationReply::Accepted),
            _ => {
                let exception = response.exception.unwrap_or_else(ExceptionInfo::unknown);
                let wire_name = response
                    .response_data
                    .and_then(|d| d.rejected_attribute)
                    .unwrap_or_default();
                Ok(NegotiationReply::Rejected {
                    wire_name,
                    code: exception.code,
                })
            }
        }
    }

    async fn initiate(&mut self) -> Result<InitiateReply, TransportError> {
        let response: Response<InitiateData> =
            self.send_receive(&CommandRequest::initiate()).await?;

        match response.status {
            Status::Ok => Ok(InitiateReply::Ready {
                sessions: required(response.response_data)?.sessions,
            }),
            Status::Queued => Ok(InitiateReply::Queued),
            Status::Error => {
                let exception = response.exception.unwrap_or_else(ExceptionInfo::unknown);
                Ok(InitiateReply::Rejected {
                    code: exception.code,
                    message: exception.text,
                })
            }
        }
    }

    async fn set_query(&mut self, sql: &str) -> Result<SchemaReply, TransportError> {
        self.schema_request(&SetQueryRequest::new(sql.to_string()))
            .await
    }

    async fn set_target(&mut self, table: &str) -> Result<SchemaReply, TransportError> {
        self.schema_request(&SetTargetRequest::new(table.to_string()))
            .await
    }

    async fn get_buffer(&mut self) -> Result<Option<RowBuffer>, TransportError> {
        let response: Response<GetBufferData> =
            self.send_receive(&CommandRequest::get_buffer()).await?;
        let data = required(expect_ok(response)?)?;
        if data.end_of_data {
            return Ok(None);
        }

        let bytes = self.receive_binary().await?;
        if data.num_bytes != 0 && bytes.len() != data.num_bytes {
            return Err(TransportError::InvalidResponse(format!(
                "Announced {} buffer bytes, received {}",
                data.num_bytes,
                bytes.len()
            )));
        }
        Ok(Some(RowBuffer::from_bytes(bytes)))
    }

    async fn put_buffer(&mut self, buffer: RowBuffer) -> Result<PutReply, TransportError> {
        let request_json = serde_json::to_string(&PutBufferRequest::new(buffer.len()))?;
        self.send(Message::Text(request_json)).await?;
        self.send(Message::Binary(buffer.into_bytes())).await?;

        let response: Response<PutBufferData> = self.receive_json().await?;
        let data = expect_ok(response)?.unwrap_or_default();
        Ok(PutReply {
            accepted: data.accepted,
            rejected: data
                .rejected
                .into_iter()
                .map(|r| RemoteRejection {
                    row_index: r.row_index,
                    code: r.code,
                    reason: r.reason,
                })
                .collect(),
        })
    }

    async fn terminate(&mut self) -> Result<u16, TransportError> {
        let response: Response<TerminateData> =
            self.send_receive(&CommandRequest::terminate()).await?;
        let code = required(expect_ok(response)?)?.completion_code;

        if let Some(mut ws_stream) = self.ws_stream.take() {
            let _ = ws_stream.close(None).await; // Ignore errors on close
        }
        self.state = ConnectionState::Closed;

        Ok(code)
    }

    fn abort(&mut self) {
        // dropping the stream closes the socket
        self.ws_stream = None;
        self.state = ConnectionState::Closed;
    }

    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_transport_new() {
        let transport = WebSocketTransport::new();
        assert!(!transport.is_connected());
        assert_eq!(transport.state, ConnectionState::Disconnected);
    }

    #[test]
    fn test_websocket_transport_default() {
        let transport = WebSocketTransport::default();
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_abort_closes() {
        let mut transport = WebSocketTransport::new();
        transport.state = ConnectionState::Connected;
        assert!(transport.is_connected());

        transport.abort();
        assert_eq!(transport.state, ConnectionState::Closed);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let mut transport = WebSocketTransport::new();

        assert_eq!(
            transport.initiate().await.unwrap_err(),
            TransportError::NotConnected
        );
        assert_eq!(
            transport.get_buffer().await.unwrap_err(),
            TransportError::NotConnected
        );
        assert_eq!(
            transport.terminate().await.unwrap_err(),
            TransportError::NotConnected
        );
    }

    #[tokio::test]
    async fn test_connect_requires_disconnected_state() {
        let mut transport = WebSocketTransport::new();
        transport.state = ConnectionState::Connected;

        let params = ConnectionParams::new("localhost".to_string(), 1025);
        let result = transport.connect(&params).await;

        assert!(matches!(
            result,
            Err(TransportError::WebSocketError(msg)) if msg.contains("Already connected")
        ));
    }

    #[test]
    fn test_expect_ok_maps_exception() {
        let response: Response<TerminateData> = Response {
            status: Status::Error,
            response_data: None,
            exception: Some(ExceptionInfo {
                code: 2631,
                text: "Transaction aborted".to_string(),
            }),
        };
        let err = expect_ok(response).unwrap_err();
        assert!(matches!(
            err,
            TransportError::InvalidResponse(msg) if msg.contains("2631") && msg.contains("aborted")
        ));
    }
}
