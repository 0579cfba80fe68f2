//! Bounded buffer hand-off between a session and a consumer or producer.

use crate::channel::buffer::RowBuffer;
use thiserror::Error;
use tokio::sync::mpsc;

/// Constructor for a bounded channel of row buffers.
///
/// At most `capacity` buffers are in flight; senders wait while the channel
/// is full.
pub struct BufferChannel;

impl BufferChannel {
    pub fn bounded(capacity: usize) -> (BufferSender, BufferReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (BufferSender { tx }, BufferReceiver { rx })
    }
}

/// Returned when the other half of the channel has been dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("buffer channel closed")]
pub struct ChannelClosed(pub RowBuffer);

/// Producing half. Cloneable so several producers can feed one session.
#[derive(Debug, Clone)]
pub struct BufferSender {
    tx: mpsc::Sender<RowBuffer>,
}

impl BufferSender {
    /// Send a buffer, waiting for capacity.
    pub async fn send(&self, buffer: RowBuffer) -> Result<(), ChannelClosed> {
        self.tx.send(buffer).await.map_err(|e| ChannelClosed(e.0))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming half.
#[derive(Debug)]
pub struct BufferReceiver {
    rx: mpsc::Receiver<RowBuffer>,
}

impl BufferReceiver {
    /// Next buffer, or `None` once every sender is dropped and the channel is
    /// drained.
    pub async fn recv(&mut self) -> Option<RowBuffer> {
        self.rx.recv().await
    }

    /// Stop accepting new buffers; already queued ones can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
