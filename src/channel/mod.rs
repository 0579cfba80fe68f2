//! Row buffers and the bounded channel used to move them.

mod buffer;
mod queue;

pub use buffer::{BufferBuilder, Frame, Frames, RowBuffer, FRAME_SIZE};
pub use queue::{BufferChannel, BufferReceiver, BufferSender, ChannelClosed};
