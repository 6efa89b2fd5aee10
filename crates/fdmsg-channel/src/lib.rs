//! Typed message framing with single-descriptor passing.
//!
//! This is the core value-add layer of fdmsg. Every message is a
//! length-prefixed frame (type, flags, peer id, sender pid), optionally
//! accompanied by one file descriptor transferred as ancillary data on the
//! call that carries the frame's first bytes. [`ChannelTransport`] turns a
//! connected stream socket into discrete [`Message`]s: partial reads and
//! writes are resumable, descriptors arrive exactly once, and resource
//! exhaustion surfaces as retryable backpressure instead of failure.

pub mod codec;
pub mod error;
pub mod reader;
pub mod transport;

pub use codec::{Header, Message, FLAG_HAS_DESCRIPTOR, HEADER_SIZE, MAX_FRAME_SIZE};
pub use error::{ChannelError, Result};
pub use fdmsg_buffer::DrainOutcome;
pub use reader::ReceiveOutcome;
pub use transport::ChannelTransport;
