//! Typed, descriptor-passing IPC messaging over Unix stream sockets.
//!
//! fdmsg exchanges length-prefixed, typed messages between two cooperating
//! processes, each message optionally carrying one file descriptor as
//! socket ancillary data. Writes are vectored and resumable, reads
//! reassemble frames across partial receives, and descriptor-table
//! pressure surfaces as retryable backpressure.
//!
//! # Crate Structure
//!
//! - [`buffer`] — growable drain buffers and the vectored outbound queue
//! - [`transport`] — Unix socket setup and descriptor-table budgeting
//! - [`channel`] — the framing protocol and [`channel::ChannelTransport`]

/// Re-export buffer types.
pub mod buffer {
    pub use fdmsg_buffer::*;
}

/// Re-export transport types.
pub mod transport {
    pub use fdmsg_transport::*;
}

/// Re-export channel types.
pub mod channel {
    pub use fdmsg_channel::*;
}
