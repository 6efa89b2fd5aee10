//! Growable drain buffers and the vectored outbound queue for fdmsg.
//!
//! A [`DynBuffer`] is assembled once and drained from the front; an
//! [`OutboundQueue`] holds buffers awaiting transmission on one socket and
//! drains them opportunistically with a single vectored send per call,
//! carrying at most one file descriptor as ancillary data.
//!
//! This is the lowest layer of fdmsg; the framing protocol in
//! `fdmsg-channel` builds on top of it.

#[cfg(not(unix))]
compile_error!("fdmsg passes descriptors via SCM_RIGHTS and requires a Unix platform");

pub mod dynbuf;
pub mod error;
pub mod queue;

pub use dynbuf::DynBuffer;
pub use error::{BufferError, Result};
pub use queue::{DrainOutcome, OutboundQueue};
