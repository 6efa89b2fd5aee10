//! Socket plumbing for fdmsg.
//!
//! Provides the pieces the framing layer treats as collaborators: Unix
//! domain socket setup ([`Listener`], [`connect`], [`socket_pair`]) and the
//! process descriptor-table budget ([`DescriptorBudget`]) used for
//! receive-side backpressure.

#[cfg(not(unix))]
compile_error!("fdmsg passes descriptors via SCM_RIGHTS and requires a Unix platform");

pub mod error;
pub mod fdtable;
pub mod uds;

pub use error::{Result, TransportError};
pub use fdtable::{DescriptorBudget, ProcessFdTable};
pub use uds::{connect, socket_pair, Listener, DEFAULT_SOCKET_MODE};
