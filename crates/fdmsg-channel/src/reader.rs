use std::collections::VecDeque;
use std::io::{ErrorKind, IoSliceMut};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};

use fdmsg_buffer::DynBuffer;
use fdmsg_transport::DescriptorBudget;
use nix::errno::Errno;
use nix::sys::socket::{recvmsg, ControlMessageOwned, MsgFlags};
use tracing::debug;

use crate::error::{ChannelError, Result};

/// Descriptors one receive can still import under control-data padding
/// rules, reserved against the table limit before each call.
pub(crate) const DESCRIPTOR_RESERVE: usize = 2;

/// Outcome of one receive attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// No data ready; retry on the next readable readiness notification.
    WouldBlock,
    /// The peer closed the connection.
    Closed,
    /// This many bytes were appended to the inbound buffer.
    Progressed(usize),
}

/// One receive: fill the unwritten tail of `inbound` and import at most one
/// ancillary descriptor into `pending`.
pub(crate) fn receive_once(
    sock: &impl AsFd,
    inbound: &mut DynBuffer,
    pending: &mut VecDeque<OwnedFd>,
    budget: &dyn DescriptorBudget,
) -> Result<ReceiveOutcome> {
    if !budget.has_headroom(DESCRIPTOR_RESERVE) {
        return Err(ChannelError::DescriptorTableFull);
    }

    let wpos = inbound.len();
    let spare = inbound.remaining_capacity();
    if spare == 0 {
        // The inbound buffer already holds a maximum-size frame; the caller
        // must parse before receiving more.
        return Ok(ReceiveOutcome::WouldBlock);
    }

    let raw = sock.as_fd().as_raw_fd();
    let received = {
        let window = inbound.reserve(spare)?;
        recv_with_rights(raw, window)
    };
    match received {
        Err(err) if err.kind() == ErrorKind::WouldBlock => {
            inbound.truncate(wpos);
            Ok(ReceiveOutcome::WouldBlock)
        }
        Err(err) => {
            inbound.truncate(wpos);
            Err(ChannelError::Io(err))
        }
        Ok((n, rights)) => {
            adopt_rights(rights, pending);
            inbound.truncate(wpos + n);
            if n == 0 {
                Ok(ReceiveOutcome::Closed)
            } else {
                Ok(ReceiveOutcome::Progressed(n))
            }
        }
    }
}

/// The audited recvmsg boundary: one call, ancillary space sized for a
/// single descriptor, interruptions absorbed. Returns raw descriptor
/// values; the caller adopts them immediately.
fn recv_with_rights(raw: RawFd, window: &mut [u8]) -> std::io::Result<(usize, Vec<RawFd>)> {
    let mut iov = [IoSliceMut::new(window)];
    let mut cmsg_buf = nix::cmsg_space!([RawFd; 1]);
    loop {
        match recvmsg::<()>(raw, &mut iov, Some(&mut cmsg_buf), MsgFlags::empty()) {
            Ok(msg) => {
                let mut rights = Vec::new();
                for cmsg in msg.cmsgs().map_err(std::io::Error::from)? {
                    if let ControlMessageOwned::ScmRights(fds) = cmsg {
                        rights.extend(fds);
                    }
                    // other control-message classes are not ours to interpret
                }
                return Ok((msg.bytes, rights));
            }
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

/// Queue the first received descriptor; close the rest. The protocol never
/// sends more than one per message, but coalesced control data can deliver
/// extras that must not leak.
fn adopt_rights(rights: Vec<RawFd>, pending: &mut VecDeque<OwnedFd>) {
    let mut rights = rights.into_iter();
    if let Some(first) = rights.next() {
        // SAFETY: the kernel installed this descriptor for this process in
        // the recvmsg that just returned; nothing else owns it yet.
        pending.push_back(unsafe { OwnedFd::from_raw_fd(first) });
    }
    for surplus in rights {
        debug!(fd = surplus, "closing surplus ancillary descriptor");
        // SAFETY: as above; adopting it here is what closes it.
        drop(unsafe { OwnedFd::from_raw_fd(surplus) });
    }
}
