use std::collections::VecDeque;
use std::io::IoSlice;
use std::os::fd::{AsFd, AsRawFd, RawFd};

use nix::errno::Errno;
use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};
use tracing::trace;

use crate::dynbuf::DynBuffer;

/// Upper bound on the scatter-list length of a single send call.
const SCATTER_MAX: usize = libc::UIO_MAXIOV as usize;

/// Outcome of one drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Kernel send buffers are exhausted; retry on the next writable
    /// readiness notification.
    WouldBlock,
    /// The peer closed the connection.
    Closed,
    /// This many bytes were accepted by the kernel.
    Progressed(usize),
}

/// FIFO of buffers awaiting transmission on one socket.
///
/// Buffers are drained strictly in enqueue order and retired only once every
/// byte has been accepted by the kernel.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    bufs: VecDeque<DynBuffer>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a buffer to the tail. Infallible.
    pub fn enqueue(&mut self, buf: DynBuffer) {
        self.bufs.push_back(buf);
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    /// Number of buffers still queued.
    pub fn queued(&self) -> usize {
        self.bufs.len()
    }

    /// Bytes not yet accepted by the kernel, across all queued buffers.
    pub fn pending_bytes(&self) -> usize {
        self.bufs.iter().map(|b| b.unread().len()).sum()
    }

    /// Destroy every queued buffer, closing any descriptor still attached.
    /// Teardown only.
    pub fn clear(&mut self) {
        self.bufs.clear();
    }

    /// Drain as much of the queue head as one vectored send accepts.
    ///
    /// The scatter list covers the unread span of up to [`SCATTER_MAX`] head
    /// buffers, and is cut short after the first buffer that carries a
    /// descriptor, so the single ancillary record of this call is
    /// unambiguously that buffer's. Interrupted calls are retried here;
    /// `EAGAIN` and a transient `ENOBUFS` surface as
    /// [`DrainOutcome::WouldBlock`].
    pub fn drain_once(&mut self, sock: &impl AsFd) -> std::io::Result<DrainOutcome> {
        if self.bufs.is_empty() {
            return Ok(DrainOutcome::Progressed(0));
        }

        let mut iovs: Vec<IoSlice<'_>> = Vec::new();
        let mut fd_to_send: Option<(usize, RawFd)> = None;
        let mut bytes_before = 0usize;
        for buf in self.bufs.iter().take(SCATTER_MAX) {
            iovs.push(IoSlice::new(buf.unread()));
            if let Some(fd) = buf.descriptor_raw() {
                fd_to_send = Some((bytes_before, fd));
                break;
            }
            bytes_before += buf.unread().len();
        }

        let fds;
        let cmsg;
        let cmsgs: &[ControlMessage<'_>] = match fd_to_send {
            Some((_, fd)) => {
                fds = [fd];
                cmsg = [ControlMessage::ScmRights(&fds)];
                &cmsg
            }
            None => &[],
        };

        let raw = sock.as_fd().as_raw_fd();
        let n = loop {
            match sendmsg::<()>(raw, &iovs, cmsgs, MsgFlags::empty(), None) {
                Ok(n) => break n,
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) | Err(Errno::ENOBUFS) => {
                    return Ok(DrainOutcome::WouldBlock)
                }
                Err(err) => return Err(err.into()),
            }
        };
        let iov_count = iovs.len();
        drop(iovs);

        if n == 0 {
            return Ok(DrainOutcome::Closed);
        }

        // The descriptor crossed with the first byte of its buffer; drop our
        // reference, the kernel holds its own now. The carrying buffer is
        // the last in the list since the scatter loop breaks on it.
        if let Some((before, _)) = fd_to_send {
            if n > before {
                drop(self.bufs[iov_count - 1].take_descriptor());
            }
        }

        self.advance(n);
        trace!(sent = n, queued = self.bufs.len(), "drained outbound queue");
        Ok(DrainOutcome::Progressed(n))
    }

    /// Retire fully sent head buffers and move the cursor of a partially
    /// sent one.
    fn advance(&mut self, mut n: usize) {
        while n > 0 {
            let Some(front) = self.bufs.front_mut() else {
                break;
            };
            let unread = front.unread().len();
            if n >= unread {
                n -= unread;
                self.bufs.pop_front();
            } else {
                front.advance_read(n);
                n = 0;
            }
        }
    }
}
