use std::collections::VecDeque;
use std::os::fd::{AsFd, OwnedFd};

use bytes::Bytes;
use fdmsg_buffer::{DrainOutcome, DynBuffer, OutboundQueue};
use fdmsg_transport::{DescriptorBudget, ProcessFdTable};
use tracing::warn;

use crate::codec::{
    decode_header, encode_header, Header, Message, FLAG_HAS_DESCRIPTOR, HEADER_SIZE,
    MAX_FRAME_SIZE,
};
use crate::error::{ChannelError, Result};
use crate::reader::{self, ReceiveOutcome};

/// Message-oriented transport over one connected stream socket.
///
/// Owns everything queued on the socket (outbound buffers, buffered inbound
/// bytes, descriptors received ahead of their message) but not the socket's
/// own lifetime: pass `&UnixStream` to keep it, or the stream by value to
/// tie it to the transport. Single-owner; not for concurrent use without
/// external synchronization.
///
/// All operations are resumable: callers drive [`drain_once`] on writable
/// readiness and [`receive_once`] + [`parse_next`] on readable readiness.
///
/// [`drain_once`]: ChannelTransport::drain_once
/// [`receive_once`]: ChannelTransport::receive_once
/// [`parse_next`]: ChannelTransport::parse_next
pub struct ChannelTransport<S: AsFd> {
    sock: S,
    outbound: OutboundQueue,
    inbound: DynBuffer,
    pending: VecDeque<OwnedFd>,
    pid: u32,
    budget: Box<dyn DescriptorBudget>,
}

impl<S: AsFd> ChannelTransport<S> {
    /// Wrap an already-connected socket.
    pub fn new(sock: S) -> Result<Self> {
        Self::with_budget(sock, Box::new(ProcessFdTable::new()))
    }

    /// Wrap a socket with an injected descriptor-table budget source.
    pub fn with_budget(sock: S, budget: Box<dyn DescriptorBudget>) -> Result<Self> {
        Ok(Self {
            sock,
            outbound: OutboundQueue::new(),
            inbound: DynBuffer::open(MAX_FRAME_SIZE)?,
            pending: VecDeque::new(),
            pid: std::process::id(),
            budget,
        })
    }

    /// Frame a message and queue it for transmission.
    ///
    /// `sender_pid == 0` stamps this process's id. The frame is enqueued
    /// whole or not at all.
    pub fn compose(
        &mut self,
        msg_type: u32,
        peer_id: u32,
        sender_pid: u32,
        descriptor: Option<OwnedFd>,
        payload: &[u8],
    ) -> Result<()> {
        self.compose_vectored(msg_type, peer_id, sender_pid, descriptor, &[payload])
    }

    /// [`compose`](ChannelTransport::compose) from multiple payload
    /// segments, gathered into a single frame.
    pub fn compose_vectored(
        &mut self,
        msg_type: u32,
        peer_id: u32,
        sender_pid: u32,
        descriptor: Option<OwnedFd>,
        segments: &[&[u8]],
    ) -> Result<()> {
        let payload_len: usize = segments.iter().map(|s| s.len()).sum();
        let total = HEADER_SIZE + payload_len;
        if total > MAX_FRAME_SIZE {
            return Err(ChannelError::FrameTooLarge {
                size: total,
                max: MAX_FRAME_SIZE,
            });
        }

        let hdr = Header {
            msg_type,
            flags: if descriptor.is_some() {
                FLAG_HAS_DESCRIPTOR
            } else {
                0
            },
            peer_id,
            sender_pid: if sender_pid == 0 { self.pid } else { sender_pid },
            total_len: total as u16,
        };

        let mut frame = DynBuffer::open_dynamic(total, MAX_FRAME_SIZE)?;
        let mut hdr_bytes = [0u8; HEADER_SIZE];
        encode_header(&hdr, hdr_bytes.as_mut_slice());
        frame.append(&hdr_bytes)?;
        for seg in segments {
            frame.append(seg)?;
        }
        if let Some(fd) = descriptor {
            frame.attach_descriptor(fd);
        }

        self.outbound.enqueue(frame);
        Ok(())
    }

    /// Extract the next complete message from the inbound buffer.
    ///
    /// `Ok(None)` means more bytes are needed, the normal partial-read
    /// case. A header length outside protocol bounds is a fatal
    /// [`ChannelError::Protocol`], never a wait.
    pub fn parse_next(&mut self) -> Result<Option<Message>> {
        if self.inbound.len() < HEADER_SIZE {
            return Ok(None);
        }
        let hdr = decode_header(self.inbound.peek(0, HEADER_SIZE)?);
        let total = hdr.total_len as usize;
        if !(HEADER_SIZE..=MAX_FRAME_SIZE).contains(&total) {
            return Err(ChannelError::Protocol { len: total });
        }
        if total > self.inbound.len() {
            return Ok(None);
        }

        let payload = Bytes::copy_from_slice(self.inbound.peek(HEADER_SIZE, total - HEADER_SIZE)?);
        let descriptor = if hdr.has_descriptor() {
            let fd = self.pending.pop_front();
            if fd.is_none() {
                // Peer flagged a descriptor that never arrived. Deliver the
                // message anyway; the inconsistency is the caller's to act on.
                warn!(
                    msg_type = hdr.msg_type,
                    peer_id = hdr.peer_id,
                    "message flagged a descriptor but none is pending"
                );
            }
            fd
        } else {
            None
        };
        self.inbound.consume_front(total);

        Ok(Some(Message {
            msg_type: hdr.msg_type,
            peer_id: hdr.peer_id,
            sender_pid: hdr.sender_pid,
            payload,
            descriptor,
        }))
    }

    /// One vectored write against the outbound backlog.
    pub fn drain_once(&mut self) -> Result<DrainOutcome> {
        self.outbound
            .drain_once(&self.sock)
            .map_err(ChannelError::Io)
    }

    /// One receive into the inbound buffer, importing at most one
    /// descriptor.
    pub fn receive_once(&mut self) -> Result<ReceiveOutcome> {
        reader::receive_once(
            &self.sock,
            &mut self.inbound,
            &mut self.pending,
            self.budget.as_ref(),
        )
    }

    /// Drain until the outbound queue is empty. A blocking convenience for
    /// short-lived control exchanges; event loops should drive
    /// [`drain_once`](ChannelTransport::drain_once) directly.
    pub fn flush(&mut self) -> Result<()> {
        while !self.outbound.is_empty() {
            match self.drain_once()? {
                DrainOutcome::Progressed(_) => {}
                DrainOutcome::WouldBlock => return Err(ChannelError::WouldBlock),
                DrainOutcome::Closed => return Err(ChannelError::PeerClosed),
            }
        }
        Ok(())
    }

    /// Whether outbound buffers remain; drives writable-readiness interest.
    pub fn has_backlog(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Descriptors received but not yet claimed by a parsed message.
    pub fn pending_descriptors(&self) -> usize {
        self.pending.len()
    }

    /// The process id stamped into composed headers when the caller passes
    /// zero.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Release every held resource: queued buffers, their attached
    /// descriptors, and unclaimed received descriptors. Infallible and
    /// also performed on drop.
    pub fn close(&mut self) {
        self.outbound.clear();
        self.pending.clear();
    }

    /// Borrow the underlying socket.
    pub fn get_ref(&self) -> &S {
        &self.sock
    }

    /// Consume the transport and return the socket, releasing all queued
    /// state.
    pub fn into_inner(self) -> S {
        self.sock
    }
}
