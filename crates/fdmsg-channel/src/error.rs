use fdmsg_buffer::BufferError;

/// Errors from message framing and channel I/O.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// A buffer operation failed (allocation, capacity, bad view).
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The composed frame would exceed the protocol's frame bound.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An inbound header carries a length outside protocol bounds. Fatal to
    /// the channel; the caller should tear it down.
    #[error("frame length {len} outside protocol bounds")]
    Protocol { len: usize },

    /// The process descriptor table is too close to its limit to import
    /// another descriptor. Retryable; no receive was attempted.
    #[error("descriptor table too close to its limit")]
    DescriptorTableFull,

    /// The operation cannot make progress right now. Retryable after the
    /// next readiness notification.
    #[error("operation would block")]
    WouldBlock,

    /// The peer shut the connection down while a backlog remained.
    #[error("peer closed the connection")]
    PeerClosed,

    /// Any other OS-level failure. Fatal to the channel.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// True for conditions the caller should retry after backpressure
    /// clears, rather than tearing the channel down.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChannelError::WouldBlock | ChannelError::DescriptorTableFull
        )
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
