/// Errors from buffer allocation and cursor operations.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// The requested maximum capacity is smaller than the initial size.
    #[error("maximum capacity {max} is smaller than initial size {initial}")]
    InvalidArgument { initial: usize, max: usize },

    /// The backing allocation could not be satisfied.
    #[error("allocation of {requested} bytes failed")]
    Allocation { requested: usize },

    /// The write would grow the buffer past its maximum capacity.
    #[error("write of {requested} bytes exceeds maximum capacity ({written} written, max {max})")]
    CapacityExceeded {
        requested: usize,
        written: usize,
        max: usize,
    },

    /// The requested view reaches past the written region.
    #[error("view {offset}+{len} is outside the {written} written bytes")]
    OutOfRange {
        offset: usize,
        len: usize,
        written: usize,
    },
}

pub type Result<T> = std::result::Result<T, BufferError>;
