use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use zeroize::Zeroize;

use crate::error::{BufferError, Result};

/// A growable write-once-then-drain byte region.
///
/// Data is appended at the write cursor and consumed from the front via the
/// read cursor; the two never cross. Growth is bounded by the maximum
/// capacity fixed at creation. A buffer may carry at most one file
/// descriptor, handed to the socket layer exactly once when the buffer is
/// transmitted.
///
/// Invariant: `read_pos <= write_pos <= capacity <= max_capacity`.
pub struct DynBuffer {
    data: Vec<u8>,
    rpos: usize,
    max: usize,
    fd: Option<OwnedFd>,
}

impl DynBuffer {
    /// Allocate a fixed-size buffer; it can never grow past `size`.
    pub fn open(size: usize) -> Result<Self> {
        Self::alloc(size, size)
    }

    /// Allocate `initial` bytes with room to grow up to `max`.
    ///
    /// `max == 0` means unbounded growth.
    pub fn open_dynamic(initial: usize, max: usize) -> Result<Self> {
        if max != 0 && max < initial {
            return Err(BufferError::InvalidArgument { initial, max });
        }
        Self::alloc(initial, if max == 0 { usize::MAX } else { max })
    }

    fn alloc(initial: usize, max: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(initial)
            .map_err(|_| BufferError::Allocation { requested: initial })?;
        Ok(Self {
            data,
            rpos: 0,
            max,
            fd: None,
        })
    }

    /// Return a writable window of `len` bytes at the write cursor and
    /// advance the cursor past it.
    ///
    /// Growth preserves previously written bytes and zero-fills the newly
    /// exposed region.
    pub fn reserve(&mut self, len: usize) -> Result<&mut [u8]> {
        let wpos = self.data.len();
        let need = wpos
            .checked_add(len)
            .ok_or(BufferError::CapacityExceeded {
                requested: len,
                written: wpos,
                max: self.max,
            })?;
        if need > self.max {
            return Err(BufferError::CapacityExceeded {
                requested: len,
                written: wpos,
                max: self.max,
            });
        }
        if need > self.data.capacity() {
            self.data
                .try_reserve_exact(need - wpos)
                .map_err(|_| BufferError::Allocation { requested: need })?;
        }
        self.data.resize(need, 0);
        Ok(&mut self.data[wpos..need])
    }

    /// Copy `data` in at the write cursor.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Read-only view into already-written bytes.
    pub fn peek(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.checked_add(len).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => Ok(&self.data[offset..end]),
            None => Err(BufferError::OutOfRange {
                offset,
                len,
                written: self.data.len(),
            }),
        }
    }

    /// Bytes written so far, regardless of drain progress.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Room left before the maximum capacity is reached.
    pub fn remaining_capacity(&self) -> usize {
        self.max - self.data.len()
    }

    /// Written bytes not yet drained.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.rpos..]
    }

    /// Mark `n` more bytes as drained.
    pub fn advance_read(&mut self, n: usize) {
        self.rpos = (self.rpos + n).min(self.data.len());
    }

    pub fn is_drained(&self) -> bool {
        self.rpos == self.data.len()
    }

    /// Pull the write cursor back to `len`, un-writing the tail.
    ///
    /// Used by receive paths that reserve a full window up front and then
    /// commit only what the kernel filled.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len.max(self.rpos));
    }

    /// Discard `n` bytes from the front, shifting the remainder down.
    pub fn consume_front(&mut self, n: usize) {
        let n = n.min(self.data.len());
        self.data.drain(..n);
        self.rpos = self.rpos.saturating_sub(n);
    }

    /// Attach a descriptor to travel with this buffer. Replaces any
    /// previously attached one.
    pub fn attach_descriptor(&mut self, fd: OwnedFd) {
        self.fd = Some(fd);
    }

    /// Take ownership of the attached descriptor, if any.
    pub fn take_descriptor(&mut self) -> Option<OwnedFd> {
        self.fd.take()
    }

    pub fn has_descriptor(&self) -> bool {
        self.fd.is_some()
    }

    /// Raw value of the attached descriptor, for the send-side ancillary
    /// record. Ownership stays with the buffer.
    pub fn descriptor_raw(&self) -> Option<RawFd> {
        self.fd.as_ref().map(|fd| fd.as_raw_fd())
    }
}

impl Drop for DynBuffer {
    fn drop(&mut self) {
        // Scrub message contents before the region is returned to the
        // allocator. The attached descriptor, if still present, closes with
        // the OwnedFd field.
        self.data.zeroize();
    }
}

impl std::fmt::Debug for DynBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynBuffer")
            .field("len", &self.data.len())
            .field("read_pos", &self.rpos)
            .field("max", &self.max)
            .field("descriptor", &self.fd.is_some())
            .finish()
    }
}
