use crate::error::{Result, SmuxError};
use bytes::BytesMut;

/// Holds the tail of a segment that was cut off at a chunk boundary until
/// the rest of it arrives.
///
/// Capacity is fixed at construction. Running past it means the peer sent a
/// header announcing more than we can ever hold, which is treated as fatal.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl ReassemblyBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends `data`, failing without modifying the buffer if it would not fit.
    pub fn extend(&mut self, data: &[u8]) -> Result<()> {
        let needed = self.buf.len() + data.len();
        if needed > self.capacity {
            return Err(SmuxError::BufferOverflow {
                needed,
                capacity: self.capacity,
            });
        }

        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Moves the buffered bytes out, leaving the buffer empty.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }
}
