use crate::error::{Result, SmuxError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Payload of a UPD segment: how much the sender has delivered to its
/// application so far, and how much it is willing to buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdate {
    /// Cumulative bytes delivered since stream start, modulo 2^32.
    pub consumed: u32,
    /// Current receive-buffer capacity.
    pub window: u32,
}

impl WindowUpdate {
    /// Encoded size in bytes.
    pub const SIZE: usize = 8;

    pub fn new(consumed: u32, window: u32) -> Self {
        Self { consumed, window }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(Self::SIZE);
        dst.put_u32_le(self.consumed);
        dst.put_u32_le(self.window);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decodes an update from a UPD fragment, which must be exactly
    /// [`WindowUpdate::SIZE`] bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != Self::SIZE {
            return Err(SmuxError::MalformedFragment {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let consumed = buf.get_u32_le();
        let window = buf.get_u32_le();

        Ok(Self { consumed, window })
    }
}
