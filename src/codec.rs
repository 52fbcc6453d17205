use crate::{
    command::Command,
    error::{Result, SmuxError},
    segment::{Segment, HEADER_SIZE},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Wire codec for smux segments.
///
/// ```text
/// offset 0: version     u8
/// offset 1: command     u8
/// offset 2: length      u16 LE
/// offset 4: stream id   u32 LE
/// offset 8: fragment    `length` bytes
/// ```
///
/// Decoding is all-or-nothing: a segment is only taken off the buffer once
/// its header and whole fragment are present. The codec does not judge the
/// version or command; that is the reader's job.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentCodec;

impl SegmentCodec {
    pub fn new() -> Self {
        Self
    }

    fn decode_header(src: &mut impl Buf) -> (u8, Command, u16, u32) {
        let version = src.get_u8();
        let cmd = Command::from_byte(src.get_u8());
        let length = src.get_u16_le();
        let stream_id = src.get_u32_le();

        (version, cmd, length, stream_id)
    }

    fn encode_header(dst: &mut BytesMut, segment: &Segment) {
        dst.put_u8(segment.version());
        dst.put_u8(segment.cmd().to_byte());
        dst.put_u16_le(segment.fragment_size());
        dst.put_u32_le(segment.stream_id());
    }

    /// Takes one complete segment off the front of `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` exactly as it was when fewer than
    /// `HEADER_SIZE + length` bytes are available.
    pub fn try_decode(src: &mut BytesMut) -> Result<Option<Segment>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the header without consuming the bytes
        let mut peek = &src[..HEADER_SIZE];
        let (_, _, length, _) = Self::decode_header(&mut peek);

        if src.len() < HEADER_SIZE + length as usize {
            return Ok(None);
        }

        // Now we can safely consume the bytes
        let mut header = src.split_to(HEADER_SIZE);
        let (version, cmd, length, stream_id) = Self::decode_header(&mut header);
        let fragment = src.split_to(length as usize).freeze();

        Segment::new(version, cmd, stream_id, fragment).map(Some)
    }

    pub fn encode_segment(segment: &Segment, dst: &mut BytesMut) {
        dst.reserve(segment.total_size());
        Self::encode_header(dst, segment);
        dst.put_slice(segment.fragment());
    }

    pub fn to_bytes(segment: &Segment) -> Bytes {
        let mut buf = BytesMut::with_capacity(segment.total_size());
        Self::encode_segment(segment, &mut buf);
        buf.freeze()
    }
}

impl Decoder for SegmentCodec {
    type Item = Segment;
    type Error = SmuxError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        let segment = Self::try_decode(src)?;

        if segment.is_none() && src.len() >= HEADER_SIZE {
            // Reserve space for the full segment
            let length = u16::from_le_bytes([src[2], src[3]]) as usize;
            src.reserve(HEADER_SIZE + length - src.len());
        }

        Ok(segment)
    }
}

impl Encoder<Segment> for SegmentCodec {
    type Error = SmuxError;

    fn encode(
        &mut self,
        segment: Segment,
        dst: &mut BytesMut,
    ) -> std::result::Result<(), Self::Error> {
        Self::encode_segment(&segment, dst);
        Ok(())
    }
}
