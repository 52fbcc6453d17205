//! Inbound half: turns raw transport chunks into segments and applies them.
//!
//! Chunks may cut segments anywhere. Whatever cannot be decoded at the end
//! of a chunk is parked in the session's reassembly buffer and prepended to
//! the next one.

use crate::{
    codec::SegmentCodec,
    command::Command,
    error::{Result, SmuxError},
    segment::{Segment, PROTOCOL_VERSION},
    state::SessionState,
};
use bytes::Bytes;

/// Side effect of dispatching one segment, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Fragment for the application.
    Data(Bytes),
    /// The peer will send no more data.
    Fin,
    /// Control segment for the outbound path (NOP pong, UPD ack).
    Reply(Segment),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Reader;

impl Reader {
    pub fn new() -> Self {
        Self
    }

    /// Processes one chunk from the transport.
    ///
    /// Every segment dispatched before a failure has already been pushed to
    /// `out`, so callers should drain it even when this returns an error.
    pub fn on_chunk(
        &self,
        state: &mut SessionState,
        chunk: &[u8],
        out: &mut Vec<Dispatch>,
    ) -> Result<()> {
        // Only what is still undecoded after this chunk counts against the
        // reassembly capacity
        let mut working = state.reassembly_mut().take();
        working.extend_from_slice(chunk);

        while let Some(segment) = SegmentCodec::try_decode(&mut working)? {
            match self.on_segment(state, segment, out) {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    tracing::debug!("Ignoring segment: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        if !working.is_empty() {
            tracing::trace!("Buffering {} bytes of partial segment", working.len());
            state.reassembly_mut().extend(&working)?;
        }

        Ok(())
    }

    fn on_segment(
        &self,
        state: &mut SessionState,
        segment: Segment,
        out: &mut Vec<Dispatch>,
    ) -> Result<()> {
        if segment.version() != PROTOCOL_VERSION {
            return Err(SmuxError::InvalidVersion(segment.version()));
        }

        let cmd = segment.cmd();
        if cmd.is_stream_bound() && segment.stream_id() != state.stream_id() {
            return Err(SmuxError::InvalidStream(segment.stream_id()));
        }

        tracing::trace!(
            "<- {:?} stream={} len={}",
            cmd,
            segment.stream_id(),
            segment.fragment_size()
        );

        match cmd {
            Command::Psh => Self::on_psh(state, segment, out),
            Command::Nop => {
                out.push(Dispatch::Reply(Segment::new_nop(segment.stream_id())));
                Ok(())
            }
            Command::Upd => {
                let update = segment.update()?;
                state.apply_update(update);
                Ok(())
            }
            Command::Fin => {
                out.push(Dispatch::Fin);
                Ok(())
            }
            // Opening handshake from the peer carries nothing we need
            Command::Syn => Ok(()),
            Command::Unknown(byte) => Err(SmuxError::UnknownCommand(byte)),
        }
    }

    fn on_psh(state: &mut SessionState, segment: Segment, out: &mut Vec<Dispatch>) -> Result<()> {
        let update = state.record_read(segment.fragment_size() as usize);
        out.push(Dispatch::Data(segment.into_fragment()));

        if let Some(update) = update {
            tracing::debug!(
                "Acknowledging consumed={} window={}",
                update.consumed,
                update.window
            );
            out.push(Dispatch::Reply(Segment::new_upd(state.stream_id(), update)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, update::WindowUpdate};
    use bytes::{BufMut, BytesMut};

    fn encode(segments: &[Segment]) -> BytesMut {
        let mut buf = BytesMut::new();
        for segment in segments {
            SegmentCodec::encode_segment(segment, &mut buf);
        }
        buf
    }

    fn psh(stream_id: u32, data: &[u8]) -> Segment {
        Segment::new_psh(stream_id, Bytes::copy_from_slice(data)).unwrap()
    }

    #[test]
    fn test_psh_delivers_and_counts() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        reader
            .on_chunk(&mut state, &encode(&[psh(3, b"hello")]), &mut out)
            .unwrap();

        assert_eq!(out, vec![Dispatch::Data(Bytes::from("hello"))]);
        assert_eq!(state.stats().self_read, 5);
        assert_eq!(state.stats().self_increment, 5);
    }

    #[test]
    fn test_multiple_segments_in_one_chunk() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        let chunk = encode(&[psh(3, b"one"), psh(3, b"two"), Segment::new_fin(3)]);
        reader.on_chunk(&mut state, &chunk, &mut out).unwrap();

        assert_eq!(
            out,
            vec![
                Dispatch::Data(Bytes::from("one")),
                Dispatch::Data(Bytes::from("two")),
                Dispatch::Fin,
            ]
        );
    }

    #[test]
    fn test_partial_segment_is_buffered() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        let bytes = encode(&[psh(3, b"hello world")]);
        reader.on_chunk(&mut state, &bytes[..5], &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(state.stats().buffered, 5);

        reader.on_chunk(&mut state, &bytes[5..], &mut out).unwrap();
        assert_eq!(out, vec![Dispatch::Data(Bytes::from("hello world"))]);
        assert_eq!(state.stats().buffered, 0);
    }

    #[test]
    fn test_invalid_version_after_valid_segments() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        let mut chunk = encode(&[psh(3, b"first"), psh(3, b"second")]);
        chunk.put_u8(1); // Version 1
        chunk.put_u8(Command::PSH);
        chunk.put_u16_le(0);
        chunk.put_u32_le(3);
        chunk.extend_from_slice(&encode(&[psh(3, b"never")]));

        let result = reader.on_chunk(&mut state, &chunk, &mut out);

        assert!(matches!(result, Err(SmuxError::InvalidVersion(1))));
        assert_eq!(
            out,
            vec![
                Dispatch::Data(Bytes::from("first")),
                Dispatch::Data(Bytes::from("second")),
            ]
        );
    }

    #[test]
    fn test_stream_mismatch_mutates_nothing() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        let result = reader.on_chunk(&mut state, &encode(&[psh(7, b"nope")]), &mut out);

        assert!(matches!(result, Err(SmuxError::InvalidStream(7))));
        assert!(out.is_empty());
        assert_eq!(state.stats().self_read, 0);
        assert_eq!(state.stats().self_increment, 0);
    }

    #[test]
    fn test_upd_and_fin_check_stream() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        let upd = Segment::new_upd(9, WindowUpdate::new(1, 2));
        let result = reader.on_chunk(&mut state, &encode(&[upd]), &mut out);
        assert!(matches!(result, Err(SmuxError::InvalidStream(9))));
        assert_eq!(state.peer_window(), 65_535);

        let result = reader.on_chunk(&mut state, &encode(&[Segment::new_fin(9)]), &mut out);
        assert!(matches!(result, Err(SmuxError::InvalidStream(9))));
        assert!(out.is_empty());
    }

    #[test]
    fn test_nop_is_echoed() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        // Echo keeps the id the ping arrived with
        reader
            .on_chunk(&mut state, &encode(&[Segment::new_nop(11)]), &mut out)
            .unwrap();

        assert_eq!(out, vec![Dispatch::Reply(Segment::new_nop(11))]);
        assert_eq!(state.stats().self_read, 0);
    }

    #[test]
    fn test_upd_updates_peer_window() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        let upd = Segment::new_upd(3, WindowUpdate::new(60, 100));
        reader.on_chunk(&mut state, &encode(&[upd]), &mut out).unwrap();

        assert!(out.is_empty());
        assert_eq!(state.stats().peer_consumed, 60);
        assert_eq!(state.stats().peer_window, 100);
    }

    #[test]
    fn test_malformed_upd_is_fatal() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        let bad = Segment::new(2, Command::Upd, 3, Bytes::from(vec![0u8; 4])).unwrap();
        let result = reader.on_chunk(&mut state, &encode(&[bad]), &mut out);

        assert!(matches!(
            result,
            Err(SmuxError::MalformedFragment {
                expected: 8,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_unknown_command_is_skipped() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        let unknown = Segment::new(2, Command::Unknown(42), 3, Bytes::from("??")).unwrap();
        let chunk = encode(&[unknown, Segment::new_syn(3), psh(3, b"after")]);
        reader.on_chunk(&mut state, &chunk, &mut out).unwrap();

        assert_eq!(out, vec![Dispatch::Data(Bytes::from("after"))]);
    }

    #[test]
    fn test_ack_emitted_at_half_window() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        let chunk = encode(&[psh(3, &[0u8; 32_766])]);
        reader.on_chunk(&mut state, &chunk, &mut out).unwrap();
        assert_eq!(out.len(), 1);

        out.clear();
        reader
            .on_chunk(&mut state, &encode(&[psh(3, b"x")]), &mut out)
            .unwrap();

        assert_eq!(
            out,
            vec![
                Dispatch::Data(Bytes::from("x")),
                Dispatch::Reply(Segment::new_upd(3, WindowUpdate::new(32_767, 65_535))),
            ]
        );
        assert_eq!(state.stats().self_increment, 0);
    }

    #[test]
    fn test_oversized_remainder_overflows() {
        let reader = Reader::new();
        let config = Config {
            receive_window: 16,
            ..Default::default()
        };
        let mut state = SessionState::new(&config);
        let mut out = Vec::new();

        // Header announces 100 bytes, we can hold 16 plus a header
        let bytes = encode(&[psh(3, &[0u8; 100])]);
        let result = reader.on_chunk(&mut state, &bytes[..30], &mut out);

        assert!(matches!(
            result,
            Err(SmuxError::BufferOverflow {
                needed: 30,
                capacity: 24
            })
        ));
    }

    #[test]
    fn test_large_chunk_after_partial() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        // 20 complete segments, about 80 KB on the wire
        let segments: Vec<_> = (0..20u8).map(|i| psh(3, &[i; 4000])).collect();
        let bytes = encode(&segments);

        reader.on_chunk(&mut state, &bytes[..4], &mut out).unwrap();
        assert!(out.is_empty());

        reader.on_chunk(&mut state, &bytes[4..], &mut out).unwrap();

        let data: Vec<_> = out
            .iter()
            .filter(|d| matches!(d, Dispatch::Data(_)))
            .collect();
        assert_eq!(data.len(), 20);
        assert_eq!(state.stats().self_read, 80_000);
        assert_eq!(state.stats().buffered, 0);
    }

    #[test]
    fn test_max_segment_split_across_chunks() {
        let reader = Reader::new();
        let mut state = SessionState::new(&Config::default());
        let mut out = Vec::new();

        let bytes = encode(&[psh(3, &[5u8; 65_535])]);
        for piece in bytes.chunks(8192) {
            reader.on_chunk(&mut state, piece, &mut out).unwrap();
        }

        assert!(matches!(&out[0], Dispatch::Data(data) if data.len() == 65_535));
        assert_eq!(state.stats().buffered, 0);
    }
}
