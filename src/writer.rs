//! Outbound half: opening handshake and window-gated data framing.

use crate::{
    error::{Result, SmuxError},
    segment::Segment,
    state::SessionState,
};
use bytes::Bytes;

#[derive(Debug, Clone, Copy, Default)]
pub struct Writer;

impl Writer {
    pub fn new() -> Self {
        Self
    }

    /// SYN followed by the UPD announcing our receive window.
    pub fn handshake(&self, state: &SessionState) -> [Segment; 2] {
        [
            Segment::new_syn(state.stream_id()),
            Segment::new_upd(state.stream_id(), state.initial_update()),
        ]
    }

    /// Frames one application write as a PSH segment.
    ///
    /// Fails with [`SmuxError::PeerWindowOverflow`] while the bytes already in
    /// flight fill the peer's window; nothing is counted in that case.
    pub fn on_write(&self, state: &mut SessionState, fragment: Bytes) -> Result<Segment> {
        let inflight = state.inflight();
        if inflight >= state.peer_window() {
            return Err(SmuxError::PeerWindowOverflow {
                inflight,
                window: state.peer_window(),
            });
        }

        let segment = Segment::new_psh(state.stream_id(), fragment)?;
        state.record_write(segment.fragment_size() as usize);

        Ok(segment)
    }

    pub fn fin(&self, state: &SessionState) -> Segment {
        Segment::new_fin(state.stream_id())
    }
}
