//! Per-stream bookkeeping shared by the reader and the writer.
//!
//! The reader owns `self_read`, `self_increment`, `peer_consumed` and
//! `peer_window`; the writer owns `self_write`. Nothing here is synchronised:
//! the duplex keeps a single `SessionState` behind one lock.

use crate::{
    config::Config, reassembly::ReassemblyBuffer, segment::HEADER_SIZE, update::WindowUpdate,
};

/// Window assumed for the peer until its first UPD arrives.
pub const INITIAL_PEER_WINDOW: u64 = 65_535;

#[derive(Debug)]
pub struct SessionState {
    stream_id: u32,
    /// Bytes delivered to the local application.
    self_read: u64,
    /// Bytes handed to the transport inside PSH segments.
    self_write: u64,
    /// Bytes received since the last UPD we sent.
    self_increment: u64,
    peer_consumed: u64,
    peer_window: u64,
    self_window: u64,
    reassembly: ReassemblyBuffer,
}

/// Point-in-time copy of the counters, for callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowStats {
    pub self_read: u64,
    pub self_write: u64,
    pub self_increment: u64,
    pub peer_consumed: u64,
    pub peer_window: u64,
    pub self_window: u64,
    pub inflight: u64,
    pub buffered: usize,
}

impl SessionState {
    pub fn new(config: &Config) -> Self {
        Self {
            stream_id: config.stream_id,
            self_read: 0,
            self_write: 0,
            self_increment: 0,
            peer_consumed: 0,
            peer_window: INITIAL_PEER_WINDOW,
            self_window: config.receive_window as u64,
            reassembly: ReassemblyBuffer::new(HEADER_SIZE + config.receive_window),
        }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn peer_window(&self) -> u64 {
        self.peer_window
    }

    /// Bytes sent but not yet reported consumed by the peer.
    ///
    /// Peers count in `u32`, so the difference is taken modulo 2^32.
    pub fn inflight(&self) -> u64 {
        (self.self_write as u32).wrapping_sub(self.peer_consumed as u32) as u64
    }

    pub fn reassembly_mut(&mut self) -> &mut ReassemblyBuffer {
        &mut self.reassembly
    }

    /// Update announcing our initial receive capacity.
    pub fn initial_update(&self) -> WindowUpdate {
        WindowUpdate::new(0, self.self_window as u32)
    }

    /// Accounts for `len` bytes handed to the application.
    ///
    /// Returns the update to send once half of our window has been consumed
    /// since the previous one, resetting the increment.
    pub fn record_read(&mut self, len: usize) -> Option<WindowUpdate> {
        self.self_read += len as u64;
        self.self_increment += len as u64;

        if self.self_increment < self.self_window / 2 {
            return None;
        }

        self.self_increment = 0;
        Some(WindowUpdate::new(
            self.self_read as u32,
            self.self_window as u32,
        ))
    }

    pub fn record_write(&mut self, len: usize) {
        self.self_write += len as u64;
    }

    pub fn apply_update(&mut self, update: WindowUpdate) {
        self.peer_consumed = update.consumed as u64;
        self.peer_window = update.window as u64;
    }

    pub fn stats(&self) -> WindowStats {
        WindowStats {
            self_read: self.self_read,
            self_write: self.self_write,
            self_increment: self.self_increment,
            peer_consumed: self.peer_consumed,
            peer_window: self.peer_window,
            self_window: self.self_window,
            inflight: self.inflight(),
            buffered: self.reassembly.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;

    #[test]
    fn test_initial_state() {
        let state = SessionState::new(&Config::default());
        let stats = state.stats();

        assert_eq!(state.stream_id(), 3);
        assert_eq!(stats.peer_window, 65_535);
        assert_eq!(stats.self_window, 65_535);
        assert_eq!(stats.self_read, 0);
        assert_eq!(stats.self_write, 0);
        assert_eq!(stats.inflight, 0);
        assert_eq!(state.initial_update(), WindowUpdate::new(0, 65_535));
    }

    #[test]
    fn test_record_read_batches_updates() {
        let config = ConfigBuilder::new().receive_window(100).build().unwrap();
        let mut state = SessionState::new(&config);

        assert_eq!(state.record_read(30), None);
        assert_eq!(state.record_read(19), None);
        assert_eq!(state.stats().self_increment, 49);

        // 50 reaches half of the 100-byte window
        assert_eq!(state.record_read(1), Some(WindowUpdate::new(50, 100)));
        assert_eq!(state.stats().self_increment, 0);
        assert_eq!(state.stats().self_read, 50);

        assert_eq!(state.record_read(10), None);
        assert_eq!(state.record_read(60), Some(WindowUpdate::new(120, 100)));
    }

    #[test]
    fn test_inflight_tracks_peer_consumed() {
        let mut state = SessionState::new(&Config::default());
        state.record_write(110);
        assert_eq!(state.inflight(), 110);

        state.apply_update(WindowUpdate::new(60, 100));
        assert_eq!(state.inflight(), 50);
        assert_eq!(state.peer_window(), 100);
    }

    #[test]
    fn test_inflight_wraps_at_u32() {
        let mut state = SessionState::new(&Config::default());
        state.record_write(u32::MAX as usize + 11);
        state.apply_update(WindowUpdate::new(u32::MAX - 4, 65_535));

        // 2^32 + 10 written, peer at 2^32 - 5 consumed
        assert_eq!(state.inflight(), 15);
    }

    #[test]
    fn test_reassembly_holds_one_full_segment() {
        let mut state = SessionState::new(&Config::default());

        assert_eq!(state.reassembly_mut().capacity(), HEADER_SIZE + 65_535);
        assert_eq!(state.stats().self_window, 65_535);
    }
}
