use crate::{
    command::Command,
    error::{Result, SmuxError},
    update::WindowUpdate,
};
use bytes::Bytes;

/// Size of the fixed segment header: version, command, length, stream id.
pub const HEADER_SIZE: usize = 8;

/// The only protocol version this crate speaks.
pub const PROTOCOL_VERSION: u8 = 2;

/// Largest fragment expressible in the 16-bit length field.
pub const MAX_FRAGMENT_SIZE: usize = u16::MAX as usize;

/// One framed protocol message.
///
/// The fragment length is computed once when the segment is built and never
/// changes afterwards; fields are read-only for that reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    version: u8,
    cmd: Command,
    stream_id: u32,
    fragment: Bytes,
    fragment_size: u16,
}

impl Segment {
    pub fn new(version: u8, cmd: Command, stream_id: u32, fragment: Bytes) -> Result<Self> {
        let fragment_size =
            u16::try_from(fragment.len()).map_err(|_| SmuxError::FragmentTooLarge {
                size: fragment.len(),
                max: MAX_FRAGMENT_SIZE,
            })?;

        Ok(Self {
            version,
            cmd,
            stream_id,
            fragment,
            fragment_size,
        })
    }

    fn control(cmd: Command, stream_id: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            cmd,
            stream_id,
            fragment: Bytes::new(),
            fragment_size: 0,
        }
    }

    pub fn new_syn(stream_id: u32) -> Self {
        Self::control(Command::Syn, stream_id)
    }

    pub fn new_fin(stream_id: u32) -> Self {
        Self::control(Command::Fin, stream_id)
    }

    pub fn new_nop(stream_id: u32) -> Self {
        Self::control(Command::Nop, stream_id)
    }

    pub fn new_psh(stream_id: u32, fragment: Bytes) -> Result<Self> {
        Self::new(PROTOCOL_VERSION, Command::Psh, stream_id, fragment)
    }

    pub fn new_upd(stream_id: u32, update: WindowUpdate) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            cmd: Command::Upd,
            stream_id,
            fragment: update.to_bytes(),
            fragment_size: WindowUpdate::SIZE as u16,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn cmd(&self) -> Command {
        self.cmd
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn fragment(&self) -> &Bytes {
        &self.fragment
    }

    pub fn into_fragment(self) -> Bytes {
        self.fragment
    }

    pub fn fragment_size(&self) -> u16 {
        self.fragment_size
    }

    /// Header plus fragment, i.e. the encoded length.
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.fragment_size as usize
    }

    /// Interprets the fragment as a window update.
    pub fn update(&self) -> Result<WindowUpdate> {
        WindowUpdate::decode(&self.fragment)
    }
}
