/// Segment command byte.
///
/// Unrecognised values are kept as [`Command::Unknown`] instead of being
/// rejected at decode time, so a newer peer's commands survive the codec and
/// can be skipped by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Syn,
    Fin,
    Psh,
    Nop,
    Upd,
    Unknown(u8),
}

impl Command {
    pub const SYN: u8 = 0;
    pub const FIN: u8 = 1;
    pub const PSH: u8 = 2;
    pub const NOP: u8 = 3;
    pub const UPD: u8 = 4;

    pub fn from_byte(byte: u8) -> Self {
        match byte {
            Self::SYN => Command::Syn,
            Self::FIN => Command::Fin,
            Self::PSH => Command::Psh,
            Self::NOP => Command::Nop,
            Self::UPD => Command::Upd,
            other => Command::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Command::Syn => Self::SYN,
            Command::Fin => Self::FIN,
            Command::Psh => Self::PSH,
            Command::Nop => Self::NOP,
            Command::Upd => Self::UPD,
            Command::Unknown(byte) => byte,
        }
    }

    /// Commands that only make sense for the stream this duplex owns.
    pub fn is_stream_bound(self) -> bool {
        matches!(self, Command::Fin | Command::Psh | Command::Upd)
    }
}

impl From<u8> for Command {
    fn from(byte: u8) -> Self {
        Command::from_byte(byte)
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> Self {
        cmd.to_byte()
    }
}
