//! A single SMUX v2 stream: segment codec, reassembly across transport
//! chunks, and window-based flow control.
//!
//! [`Reader`] and [`Writer`] are synchronous and transport-agnostic; they
//! operate on a [`SessionState`] and can be driven directly. [`SmuxDuplex`]
//! runs them over any tokio `AsyncRead + AsyncWrite` transport.

pub mod codec;
pub mod command;
pub mod config;
pub mod duplex;
pub mod error;
pub mod lifecycle;
pub mod reader;
pub mod reassembly;
pub mod segment;
pub mod state;
pub mod update;
pub mod writer;

pub use codec::SegmentCodec;
pub use command::Command;
pub use config::{Config, ConfigBuilder};
pub use duplex::SmuxDuplex;
pub use error::{Result, SmuxError};
pub use lifecycle::DuplexState;
pub use reader::{Dispatch, Reader};
pub use reassembly::ReassemblyBuffer;
pub use segment::{Segment, HEADER_SIZE, MAX_FRAGMENT_SIZE, PROTOCOL_VERSION};
pub use state::{SessionState, WindowStats};
pub use update::WindowUpdate;
pub use writer::Writer;
