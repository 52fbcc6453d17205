use crate::error::{Result, SmuxError};

/// Stream id used when none is configured.
pub const DEFAULT_STREAM_ID: u32 = 3;

/// Default local receive window. Matches the largest fragment a single
/// segment can carry.
pub const DEFAULT_RECEIVE_WINDOW: usize = 65_535;

/// Configuration for a smux duplex.
///
/// # Examples
///
/// ## Using default configuration
///
/// ```rust
/// use smux_duplex::Config;
///
/// let config = Config::default();
/// assert_eq!(config.stream_id, 3);
/// assert_eq!(config.receive_window, 65_535);
/// ```
///
/// ## Creating custom configuration
///
/// ```rust
/// use smux_duplex::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .stream_id(12345)
///     .receive_window(16 * 1024)
///     .build()
///     .expect("Valid configuration");
/// assert_eq!(config.stream_id, 12345);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// The only stream id this duplex speaks for.
    pub stream_id: u32,
    /// Bytes advertised to the peer as our window. The reassembly buffer
    /// holds this much plus one segment header, so the largest segment
    /// still fits when split across reads.
    pub receive_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream_id: DEFAULT_STREAM_ID,
            receive_window: DEFAULT_RECEIVE_WINDOW,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.receive_window < 2 {
            return Err(SmuxError::Config(
                "Receive window must be at least 2 bytes".to_string(),
            ));
        }

        if self.receive_window > DEFAULT_RECEIVE_WINDOW {
            return Err(SmuxError::Config(format!(
                "Receive window cannot exceed {DEFAULT_RECEIVE_WINDOW} bytes"
            )));
        }

        Ok(())
    }
}

/// Builder for creating custom `Config` instances.
///
/// Starts from [`Config::default`] and validates on [`ConfigBuilder::build`].
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn stream_id(mut self, stream_id: u32) -> Self {
        self.config.stream_id = stream_id;
        self
    }

    pub fn receive_window(mut self, size: usize) -> Self {
        self.config.receive_window = size;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
