use std::{env, num::NonZeroUsize, str::FromStr, time::Duration};

use thiserror::Error;

const DEFAULT_PORT: u16 = 24859;
// 20ms of 48kHz 16-bit stereo PCM
const DEFAULT_FRAME_SIZE: usize = 3840;
const DEFAULT_BYTES_PER_SECOND: u64 = 48_000 * 2 * 2;
const DEFAULT_READ_CHUNK: usize = 4096;
const HANDSHAKE_TIMEOUT: u64 = 20;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Frame size used when a join request carries no `buffer_length`.
    pub default_frame_size: NonZeroUsize,
    /// Raw media byte rate; paces frames and drives the played-time clock.
    pub bytes_per_second: u64,
    pub read_chunk_size: NonZeroUsize,
    pub handshake_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: `{value}`")]
    InvalidValue { var: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            default_frame_size: non_zero(DEFAULT_FRAME_SIZE),
            bytes_per_second: DEFAULT_BYTES_PER_SECOND,
            read_chunk_size: non_zero(DEFAULT_READ_CHUNK),
            handshake_timeout: Duration::from_secs(HANDSHAKE_TIMEOUT),
        }
    }
}

impl Config {
    pub fn new(port: u16) -> Self {
        Self { port, ..Self::default() }
    }

    /// Small frames and a fast clock so playout tests finish in milliseconds.
    #[cfg(test)]
    pub fn new_test(port: u16) -> Self {
        Self {
            port,
            default_frame_size: non_zero(64),
            bytes_per_second: 64_000,
            read_chunk_size: non_zero(100),
            handshake_timeout: Duration::from_secs(1),
        }
    }

    /// Defaults overridden by `CALLRELAY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|var| env::var(var).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = read_var(&lookup, "CALLRELAY_PORT")?.unwrap_or(DEFAULT_PORT);
        let mut config = Self::new(port);
        if let Some(size) = read_var(&lookup, "CALLRELAY_FRAME_SIZE")? {
            config.default_frame_size = size;
        }
        if let Some(rate) = read_var::<u64>(&lookup, "CALLRELAY_BYTES_PER_SECOND")? {
            if rate == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "CALLRELAY_BYTES_PER_SECOND",
                    value: rate.to_string(),
                });
            }
            config.bytes_per_second = rate;
        }
        if let Some(chunk) = read_var(&lookup, "CALLRELAY_READ_CHUNK")? {
            config.read_chunk_size = chunk;
        }
        if let Some(secs) = read_var(&lookup, "CALLRELAY_HANDSHAKE_TIMEOUT")? {
            config.handshake_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Wall-clock length of `bytes` of media at the configured rate.
    pub fn media_duration(&self, bytes: usize) -> Duration {
        Duration::from_secs_f64(bytes as f64 / self.bytes_per_second as f64)
    }
}

fn read_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        None => Ok(None),
    }
}

fn non_zero(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}
