use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::DEFAULT_PORT;

/// Tunable parameters for a live-link source. Everything an editor-side
/// settings panel would expose lives here and is passed in explicitly at
/// construction; the library keeps no global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Local address to bind the UDP socket to.
    pub bind_addr: String,
    pub port: u16,
    /// Per-subject frame window capacity.
    pub max_buffered_frames: usize,
    /// Frames older than this (relative to the newest buffered frame, and to
    /// the sample time when publishing) are considered useless.
    pub max_frame_age: Duration,
    /// Silence after which a subject is marked stale. Must be shorter than
    /// both `lost_timeout` and `max_frame_age`, so held frames are still
    /// fresh enough to serve while stale.
    pub stale_timeout: Duration,
    /// Silence after which a subject is declared lost and its buffers are
    /// cleared.
    pub lost_timeout: Duration,
    /// Socket read timeout; bounds the receive loop's housekeeping cadence
    /// and the shutdown latency.
    pub recv_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_owned(),
            port: DEFAULT_PORT,
            max_buffered_frames: 64,
            max_frame_age: Duration::from_secs(1),
            stale_timeout: Duration::from_millis(500),
            lost_timeout: Duration::from_secs(5),
            recv_timeout: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid bind address {0:?}")]
    InvalidBindAddr(String),
    #[error("max_buffered_frames must be at least 1")]
    ZeroBufferCapacity,
    #[error("stale_timeout ({stale:?}) must be shorter than lost_timeout ({lost:?})")]
    TimeoutOrder { stale: Duration, lost: Duration },
    #[error("stale_timeout ({stale:?}) must not exceed max_frame_age ({max_age:?})")]
    StaleExceedsFrameAge { stale: Duration, max_age: Duration },
    #[error("recv_timeout must be nonzero")]
    ZeroRecvTimeout,
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.max_buffered_frames == 0 {
            return Err(ConfigError::ZeroBufferCapacity);
        }
        if self.stale_timeout >= self.lost_timeout {
            return Err(ConfigError::TimeoutOrder {
                stale: self.stale_timeout,
                lost: self.lost_timeout,
            });
        }
        if self.stale_timeout > self.max_frame_age {
            return Err(ConfigError::StaleExceedsFrameAge {
                stale: self.stale_timeout,
                max_age: self.max_frame_age,
            });
        }
        if self.recv_timeout.is_zero() {
            return Err(ConfigError::ZeroRecvTimeout);
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(self.bind_addr.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
