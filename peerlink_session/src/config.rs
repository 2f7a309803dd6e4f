//! Tunables of a session. The defaults reproduce the fixed policy in [`crate::constants`]
use crate::constants::{
    DEFAULT_DIAL_TIMEOUT, DEFAULT_PORT, DIAL_RETRY_DELAY, MAX_DIAL_ATTEMPTS, MAX_QUEUED_BYTES,
    OWNER_ADDRESS_REQUERY_DELAY, READ_BUFFER_SIZE,
};
use crate::error::SessionError;
use peerlink_wire::TransportConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// The port the listener role binds to, and the port dialers connect to
    pub listen_port: u16,
    /// The local ip the listener binds to
    pub bind_ip: IpAddr,
    /// Timebox of a single connect attempt
    pub dial_timeout: Duration,
    /// Connect attempts per dial sequence
    pub max_dial_attempts: u32,
    /// Pause between two failed attempts
    pub dial_backoff: Duration,
    /// Pause before re-querying the role source for a missing owner address
    pub requery_delay: Duration,
    /// Max bytes delivered per message event
    pub read_chunk_size: usize,
    /// Per-connection limit on queued outbound bytes. A peer that falls this far
    /// behind is disconnected
    pub max_queued_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            max_dial_attempts: MAX_DIAL_ATTEMPTS,
            dial_backoff: DIAL_RETRY_DELAY,
            requery_delay: OWNER_ADDRESS_REQUERY_DELAY,
            read_chunk_size: READ_BUFFER_SIZE,
            max_queued_bytes: MAX_QUEUED_BYTES,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.max_dial_attempts == 0 {
            return Err(SessionError::InvalidConfig(
                "max_dial_attempts must be at least 1",
            ));
        }

        if self.read_chunk_size == 0 {
            return Err(SessionError::InvalidConfig(
                "read_chunk_size must be at least 1",
            ));
        }

        if self.max_queued_bytes == 0 {
            return Err(SessionError::InvalidConfig(
                "max_queued_bytes must be at least 1",
            ));
        }

        if self.dial_timeout.is_zero() {
            return Err(SessionError::InvalidConfig("dial_timeout must be non-zero"));
        }

        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            read_chunk_size: self.read_chunk_size,
            bind_ip: self.bind_ip,
            max_queued_bytes: self.max_queued_bytes,
        }
    }
}
