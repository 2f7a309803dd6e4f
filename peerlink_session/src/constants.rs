//! Defaults for the session transport.
//!
//! Every value here can be overridden through [`SessionConfig`](crate::config::SessionConfig);
//! the defaults reproduce the fixed policy peers already expect.

use std::time::Duration;

/// The well-known port the group owner listens on
pub const DEFAULT_PORT: u16 = 8888;
/// Each connect attempt is bounded by this
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_millis(5000);
/// Total connect attempts per dial sequence, the first one included
pub const MAX_DIAL_ATTEMPTS: u32 = 5;
/// Wait between two failed connect attempts
pub const DIAL_RETRY_DELAY: Duration = Duration::from_millis(1000);
/// Wait before asking the role source again when the owner address was missing
pub const OWNER_ADDRESS_REQUERY_DELAY: Duration = Duration::from_millis(1000);
/// Max bytes delivered per received message event
pub const READ_BUFFER_SIZE: usize = peerlink_wire::DEFAULT_READ_CHUNK_SIZE;
/// Outbound bytes a peer may leave unread before its connection is dropped
pub const MAX_QUEUED_BYTES: usize = peerlink_wire::DEFAULT_MAX_QUEUED_BYTES;
