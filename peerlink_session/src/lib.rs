#![forbid(unsafe_code)]
//! Peer session transport for peerlink.
//!
//! A [`SessionManager`](session::SessionManager) receives role events from the peer
//! discovery layer (group formed or dissolved, owner or client, owner address) and
//! keeps the matching socket role running: a listener that fans every send out to all
//! of its peers, or a dialer that connects to the group owner with a bounded retry
//! budget. Every received chunk of bytes, along with connection and role changes, is
//! reported to the attached [`SessionEventSink`](sink::SessionEventSink)s.
//!
//! No framing, encryption or authentication is applied to the bytes.
#![deny(trivial_numeric_casts, unused_extern_crates, unused_import_braces)]

pub mod builder;
pub mod config;
pub mod constants;
pub mod dial;
pub mod error;
pub mod event;
pub mod manager;
pub mod role_source;
pub mod sink;

/// The session manager and the handle its dial returns
pub mod session {
    pub use crate::builder::SessionManagerBuilder;
    pub use crate::manager::{DialOutcome, SessionManager};
}

pub mod prelude {
    pub use crate::builder::SessionManagerBuilder;
    pub use crate::config::SessionConfig;
    pub use crate::constants::*;
    pub use crate::dial::RetryBudget;
    pub use crate::error::SessionError;
    pub use crate::event::{RoleEvent, SessionEvent, TransportState};
    pub use crate::manager::{DialOutcome, SessionManager};
    pub use crate::role_source::RoleSource;
    pub use crate::sink::{ChannelSink, LoggingSink, SessionEventSink};
    pub use bytes::Bytes;
    pub use peerlink_wire::{ConnectionId, WireError};
    pub use std::time::Duration;
}

pub mod re_imports {
    pub use async_trait::async_trait;
    pub use peerlink_io::tokio_stream::wrappers::UnboundedReceiverStream;
}
