//! Raw listen/accept/dial/read/write primitives for a peer session.
//!
//! There is no protocol awareness here: payloads are opaque bytes, each read is
//! delivered as it arrived, and nothing is framed, encrypted or authenticated.
#![forbid(unsafe_code)]

pub mod connection;
pub mod error;
pub mod socket_helpers;
pub mod transport;

pub use connection::{Connection, ConnectionDirection, ConnectionId, ConnectionSet};
pub use error::WireError;
pub use transport::{
    BroadcastReport, DisconnectReason, SocketTransport, TransportConfig, TransportEvent,
    DEFAULT_MAX_QUEUED_BYTES, DEFAULT_READ_CHUNK_SIZE,
};
