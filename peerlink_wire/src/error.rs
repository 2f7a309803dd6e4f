use crate::connection::ConnectionId;
use std::fmt::Formatter;
use std::net::SocketAddr;

/// Failures raised by the socket layer. None of these are fatal to the transport:
/// each one is scoped to a single bind, a single connect attempt or a single connection
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WireError {
    /// The listening socket could not be created or bound
    Bind { addr: SocketAddr, reason: String },
    /// A listener is already active on this transport
    AlreadyListening,
    /// A dialed connection is already active on this transport
    AlreadyConnected,
    /// The connect attempt did not complete within its timebox
    ConnectTimeout(SocketAddr),
    /// The remote refused or the connect failed before the timebox elapsed
    ConnectRefused { addr: SocketAddr, reason: String },
    /// The connection was closed, locally or by the remote
    StreamClosed(ConnectionId),
    /// An I/O error occurred on an established connection
    Stream { id: ConnectionId, reason: String },
    /// The remote stopped draining and the outbound queue passed its byte limit.
    /// The connection is closed as a result
    QueueFull { id: ConnectionId, queued: usize },
    /// There is no connection to deliver to
    NotConnected,
    /// The address could not be parsed or resolved into a socket address
    BadAddress(String),
}

impl WireError {
    pub fn std(self) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, self.to_string())
    }

    /// Returns true for connect failures where trying again later may succeed.
    /// `AlreadyConnected` counts: a superseded dial may still be releasing its connection
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WireError::ConnectTimeout(..)
                | WireError::ConnectRefused { .. }
                | WireError::AlreadyConnected
        )
    }
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::Bind { addr, reason } => write!(f, "Unable to bind {addr}: {reason}"),
            WireError::AlreadyListening => write!(f, "Listener already running"),
            WireError::AlreadyConnected => write!(f, "Already connected to a listener"),
            WireError::ConnectTimeout(addr) => write!(f, "Connect to {addr} timed out"),
            WireError::ConnectRefused { addr, reason } => {
                write!(f, "Connect to {addr} failed: {reason}")
            }
            WireError::StreamClosed(id) => write!(f, "Connection {id} is closed"),
            WireError::Stream { id, reason } => write!(f, "Connection {id} failed: {reason}"),
            WireError::QueueFull { id, queued } => {
                write!(f, "Connection {id} is not draining ({queued} bytes queued)")
            }
            WireError::NotConnected => write!(f, "No connection"),
            WireError::BadAddress(addr) => write!(f, "Bad socket addr: {addr}"),
        }
    }
}

impl std::error::Error for WireError {}

impl From<WireError> for std::io::Error {
    fn from(val: WireError) -> Self {
        val.std()
    }
}
