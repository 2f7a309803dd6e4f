use crate::event::TransportState;
use peerlink_wire::WireError;
use std::error::Error;
use std::fmt::Formatter;
use std::fmt::{Debug, Display};
use std::net::SocketAddr;

/// The basic error type for this crate.
///
/// Every variant describes a failure the manager has already recovered from: none of
/// them leave the [`SessionManager`](crate::session::SessionManager) unusable.
#[derive(Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The listener port is unavailable. Never retried
    BindFailure { port: u16, reason: String },
    /// A single connect attempt ran out of time
    DialTimeout(SocketAddr),
    /// A single connect attempt was refused or otherwise failed
    DialRefused { addr: SocketAddr, reason: String },
    /// Every attempt in the retry budget failed
    DialExhausted { attempts: u32, last_error: String },
    /// The owner address was still missing after the re-query
    AddressUnresolved,
    /// The connection was closed
    StreamClosed,
    /// The connection failed with an I/O error
    StreamError(String),
    /// There is no transport to send through
    NotConnected,
    /// A start request arrived while another role was active
    AlreadyActive(TransportState),
    /// The dial sequence was superseded by a newer one, or stopped
    Cancelled,
    /// The configuration cannot be used
    InvalidConfig(&'static str),
    /// For a converted error
    Generic(String),
}

impl Error for SessionError {}

impl Debug for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_msg())
    }
}

impl SessionError {
    fn to_msg(&self) -> String {
        match self {
            SessionError::BindFailure { port, reason } => {
                format!("Unable to listen on port {port}: {reason}")
            }
            SessionError::DialTimeout(addr) => format!("Connect to {addr} timed out"),
            SessionError::DialRefused { addr, reason } => {
                format!("Connect to {addr} failed: {reason}")
            }
            SessionError::DialExhausted {
                attempts,
                last_error,
            } => format!("Failed to connect after {attempts} attempts (last error: {last_error})"),
            SessionError::AddressUnresolved => "Group owner address still unresolved".to_string(),
            SessionError::StreamClosed => "Connection closed".to_string(),
            SessionError::StreamError(err) => err.clone(),
            SessionError::NotConnected => "No connection".to_string(),
            SessionError::AlreadyActive(state) => format!("Transport already active ({state})"),
            SessionError::Cancelled => "Dial cancelled".to_string(),
            SessionError::InvalidConfig(err) => (*err).to_string(),
            SessionError::Generic(err) => err.clone(),
        }
    }

    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Generic(msg.into())
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <Self as Debug>::fmt(self, f)
    }
}

impl From<WireError> for SessionError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Bind { addr, reason } => SessionError::BindFailure {
                port: addr.port(),
                reason,
            },
            WireError::ConnectTimeout(addr) => SessionError::DialTimeout(addr),
            WireError::ConnectRefused { addr, reason } => SessionError::DialRefused { addr, reason },
            WireError::StreamClosed(_) => SessionError::StreamClosed,
            WireError::Stream { reason, .. } => SessionError::StreamError(reason),
            err @ WireError::QueueFull { .. } => SessionError::StreamError(err.to_string()),
            WireError::NotConnected => SessionError::NotConnected,
            err @ (WireError::AlreadyListening
            | WireError::AlreadyConnected
            | WireError::BadAddress(..)) => SessionError::Generic(err.to_string()),
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Generic(err.to_string())
    }
}

impl<T> From<peerlink_io::tokio::sync::mpsc::error::SendError<T>> for SessionError {
    fn from(err: peerlink_io::tokio::sync::mpsc::error::SendError<T>) -> Self {
        SessionError::Generic(err.to_string())
    }
}
