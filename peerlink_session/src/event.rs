use crate::error::SessionError;
use bytes::Bytes;
use peerlink_wire::ConnectionId;
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, SocketAddr};

/// The group state as reported by the peer discovery layer.
///
/// `is_owner` and `owner_address` only mean something while `group_formed` is true.
/// An absent `owner_address` right after formation is normal: the address often
/// resolves a moment later.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RoleEvent {
    pub group_formed: bool,
    pub is_owner: bool,
    pub owner_address: Option<IpAddr>,
}

impl RoleEvent {
    /// The group dissolved, or never formed
    pub fn group_dissolved() -> Self {
        Self {
            group_formed: false,
            is_owner: false,
            owner_address: None,
        }
    }

    /// This device owns the group and should listen
    pub fn owner() -> Self {
        Self {
            group_formed: true,
            is_owner: true,
            owner_address: None,
        }
    }

    /// This device is a client of the group owner at `owner_address`, if known yet
    pub fn client(owner_address: Option<IpAddr>) -> Self {
        Self {
            group_formed: true,
            is_owner: false,
            owner_address,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TransportState {
    Idle,
    Listening,
    Dialing,
    Connected,
    Stopped,
}

impl TransportState {
    /// Whether a new listener or dial may start from this state
    pub fn is_idle(&self) -> bool {
        matches!(self, TransportState::Idle | TransportState::Stopped)
    }
}

impl Display for TransportState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportState::Idle => "Idle",
            TransportState::Listening => "Listening",
            TransportState::Dialing => "Dialing",
            TransportState::Connected => "Connected",
            TransportState::Stopped => "Stopped",
        };
        write!(f, "{name}")
    }
}

/// Everything a [`SessionManager`](crate::session::SessionManager) reports to its sinks
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        from: TransportState,
        to: TransportState,
    },
    ListenerStarted {
        local_addr: SocketAddr,
    },
    ListenerFailed {
        error: SessionError,
    },
    ListenerStopped,
    /// Emitted before each connect attempt. `attempt` starts at 1
    DialAttempt {
        attempt: u32,
        max_attempts: u32,
        address: SocketAddr,
    },
    DialSucceeded {
        connection: ConnectionId,
        address: SocketAddr,
    },
    DialFailed {
        error: SessionError,
    },
    PeerConnected {
        connection: ConnectionId,
        peer_addr: SocketAddr,
    },
    PeerDisconnected {
        connection: ConnectionId,
        peer_addr: SocketAddr,
    },
    /// One read's worth of bytes from a peer. No framing is applied
    MessageReceived {
        from: SocketAddr,
        connection: ConnectionId,
        payload: Bytes,
    },
    /// A write to one peer failed; that peer's connection was closed
    SendFailed {
        connection: ConnectionId,
        peer_addr: SocketAddr,
        error: SessionError,
    },
}
