//! Established connections and the set of connections accepted by a listener.
//!
//! A [`Connection`] is a handle: the socket halves themselves are owned by the
//! connection's read task and write task. Closing a connection cancels its token,
//! which wakes both tasks out of whatever read or write they are blocked in; each
//! task then drops its half, closing the socket.

use crate::error::WireError;
use bytes::Bytes;
use peerlink_io::tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use peerlink_io::tokio_util::sync::WaitForCancellationFuture;
use peerlink_io::{CancellationToken, Mutex};
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a connection
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which side opened the connection
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectionDirection {
    /// Accepted by our listener
    Inbound,
    /// Dialed by us
    Outbound,
}

pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    direction: ConnectionDirection,
    alive: AtomicBool,
    outbound: UnboundedSender<Bytes>,
    /// Bytes handed to `send` that the write task has not finished writing
    queued_bytes: AtomicUsize,
    max_queued_bytes: usize,
    cancel: CancellationToken,
}

impl Connection {
    /// Creates the handle plus the receiving end of its outbound queue, which the
    /// write task drains. The queue holds at most `max_queued_bytes`, plus one
    /// payload of any size accepted onto an empty queue
    pub(crate) fn new(
        peer_addr: SocketAddr,
        direction: ConnectionDirection,
        max_queued_bytes: usize,
        cancel: CancellationToken,
    ) -> (Arc<Self>, UnboundedReceiver<Bytes>) {
        let (outbound, outbound_rx) = peerlink_io::tokio::sync::mpsc::unbounded_channel();
        let this = Arc::new(Self {
            id: ConnectionId::next(),
            peer_addr,
            direction,
            alive: AtomicBool::new(true),
            outbound,
            queued_bytes: AtomicUsize::new(0),
            max_queued_bytes,
            cancel,
        });

        (this, outbound_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn direction(&self) -> ConnectionDirection {
        self.direction
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Queues `payload` for the write task. Never blocks. Fails if the connection is
    /// already closed, or if the remote has stopped draining and the queue would pass
    /// its byte limit, in which case the connection is closed. Write failures surface
    /// asynchronously
    pub fn send(&self, payload: Bytes) -> Result<(), WireError> {
        if !self.is_alive() {
            return Err(WireError::StreamClosed(self.id));
        }

        let len = payload.len();
        let before = self.queued_bytes.fetch_add(len, Ordering::SeqCst);
        if before > 0 && before + len > self.max_queued_bytes {
            self.queued_bytes.fetch_sub(len, Ordering::SeqCst);
            log::warn!(target: "peerlink", "Connection {} to {} is not draining ({before} bytes queued), closing", self.id, self.peer_addr);
            self.close();
            return Err(WireError::QueueFull {
                id: self.id,
                queued: before,
            });
        }

        self.outbound.send(payload).map_err(|_| {
            self.queued_bytes.fetch_sub(len, Ordering::SeqCst);
            WireError::StreamClosed(self.id)
        })
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes.load(Ordering::SeqCst)
    }

    /// Called by the write task once `len` bytes are on the wire
    pub(crate) fn written(&self, len: usize) {
        self.queued_bytes.fetch_sub(len, Ordering::SeqCst);
    }

    /// Marks the connection dead and wakes its read and write tasks. Idempotent.
    /// Returns true only for the call that performed the close
    pub fn close(&self) -> bool {
        let was_alive = self.alive.swap(false, Ordering::SeqCst);
        self.cancel.cancel();
        if was_alive {
            log::trace!(target: "peerlink", "Closing connection {} to {}", self.id, self.peer_addr);
        }
        was_alive
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("direction", &self.direction)
            .field("alive", &self.is_alive())
            .field("queued_bytes", &self.queued_bytes())
            .finish()
    }
}

/// The live connections accepted by a listener.
///
/// Every mutation goes through one lock. Iteration never happens under the lock:
/// callers take a [`snapshot`](ConnectionSet::snapshot) and iterate that, so a
/// connection removing itself mid-broadcast cannot invalidate the iteration.
#[derive(Clone, Default)]
pub struct ConnectionSet {
    inner: Arc<Mutex<HashMap<ConnectionId, Arc<Connection>>>>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if a connection with the same id is already present
    pub fn insert(&self, conn: Arc<Connection>) -> bool {
        let mut lock = self.inner.lock();
        if lock.contains_key(&conn.id()) {
            return false;
        }

        lock.insert(conn.id(), conn);
        true
    }

    /// Removes the connection if present. Removing an absent id is a no-op
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner.lock().remove(&id)
    }

    /// A stable copy of the current membership
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.inner.lock().values().cloned().collect()
    }

    /// Empties the set, returning what it held
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        self.inner.lock().drain().map(|(_, conn)| conn).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
