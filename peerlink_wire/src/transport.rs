//! The listener/dialer socket primitive.
//!
//! # Cancellation
//!
//! Every loop here (accept, read, write) runs on its own task and `select!`s its I/O
//! against a [`CancellationToken`]. Stopping the transport cancels the tokens, which
//! unblocks any pending `accept`/`read`/`write` immediately; the task then drops its
//! socket half, closing it. This is the close-to-cancel pattern: the socket is torn
//! down out from under the blocked operation rather than waiting for it to notice a
//! flag.
//!
//! # Ordering
//!
//! Each read task pushes a chunk into the event channel before issuing its next read,
//! so chunks from one connection arrive in order. Chunks from different connections
//! race and have no defined relative order.

use crate::connection::{Connection, ConnectionDirection, ConnectionId, ConnectionSet};
use crate::error::WireError;
use crate::socket_helpers;
use bytes::Bytes;
use peerlink_io::tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use peerlink_io::tokio::net::{TcpListener, TcpStream};
use peerlink_io::tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use peerlink_io::{CancellationToken, Mutex};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// The number of bytes requested per read. Each read is delivered as-is
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;
/// Outbound bytes a connection may hold before its remote is considered stalled
pub const DEFAULT_MAX_QUEUED_BYTES: usize = 4 * 1024 * 1024;
/// Pause after a failed `accept` before accepting again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// The max number of bytes delivered per [`TransportEvent::Received`]
    pub read_chunk_size: usize,
    /// The local ip that listeners bind to
    pub bind_ip: IpAddr,
    /// Per-connection limit on bytes queued but not yet written
    pub max_queued_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            max_queued_bytes: DEFAULT_MAX_QUEUED_BYTES,
        }
    }
}

/// Why a connection ended
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DisconnectReason {
    /// The remote closed its side
    EndOfStream,
    /// A read failed
    Error(String),
    /// Closed locally
    Closed,
}

/// Everything the transport reports back to its owner
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected {
        id: ConnectionId,
        peer_addr: SocketAddr,
        direction: ConnectionDirection,
    },
    /// One read's worth of bytes. Never empty
    Received {
        id: ConnectionId,
        peer_addr: SocketAddr,
        payload: Bytes,
    },
    /// A queued write failed. The connection is closed as a result
    WriteFailed {
        id: ConnectionId,
        peer_addr: SocketAddr,
        reason: String,
    },
    Disconnected {
        id: ConnectionId,
        peer_addr: SocketAddr,
        direction: ConnectionDirection,
        reason: DisconnectReason,
    },
}

/// How a broadcast fared at queueing time
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct BroadcastReport {
    /// Connections the payload was queued on
    pub queued: usize,
    /// Connections that were already closed and got skipped
    pub skipped: usize,
}

struct ListenerHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

struct TransportInner {
    config: TransportConfig,
    connections: ConnectionSet,
    listener: Mutex<Option<ListenerHandle>>,
    dialed: Mutex<Option<Arc<Connection>>>,
    events: UnboundedSender<TransportEvent>,
}

/// Clonable handle to one transport. All clones drive the same sockets
#[derive(Clone)]
pub struct SocketTransport {
    inner: Arc<TransportInner>,
}

impl SocketTransport {
    pub fn new(config: TransportConfig, events: UnboundedSender<TransportEvent>) -> Self {
        Self {
            inner: Arc::new(TransportInner {
                config,
                connections: ConnectionSet::new(),
                listener: Mutex::new(None),
                dialed: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Binds `port` on the configured ip and starts the accept loop. Port 0 picks an
    /// ephemeral port; the bound address is returned
    pub fn listen(&self, port: u16) -> Result<SocketAddr, WireError> {
        let mut listener_slot = self.inner.listener.lock();
        if listener_slot.is_some() {
            return Err(WireError::AlreadyListening);
        }

        let listener = socket_helpers::get_tcp_listener((self.inner.config.bind_ip, port))?;
        let local_addr = listener.local_addr().map_err(|err| WireError::Bind {
            addr: SocketAddr::new(self.inner.config.bind_ip, port),
            reason: err.to_string(),
        })?;

        let cancel = CancellationToken::new();
        *listener_slot = Some(ListenerHandle {
            local_addr,
            cancel: cancel.clone(),
        });
        drop(listener_slot);

        log::info!(target: "peerlink", "Listener started on {local_addr}");
        peerlink_io::spawn(accept_loop(self.inner.clone(), listener, cancel));
        Ok(local_addr)
    }

    /// Opens one connection and starts its read loop. A failure leaves the transport
    /// untouched so the caller can decide whether to retry
    pub async fn connect(
        &self,
        addr: IpAddr,
        port: u16,
        timeout: Duration,
    ) -> Result<(ConnectionId, SocketAddr), WireError> {
        if self.dialed_connection().is_some() {
            return Err(WireError::AlreadyConnected);
        }

        let stream = socket_helpers::get_tcp_stream((addr, port), timeout).await?;
        let peer_addr = stream
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::new(addr, port));

        let mut dialed = self.inner.dialed.lock();
        if dialed.as_ref().map(|c| c.is_alive()).unwrap_or(false) {
            // another connect won the race while this one was in flight
            return Err(WireError::AlreadyConnected);
        }

        let conn = adopt_tcp(
            &self.inner,
            stream,
            peer_addr,
            ConnectionDirection::Outbound,
            CancellationToken::new(),
        );
        *dialed = Some(conn.clone());
        log::info!(target: "peerlink", "Connected to listener at {peer_addr} ({})", conn.id());
        Ok((conn.id(), peer_addr))
    }

    /// Queues `payload` on every accepted connection. A closed connection is skipped
    pub fn broadcast(&self, payload: Bytes) -> BroadcastReport {
        let snapshot = self.inner.connections.snapshot();
        log::trace!(target: "peerlink", "Broadcasting {} bytes to {} clients", payload.len(), snapshot.len());
        let mut report = BroadcastReport::default();
        for conn in snapshot {
            match self.queue_on(&conn, payload.clone()) {
                Ok(()) => report.queued += 1,
                Err(err) => {
                    log::warn!(target: "peerlink", "Skipping client {}: {err}", conn.peer_addr());
                    report.skipped += 1;
                }
            }
        }

        report
    }

    /// Queues `payload` on the dialed connection
    pub fn unicast(&self, payload: Bytes) -> Result<(), WireError> {
        let conn = self.dialed_connection().ok_or(WireError::NotConnected)?;
        self.queue_on(&conn, payload)
    }

    /// A stalled remote is reported like a failed write
    fn queue_on(&self, conn: &Connection, payload: Bytes) -> Result<(), WireError> {
        let res = conn.send(payload);
        if let Err(err @ WireError::QueueFull { .. }) = &res {
            let _ = self.inner.events.send(TransportEvent::WriteFailed {
                id: conn.id(),
                peer_addr: conn.peer_addr(),
                reason: err.to_string(),
            });
        }

        res
    }

    /// Routes `payload` by role: broadcast while listening, unicast while dialed.
    /// Returns false only when there is no connection to send to
    pub fn send(&self, payload: Bytes) -> bool {
        if self.is_listening() {
            let report = self.broadcast(payload);
            report.queued + report.skipped > 0
        } else {
            match self.unicast(payload) {
                Ok(()) => true,
                Err(err) => {
                    log::debug!(target: "peerlink", "Cannot send message: {err}");
                    false
                }
            }
        }
    }

    /// Stops accepting and closes every accepted connection. Idempotent
    pub fn stop_listener(&self) {
        if let Some(handle) = self.inner.listener.lock().take() {
            log::debug!(target: "peerlink", "Stopping listener on {}", handle.local_addr);
            handle.cancel.cancel();
        }

        for conn in self.inner.connections.drain() {
            conn.close();
        }
    }

    /// Closes the dialed connection, if any. Idempotent
    pub fn disconnect(&self) {
        if let Some(conn) = self.inner.dialed.lock().take() {
            log::debug!(target: "peerlink", "Disconnecting from {}", conn.peer_addr());
            conn.close();
        }
    }

    /// Closes the listener and every connection, then clears the set. Idempotent
    pub fn close_all(&self) {
        self.stop_listener();
        self.disconnect();
    }

    /// Closes one connection by id, wherever it lives
    pub fn close_connection(&self, id: ConnectionId) -> bool {
        if let Some(conn) = self.inner.connections.remove(id) {
            return conn.close();
        }

        let mut dialed = self.inner.dialed.lock();
        if dialed.as_ref().map(|c| c.id()) == Some(id) {
            if let Some(conn) = dialed.take() {
                return conn.close();
            }
        }

        false
    }

    pub fn is_listening(&self) -> bool {
        self.inner.listener.lock().is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.dialed_connection().is_some()
    }

    pub fn local_listen_addr(&self) -> Option<SocketAddr> {
        self.inner.listener.lock().as_ref().map(|l| l.local_addr)
    }

    /// The number of live accepted connections
    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner.connections.snapshot()
    }

    fn dialed_connection(&self) -> Option<Arc<Connection>> {
        self.inner
            .dialed
            .lock()
            .as_ref()
            .filter(|c| c.is_alive())
            .cloned()
    }

    /// Adopts an arbitrary duplex as an accepted connection. Used to exercise the
    /// broadcast and teardown paths against in-memory streams
    #[cfg(test)]
    pub(crate) fn adopt_inbound<R, W>(&self, reader: R, writer: W, peer_addr: SocketAddr) -> Arc<Connection>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let cancel = self
            .inner
            .listener
            .lock()
            .as_ref()
            .map(|l| l.cancel.child_token())
            .unwrap_or_default();
        adopt(&self.inner, reader, writer, peer_addr, ConnectionDirection::Inbound, cancel)
    }
}

async fn accept_loop(inner: Arc<TransportInner>, listener: TcpListener, cancel: CancellationToken) {
    loop {
        log::trace!(target: "peerlink", "Waiting for client connection...");
        let accepted = peerlink_io::tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = listener.accept() => res,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                if cancel.is_cancelled() {
                    break;
                }

                log::debug!(target: "peerlink", "Client connected: {peer_addr}");
                let _ = adopt_tcp(
                    &inner,
                    stream,
                    peer_addr,
                    ConnectionDirection::Inbound,
                    cancel.child_token(),
                );
            }

            Err(err) => {
                log::error!(target: "peerlink", "Error accepting client: {err}");
                peerlink_io::tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = peerlink_io::tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                }
            }
        }
    }

    log::debug!(target: "peerlink", "Listener socket closed normally");
}

fn adopt_tcp(
    inner: &Arc<TransportInner>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    direction: ConnectionDirection,
    cancel: CancellationToken,
) -> Arc<Connection> {
    if let Err(err) = stream.set_nodelay(true) {
        log::warn!(target: "peerlink", "Failed to set TCP_NODELAY for {peer_addr}: {err}");
    }

    let (reader, writer) = stream.into_split();
    adopt(inner, reader, writer, peer_addr, direction, cancel)
}

/// Registers the connection, announces it and spawns its I/O task
fn adopt<R, W>(
    inner: &Arc<TransportInner>,
    reader: R,
    writer: W,
    peer_addr: SocketAddr,
    direction: ConnectionDirection,
    cancel: CancellationToken,
) -> Arc<Connection>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    // a listener stopped mid-accept hands out already-cancelled tokens; such a
    // connection must never enter the set
    let stopped = cancel.is_cancelled();
    let (conn, outbound_rx) =
        Connection::new(peer_addr, direction, inner.config.max_queued_bytes, cancel);
    if direction == ConnectionDirection::Inbound && !stopped {
        inner.connections.insert(conn.clone());
    }

    let _ = inner.events.send(TransportEvent::Connected {
        id: conn.id(),
        peer_addr,
        direction,
    });

    peerlink_io::spawn(connection_task(
        inner.clone(),
        conn.clone(),
        reader,
        writer,
        outbound_rx,
    ));

    conn
}

/// Runs the connection's write loop alongside its read loop, then tears it down:
/// close the stream first, remove it from the set second
async fn connection_task<R, W>(
    inner: Arc<TransportInner>,
    conn: Arc<Connection>,
    reader: R,
    writer: W,
    outbound_rx: UnboundedReceiver<Bytes>,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let write_task = peerlink_io::spawn(write_loop(
        inner.events.clone(),
        conn.clone(),
        writer,
        outbound_rx,
    ));

    let reason = read_loop(&inner, &conn, reader).await;

    conn.close();
    if let Err(err) = write_task.await {
        log::error!(target: "peerlink", "Write task for {} failed: {err}", conn.id());
    }

    let id = conn.id();
    inner.connections.remove(id);
    {
        let mut dialed = inner.dialed.lock();
        if dialed.as_ref().map(|c| c.id()) == Some(id) {
            *dialed = None;
        }
    }

    log::debug!(target: "peerlink", "Client handler for {} finished ({reason:?})", conn.peer_addr());
    let _ = inner.events.send(TransportEvent::Disconnected {
        id,
        peer_addr: conn.peer_addr(),
        direction: conn.direction(),
        reason,
    });
}

/// Reads until end-of-stream, error or cancellation. The reader is dropped on return
async fn read_loop<R>(inner: &TransportInner, conn: &Connection, mut reader: R) -> DisconnectReason
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; inner.config.read_chunk_size.max(1)];
    loop {
        if !conn.is_alive() {
            return DisconnectReason::Closed;
        }

        let read = peerlink_io::tokio::select! {
            biased;
            _ = conn.cancelled() => return DisconnectReason::Closed,
            res = reader.read(&mut buf) => res,
        };

        match read {
            Ok(0) => return DisconnectReason::EndOfStream,
            Ok(len) => {
                log::trace!(target: "peerlink", "Received {len} bytes from {}", conn.peer_addr());
                let payload = Bytes::copy_from_slice(&buf[..len]);
                let _ = inner.events.send(TransportEvent::Received {
                    id: conn.id(),
                    peer_addr: conn.peer_addr(),
                    payload,
                });
            }
            Err(err) => {
                log::debug!(target: "peerlink", "Connection {} closed: {err}", conn.id());
                return DisconnectReason::Error(err.to_string());
            }
        }
    }
}

/// Drains the outbound queue in order. The first failed write closes the connection
async fn write_loop<W>(
    events: UnboundedSender<TransportEvent>,
    conn: Arc<Connection>,
    mut writer: W,
    mut outbound_rx: UnboundedReceiver<Bytes>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let next = peerlink_io::tokio::select! {
            biased;
            _ = conn.cancelled() => break,
            next = outbound_rx.recv() => next,
        };

        let Some(payload) = next else {
            break;
        };

        let written = peerlink_io::tokio::select! {
            biased;
            _ = conn.cancelled() => break,
            res = async {
                writer.write_all(&payload).await?;
                writer.flush().await
            } => res,
        };

        match written {
            Ok(()) => conn.written(payload.len()),
            Err(err) => {
                log::warn!(target: "peerlink", "Error sending to client {}: {err}", conn.peer_addr());
                let _ = events.send(TransportEvent::WriteFailed {
                    id: conn.id(),
                    peer_addr: conn.peer_addr(),
                    reason: err.to_string(),
                });
                conn.close();
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerlink_io::tokio;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Accepts nothing: every write fails
    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken")))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    async fn next_event(rx: &mut UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    async fn wait_for_disconnect(rx: &mut UnboundedReceiver<TransportEvent>, id: ConnectionId) {
        loop {
            if let TransportEvent::Disconnected { id: gone, .. } = next_event(rx).await {
                if gone == id {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn broadcast_skips_failing_connection() {
        peerlink_logging::setup_log();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = SocketTransport::new(TransportConfig::default(), tx);
        transport.listen(0).unwrap();

        let mut remotes = Vec::new();
        for port in 1..=3 {
            let (local, remote) = tokio::io::duplex(4096);
            let (reader, writer) = tokio::io::split(local);
            transport.adopt_inbound(reader, writer, addr(port));
            remotes.push(remote);
        }

        let (dead_reader, _dead_remote) = tokio::io::duplex(64);
        let broken = transport.adopt_inbound(dead_reader, BrokenWriter, addr(4));
        assert_eq!(transport.connection_count(), 4);

        assert!(transport.send(Bytes::from_static(b"hello")));

        for remote in remotes.iter_mut() {
            let mut buf = [0u8; 5];
            tokio::time::timeout(EVENT_TIMEOUT, remote.read_exact(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&buf, b"hello");
        }

        wait_for_disconnect(&mut rx, broken.id()).await;
        assert!(!broken.is_alive());
        assert_eq!(transport.connection_count(), 3);
    }

    #[tokio::test]
    async fn remote_close_removes_only_that_connection() {
        peerlink_logging::setup_log();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = SocketTransport::new(TransportConfig::default(), tx);
        transport.listen(0).unwrap();

        let mut remotes = Vec::new();
        let mut conns = Vec::new();
        for port in 1..=3 {
            let (local, remote) = tokio::io::duplex(4096);
            let (reader, writer) = tokio::io::split(local);
            conns.push(transport.adopt_inbound(reader, writer, addr(port)));
            remotes.push(remote);
        }

        // simulated remote close of the middle connection, racing a broadcast
        let closed = remotes.remove(1);
        let racer = {
            let transport = transport.clone();
            tokio::spawn(async move {
                for _ in 0..16 {
                    transport.broadcast(Bytes::from_static(b"x"));
                    tokio::task::yield_now().await;
                }
            })
        };
        drop(closed);

        wait_for_disconnect(&mut rx, conns[1].id()).await;
        racer.await.unwrap();

        let live = transport.connections();
        assert_eq!(live.len(), 2);
        assert!(live.iter().all(|c| c.id() != conns[1].id()));
        assert!(conns[0].is_alive());
        assert!(conns[2].is_alive());
    }

    #[tokio::test]
    async fn reads_are_delivered_in_chunks_in_order() {
        peerlink_logging::setup_log();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let config = TransportConfig {
            read_chunk_size: 4,
            ..Default::default()
        };
        let transport = SocketTransport::new(config, tx);

        let (local, mut remote) = tokio::io::duplex(4096);
        let (reader, writer) = tokio::io::split(local);
        let conn = transport.adopt_inbound(reader, writer, addr(1));

        remote.write_all(b"abcdefghij").await.unwrap();
        drop(remote);

        let mut collected = Vec::new();
        loop {
            match next_event(&mut rx).await {
                TransportEvent::Received { id, payload, .. } => {
                    assert_eq!(id, conn.id());
                    assert!(!payload.is_empty());
                    assert!(payload.len() <= 4);
                    collected.extend_from_slice(&payload);
                }
                TransportEvent::Disconnected { reason, .. } => {
                    assert_eq!(reason, DisconnectReason::EndOfStream);
                    break;
                }
                _ => {}
            }
        }

        assert_eq!(collected, b"abcdefghij");
    }

    #[tokio::test]
    async fn stalled_remote_is_dropped_once_queue_limit_is_hit() {
        peerlink_logging::setup_log();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let config = TransportConfig {
            max_queued_bytes: 256,
            ..Default::default()
        };
        let transport = SocketTransport::new(config, tx);
        transport.listen(0).unwrap();

        let (healthy_local, mut healthy_remote) = tokio::io::duplex(4096);
        let (reader, writer) = tokio::io::split(healthy_local);
        let healthy = transport.adopt_inbound(reader, writer, addr(1));

        // the remote never reads, so at most 64 bytes ever leave the queue
        let (stalled_local, _stalled_remote) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(stalled_local);
        let stalled = transport.adopt_inbound(reader, writer, addr(2));

        let payload = Bytes::from(vec![7u8; 100]);
        let mut reports = Vec::new();
        for _ in 0..3 {
            reports.push(transport.broadcast(payload.clone()));
            let mut buf = [0u8; 100];
            tokio::time::timeout(EVENT_TIMEOUT, healthy_remote.read_exact(&mut buf))
                .await
                .unwrap()
                .unwrap();
        }

        assert_eq!(reports[0], BroadcastReport { queued: 2, skipped: 0 });
        assert_eq!(reports[1], BroadcastReport { queued: 2, skipped: 0 });
        assert_eq!(reports[2], BroadcastReport { queued: 1, skipped: 1 });
        assert!(!stalled.is_alive());
        assert!(healthy.is_alive());

        let mut write_failed = false;
        loop {
            match next_event(&mut rx).await {
                TransportEvent::WriteFailed { id, .. } if id == stalled.id() => write_failed = true,
                TransportEvent::Disconnected { id, .. } if id == stalled.id() => break,
                _ => {}
            }
        }
        assert!(write_failed);
        assert_eq!(transport.connection_count(), 1);
    }

    #[tokio::test]
    async fn send_without_connection_is_rejected() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = SocketTransport::new(TransportConfig::default(), tx);
        assert!(!transport.send(Bytes::from_static(b"nobody")));
        assert_eq!(
            transport.unicast(Bytes::from_static(b"nobody")),
            Err(WireError::NotConnected)
        );

        transport.listen(0).unwrap();
        assert!(!transport.send(Bytes::from_static(b"nobody")));
        transport.close_all();
        transport.close_all();
        assert!(!transport.is_listening());
    }

    #[tokio::test]
    async fn listen_twice_fails() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = SocketTransport::new(TransportConfig::default(), tx);
        transport.listen(0).unwrap();
        assert_eq!(transport.listen(0), Err(WireError::AlreadyListening));
        transport.stop_listener();
        assert!(transport.listen(0).is_ok());
    }
}
