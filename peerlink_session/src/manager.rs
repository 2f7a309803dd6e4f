//! The session manager: turns role events into a running listener or dialer.
//!
//! # Roles
//!
//! At most one role is active at a time. The owner of a group listens and fans every
//! send out to all accepted peers. A client dials the owner with a bounded retry
//! budget and sends to that single connection. A role event that implies a different
//! role tears the current one down first. An established link to the owner is kept
//! across owner events and across repeats of the same client event.
//!
//! # Tasks
//!
//! Besides the transport's own accept/read/write tasks, each manager runs:
//!
//! - a translator, turning transport events into session events and noticing when
//!   the dialed connection is lost
//! - a dispatcher, the only task that ever calls into a [`SessionEventSink`]
//! - at most one dial sequence
//! - at most one pending owner address re-query
//!
//! Background tasks hold the manager weakly. Dropping the last [`SessionManager`]
//! handle cancels the dial and re-query tasks and closes every socket, after which the
//! translator and dispatcher run dry and exit.

use crate::config::SessionConfig;
use crate::dial::{dial_with_retry, RetryBudget};
use crate::error::SessionError;
use crate::event::{RoleEvent, SessionEvent, TransportState};
use crate::role_source::RoleSource;
use crate::sink::{ChannelSink, SessionEventSink};
use bytes::Bytes;
use futures::StreamExt;
use peerlink_io::tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use peerlink_io::tokio::sync::oneshot;
use peerlink_io::tokio_stream::wrappers::UnboundedReceiverStream;
use peerlink_io::{tokio, CancellationToken, Mutex};
use peerlink_wire::{
    ConnectionDirection, ConnectionId, SocketTransport, TransportEvent,
};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

type SinkList = Arc<Mutex<Vec<Arc<dyn SessionEventSink>>>>;

/// Clonable handle to one session. All clones drive the same role
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    transport: SocketTransport,
    role: Mutex<RoleState>,
    sinks: SinkList,
    role_source: Option<Arc<dyn RoleSource>>,
    events: UnboundedSender<SessionEvent>,
    /// Parent of every dial and re-query token
    shutdown: CancellationToken,
}

struct RoleState {
    state: TransportState,
    /// Bumped whenever the dialer role is replaced or torn down
    generation: u64,
    dial_cancel: Option<CancellationToken>,
    requery_cancel: Option<CancellationToken>,
    dialed: Option<ConnectionId>,
    /// Where the current dialer role points
    target: Option<SocketAddr>,
}

/// Resolves to whether a [`SessionManager::dial`] sequence connected
pub struct DialOutcome {
    rx: oneshot::Receiver<bool>,
}

impl DialOutcome {
    fn ready(success: bool) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(success);
        Self { rx }
    }
}

impl Future for DialOutcome {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // a dropped sender means the sequence was torn down with the manager
        Pin::new(&mut self.rx).poll(cx).map(|res| res.unwrap_or(false))
    }
}

impl SessionManager {
    /// Must be called from within a tokio runtime: the translator and dispatcher
    /// tasks are spawned here
    pub(crate) fn new(
        config: SessionConfig,
        sinks: Vec<Arc<dyn SessionEventSink>>,
        role_source: Option<Arc<dyn RoleSource>>,
    ) -> Self {
        let (transport_tx, transport_rx) = tokio::sync::mpsc::unbounded_channel();
        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = SocketTransport::new(config.transport_config(), transport_tx);
        let sinks: SinkList = Arc::new(Mutex::new(sinks));

        let inner = Arc::new(SessionInner {
            config,
            transport,
            role: Mutex::new(RoleState {
                state: TransportState::Idle,
                generation: 0,
                dial_cancel: None,
                requery_cancel: None,
                dialed: None,
                target: None,
            }),
            sinks: sinks.clone(),
            role_source,
            events: events_tx,
            shutdown: CancellationToken::new(),
        });

        peerlink_io::spawn(dispatch_loop(sinks, events_rx));
        peerlink_io::spawn(translate_loop(Arc::downgrade(&inner), transport_rx));

        Self { inner }
    }

    pub fn builder() -> crate::builder::SessionManagerBuilder {
        crate::builder::SessionManagerBuilder::default()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Reacts to the latest group state. Never fails: problems are reported through
    /// the event sinks
    pub fn on_role_event(&self, event: RoleEvent) {
        self.inner.on_role_event(event)
    }

    /// Starts the listener role on `port`. Returns false if a role is already active or
    /// the port cannot be bound. Bind failures are not retried
    pub fn start_listener(&self, port: u16) -> bool {
        let mut role = self.inner.role.lock();
        if !role.state.is_idle() {
            log::warn!(target: "peerlink", "Cannot start listener while {}", role.state);
            self.inner.emit(SessionEvent::ListenerFailed {
                error: SessionError::AlreadyActive(role.state),
            });
            return false;
        }

        self.inner.listen_locked(&mut role, port)
    }

    /// Starts the dialer role against `addr:port`, each attempt bounded by `timeout`.
    /// The returned outcome resolves once the sequence connects, exhausts its budget
    /// or is superseded. A dial requested while another role is active resolves to
    /// false right away
    pub fn dial(&self, addr: IpAddr, port: u16, timeout: Duration) -> DialOutcome {
        let mut role = self.inner.role.lock();
        if !role.state.is_idle() {
            log::warn!(target: "peerlink", "Cannot dial while {}", role.state);
            self.inner.emit(SessionEvent::DialFailed {
                error: SessionError::AlreadyActive(role.state),
            });
            return DialOutcome::ready(false);
        }

        let budget = RetryBudget::from(&self.inner.config).with_attempt_timeout(timeout);
        let (tx, rx) = oneshot::channel();
        self.inner
            .begin_dial_locked(&mut role, addr, port, budget, Some(tx));
        DialOutcome { rx }
    }

    /// Queues `payload` for every accepted peer (listener role) or for the owner
    /// (dialer role). Returns false only if there is nobody to send to. Never blocks:
    /// write failures surface later as [`SessionEvent::SendFailed`]
    pub fn send<T: Into<Bytes>>(&self, payload: T) -> bool {
        self.inner.transport.send(payload.into())
    }

    /// Stops every role and cancels any pending dial or re-query. Idempotent
    pub fn stop(&self) {
        let mut role = self.inner.role.lock();
        self.inner.teardown_locked(&mut role, TransportState::Stopped);
    }

    /// Stops only the listener role and closes its connections
    pub fn stop_listener(&self) {
        let mut role = self.inner.role.lock();
        if role.state != TransportState::Listening {
            return;
        }

        self.inner.transport.stop_listener();
        self.inner.emit(SessionEvent::ListenerStopped);
        self.inner.set_state(&mut role, TransportState::Idle);
    }

    /// Stops only the dialer role, cancelling a dial in flight
    pub fn disconnect(&self) {
        let mut role = self.inner.role.lock();
        if !matches!(
            role.state,
            TransportState::Dialing | TransportState::Connected
        ) {
            return;
        }

        self.inner.cancel_dial_locked(&mut role);
        self.inner.transport.disconnect();
        self.inner.set_state(&mut role, TransportState::Idle);
    }

    pub fn state(&self) -> TransportState {
        self.inner.role.lock().state
    }

    /// The number of peers accepted by the listener role
    pub fn connection_count(&self) -> usize {
        self.inner.transport.connection_count()
    }

    pub fn local_listen_addr(&self) -> Option<SocketAddr> {
        self.inner.transport.local_listen_addr()
    }

    /// Sinks added later only see events produced after they were added
    pub fn add_event_sink<S: SessionEventSink + 'static>(&self, sink: S) {
        self.inner.sinks.lock().push(Arc::new(sink));
    }

    /// Shorthand for a [`ChannelSink`] whose receiving end is returned as a stream
    pub fn subscribe(&self) -> UnboundedReceiverStream<SessionEvent> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.add_event_sink(ChannelSink::new(tx));
        UnboundedReceiverStream::new(rx)
    }
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, role: &mut RoleState, to: TransportState) {
        if role.state == to {
            return;
        }

        let from = std::mem::replace(&mut role.state, to);
        log::debug!(target: "peerlink", "Transport state {from} -> {to}");
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn on_role_event(self: &Arc<Self>, event: RoleEvent) {
        log::debug!(target: "peerlink", "Role event: {event:?}");
        let mut role = self.role.lock();

        if !event.group_formed {
            self.teardown_locked(&mut role, TransportState::Idle);
            return;
        }

        if event.is_owner {
            // an established link to the owner outlives a stale owner report
            if matches!(
                role.state,
                TransportState::Listening | TransportState::Connected
            ) {
                log::trace!(target: "peerlink", "Owner event ignored while {}", role.state);
                return;
            }

            self.teardown_locked(&mut role, TransportState::Idle);
            let _ = self.listen_locked(&mut role, self.config.listen_port);
            return;
        }

        match event.owner_address {
            Some(addr) => self.redial_locked(&mut role, addr),
            None => self.schedule_requery_locked(&mut role),
        }
    }

    fn listen_locked(&self, role: &mut RoleState, port: u16) -> bool {
        match self.transport.listen(port) {
            Ok(local_addr) => {
                self.set_state(role, TransportState::Listening);
                self.emit(SessionEvent::ListenerStarted { local_addr });
                true
            }

            Err(err) => {
                let error = SessionError::from(err);
                log::error!(target: "peerlink", "Error starting listener: {error}");
                self.emit(SessionEvent::ListenerFailed { error });
                false
            }
        }
    }

    /// Replaces whatever role is active with a fresh dial to the owner
    fn redial_locked(self: &Arc<Self>, role: &mut RoleState, addr: IpAddr) {
        let target = SocketAddr::new(addr, self.config.listen_port);
        if role.state == TransportState::Connected && role.target == Some(target) {
            log::trace!(target: "peerlink", "Already connected to {target}");
            return;
        }

        self.teardown_locked(role, TransportState::Idle);
        let budget = RetryBudget::from(&self.config);
        self.begin_dial_locked(role, addr, self.config.listen_port, budget, None);
    }

    fn begin_dial_locked(
        self: &Arc<Self>,
        role: &mut RoleState,
        addr: IpAddr,
        port: u16,
        budget: RetryBudget,
        outcome: Option<oneshot::Sender<bool>>,
    ) {
        self.cancel_dial_locked(role);
        let generation = role.generation;
        let cancel = self.shutdown.child_token();
        role.dial_cancel = Some(cancel.clone());
        role.target = Some(SocketAddr::new(addr, port));
        self.set_state(role, TransportState::Dialing);

        log::info!(target: "peerlink", "Connecting to {addr}:{port}");
        peerlink_io::spawn(dial_task(
            Arc::downgrade(self),
            self.transport.clone(),
            self.events.clone(),
            DialRequest {
                addr,
                port,
                budget,
                generation,
                cancel,
                outcome,
            },
        ));
    }

    /// Cancels the dial sequence in flight, if any. Its result can no longer be
    /// installed afterwards
    fn cancel_dial_locked(&self, role: &mut RoleState) {
        role.generation = role.generation.wrapping_add(1);
        if let Some(cancel) = role.dial_cancel.take() {
            cancel.cancel();
        }
    }

    fn finish_dial(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        result: Result<(ConnectionId, SocketAddr), SessionError>,
    ) -> bool {
        let mut role = self.role.lock();
        if role.generation != generation || cancel.is_cancelled() {
            if let Ok((id, address)) = result {
                log::debug!(target: "peerlink", "Dropping superseded connection to {address}");
                self.transport.close_connection(id);
            }
            return false;
        }

        role.dial_cancel = None;
        match result {
            // the connection may already have dropped before we got the lock
            Ok((id, address)) if self.transport.is_connected() => {
                role.dialed = Some(id);
                self.set_state(&mut role, TransportState::Connected);
                self.emit(SessionEvent::DialSucceeded {
                    connection: id,
                    address,
                });
                true
            }

            Ok(_) => {
                self.set_state(&mut role, TransportState::Idle);
                self.emit(SessionEvent::DialFailed {
                    error: SessionError::StreamClosed,
                });
                false
            }

            Err(error) => {
                log::error!(target: "peerlink", "Dial failed: {error}");
                self.set_state(&mut role, TransportState::Idle);
                self.emit(SessionEvent::DialFailed { error });
                false
            }
        }
    }

    /// The owner address is not known yet. Ask the role source once more after the
    /// configured delay; a newer client event replaces the pending question
    fn schedule_requery_locked(self: &Arc<Self>, role: &mut RoleState) {
        if let Some(prev) = role.requery_cancel.take() {
            prev.cancel();
        }

        let Some(source) = self.role_source.clone() else {
            log::warn!(target: "peerlink", "Group owner address is unresolved and no role source is set");
            self.emit(SessionEvent::DialFailed {
                error: SessionError::AddressUnresolved,
            });
            return;
        };

        log::debug!(target: "peerlink", "Group owner address unresolved, asking again in {:?}", self.config.requery_delay);
        let cancel = self.shutdown.child_token();
        role.requery_cancel = Some(cancel.clone());
        peerlink_io::spawn_cancellable(
            cancel.clone(),
            requery_task(Arc::downgrade(self), source, self.config.requery_delay, cancel),
        );
    }

    fn finish_requery(self: &Arc<Self>, cancel: &CancellationToken, answer: Option<RoleEvent>) {
        let mut role = self.role.lock();
        if cancel.is_cancelled() {
            return;
        }

        role.requery_cancel = None;
        match answer.and_then(|event| event.owner_address) {
            Some(addr) => {
                log::debug!(target: "peerlink", "Re-query resolved owner address {addr}");
                self.redial_locked(&mut role, addr);
            }

            None => {
                log::error!(target: "peerlink", "Group owner address still unresolved");
                self.emit(SessionEvent::DialFailed {
                    error: SessionError::AddressUnresolved,
                });
            }
        }
    }

    /// Stop accepting, close every connection, clear the set, then cancel anything
    /// pending
    fn teardown_locked(&self, role: &mut RoleState, to: TransportState) {
        let was_listening = self.transport.is_listening();
        self.transport.close_all();
        self.cancel_dial_locked(role);
        if let Some(cancel) = role.requery_cancel.take() {
            cancel.cancel();
        }
        role.dialed = None;
        role.target = None;

        if was_listening {
            self.emit(SessionEvent::ListenerStopped);
        }
        self.set_state(role, to);
    }

    fn on_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { id, peer_addr, .. } => {
                self.emit(SessionEvent::PeerConnected {
                    connection: id,
                    peer_addr,
                });
            }

            TransportEvent::Received {
                id,
                peer_addr,
                payload,
            } => {
                self.emit(SessionEvent::MessageReceived {
                    from: peer_addr,
                    connection: id,
                    payload,
                });
            }

            TransportEvent::WriteFailed {
                id,
                peer_addr,
                reason,
            } => {
                self.emit(SessionEvent::SendFailed {
                    connection: id,
                    peer_addr,
                    error: SessionError::StreamError(reason),
                });
            }

            TransportEvent::Disconnected {
                id,
                peer_addr,
                direction,
                reason,
            } => {
                log::debug!(target: "peerlink", "Peer {peer_addr} ({id}) disconnected: {reason:?}");
                if direction == ConnectionDirection::Outbound {
                    let mut role = self.role.lock();
                    if role.dialed == Some(id) {
                        role.dialed = None;
                        role.target = None;
                        self.set_state(&mut role, TransportState::Idle);
                    }
                }

                self.emit(SessionEvent::PeerDisconnected {
                    connection: id,
                    peer_addr,
                });
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        log::trace!(target: "peerlink", "Dropping session manager");
        self.shutdown.cancel();
        self.transport.close_all();
    }
}

struct DialRequest {
    addr: IpAddr,
    port: u16,
    budget: RetryBudget,
    generation: u64,
    cancel: CancellationToken,
    outcome: Option<oneshot::Sender<bool>>,
}

async fn dial_task(
    inner: Weak<SessionInner>,
    transport: SocketTransport,
    events: UnboundedSender<SessionEvent>,
    request: DialRequest,
) {
    let DialRequest {
        addr,
        port,
        budget,
        generation,
        cancel,
        outcome,
    } = request;

    let result = dial_with_retry(&transport, addr, port, &budget, &cancel, |attempt, address| {
        let _ = events.send(SessionEvent::DialAttempt {
            attempt,
            max_attempts: budget.max_attempts,
            address,
        });
    })
    .await;

    let success = match inner.upgrade() {
        Some(inner) => inner.finish_dial(generation, &cancel, result),
        None => {
            if let Ok((id, _)) = result {
                transport.close_connection(id);
            }
            false
        }
    };

    if let Some(outcome) = outcome {
        let _ = outcome.send(success);
    }
}

async fn requery_task(
    inner: Weak<SessionInner>,
    source: Arc<dyn RoleSource>,
    delay: Duration,
    cancel: CancellationToken,
) {
    tokio::time::sleep(delay).await;
    let answer = source.query_role().await;
    if let Some(inner) = inner.upgrade() {
        inner.finish_requery(&cancel, answer);
    }
}

async fn translate_loop(inner: Weak<SessionInner>, events: UnboundedReceiver<TransportEvent>) {
    let mut events = UnboundedReceiverStream::new(events);
    while let Some(event) = events.next().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };

        inner.on_transport_event(event);
    }

    log::trace!(target: "peerlink", "Transport event translator finished");
}

/// Delivers events to the sinks one at a time, in production order
async fn dispatch_loop(sinks: SinkList, events: UnboundedReceiver<SessionEvent>) {
    let mut events = UnboundedReceiverStream::new(events);
    while let Some(event) = events.next().await {
        let sinks = sinks.lock().clone();
        for sink in sinks {
            if let Err(err) = sink.on_session_event(&event).await {
                log::warn!(target: "peerlink", "Event sink failed: {err}");
            }
        }
    }

    log::trace!(target: "peerlink", "Event dispatcher finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn manager() -> SessionManager {
        SessionManager::new(
            SessionConfig {
                listen_port: 0,
                bind_ip: LOCALHOST,
                dial_backoff: Duration::from_millis(50),
                dial_timeout: Duration::from_millis(200),
                ..Default::default()
            },
            Vec::new(),
            None,
        )
    }

    #[tokio::test]
    async fn stop_is_idempotent_from_any_state() {
        peerlink_logging::setup_log();
        let manager = manager();
        manager.stop();
        manager.stop();
        assert_eq!(manager.state(), TransportState::Stopped);

        assert!(manager.start_listener(0));
        manager.stop();
        manager.stop();
        assert_eq!(manager.state(), TransportState::Stopped);
        assert!(manager.local_listen_addr().is_none());
    }

    #[tokio::test]
    async fn listener_and_dialer_are_exclusive() {
        peerlink_logging::setup_log();
        let manager = manager();
        assert!(manager.start_listener(0));
        assert!(!manager.dial(LOCALHOST, 1, Duration::from_millis(100)).await);
        assert_eq!(manager.state(), TransportState::Listening);

        manager.stop_listener();
        assert_eq!(manager.state(), TransportState::Idle);
        manager.stop_listener();
        assert_eq!(manager.state(), TransportState::Idle);
    }

    #[tokio::test]
    async fn disconnect_cancels_dial_in_flight() {
        peerlink_logging::setup_log();
        let manager = manager();
        let port = std::net::TcpListener::bind((LOCALHOST, 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let outcome = manager.dial(LOCALHOST, port, Duration::from_millis(200));
        assert_eq!(manager.state(), TransportState::Dialing);
        manager.disconnect();
        assert_eq!(manager.state(), TransportState::Idle);
        assert!(!outcome.await);
        assert_eq!(manager.state(), TransportState::Idle);
    }

    #[tokio::test]
    async fn missing_owner_without_role_source_stays_idle() {
        peerlink_logging::setup_log();
        let manager = manager();
        let mut events = manager.subscribe();
        manager.on_role_event(RoleEvent::client(None));
        assert_eq!(manager.state(), TransportState::Idle);

        let event = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            SessionEvent::DialFailed {
                error: SessionError::AddressUnresolved
            }
        ));
    }
}
