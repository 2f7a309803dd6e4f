//! Observers of session events.
//!
//! Sinks are driven by a single dispatcher task, one event at a time, in the order the
//! events were produced. A sink never runs concurrently with another sink or with
//! itself, so it may touch context that is not safe for concurrent access.

use crate::error::SessionError;
use crate::event::SessionEvent;
use async_trait::async_trait;
use auto_impl::auto_impl;
use peerlink_io::tokio::sync::mpsc::UnboundedSender;

#[async_trait]
#[auto_impl(Arc, Box)]
pub trait SessionEventSink: Send + Sync {
    /// An error is logged and otherwise ignored: it never stops delivery to this or
    /// any other sink
    async fn on_session_event(&self, event: &SessionEvent) -> Result<(), SessionError>;
}

/// Forwards every event into a channel
#[derive(Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl SessionEventSink for ChannelSink {
    async fn on_session_event(&self, event: &SessionEvent) -> Result<(), SessionError> {
        Ok(self.tx.send(event.clone())?)
    }
}

/// Writes every event to the log
#[derive(Copy, Clone, Default)]
pub struct LoggingSink;

#[async_trait]
impl SessionEventSink for LoggingSink {
    async fn on_session_event(&self, event: &SessionEvent) -> Result<(), SessionError> {
        match event {
            SessionEvent::MessageReceived {
                from,
                connection,
                payload,
            } => {
                log::trace!(target: "peerlink", "Message of {} bytes from {from} ({connection})", payload.len())
            }
            SessionEvent::DialFailed { error } | SessionEvent::ListenerFailed { error } => {
                log::error!(target: "peerlink", "{error}")
            }
            SessionEvent::SendFailed { error, .. } => log::warn!(target: "peerlink", "{error}"),
            other => log::debug!(target: "peerlink", "{other:?}"),
        }

        Ok(())
    }
}
