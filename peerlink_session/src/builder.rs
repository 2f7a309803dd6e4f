//! Builder for [`SessionManager`].
//!
//! ```rust,ignore
//! use peerlink_session::prelude::*;
//!
//! let manager = SessionManagerBuilder::default()
//!     .with_listen_port(9000)
//!     .with_retry_budget(3, Duration::from_millis(500))
//!     .with_event_sink(LoggingSink)
//!     .build()?;
//! ```

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::manager::SessionManager;
use crate::role_source::RoleSource;
use crate::sink::SessionEventSink;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub struct SessionManagerBuilder {
    config: Option<SessionConfig>,
    sinks: Vec<Arc<dyn SessionEventSink>>,
    role_source: Option<Arc<dyn RoleSource>>,
}

impl SessionManagerBuilder {
    fn config_mut(&mut self) -> &mut SessionConfig {
        self.config.get_or_insert_with(SessionConfig::default)
    }

    /// Replaces every setting made so far with `config`
    pub fn with_config(&mut self, config: SessionConfig) -> &mut Self {
        self.config = Some(config);
        self
    }

    pub fn with_listen_port(&mut self, port: u16) -> &mut Self {
        self.config_mut().listen_port = port;
        self
    }

    pub fn with_bind_ip<T: Into<IpAddr>>(&mut self, ip: T) -> &mut Self {
        self.config_mut().bind_ip = ip.into();
        self
    }

    pub fn with_dial_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config_mut().dial_timeout = timeout;
        self
    }

    /// Sets how many connect attempts a dial makes, and the pause between them
    pub fn with_retry_budget(&mut self, max_attempts: u32, backoff: Duration) -> &mut Self {
        let cfg = self.config_mut();
        cfg.max_dial_attempts = max_attempts;
        cfg.dial_backoff = backoff;
        self
    }

    pub fn with_requery_delay(&mut self, delay: Duration) -> &mut Self {
        self.config_mut().requery_delay = delay;
        self
    }

    pub fn with_read_chunk_size(&mut self, size: usize) -> &mut Self {
        self.config_mut().read_chunk_size = size;
        self
    }

    /// Bytes a peer may leave unread before it is disconnected
    pub fn with_max_queued_bytes(&mut self, max: usize) -> &mut Self {
        self.config_mut().max_queued_bytes = max;
        self
    }

    /// May be called more than once. Sinks are invoked in the order they were added
    pub fn with_event_sink<S: SessionEventSink + 'static>(&mut self, sink: S) -> &mut Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Consulted once when a client role event lacks the owner address
    pub fn with_role_source<S: RoleSource + 'static>(&mut self, source: S) -> &mut Self {
        self.role_source = Some(Arc::new(source));
        self
    }

    /// Must be called from within a tokio runtime. The builder is left reset
    pub fn build(&mut self) -> Result<SessionManager, SessionError> {
        let config = self.config.take().unwrap_or_default();
        config.validate()?;

        Ok(SessionManager::new(
            config,
            std::mem::take(&mut self.sinks),
            self.role_source.take(),
        ))
    }
}
