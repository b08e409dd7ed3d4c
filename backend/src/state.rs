//! Application state management.

use crate::config::Config;
use crate::mcp::SessionRegistry;
use crate::yapi::{InterfaceSource, YapiClient};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
///
/// Owned by one server instance and handed to every handler; independent
/// instances share nothing.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Live MCP sessions
    sessions: SessionRegistry,
    /// Where interface documents come from
    source: Arc<dyn InterfaceSource>,
    /// Interval between SSE keep-alive comments
    keep_alive: Duration,
}

impl AppState {
    /// Create new application state with the given interface source.
    pub fn new(source: impl InterfaceSource + 'static, keep_alive: Duration) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                sessions: SessionRegistry::new(),
                source: Arc::new(source),
                keep_alive,
            }),
        }
    }

    /// Create application state backed by the YAPI server from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(YapiClient::new(config.yapi.clone()), config.keep_alive)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    pub fn source(&self) -> &dyn InterfaceSource {
        self.inner.source.as_ref()
    }

    pub fn keep_alive(&self) -> Duration {
        self.inner.keep_alive
    }
}
