//! Shared application state passed to all HTTP handlers.

use std::sync::Arc;

use crate::broker::Broker;
use crate::config::Config;

/// Central state shared across every websocket/session and the HTTP surface.
pub struct AppState {
    pub config: Arc<Config>,
    pub broker: Arc<Broker>,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            broker: Arc::new(Broker::new()),
        })
    }
}
