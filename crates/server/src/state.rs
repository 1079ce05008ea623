//! Application State
//!
//! Shared state across all handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use std::sync::Arc;

use receptionist_config::{load_settings, Settings};

use crate::upstream::UpstreamClient;
use crate::ServerError;

#[derive(Clone)]
pub struct AppState {
    /// Wrapped for hot reload
    pub config: Arc<RwLock<Settings>>,
    pub upstream: Arc<UpstreamClient>,
    pub metrics: Option<PrometheusHandle>,
    env: Option<String>,
}

impl AppState {
    pub fn new(config: Settings) -> Result<Self, ServerError> {
        let upstream = UpstreamClient::from_settings(&config.upstream)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            upstream: Arc::new(upstream),
            metrics: None,
            env: None,
        })
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    pub fn with_env(mut self, env: Option<String>) -> Self {
        self.env = env;
        self
    }

    /// Reload configuration from files.
    ///
    /// The upstream client keeps its connection pool; endpoints and keys
    /// are read from the config on every request.
    pub fn reload_config(&self) -> Result<(), String> {
        let new_config = load_settings(self.env.as_deref())
            .map_err(|e| format!("Failed to reload config: {}", e))?;

        *self.config.write() = new_config;
        tracing::info!("Configuration reloaded successfully");
        Ok(())
    }

    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }
}
