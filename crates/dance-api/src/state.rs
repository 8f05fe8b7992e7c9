//! Application state.

use dance_worker::JobExecutor;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub executor: JobExecutor,
}

impl AppState {
    pub fn new(config: ApiConfig, executor: JobExecutor) -> Self {
        Self { config, executor }
    }
}
