use axum::extract::FromRef;

use super::ServerConfig;
use crate::scan_jobs::ScanContext;
use std::time::Instant;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub ctx: ScanContext,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for ScanContext {
    fn from_ref(input: &ServerState) -> Self {
        input.ctx.clone()
    }
}
