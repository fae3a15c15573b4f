use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::handlers::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub global_limiter: String,
    pub per_client_limiter: String,
    pub url_store: String,
}

fn describe(offline: bool) -> String {
    if offline { "offline" } else { "online" }.to_string()
}

pub struct HealthChecker;

impl HealthChecker {
    /// Healthy while every background maintenance task is still running.
    pub fn check_health(state: &AppState) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = state.started_at.elapsed().as_secs();

        let global_offline = state.global_limiter.is_offline();
        let per_client_offline = state.per_client_limiter.is_offline();
        let store_offline = state.shortener.is_offline();

        let status = if global_offline || per_client_offline || store_offline {
            "unhealthy"
        } else {
            "healthy"
        };

        HealthStatus {
            status: status.to_string(),
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            components: ComponentStatus {
                global_limiter: describe(global_offline),
                per_client_limiter: describe(per_client_offline),
                url_store: describe(store_offline),
            },
        }
    }
}
