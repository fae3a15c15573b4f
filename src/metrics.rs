use serde::Serialize;

use crate::handlers::AppState;

/// Point-in-time view of the admission and storage components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub global_token_bucket_cap: u64,
    pub global_tokens_used: u64,
    pub active_users: usize,
    pub current_url_count: usize,
}

impl Metrics {
    pub fn collect(state: &AppState) -> Self {
        let cap = state.global_limiter.cap();
        Self {
            global_token_bucket_cap: cap,
            global_tokens_used: cap.saturating_sub(state.global_limiter.len()),
            active_users: state.per_client_limiter.len(),
            current_url_count: state.shortener.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_serialization() {
        let metrics = Metrics {
            global_token_bucket_cap: 100,
            global_tokens_used: 7,
            active_users: 2,
            current_url_count: 5,
        };

        let json = serde_json::to_value(metrics).unwrap();
        assert_eq!(json["globalTokenBucketCap"], 100);
        assert_eq!(json["globalTokensUsed"], 7);
        assert_eq!(json["activeUsers"], 2);
        assert_eq!(json["currentUrlCount"], 5);
    }
}
