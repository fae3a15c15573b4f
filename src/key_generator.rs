//! Client identification for per-client rate limiting.

use axum::http::HeaderMap;
use std::net::SocketAddr;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Derives per-client limiter keys from request metadata.
pub struct KeyGenerator;

impl KeyGenerator {
    /// Clients are identified by the pair of address and API key.
    pub fn client_key(client_ip: &str, api_key: &str) -> String {
        format!("{}:{}", client_ip, api_key)
    }

    /// Extract the client IP, preferring proxy headers over the peer address
    pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        forwarded
            .or(real_ip)
            .map(str::to_string)
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}
