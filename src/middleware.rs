use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{error, info, warn};

use crate::error::GateError;
pub use crate::error::{BUSY_MESSAGE, RATE_EXCEEDED_MESSAGE};
use crate::handlers::SharedState;
use crate::key_generator::KeyGenerator;
use crate::per_client_limiter::Admission;

pub const INVALID_API_KEY_MESSAGE: &str = "Invalid API key provided.";

fn client_ip(request: &Request) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    KeyGenerator::extract_client_ip(request.headers(), peer)
}

/// Debits one global token per request
pub async fn global_rate_limit(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    if state.global_limiter.allow(1) {
        return next.run(request).await;
    }

    warn!(
        target: "linkgate::middleware",
        client_ip = %client_ip(&request),
        path = %request.uri().path(),
        "Global rate limit exceeded"
    );
    GateError::CapacityExceeded("Global token bucket is empty".into()).into_response()
}

/// Admits requests per `ip:api-key` client
pub async fn per_client_rate_limit(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    let path = request.uri().path().to_string();

    let client_key = match KeyGenerator::extract_api_key(request.headers()) {
        Some(api_key) => KeyGenerator::client_key(&ip, api_key),
        None => {
            warn!(target: "linkgate::middleware", client_ip = %ip, path = %path, "Missing API key");
            return GateError::Unauthorized(INVALID_API_KEY_MESSAGE.into()).into_response();
        }
    };

    match state.per_client_limiter.allow(&client_key) {
        Ok(Admission::Admitted) => next.run(request).await,
        Ok(Admission::StorageFull) => {
            warn!(
                target: "linkgate::middleware",
                client_id = %client_key,
                path = %path,
                "Per-client limiter storage full"
            );
            GateError::CapacityExceeded("Client table is full".into()).into_response()
        }
        Ok(Admission::RateExceeded) => {
            warn!(
                target: "linkgate::middleware",
                client_id = %client_key,
                path = %path,
                "Per-client rate limit exceeded"
            );
            GateError::RateExceeded.into_response()
        }
        Err(e) => {
            error!(target: "linkgate::middleware", client_id = %client_key, error = %e, "Per-client limiter failed");
            e.into_response()
        }
    }
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = client_ip(&request);

    info!(
        target: "linkgate::middleware",
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        target: "linkgate::middleware",
        method = %method,
        uri = %uri,
        status = %response.status(),
        "Request completed"
    );

    response
}
