use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Redirect, Response,
    },
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info, warn};

use crate::code_generator::CodeGenerator;
use crate::config::Config;
use crate::error::{GateError, Result};
use crate::global_limiter::GlobalLimiter;
use crate::health::HealthChecker;
use crate::metrics::Metrics;
use crate::per_client_limiter::PerClientLimiter;
use crate::response::ShortenResponse;
use crate::shortener::{InMemoryUrlStore, UrlStore};
use crate::validation::{RequestValidator, ShortenRequest};

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Every component is built once at startup and shared by handle.
pub struct AppState {
    pub config: Config,
    pub global_limiter: GlobalLimiter,
    pub per_client_limiter: PerClientLimiter,
    pub shortener: Arc<dyn UrlStore>,
    pub code_generator: CodeGenerator,
    pub started_at: tokio::time::Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("code_generator", &self.code_generator)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Builds all components. Any validation failure aborts startup; components
    /// already built are stopped when dropped.
    pub fn new(config: Config) -> Result<Self> {
        let global_limiter = GlobalLimiter::new(config.global_limiter())?;
        let per_client_limiter = PerClientLimiter::new(config.per_client_limiter())?;
        let shortener_config = config.shortener();
        let shortener = Arc::new(InMemoryUrlStore::new(shortener_config)?);

        Ok(Self {
            global_limiter,
            per_client_limiter,
            shortener,
            code_generator: CodeGenerator::new(shortener_config.code_length),
            started_at: tokio::time::Instant::now(),
            config,
        })
    }

    /// Takes every component offline. Call once.
    pub fn shutdown(&self) {
        self.global_limiter.offline();
        self.per_client_limiter.offline();
        self.shortener.offline();
    }
}

/// Shorten a URL
pub async fn shorten_url(
    State(state): State<SharedState>,
    payload: std::result::Result<Json<ShortenRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload.map_err(|e| {
        warn!(error = %e, "Failed to decode shorten payload");
        GateError::InvalidRequest(
            "Oops, we couldn't process your request. Please try again later.".to_string(),
        )
    })?;

    if let Err(e) = RequestValidator::validate_shorten_request(&request, state.config.max_url_length) {
        warn!(url = %request.original, error = %e, "Rejected url");
        return Err(e);
    }

    let code = state
        .code_generator
        .shorten(state.shortener.as_ref(), &request.original)
        .inspect_err(|e| {
            error!(original_url = %request.original, error = %e, "Failed to shorten url");
        })?;

    info!(original_url = %request.original, short_code = %code, "Url shortened");
    Ok((StatusCode::CREATED, Json(ShortenResponse::new(code))))
}

/// Redirect a short code to its original URL
pub async fn retrieve_url(State(state): State<SharedState>, Path(code): Path<String>) -> Response {
    match state.shortener.retrieve_url(&code) {
        Ok(original) => {
            info!(short_code = %code, original_url = %original, "Redirecting short code");
            Redirect::temporary(&original).into_response()
        }
        Err(GateError::NotFound(_)) => {
            info!(short_code = %code, "Short code not found");
            (
                StatusCode::NOT_FOUND,
                Html(state.config.fallback_404_html.clone()),
            )
                .into_response()
        }
        Err(e) => {
            error!(short_code = %code, error = %e, "Failed to look up short code");
            e.into_response()
        }
    }
}

/// Current metrics snapshot
pub async fn get_metrics(State(state): State<SharedState>) -> Json<Metrics> {
    Json(Metrics::collect(&state))
}

/// One metrics snapshot per second as server-sent events
pub async fn stream_metrics(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    info!("Client connected to metrics stream");

    let ticks = IntervalStream::new(tokio::time::interval(Duration::from_secs(1)));
    let events = ticks.map(move |_| {
        let event = Event::default()
            .json_data(Metrics::collect(&state))
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to encode metrics");
                Event::default()
                    .event("error")
                    .data("Metrics Streaming is currently unavailable.")
            });
        Ok(event)
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let health = HealthChecker::check_health(&state);
    let status = if health.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(health))
}
