use crate::config::Config;
use crate::error::Result;
use crate::handlers::{
    get_metrics, health_check, retrieve_url, shorten_url, stream_metrics, AppState, SharedState,
};
use crate::middleware::{global_rate_limit, logging_middleware, per_client_rate_limit};
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub struct Server {
    app: Router,
    state: SharedState,
    bind_addr: SocketAddr,
}

impl Server {
    /// Builds every component. Fails if any of them rejects its configuration.
    pub fn new(config: Config) -> Result<Self> {
        let bind_addr = config.bind_addr;
        let state = Arc::new(AppState::new(config)?);
        let app = create_app(Arc::clone(&state));

        Ok(Self {
            app,
            state,
            bind_addr,
        })
    }

    pub async fn run(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        info!("Linkgate server listening on {}", self.bind_addr);
        info!(
            global_rate = self.state.global_limiter.rate(),
            global_capacity = self.state.global_limiter.cap(),
            "Global limiter refilling"
        );
        info!("Health check available at /health");

        let served = axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        self.state.shutdown();
        info!("Linkgate server stopped");
        served
    }
}

/// Builds the router over already constructed components.
pub fn create_app(state: SharedState) -> Router {
    let per_client = Router::new()
        .route("/api/shorten", post(shorten_url))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            per_client_rate_limit,
        ));

    Router::new()
        .route("/:code", get(retrieve_url))
        .route("/api/metrics", get(get_metrics))
        .route("/api/metrics/stream", get(stream_metrics))
        .merge(per_client)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            global_rate_limit,
        ))
        .route("/health", get(health_check))
        .with_state(state.clone())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config))
                .layer(middleware::from_fn(logging_middleware)),
        )
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            // Wildcards cannot be combined with credentials.
            Ok(value) if value != "*" => Some(value),
            _ => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(crate::key_generator::API_KEY_HEADER),
        ])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
