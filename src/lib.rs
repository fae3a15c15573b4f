pub mod code_generator;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod global_limiter;
pub mod handlers;
pub mod health;
pub mod key_generator;
pub mod metrics;
pub mod middleware;
pub mod per_client_limiter;
pub mod response;
pub mod server;
pub mod shortener;
pub mod token_bucket;
pub mod validation;

pub use code_generator::CodeGenerator;
pub use config::Config;
pub use error::{GateError, Result};
pub use global_limiter::{GlobalLimiter, GlobalLimiterConfig};
pub use handlers::{AppState, SharedState};
pub use per_client_limiter::{Admission, PerClientConfig, PerClientLimiter};
pub use server::{create_app, Server};
pub use shortener::{InMemoryUrlStore, ShortenerConfig, UrlStore};
