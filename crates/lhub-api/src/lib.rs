//! HTTP intake for LibrasHub sign uploads.
//!
//! This crate provides:
//! - `POST /signs` multipart intake feeding the sign pipeline
//! - Liveness checks
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{ApiConfig, PublisherKind};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
