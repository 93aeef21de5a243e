//! # DriverLedger Gateway
//!
//! HTTP server for DriverLedger: token authentication and the REST API.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// REST routes.
pub mod api;
/// Authentication and authorization.
pub mod auth;
mod server;

pub use api::{ApiError, ApiResult};
pub use auth::{AuthError, AuthState, PublicUser, User, UserDirectory};
pub use server::{AppState, Gateway, GatewayBuilder, GatewayConfig, app};

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: GatewayConfig) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
