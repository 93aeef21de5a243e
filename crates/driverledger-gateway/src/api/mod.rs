//! REST routes mounted under `/api`.

mod admin;
mod drivers;
mod expenses;
mod goals;
mod reports;
mod session;
mod trips;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use driverledger_core::{AuthConfig, LedgerError, StorageError};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::server::AppState;

/// Errors returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Caller does not own the record.
    #[error("{0}")]
    Forbidden(String),

    /// Malformed or inconsistent request.
    #[error("{0}")]
    BadRequest(String),
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Storage(e) => Self::Storage(e),
            LedgerError::InvalidRequest(msg) => Self::BadRequest(msg),
            LedgerError::NotFound(what) => Self::NotFound(what.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::BadRequest(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Auth(e) => return e.into_response(),
            Self::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

/// Handler result.
pub type ApiResult<T> = Result<T, ApiError>;

/// Fail with `Forbidden` unless `owner` is the caller.
fn ensure_owner(owner: &str, caller: &str, action: &str) -> ApiResult<()> {
    if owner == caller {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!("Not authorized to {action}")))
    }
}

/// All `/api` routes. The debug routes are only mounted when enabled.
pub fn routes(auth: &AuthConfig) -> Router<AppState> {
    let router = Router::new()
        .merge(session::routes())
        .merge(drivers::routes())
        .merge(trips::routes())
        .merge(expenses::routes())
        .merge(goals::routes())
        .merge(reports::routes())
        .merge(admin::routes());

    if auth.debug_endpoints {
        tracing::warn!("debug token endpoint enabled");
        router.merge(admin::debug_routes())
    } else {
        router
    }
}
