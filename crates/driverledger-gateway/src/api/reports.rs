//! Financial reports.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use driverledger_core::{
    Report, ReportPeriod,
    types::{PeriodData, ReportRequest},
};

use super::{ApiError, ApiResult};
use crate::auth::{AllowExpiredUser, RequireUser};
use crate::server::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/reports", post(generate_report))
        .route("/reports/", post(generate_report))
        .route("/reports/verify-data", post(verify_data))
        .route("/reports/driver/{driver_id}", get(reports_for_driver))
        .route("/reports/{id}", get(get_report))
}

async fn generate_report(
    State(state): State<AppState>,
    AllowExpiredUser(identity): AllowExpiredUser,
    Json(request): Json<ReportRequest>,
) -> ApiResult<Json<Report>> {
    let period = ReportPeriod::from_request(&request)?;
    let report = state
        .ledger
        .generate_report(&identity.user.id, &period)
        .await?;
    Ok(Json(report))
}

async fn verify_data(
    State(state): State<AppState>,
    RequireUser(_): RequireUser,
    Json(request): Json<ReportRequest>,
) -> ApiResult<Json<PeriodData>> {
    let period = ReportPeriod::from_request(&request)?;
    Ok(Json(state.ledger.check_period_data(&period).await?))
}

async fn reports_for_driver(
    State(state): State<AppState>,
    RequireUser(_): RequireUser,
    Path(driver_id): Path<String>,
) -> ApiResult<Json<Vec<Report>>> {
    let driver_id = driver_id.trim().to_string();
    Ok(Json(
        state.reports.find(|r| r.driver_id == driver_id).await?,
    ))
}

async fn get_report(
    State(state): State<AppState>,
    RequireUser(_): RequireUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Report>> {
    state
        .reports
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Report".into()))
}
