//! Trips.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use driverledger_core::{Trip, new_id, types::TripInput};
use serde_json::{Value, json};

use super::{ApiError, ApiResult, ensure_owner};
use crate::auth::{AllowExpiredUser, RequireUser};
use crate::server::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/trips", get(list_trips).post(create_trip))
        .route("/trips/", get(list_trips).post(create_trip))
        .route("/trips/{id}", put(update_trip).delete(delete_trip))
}

async fn create_trip(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    Json(input): Json<TripInput>,
) -> ApiResult<Json<Trip>> {
    let trip = Trip::new(new_id(), identity.user.id, input);
    state.trips.insert(&trip).await?;
    tracing::debug!(trip = %trip.id, driver = %trip.driver_id, "trip logged");
    Ok(Json(trip))
}

async fn list_trips(
    State(state): State<AppState>,
    AllowExpiredUser(identity): AllowExpiredUser,
) -> ApiResult<Json<Vec<Trip>>> {
    let user_id = identity.user.id;
    let trips = state.trips.find(|t| t.user_id == user_id).await?;
    Ok(Json(trips))
}

async fn owned_trip(state: &AppState, id: &str, caller: &str, action: &str) -> ApiResult<Trip> {
    let trip = state
        .trips
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Trip".into()))?;
    ensure_owner(&trip.user_id, caller, action)?;
    Ok(trip)
}

async fn update_trip(
    State(state): State<AppState>,
    AllowExpiredUser(identity): AllowExpiredUser,
    Path(id): Path<String>,
    Json(input): Json<TripInput>,
) -> ApiResult<Json<Trip>> {
    let existing = owned_trip(&state, &id, &identity.user.id, "update this trip").await?;
    let trip = Trip::new(existing.id, existing.user_id, input);
    state.trips.update(&trip).await?;
    Ok(Json(trip))
}

async fn delete_trip(
    State(state): State<AppState>,
    AllowExpiredUser(identity): AllowExpiredUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    owned_trip(&state, &id, &identity.user.id, "delete this trip").await?;
    state.trips.delete(&id).await?;
    Ok(Json(json!({"message": "Trip deleted"})))
}
