//! Driver profiles.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use driverledger_core::{Driver, new_id, types::DriverInput, types::DriverView};
use serde_json::{Value, json};

use super::{ApiError, ApiResult};
use crate::auth::{AllowExpiredUser, RequireUser};
use crate::server::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/drivers", get(list_drivers).post(create_driver))
        .route("/drivers/", get(list_drivers).post(create_driver))
        .route(
            "/drivers/{id}",
            get(get_driver).put(update_driver).delete(delete_driver),
        )
}

fn validate(input: &DriverInput) -> ApiResult<String> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Driver name is required".into()));
    }
    if input.password.is_empty() {
        return Err(ApiError::BadRequest("Driver password is required".into()));
    }
    Ok(name.to_string())
}

async fn name_taken(state: &AppState, name: &str, except: Option<&str>) -> ApiResult<bool> {
    let clash = state
        .drivers
        .find(|d| d.name == name && Some(d.id.as_str()) != except)
        .await?;
    Ok(!clash.is_empty())
}

async fn create_driver(
    State(state): State<AppState>,
    AllowExpiredUser(identity): AllowExpiredUser,
    Json(input): Json<DriverInput>,
) -> ApiResult<Json<DriverView>> {
    let name = validate(&input)?;
    if name_taken(&state, &name, None).await? {
        return Err(ApiError::BadRequest(
            "A driver with this name already exists".into(),
        ));
    }

    let driver = Driver {
        id: new_id(),
        user_id: identity.user.id,
        name,
        password_hash: state.auth.passwords.hash(&input.password)?,
    };
    state.drivers.insert(&driver).await?;

    tracing::info!(driver = %driver.id, "driver created");
    Ok(Json(driver.view()))
}

async fn list_drivers(
    State(state): State<AppState>,
    AllowExpiredUser(_): AllowExpiredUser,
) -> ApiResult<Json<Vec<DriverView>>> {
    let drivers = state.drivers.list().await?;
    Ok(Json(drivers.iter().map(Driver::view).collect()))
}

async fn get_driver(
    State(state): State<AppState>,
    AllowExpiredUser(_): AllowExpiredUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DriverView>> {
    let driver = state
        .drivers
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Driver".into()))?;
    Ok(Json(driver.view()))
}

async fn update_driver(
    State(state): State<AppState>,
    RequireUser(_): RequireUser,
    Path(id): Path<String>,
    Json(input): Json<DriverInput>,
) -> ApiResult<Json<DriverView>> {
    let mut driver = state
        .drivers
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Driver".into()))?;

    let name = validate(&input)?;
    if name_taken(&state, &name, Some(&id)).await? {
        return Err(ApiError::BadRequest(
            "A driver with this name already exists".into(),
        ));
    }

    driver.name = name;
    driver.password_hash = state.auth.passwords.hash(&input.password)?;
    state.drivers.update(&driver).await?;
    Ok(Json(driver.view()))
}

async fn delete_driver(
    State(state): State<AppState>,
    RequireUser(_): RequireUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.drivers.delete(&id).await? {
        return Err(ApiError::NotFound("Driver".into()));
    }
    tracing::info!(driver = %id, "driver deleted");
    Ok(Json(json!({"message": "Driver deleted"})))
}
