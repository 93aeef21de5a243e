//! Savings goals.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use driverledger_core::{Goal, new_id, types::GoalInput};
use serde_json::{Value, json};

use super::{ApiError, ApiResult, ensure_owner};
use crate::auth::AllowExpiredUser;
use crate::server::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/goals", get(list_goals).post(create_goal))
        .route("/goals/", get(list_goals).post(create_goal))
        .route("/goals/driver/{driver_id}", get(goals_for_driver))
        .route("/goals/{id}/update-progress", put(update_progress))
        .route(
            "/goals/{id}",
            get(get_goal).put(update_goal).delete(delete_goal),
        )
}

async fn create_goal(
    State(state): State<AppState>,
    AllowExpiredUser(identity): AllowExpiredUser,
    Json(input): Json<GoalInput>,
) -> ApiResult<Json<Goal>> {
    if input.target_amount < 0.0 {
        return Err(ApiError::BadRequest(
            "target_amount must not be negative".into(),
        ));
    }
    let goal = Goal::new(new_id(), identity.user.id, input);
    state.goals.insert(&goal).await?;
    Ok(Json(goal))
}

async fn list_goals(
    State(state): State<AppState>,
    AllowExpiredUser(_): AllowExpiredUser,
) -> ApiResult<Json<Vec<Goal>>> {
    Ok(Json(state.goals.list().await?))
}

async fn goals_for_driver(
    State(state): State<AppState>,
    AllowExpiredUser(_): AllowExpiredUser,
    Path(driver_id): Path<String>,
) -> ApiResult<Json<Vec<Goal>>> {
    let driver_id = driver_id.trim().to_string();
    Ok(Json(
        state.goals.find(|g| g.driver_id == driver_id).await?,
    ))
}

async fn get_goal(
    State(state): State<AppState>,
    AllowExpiredUser(_): AllowExpiredUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Goal>> {
    state
        .goals
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Goal".into()))
}

async fn update_progress(
    State(state): State<AppState>,
    AllowExpiredUser(_): AllowExpiredUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Goal>> {
    Ok(Json(state.ledger.refresh_goal_progress(&id).await?))
}

async fn owned_goal(state: &AppState, id: &str, caller: &str, action: &str) -> ApiResult<Goal> {
    let goal = state
        .goals
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Goal".into()))?;
    ensure_owner(&goal.user_id, caller, action)?;
    Ok(goal)
}

async fn update_goal(
    State(state): State<AppState>,
    AllowExpiredUser(identity): AllowExpiredUser,
    Path(id): Path<String>,
    Json(input): Json<GoalInput>,
) -> ApiResult<Json<Goal>> {
    let mut goal = owned_goal(&state, &id, &identity.user.id, "update this goal").await?;
    goal.apply(input);
    state.goals.update(&goal).await?;
    Ok(Json(goal))
}

async fn delete_goal(
    State(state): State<AppState>,
    AllowExpiredUser(identity): AllowExpiredUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    owned_goal(&state, &id, &identity.user.id, "delete this goal").await?;
    state.goals.delete(&id).await?;
    Ok(Json(json!({"message": "Goal deleted"})))
}
