//! Login, renewal, registration and the caller's profile.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ApiResult;
use crate::auth::{NewUser, ProfileUpdate, PublicUser, RequireUser};
use crate::server::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
        .route("/register", post(register))
        .route("/me", get(me))
        .route("/users/me", get(me).put(update_me))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    access_token: String,
    token_type: &'static str,
    refresh_token: String,
    user_id: String,
}

#[derive(Debug, Serialize)]
struct AccessTokenResponse {
    access_token: String,
    token_type: &'static str,
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let (user, pair) = state
        .auth
        .login(request.username.trim(), &request.password)
        .await?;

    Ok(Json(LoginResponse {
        access_token: pair.access_token,
        token_type: "bearer",
        refresh_token: pair.refresh_token,
        user_id: user.id,
    }))
}

async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<AccessTokenResponse>> {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let issued = state.auth.renew(authorization).await?;

    Ok(Json(AccessTokenResponse {
        access_token: issued.token,
        token_type: "bearer",
    }))
}

async fn register(
    State(state): State<AppState>,
    Json(new_user): Json<NewUser>,
) -> ApiResult<Json<PublicUser>> {
    let new_user = new_user.normalized();
    new_user.validate()?;
    let user = state.auth.register(new_user).await?;
    Ok(Json(user.to_public()))
}

async fn me(RequireUser(identity): RequireUser) -> Json<PublicUser> {
    Json(identity.user.to_public())
}

async fn update_me(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<PublicUser>> {
    update.validate()?;
    let user = state
        .auth
        .users
        .update_profile(&identity.user.id, update)
        .await?;
    Ok(Json(user.to_public()))
}
