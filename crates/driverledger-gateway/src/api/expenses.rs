//! Expenses.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use driverledger_core::{Expense, ledger::ExpenseNormalization, new_id, types::ExpenseInput};
use serde_json::{Value, json};

use super::{ApiError, ApiResult, ensure_owner};
use crate::auth::{AllowExpiredUser, RequireUser};
use crate::server::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/expenses", get(list_expenses).post(create_expense))
        .route("/expenses/", get(list_expenses).post(create_expense))
        .route("/expenses/driver/{driver_id}", get(expenses_for_driver))
        .route("/expenses/normalize/{driver_id}", get(normalize_driver))
        .route(
            "/expenses/{id}",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
}

fn build(id: String, user_id: String, input: ExpenseInput) -> Expense {
    let expense = Expense::new(id, user_id, input);
    if !expense.fuel_details_complete() {
        tracing::warn!(expense = %expense.id, "fuel expense with incomplete details");
    }
    expense
}

async fn create_expense(
    State(state): State<AppState>,
    AllowExpiredUser(identity): AllowExpiredUser,
    Json(input): Json<ExpenseInput>,
) -> ApiResult<Json<Expense>> {
    let expense = build(new_id(), identity.user.id, input);
    state.expenses.insert(&expense).await?;
    tracing::debug!(expense = %expense.id, driver = %expense.driver_id, "expense logged");
    Ok(Json(expense))
}

async fn list_expenses(
    State(state): State<AppState>,
    AllowExpiredUser(_): AllowExpiredUser,
) -> ApiResult<Json<Vec<Expense>>> {
    Ok(Json(state.expenses.list().await?))
}

async fn get_expense(
    State(state): State<AppState>,
    AllowExpiredUser(_): AllowExpiredUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Expense>> {
    state
        .expenses
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Expense".into()))
}

async fn expenses_for_driver(
    State(state): State<AppState>,
    AllowExpiredUser(_): AllowExpiredUser,
    Path(driver_id): Path<String>,
) -> ApiResult<Json<Vec<Expense>>> {
    Ok(Json(state.ledger.expenses_for_driver(&driver_id).await?))
}

async fn normalize_driver(
    State(state): State<AppState>,
    RequireUser(_): RequireUser,
    Path(driver_id): Path<String>,
) -> ApiResult<Json<ExpenseNormalization>> {
    Ok(Json(
        state.ledger.normalize_expense_driver_ids(&driver_id).await?,
    ))
}

async fn owned_expense(
    state: &AppState,
    id: &str,
    caller: &str,
    action: &str,
) -> ApiResult<Expense> {
    let expense = state
        .expenses
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Expense".into()))?;
    ensure_owner(&expense.user_id, caller, action)?;
    Ok(expense)
}

async fn update_expense(
    State(state): State<AppState>,
    AllowExpiredUser(identity): AllowExpiredUser,
    Path(id): Path<String>,
    Json(input): Json<ExpenseInput>,
) -> ApiResult<Json<Expense>> {
    let existing = owned_expense(&state, &id, &identity.user.id, "update this expense").await?;
    let expense = build(existing.id, existing.user_id, input);
    state.expenses.update(&expense).await?;
    Ok(Json(expense))
}

async fn delete_expense(
    State(state): State<AppState>,
    AllowExpiredUser(identity): AllowExpiredUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    owned_expense(&state, &id, &identity.user.id, "delete this expense").await?;
    state.expenses.delete(&id).await?;
    Ok(Json(json!({"message": "Expense deleted"})))
}
