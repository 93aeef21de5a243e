//! Router-level tests for the REST API.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use driverledger_core::{AuthConfig, DocumentStore, SledDocumentStore};
use driverledger_gateway::auth::{
    InMemoryRefreshRegistry, KeyRing, NewUser, TOKEN_EXPIRED_HEADER, TOKEN_EXPIRING_SOON_HEADER,
    TokenIssuer,
};
use driverledger_gateway::{AppState, AuthState, app};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    auth: Arc<AuthState>,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

fn test_app(config: AuthConfig) -> TestApp {
    let store: Arc<dyn DocumentStore> = Arc::new(SledDocumentStore::temporary().unwrap());
    let auth = Arc::new(AuthState::initialize(config, Arc::clone(&store)).unwrap());
    let router = app(AppState::new(Arc::clone(&auth), store), false);
    TestApp { router, auth }
}

fn default_app() -> TestApp {
    test_app(
        AuthConfig::builder()
            .jwt_secret("current-secret")
            .alternate_secret("retired-secret")
            .build(),
    )
}

fn issuer_for(secret: &str) -> TokenIssuer {
    let keys = KeyRing::new(&SecretString::from(secret.to_string()), Vec::new()).unwrap();
    TokenIssuer::new(
        Arc::new(keys),
        Arc::new(InMemoryRefreshRegistry::new()),
        Duration::from_secs(1800),
        Duration::from_secs(7 * 86400),
    )
    .unwrap()
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn register(&self, username: &str, password: &str) {
        self.auth
            .register(NewUser {
                username: username.to_string(),
                email: None,
                profile_picture: None,
                password: password.to_string(),
            })
            .await
            .unwrap();
    }

    async fn login(&self, username: &str, password: &str) -> Value {
        let reply = self
            .send(
                Method::POST,
                "/api/login",
                None,
                Some(json!({"username": username, "password": password})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.body
    }

    fn access_token(&self, username: &str) -> String {
        self.auth
            .issuer
            .issue_access_token(username)
            .unwrap()
            .token
    }

    fn expired_token(&self, username: &str) -> String {
        self.auth
            .issuer
            .issue_access_token_with_ttl(username, chrono::Duration::minutes(-10))
            .unwrap()
            .token
    }
}

fn trip(driver_id: &str, date: &str, earnings: f64) -> Value {
    json!({
        "driver_id": driver_id,
        "platform": "Uber",
        "date": date,
        "distance": 12.5,
        "earnings": earnings,
        "origin": "Centro",
        "destination": "Aeroporto",
    })
}

fn expense(driver_id: &str, date: &str, amount: f64) -> Value {
    json!({
        "driver_id": driver_id,
        "category": "Combustível",
        "amount": amount,
        "date": date,
        "description": "Tanque",
        "fuel_type": "Gasolina",
        "liters": 20.0,
        "price_per_liter": 5.5,
        "odometer": 10200.0,
    })
}

#[tokio::test]
async fn health_is_public() {
    let app = default_app();
    let reply = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn register_login_me_and_renew() {
    let app = default_app();

    let reply = app
        .send(
            Method::POST,
            "/api/register",
            None,
            Some(json!({"username": "ana", "password": "pw", "email": "ana@example.com"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["username"], "ana");
    assert!(reply.body.get("password_hash").is_none());

    let login = app.login("ana", "pw").await;
    assert_eq!(login["token_type"], "bearer");
    assert_eq!(login["user_id"], reply.body["id"]);

    let access = login["access_token"].as_str().unwrap();
    let me = app.send(Method::GET, "/api/me", Some(access), None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["email"], "ana@example.com");

    let refresh = login["refresh_token"].as_str().unwrap();
    let renewed = app
        .send(Method::POST, "/api/refresh-token", Some(refresh), None)
        .await;
    assert_eq!(renewed.status, StatusCode::OK);
    assert_eq!(renewed.body["token_type"], "bearer");

    let fresh = renewed.body["access_token"].as_str().unwrap();
    let me = app.send(Method::GET, "/api/users/me", Some(fresh), None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["username"], "ana");
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let app = default_app();
    app.register("ana", "first").await;

    let reply = app
        .send(
            Method::POST,
            "/api/register",
            None,
            Some(json!({"username": "ana", "password": "second"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    app.login("ana", "first").await;
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let app = default_app();
    app.register("ana", "pw").await;

    let reply = app
        .send(
            Method::POST,
            "/api/login",
            None,
            Some(json!({"username": "ana", "password": "nope"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.headers[header::WWW_AUTHENTICATE], "Bearer");
    assert_eq!(reply.body["code"], "invalid_credentials");
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = default_app();
    let reply = app.send(Method::GET, "/api/me", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["code"], "not_authenticated");
}

#[tokio::test]
async fn expired_token_strict_vs_lenient_routes() {
    let app = default_app();
    app.register("ana", "pw").await;
    let expired = app.expired_token("ana");

    let strict = app
        .send(
            Method::POST,
            "/api/trips",
            Some(&expired),
            Some(trip("d1", "2024-01-10", 100.0)),
        )
        .await;
    assert_eq!(strict.status, StatusCode::UNAUTHORIZED);
    assert_eq!(strict.headers[TOKEN_EXPIRED_HEADER], "true");
    assert_eq!(strict.headers[header::WWW_AUTHENTICATE], "Bearer");
    assert_eq!(strict.body["token_expired"], true);

    let lenient = app
        .send(
            Method::POST,
            "/api/expenses",
            Some(&expired),
            Some(expense("d1", "2024-01-11", 40.0)),
        )
        .await;
    assert_eq!(lenient.status, StatusCode::OK);
    assert_eq!(lenient.body["driver_id"], "d1");
}

#[tokio::test]
async fn alternate_key_tokens_are_honored() {
    let app = default_app();
    app.register("ana", "pw").await;

    let legacy = issuer_for("retired-secret")
        .issue_access_token("ana")
        .unwrap()
        .token;
    let reply = app.send(Method::GET, "/api/me", Some(&legacy), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["username"], "ana");
}

#[tokio::test]
async fn foreign_key_tokens_fail_both_gates() {
    let app = default_app();
    app.register("ana", "pw").await;

    let foreign = issuer_for("someone-else")
        .issue_access_token("ana")
        .unwrap()
        .token;

    let strict = app.send(Method::GET, "/api/me", Some(&foreign), None).await;
    assert_eq!(strict.status, StatusCode::UNAUTHORIZED);
    assert_eq!(strict.body["code"], "invalid_token");

    let lenient = app
        .send(Method::GET, "/api/drivers", Some(&foreign), None)
        .await;
    assert_eq!(lenient.status, StatusCode::UNAUTHORIZED);
    assert!(lenient.headers.get(TOKEN_EXPIRED_HEADER).is_none());
}

#[tokio::test]
async fn only_latest_refresh_token_renews() {
    let app = default_app();
    app.register("ana", "pw").await;

    let first = app.login("ana", "pw").await;
    let second = app.login("ana", "pw").await;

    let stale = app
        .send(
            Method::POST,
            "/api/refresh-token",
            first["refresh_token"].as_str(),
            None,
        )
        .await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);
    assert_eq!(stale.body["code"], "refresh_rejected");

    let live = app
        .send(
            Method::POST,
            "/api/refresh-token",
            second["refresh_token"].as_str(),
            None,
        )
        .await;
    assert_eq!(live.status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_token_is_not_an_access_token() {
    let app = default_app();
    app.register("ana", "pw").await;
    let login = app.login("ana", "pw").await;

    let reply = app
        .send(Method::GET, "/api/me", login["refresh_token"].as_str(), None)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["code"], "wrong_token_type");
}

#[tokio::test]
async fn trips_are_owner_scoped() {
    let app = default_app();
    app.register("ana", "pw").await;
    app.register("bia", "pw").await;
    let ana = app.access_token("ana");
    let bia = app.access_token("bia");

    let created = app
        .send(
            Method::POST,
            "/api/trips",
            Some(&ana),
            Some(trip(" d1 ", "2024-01-10", 100.0)),
        )
        .await;
    assert_eq!(created.status, StatusCode::OK);
    assert_eq!(created.body["driver_id"], "d1");
    let id = created.body["id"].as_str().unwrap().to_string();

    let theirs = app.send(Method::GET, "/api/trips", Some(&bia), None).await;
    assert_eq!(theirs.body, json!([]));

    let forbidden = app
        .send(
            Method::PUT,
            &format!("/api/trips/{id}"),
            Some(&bia),
            Some(trip("d1", "2024-01-10", 1.0)),
        )
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let deleted = app
        .send(Method::DELETE, &format!("/api/trips/{id}"), Some(&ana), None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK);

    let missing = app
        .send(Method::DELETE, &format!("/api/trips/{id}"), Some(&ana), None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn drivers_hide_password_and_reject_duplicate_names() {
    let app = default_app();
    app.register("ana", "pw").await;
    let token = app.access_token("ana");

    let created = app
        .send(
            Method::POST,
            "/api/drivers",
            Some(&token),
            Some(json!({"name": "Carlos", "password": "driver-pw"})),
        )
        .await;
    assert_eq!(created.status, StatusCode::OK);
    assert!(created.body.get("password").is_none());
    assert!(created.body.get("password_hash").is_none());

    let duplicate = app
        .send(
            Method::POST,
            "/api/drivers/",
            Some(&token),
            Some(json!({"name": "Carlos", "password": "x"})),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);

    let listed = app.send(Method::GET, "/api/drivers", Some(&token), None).await;
    assert_eq!(listed.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn report_aggregates_period() {
    let app = default_app();
    app.register("ana", "pw").await;
    let token = app.access_token("ana");

    for (date, earnings) in [("2024-01-05", 200.0), ("2024-01-20", 100.0), ("2024-02-02", 999.0)] {
        let reply = app
            .send(Method::POST, "/api/trips", Some(&token), Some(trip("d1", date, earnings)))
            .await;
        assert_eq!(reply.status, StatusCode::OK);
    }
    app.send(
        Method::POST,
        "/api/expenses",
        Some(&token),
        Some(expense("d1", "2024-01-15", 50.0)),
    )
    .await;
    let goal = app
        .send(
            Method::POST,
            "/api/goals",
            Some(&token),
            Some(json!({"driver_id": "d1", "name": "Carro", "target_amount": 500.0, "deadline": "2024-12-31"})),
        )
        .await;
    let goal_id = goal.body["id"].as_str().unwrap().to_string();

    let period = json!({"driver_id": "d1", "start_date": "2024-01-01", "end_date": "2024-01-31"});
    let report = app
        .send(Method::POST, "/api/reports", Some(&token), Some(period.clone()))
        .await;
    assert_eq!(report.status, StatusCode::OK);
    assert_eq!(report.body["total_earnings"], 300.0);
    assert_eq!(report.body["total_expenses"], 50.0);
    assert_eq!(report.body["net_profit"], 250.0);
    assert_eq!(report.body["goals_progress"][&goal_id]["progress"], 50.0);

    let check = app
        .send(Method::POST, "/api/reports/verify-data", Some(&token), Some(period))
        .await;
    assert_eq!(check.body["has_data"], true);
    assert_eq!(check.body["trips_count"], 2);

    let stored = app
        .send(Method::GET, "/api/reports/driver/d1", Some(&token), None)
        .await;
    assert_eq!(stored.body.as_array().unwrap().len(), 1);

    let backwards = app
        .send(
            Method::POST,
            "/api/reports",
            Some(&token),
            Some(json!({"driver_id": "d1", "start_date": "2024-02-01", "end_date": "2024-01-01"})),
        )
        .await;
    assert_eq!(backwards.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn goal_progress_uses_lifetime_net() {
    let app = default_app();
    app.register("ana", "pw").await;
    let token = app.access_token("ana");

    app.send(Method::POST, "/api/trips", Some(&token), Some(trip("D1", "2023-05-01", 300.0)))
        .await;
    app.send(Method::POST, "/api/expenses", Some(&token), Some(expense("d1", "2024-01-01", 100.0)))
        .await;
    let goal = app
        .send(
            Method::POST,
            "/api/goals",
            Some(&token),
            Some(json!({"driver_id": "d1", "name": "Reserva", "target_amount": 1000.0, "deadline": "2025-01-01"})),
        )
        .await;
    let id = goal.body["id"].as_str().unwrap();

    let refreshed = app
        .send(Method::PUT, &format!("/api/goals/{id}/update-progress"), Some(&token), None)
        .await;
    assert_eq!(refreshed.status, StatusCode::OK);
    assert_eq!(refreshed.body["current_amount"], 200.0);
}

#[tokio::test]
async fn merge_driver_ids_requires_both_ids() {
    let app = default_app();
    app.register("ana", "pw").await;
    let token = app.access_token("ana");

    app.send(Method::POST, "/api/trips", Some(&token), Some(trip("old", "2024-01-01", 10.0)))
        .await;

    let missing = app
        .send(
            Method::POST,
            "/api/admin/merge-driver-ids",
            Some(&token),
            Some(json!({"source_id": "old"})),
        )
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let merged = app
        .send(
            Method::POST,
            "/api/admin/merge-driver-ids",
            Some(&token),
            Some(json!({"source_id": "old", "target_id": "new"})),
        )
        .await;
    assert_eq!(merged.status, StatusCode::OK);
    assert_eq!(merged.body["updated"]["trips"], 1);
    assert_eq!(merged.body["total"], 1);
}

#[tokio::test]
async fn expiring_soon_header() {
    let app = default_app();
    app.register("ana", "pw").await;

    let soon = app
        .auth
        .issuer
        .issue_access_token_with_ttl("ana", chrono::Duration::minutes(2))
        .unwrap()
        .token;
    let reply = app.send(Method::GET, "/api/me", Some(&soon), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers[TOKEN_EXPIRING_SOON_HEADER], "true");

    let fresh = app.access_token("ana");
    let reply = app.send(Method::GET, "/api/me", Some(&fresh), None).await;
    assert!(reply.headers.get(TOKEN_EXPIRING_SOON_HEADER).is_none());
}

#[tokio::test]
async fn token_expired_seconds_ago_is_rejected_by_strict_routes() {
    let app = default_app();
    app.register("ana", "pw").await;

    let stale = app
        .auth
        .issuer
        .issue_access_token_with_ttl("ana", chrono::Duration::seconds(-15))
        .unwrap()
        .token;

    let reply = app.send(Method::GET, "/api/me", Some(&stale), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.headers[TOKEN_EXPIRED_HEADER], "true");
    assert!(reply.headers.get(TOKEN_EXPIRING_SOON_HEADER).is_none());

    let reply = app.send(Method::GET, "/api/goals", Some(&stale), None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn debug_token_info_only_when_enabled() {
    let disabled = default_app();
    let token = disabled.access_token("ana");
    let reply = disabled
        .send(Method::GET, "/api/debug/token-info", Some(&token), None)
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let enabled = test_app(
        AuthConfig::builder()
            .jwt_secret("current-secret")
            .alternate_secret("retired-secret")
            .debug_endpoints(true)
            .build(),
    );
    let token = issuer_for("retired-secret")
        .issue_access_token("ana")
        .unwrap()
        .token;
    let reply = enabled
        .send(Method::GET, "/api/debug/token-info", Some(&token), None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let results = reply.body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["key"], "primary");
    assert_eq!(results[0]["valid"], false);
    assert_eq!(results[1]["key"], "alternate-1");
    assert_eq!(results[1]["valid"], true);
    assert_eq!(results[1]["payload"]["sub"], "ana");
    assert!(reply.body["token_preview"].as_str().unwrap().ends_with("..."));
}
