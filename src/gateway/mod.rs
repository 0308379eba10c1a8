//! Axum-based HTTP gateway for the auth endpoints.
//!
//! - Request body size limits (64KB max)
//! - Request timeouts (30s)
//! - CORS restricted to the configured origin allow-list
//!
//! Every handler maps `AuthError` to a status code and a short
//! `{"error": ...}` body; nothing escapes a handler unmapped.

use crate::auth::{AuthError, AuthService, SignupRequest};
use crate::config::GatewayConfig;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize as GatewayDeserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
}

/// Build the router with middleware.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/auth/signup", post(handle_signup))
        .route("/auth/login", post(handle_login))
        .route("/auth/validate", post(handle_validate))
        .route("/check-admin", post(handle_check_admin))
        .route("/generate-invite-link", post(handle_generate_invite_link))
        .route("/change-password", put(handle_change_password))
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Run the HTTP gateway until Ctrl-C.
pub async fn run_gateway(config: &GatewayConfig, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let local = listener.local_addr()?;

    tracing::info!(%local, origins = config.allowed_origins.len(), "Gateway listening");

    let app = router(state, &config.allowed_origins);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// Concrete return type for handlers (avoids `impl IntoResponse` inference issues).
type AuthResponse = (StatusCode, Json<serde_json::Value>);

/// GET /health: always public
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Default, GatewayDeserialize)]
struct SignupBody {
    displayname: Option<String>,
    username: Option<String>,
    password: Option<String>,
    /// Invite token (named like the access token on the wire).
    accesstoken: Option<String>,
    #[serde(rename = "dbPool")]
    db_pool: Option<String>,
}

#[derive(Debug, Default, GatewayDeserialize)]
struct LoginBody {
    username: Option<String>,
    password: Option<String>,
    #[serde(rename = "dbPool")]
    db_pool: Option<String>,
}

#[derive(Debug, Default, GatewayDeserialize)]
struct ValidateBody {
    username: Option<String>,
    accesstoken: Option<String>,
    #[serde(rename = "dbPool")]
    db_pool: Option<String>,
}

/// Body for the bearer-authenticated admin endpoints.
#[derive(Debug, Default, GatewayDeserialize)]
struct AdminBody {
    username: Option<String>,
    #[serde(rename = "dbPool")]
    db_pool: Option<String>,
}

#[derive(Debug, Default, GatewayDeserialize)]
struct ChangePasswordBody {
    username: Option<String>,
    accesstoken: Option<String>,
    #[serde(rename = "newPassword")]
    new_password: Option<String>,
    #[serde(rename = "dbPool")]
    db_pool: Option<String>,
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn error_response(err: AuthError) -> AuthResponse {
    let (status, message) = match err {
        AuthError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.to_string()),
        AuthError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
        AuthError::Forbidden => (StatusCode::FORBIDDEN, err.to_string()),
        AuthError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
        AuthError::Conflict(_) => (StatusCode::CONFLICT, err.to_string()),
        AuthError::Internal(_) | AuthError::InvalidPool(_) => {
            tracing::error!("Request failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            )
        }
    };
    (status, Json(serde_json::json!({ "error": message })))
}

fn invalid_body(e: &JsonRejection) -> AuthResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": format!("Invalid request: {e}")})),
    )
}

/// POST /auth/signup: create an account (bootstrap or invited).
async fn handle_signup(
    State(state): State<AppState>,
    body: Result<Json<SignupBody>, JsonRejection>,
) -> AuthResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return invalid_body(&e),
    };

    let req = SignupRequest {
        display_name: body.displayname.as_deref().unwrap_or_default(),
        username: body.username.as_deref().unwrap_or_default(),
        password: body.password.as_deref().unwrap_or_default(),
        invite_token: body.accesstoken.as_deref(),
        dataset: body.db_pool.as_deref().unwrap_or_default(),
    };

    match state.auth.signup(&req) {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({"message": "User registered successfully"})),
        ),
        Err(e) => error_response(e),
    }
}

/// POST /auth/login: return id, display name and the current access token.
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> AuthResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return invalid_body(&e),
    };

    match state.auth.login(
        body.username.as_deref().unwrap_or_default(),
        body.password.as_deref().unwrap_or_default(),
        body.db_pool.as_deref().unwrap_or_default(),
    ) {
        Ok(profile) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": profile.id,
                "displayname": profile.display_name,
                "accesstoken": profile.access_token,
            })),
        ),
        Err(e) => error_response(e),
    }
}

/// POST /auth/validate: check a body-carried access token.
async fn handle_validate(
    State(state): State<AppState>,
    body: Result<Json<ValidateBody>, JsonRejection>,
) -> AuthResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return invalid_body(&e),
    };

    match state.auth.validate(
        body.username.as_deref().unwrap_or_default(),
        body.accesstoken.as_deref().unwrap_or_default(),
        body.db_pool.as_deref().unwrap_or_default(),
    ) {
        Ok(display_name) => (
            StatusCode::OK,
            Json(serde_json::json!({"displayname": display_name})),
        ),
        Err(e) => error_response(e),
    }
}

/// POST /check-admin: bearer-authenticated admin probe.
async fn handle_check_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AdminBody>, JsonRejection>,
) -> AuthResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return invalid_body(&e),
    };

    match state.auth.check_admin(
        body.username.as_deref().unwrap_or_default(),
        extract_bearer_token(&headers).unwrap_or_default(),
        body.db_pool.as_deref().unwrap_or_default(),
    ) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Admin validated",
                "isAdmin": true,
            })),
        ),
        Err(e) => error_response(e),
    }
}

/// POST /generate-invite-link: admin issues the dataset's invite link.
async fn handle_generate_invite_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AdminBody>, JsonRejection>,
) -> AuthResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return invalid_body(&e),
    };

    match state.auth.issue_invite(
        body.username.as_deref().unwrap_or_default(),
        extract_bearer_token(&headers).unwrap_or_default(),
        body.db_pool.as_deref().unwrap_or_default(),
    ) {
        Ok(link) => (StatusCode::OK, Json(serde_json::json!({"inviteLink": link}))),
        Err(e) => error_response(e),
    }
}

/// PUT /change-password: set a new password and rotate the access token.
async fn handle_change_password(
    State(state): State<AppState>,
    body: Result<Json<ChangePasswordBody>, JsonRejection>,
) -> AuthResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return invalid_body(&e),
    };

    match state.auth.change_password(
        body.username.as_deref().unwrap_or_default(),
        body.accesstoken.as_deref().unwrap_or_default(),
        body.new_password.as_deref().unwrap_or_default(),
        body.db_pool.as_deref().unwrap_or_default(),
    ) {
        Ok(new_token) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Password changed successfully",
                "newAccessToken": new_token,
            })),
        ),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::service::tests::test_service;
    use crate::auth::StoreError;
    use crate::db::InvalidPool;
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;
    use tempfile::TempDir;

    fn test_state() -> (TempDir, AppState) {
        let (tmp, service) = test_service(false);
        (
            tmp,
            AppState {
                auth: Arc::new(service),
            },
        )
    }

    async fn json_of(resp: AuthResponse) -> (StatusCode, serde_json::Value) {
        let resp = resp.into_response();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn signup_body(username: &str, invite: Option<&str>) -> SignupBody {
        SignupBody {
            displayname: Some(username.to_uppercase()),
            username: Some(username.into()),
            password: Some("pw".into()),
            accesstoken: invite.map(str::to_string),
            db_pool: Some("mainPool".into()),
        }
    }

    async fn login(state: &AppState, username: &str) -> serde_json::Value {
        let (status, json) = json_of(
            handle_login(
                State(state.clone()),
                Ok(Json(LoginBody {
                    username: Some(username.into()),
                    password: Some("pw".into()),
                    db_pool: Some("mainPool".into()),
                })),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        json
    }

    #[test]
    fn security_body_limit_is_64kb() {
        assert_eq!(MAX_BODY_SIZE, 65_536);
    }

    #[test]
    fn app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn bodies_use_wire_field_names() {
        let body: ChangePasswordBody = serde_json::from_str(
            r#"{"username":"a","accesstoken":"t","newPassword":"n","dbPool":"demoPool"}"#,
        )
        .unwrap();
        assert_eq!(body.new_password.as_deref(), Some("n"));
        assert_eq!(body.db_pool.as_deref(), Some("demoPool"));

        let empty: SignupBody = serde_json::from_str("{}").unwrap();
        assert!(empty.username.is_none() && empty.db_pool.is_none());
    }

    #[test]
    fn bearer_token_requires_scheme() {
        assert_eq!(extract_bearer_token(&bearer("abc")), Some("abc"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("abc"));
        assert_eq!(extract_bearer_token(&headers), None);
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn error_statuses_follow_taxonomy() {
        let cases = [
            (AuthError::BadRequest("x"), StatusCode::BAD_REQUEST),
            (AuthError::Unauthorized("x"), StatusCode::UNAUTHORIZED),
            (AuthError::Forbidden, StatusCode::FORBIDDEN),
            (AuthError::NotFound, StatusCode::NOT_FOUND),
            (AuthError::Conflict("bob".into()), StatusCode::CONFLICT),
            (
                AuthError::Internal(StoreError::Sqlite(rusqlite::Error::InvalidQuery)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let (status, json) = json_of(error_response(err)).await;
            assert_eq!(status, expected);
            assert!(json["error"].is_string());
        }
    }

    #[tokio::test]
    async fn invalid_pool_is_a_generic_failure() {
        let (status, json) =
            json_of(error_response(AuthError::InvalidPool(InvalidPool("x".into())))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Internal Server Error");
    }

    #[tokio::test]
    async fn router_enforces_body_limit_and_cors() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let (_tmp, state) = test_state();
        let app = router(state, &["https://shop.example".to_string()]);

        let oversized = Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, MAX_BODY_SIZE + 1)
            .body(Body::from(vec![b' '; MAX_BODY_SIZE + 1]))
            .unwrap();
        let resp = app.clone().oneshot(oversized).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let preflight = Request::options("/auth/login")
            .header(header::ORIGIN, "https://shop.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(preflight).await.unwrap();
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://shop.example"
        );

        let foreign = Request::get("/health")
            .header(header::ORIGIN, "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(foreign).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn health_is_ok() {
        let resp = handle_health().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signup_invite_flow_over_handlers() {
        let (_tmp, state) = test_state();

        let (status, json) =
            json_of(handle_signup(State(state.clone()), Ok(Json(signup_body("bob", None)))).await)
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "User registered successfully");

        let (status, _) = json_of(
            handle_signup(State(state.clone()), Ok(Json(signup_body("carol", None)))).await,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let bob = login(&state, "bob").await;
        let token = bob["accesstoken"].as_str().unwrap().to_string();
        assert_eq!(token.len(), 128);
        assert_eq!(bob["displayname"], "BOB");

        let admin_body = || AdminBody {
            username: Some("bob".into()),
            db_pool: Some("mainPool".into()),
        };
        let (status, json) = json_of(
            handle_check_admin(State(state.clone()), bearer(&token), Ok(Json(admin_body()))).await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["isAdmin"], true);

        let (status, json) = json_of(
            handle_generate_invite_link(State(state.clone()), bearer(&token), Ok(Json(admin_body())))
                .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let link = json["inviteLink"].as_str().unwrap();
        let invite = link.split_once("?token=").unwrap().1.to_string();

        let (status, _) = json_of(
            handle_signup(
                State(state.clone()),
                Ok(Json(signup_body("carol", Some(&invite)))),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let carol = login(&state, "carol").await;
        let carol_token = carol["accesstoken"].as_str().unwrap();
        let (status, json) = json_of(
            handle_check_admin(
                State(state.clone()),
                bearer(carol_token),
                Ok(Json(AdminBody {
                    username: Some("carol".into()),
                    db_pool: Some("mainPool".into()),
                })),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"], "You are not an admin");
    }

    #[tokio::test]
    async fn admin_endpoints_need_bearer_header() {
        let (_tmp, state) = test_state();
        handle_signup(State(state.clone()), Ok(Json(signup_body("bob", None)))).await;
        let token = login(&state, "bob").await["accesstoken"]
            .as_str()
            .unwrap()
            .to_string();

        // Token in the body is not accepted in place of the header.
        let (status, _) = json_of(
            handle_generate_invite_link(
                State(state.clone()),
                HeaderMap::new(),
                Ok(Json(AdminBody {
                    username: Some("bob".into()),
                    db_pool: Some("mainPool".into()),
                })),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = json_of(
            handle_generate_invite_link(
                State(state.clone()),
                bearer(&format!("{token}x")),
                Ok(Json(AdminBody {
                    username: Some("bob".into()),
                    db_pool: Some("mainPool".into()),
                })),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validate_and_change_password_over_handlers() {
        let (_tmp, state) = test_state();
        handle_signup(State(state.clone()), Ok(Json(signup_body("alice", None)))).await;
        let old = login(&state, "alice").await["accesstoken"]
            .as_str()
            .unwrap()
            .to_string();

        let validate = |token: String| ValidateBody {
            username: Some(" alice ".into()),
            accesstoken: Some(token),
            db_pool: Some("mainPool".into()),
        };

        let (status, json) =
            json_of(handle_validate(State(state.clone()), Ok(Json(validate(old.clone())))).await)
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["displayname"], "ALICE");

        let (status, json) = json_of(
            handle_change_password(
                State(state.clone()),
                Ok(Json(ChangePasswordBody {
                    username: Some("alice".into()),
                    accesstoken: Some(old.clone()),
                    new_password: Some("pw".into()),
                    db_pool: Some("mainPool".into()),
                })),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let new = json["newAccessToken"].as_str().unwrap().to_string();
        assert_ne!(new, old);

        let (status, _) =
            json_of(handle_validate(State(state.clone()), Ok(Json(validate(old)))).await).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) =
            json_of(handle_validate(State(state.clone()), Ok(Json(validate(new)))).await).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_fields_are_bad_requests() {
        let (_tmp, state) = test_state();

        let (status, _) = json_of(
            handle_login(State(state.clone()), Ok(Json(LoginBody::default()))).await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = json_of(
            handle_validate(State(state.clone()), Ok(Json(ValidateBody::default()))).await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = json_of(
            handle_change_password(State(state.clone()), Ok(Json(ChangePasswordBody::default())))
                .await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Signup resolves the dataset first; a missing selector is a config error.
        let (status, json) = json_of(
            handle_signup(State(state.clone()), Ok(Json(SignupBody::default()))).await,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Internal Server Error");
    }
}
