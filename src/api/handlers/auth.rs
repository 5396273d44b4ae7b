use axum::{extract::State, http::StatusCode, Json};
use tracing::info;

use crate::{
    api::{
        auth::{issue_token, session_ttl, AdminUser},
        dto::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse},
        errors::{ApiJson, AppError},
        AppState,
    },
    users::Role,
};

/// Exchange email and password for a bearer token.
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Account disabled"),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = state.users.authenticate(req.email.trim(), &req.password).await?;
    let token = issue_token(
        &state.auth.jwt_secret,
        user.id,
        &user.username,
        user.role,
        session_ttl(req.remember_me),
    )?;

    info!(user_id = user.id, remember_me = req.remember_me, "User logged in");
    Ok(Json(LoginResponse {
        token,
        username: user.username,
        user_role: user.role,
    }))
}

/// Create an account. Admin only.
#[utoipa::path(
    post,
    path = "/api/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = RegisterResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Missing or invalid credentials"),
        (status = 403, description = "Caller is not an admin"),
        (status = 409, description = "Username or email already registered"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let role = req.role.unwrap_or(Role::User);
    let user_id = state
        .users
        .register(&req.name, &req.email, &req.password, role)
        .await?;

    info!(user_id, registered_by = admin.id, "Account created by admin");
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::{
        api::testing::{with_service_key, Harness, SERVICE_KEY},
        users::Role,
    };

    async fn seed(h: &Harness, email: &str, password: &str, role: Role) -> i64 {
        h.users.register("grower", email, password, role).await.unwrap()
    }

    #[tokio::test]
    async fn login_returns_token_and_role() {
        let h = Harness::new();
        seed(&h, "ana@example.com", "s3cret", Role::Admin).await;

        let resp = h
            .server
            .post("/api/login")
            .json(&json!({ "email": "ana@example.com", "password": "s3cret" }))
            .await;
        resp.assert_status_ok();
        let body = resp.json::<Value>();
        assert_eq!(body["username"], "grower");
        assert_eq!(body["userRole"], "admin");
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[tokio::test]
    async fn issued_token_authenticates_later_requests() {
        let h = Harness::new();
        seed(&h, "ana@example.com", "s3cret", Role::User).await;

        let token = h
            .server
            .post("/api/login")
            .json(&json!({ "email": "ana@example.com", "password": "s3cret", "remember_me": true }))
            .await
            .json::<Value>()["token"]
            .as_str()
            .unwrap()
            .to_owned();

        let resp = crate::api::testing::with_bearer(h.server.get("/api/commands/status"), &token).await;
        resp.assert_status_ok();
    }

    #[tokio::test]
    async fn wrong_password_is_401() {
        let h = Harness::new();
        seed(&h, "ana@example.com", "s3cret", Role::User).await;

        let resp = h
            .server
            .post("/api/login")
            .json(&json!({ "email": "ana@example.com", "password": "nope" }))
            .await;
        resp.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(resp.json::<Value>()["error"], "invalid email or password");
    }

    #[tokio::test]
    async fn disabled_account_is_403() {
        let h = Harness::new();
        let id = seed(&h, "ana@example.com", "s3cret", Role::User).await;
        h.user_store.deactivate(id);

        let resp = h
            .server
            .post("/api/login")
            .json(&json!({ "email": "ana@example.com", "password": "s3cret" }))
            .await;
        resp.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_login_body_is_400_json() {
        let h = Harness::new();
        let resp = h.server.post("/api/login").json(&json!({ "email": 5 })).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert!(resp.json::<Value>()["error"].is_string());
    }

    #[tokio::test]
    async fn admin_registers_user() {
        let h = Harness::new();
        let resp = h
            .as_user(h.server.post("/api/register"), Role::Admin)
            .json(&json!({
                "name": "bob",
                "email": "bob@example.com",
                "password": "pw",
                "role": "user"
            }))
            .await;
        resp.assert_status(StatusCode::CREATED);
        assert_eq!(resp.json::<Value>()["userId"], 1);

        let again = h
            .as_user(h.server.post("/api/register"), Role::Admin)
            .json(&json!({ "name": "bob", "email": "bob@example.com", "password": "pw" }))
            .await;
        again.assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn register_requires_admin() {
        let h = Harness::new();
        let body = json!({ "name": "bob", "email": "bob@example.com", "password": "pw" });

        h.server
            .post("/api/register")
            .json(&body)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        h.as_user(h.server.post("/api/register"), Role::User)
            .json(&body)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        // The service user is configured with the `user` role.
        with_service_key(h.server.post("/api/register"), SERVICE_KEY)
            .json(&body)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
