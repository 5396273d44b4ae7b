use axum::{extract::State, Json};

use crate::api::{
    auth::AuthUser,
    dto::{ChatRequest, ChatResponse},
    errors::{ApiJson, AppError},
    AppState,
};

/// Ask the greenhouse assistant. The answer is an HTML fragment.
#[utoipa::path(
    post,
    path = "/api/chatbot",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant answer", body = ChatResponse),
        (status = 400, description = "Empty or oversized question"),
        (status = 401, description = "Missing or invalid credentials"),
    ),
    security(("bearer" = []), ("service_key" = [])),
    tag = "chat"
)]
pub async fn chatbot(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiJson(req): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let response = state.chat.ask(&req.question).await?;
    Ok(Json(ChatResponse { response }))
}
