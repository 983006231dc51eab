use crate::chat::{ChatReply, ChatRequest};
use crate::error::AppError;
use crate::extractors::ApiJson;
use crate::state::AppState;
use axum::{extract::State, Json};

pub async fn chatbot(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    let reply = state.chat.reply(&request).await?;
    Ok(Json(reply))
}
