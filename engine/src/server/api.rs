//! REST endpoints
//!
//! Conversation inspection, reset and manual goal editing. Goal edits take
//! the conversation's mutex, so they never interleave with a running turn.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use sdk::{EngineError, GoalPatch, GoalType};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::store::ConversationHandle;

/// Error response carrying `{"detail": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn conversation_not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: "Conversation not found".to_string(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ConversationNotFound(_) => Self::conversation_not_found(),
            EngineError::GoalNotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                detail: "Goal not found".to_string(),
            },
            EngineError::InvalidMessage(msg) | EngineError::UnknownStage(msg) => Self {
                status: StatusCode::BAD_REQUEST,
                detail: msg,
            },
            other => {
                tracing::error!("Request failed: {}", other);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    detail: "Internal server error".to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct GoalCreateRequest {
    text: String,
    #[serde(rename = "type")]
    goal_type: GoalType,
    source_message_id: String,
}

async fn existing(state: &AppState, conversation_id: &str) -> Result<ConversationHandle, ApiError> {
    state
        .orchestrator
        .store()
        .get(conversation_id)
        .await
        .ok_or_else(ApiError::conversation_not_found)
}

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "OnGoal Backend API",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let provider = state.orchestrator.provider();
    let available = provider.is_available();

    Json(json!({
        "status": if available { "healthy" } else { "degraded" },
        "timestamp": Utc::now(),
        "llm_service": {
            "service": provider.name(),
            "available": available,
            "model": provider.model(),
        }
    }))
}

pub async fn list_conversations(State(state): State<AppState>) -> Json<serde_json::Value> {
    let ids = state.orchestrator.store().list_ids().await;
    Json(json!({
        "count": ids.len(),
        "conversations": ids,
    }))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<sdk::Conversation>, ApiError> {
    state
        .orchestrator
        .store()
        .snapshot(&conversation_id)
        .await
        .map(Json)
        .ok_or_else(ApiError::conversation_not_found)
}

pub async fn reset_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<serde_json::Value> {
    state.orchestrator.store().reset(&conversation_id).await;

    Json(json!({
        "status": "success",
        "message": format!("Conversation {} reset", conversation_id),
        "timestamp": Utc::now(),
    }))
}

pub async fn create_goal(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(request): Json<GoalCreateRequest>,
) -> ApiResult {
    let handle = state.orchestrator.store().get_or_create(&conversation_id).await;
    let mut conversation = handle.lock().await;

    let goal = conversation.add_manual_goal(
        request.text,
        request.goal_type,
        request.source_message_id,
    );
    tracing::info!(conversation_id = %conversation_id, goal_id = %goal.id, "Manual goal created");

    Ok(Json(json!({
        "status": "success",
        "goal": goal,
        "timestamp": Utc::now(),
    })))
}

pub async fn list_goals(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ApiResult {
    let handle = existing(&state, &conversation_id).await?;
    let conversation = handle.lock().await;

    Ok(Json(json!({
        "goals": conversation.goals,
        "count": conversation.goals.len(),
    })))
}

pub async fn get_goal(
    State(state): State<AppState>,
    Path((conversation_id, goal_id)): Path<(String, String)>,
) -> ApiResult {
    let handle = existing(&state, &conversation_id).await?;
    let conversation = handle.lock().await;

    let goal = conversation
        .find_goal(&goal_id)
        .ok_or_else(|| EngineError::GoalNotFound(goal_id.clone()))?;

    Ok(Json(json!({ "goal": goal })))
}

pub async fn update_goal(
    State(state): State<AppState>,
    Path((conversation_id, goal_id)): Path<(String, String)>,
    Json(patch): Json<GoalPatch>,
) -> ApiResult {
    let handle = existing(&state, &conversation_id).await?;
    let mut conversation = handle.lock().await;

    let goal = conversation.update_goal(&goal_id, patch)?;

    Ok(Json(json!({
        "status": "success",
        "goal": goal,
        "timestamp": Utc::now(),
    })))
}

pub async fn delete_goal(
    State(state): State<AppState>,
    Path((conversation_id, goal_id)): Path<(String, String)>,
) -> ApiResult {
    let handle = existing(&state, &conversation_id).await?;
    let mut conversation = handle.lock().await;

    let deleted = conversation.remove_goal(&goal_id)?;
    tracing::info!(conversation_id = %conversation_id, goal_id = %goal_id, "Goal deleted");

    Ok(Json(json!({
        "status": "success",
        "message": format!("Goal {} deleted", goal_id),
        "deleted_goal": deleted,
        "timestamp": Utc::now(),
    })))
}

async fn set_locked(state: AppState, conversation_id: String, goal_id: String, locked: bool) -> ApiResult {
    let handle = existing(&state, &conversation_id).await?;
    let mut conversation = handle.lock().await;

    let goal = conversation.set_locked(&goal_id, locked)?;
    let verb = if locked { "locked" } else { "unlocked" };

    Ok(Json(json!({
        "status": "success",
        "message": format!("Goal {} {}", goal_id, verb),
        "goal": goal,
        "timestamp": Utc::now(),
    })))
}

pub async fn lock_goal(
    State(state): State<AppState>,
    Path((conversation_id, goal_id)): Path<(String, String)>,
) -> ApiResult {
    set_locked(state, conversation_id, goal_id, true).await
}

pub async fn unlock_goal(
    State(state): State<AppState>,
    Path((conversation_id, goal_id)): Path<(String, String)>,
) -> ApiResult {
    set_locked(state, conversation_id, goal_id, false).await
}
