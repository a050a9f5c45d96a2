//! HTTP handlers for the tutoring and scheduling API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::CoachError;
use crate::server::AppState;
use crate::srs::ReviewQuality;
use crate::types::{TutorRequest, UserProfile};

/// Map a core error to its HTTP status. Upstream-model errors never reach
/// this point in practice; the model layer absorbs them.
fn error_response(err: CoachError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        CoachError::Validation(_) => StatusCode::BAD_REQUEST,
        CoachError::NotFound(_) => StatusCode::NOT_FOUND,
        CoachError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoachError::UpstreamModel(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

/// Liveness probe
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Create-user payload
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub level: String,
    pub native_language: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

pub async fn create_user_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    if req.level.trim().is_empty() {
        return error_response(CoachError::Validation("level must not be empty".into()))
            .into_response();
    }

    let profile = UserProfile {
        user_id: Uuid::new_v4().to_string(),
        level: req.level,
        native_language: req.native_language,
        goals: req.goals,
        interests: req.interests,
        created_at: Utc::now(),
    };

    match state.store.create_user(&profile).await {
        Ok(()) => (StatusCode::OK, Json(profile)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_user(&user_id).await {
        Ok(Some(profile)) => (StatusCode::OK, Json(profile)).into_response(),
        Ok(None) => {
            error_response(CoachError::NotFound(format!("user {}", user_id))).into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

/// Tutoring endpoint. Model failures degrade inside the model layer, so a
/// well-formed payload never produces a 5xx here.
pub async fn tutor_text_handler(
    State(state): State<AppState>,
    Json(req): Json<TutorRequest>,
) -> impl IntoResponse {
    match state.engine.handle_text(&req).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct DueQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DueResponse {
    pub count: usize,
    pub cards: Vec<crate::srs::ReviewItem>,
}

pub async fn srs_due_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<DueQuery>,
) -> impl IntoResponse {
    match state.scheduler.get_due(&user_id, query.limit).await {
        Ok(cards) => (
            StatusCode::OK,
            Json(DueResponse {
                count: cards.len(),
                cards,
            }),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewSubmitRequest {
    pub user_id: String,
    pub item_id: String,
    pub quality: ReviewQuality,
}

pub async fn srs_review_handler(
    State(state): State<AppState>,
    Json(req): Json<ReviewSubmitRequest>,
) -> impl IntoResponse {
    match state
        .scheduler
        .submit_review(&req.user_id, &req.item_id, req.quality)
        .await
    {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SuspendRequest {
    pub user_id: String,
    pub item_id: String,
    pub suspended: bool,
}

pub async fn srs_suspend_handler(
    State(state): State<AppState>,
    Json(req): Json<SuspendRequest>,
) -> impl IntoResponse {
    match state
        .scheduler
        .set_suspended(&req.user_id, &req.item_id, req.suspended)
        .await
    {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorsQuery {
    pub limit: Option<usize>,
    pub unrecycled_only: Option<bool>,
}

pub async fn errors_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ErrorsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50);
    let unrecycled_only = query.unrecycled_only.unwrap_or(false);

    match state
        .store
        .query_findings(&user_id, limit, unrecycled_only)
        .await
    {
        Ok(errors) => (
            StatusCode::OK,
            Json(json!({
                "count": errors.len(),
                "errors": errors,
            })),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn mastery_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    match state.mastery.get_mastery(&user_id).await {
        Ok(skills) => (StatusCode::OK, Json(json!({ "skills": skills }))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
