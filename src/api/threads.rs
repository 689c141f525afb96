use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::{self, CurrentUser};
use crate::models::{Comment, Thread, ThreadCategory};
use crate::services::{AccessLevel, CreateThread, ThreadService, THREADS_PAGE_SIZE};
use crate::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    let member = Router::new()
        .route("/", get(list_threads).post(create_thread))
        .route("/:id", get(get_thread).delete(delete_thread))
        .route("/:id/comments", post(add_comment))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_member,
        ));

    let admin = Router::new()
        .route("/:id/restore", post(restore_thread))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin,
        ));

    member
        .merge(admin)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
}

/// `DELETE /api/comments/:id` lives outside the /threads nest.
pub fn comment_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/:id", delete(delete_comment))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_member,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
}

#[derive(Debug, Deserialize)]
pub struct ListThreadsQuery {
    pub page: Option<u32>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ThreadListResponse {
    pub threads: Vec<Thread>,
    pub total: i64,
    pub page: u32,
    pub page_size: i64,
}

async fn list_threads(
    State(state): State<AppState>,
    Query(query): Query<ListThreadsQuery>,
) -> Result<Json<ThreadListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let category = match query.category.as_deref() {
        Some(raw) => Some(
            ThreadCategory::parse(raw)
                .ok_or_else(|| AppError::BadRequest("Unknown category".to_string()))?,
        ),
        None => None,
    };

    let thread_service = ThreadService::new(state.db.clone());
    let (threads, total) = thread_service.list(page, category).await?;

    Ok(Json(ThreadListResponse {
        threads,
        total,
        page,
        page_size: THREADS_PAGE_SIZE,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateThreadRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 20000))]
    pub content: String,
    pub category: String,
}

async fn create_thread(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Extension(level): Extension<AccessLevel>,
    Json(payload): Json<CreateThreadRequest>,
) -> Result<Json<Thread>> {
    payload.validate().map_err(AppError::validation)?;

    let category = ThreadCategory::parse(&payload.category)
        .ok_or_else(|| AppError::BadRequest("Unknown category".to_string()))?;

    let thread_service = ThreadService::new(state.db.clone());
    let thread = thread_service
        .create(
            current_user.id,
            level,
            CreateThread {
                title: payload.title,
                content: payload.content,
                category,
            },
        )
        .await?;

    Ok(Json(thread))
}

#[derive(Debug, Serialize)]
pub struct ThreadDetailResponse {
    #[serde(flatten)]
    pub thread: Thread,
    pub comments: Vec<Comment>,
}

async fn get_thread(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ThreadDetailResponse>> {
    let thread_service = ThreadService::new(state.db.clone());
    let (thread, comments) = thread_service.get(id).await?;

    Ok(Json(ThreadDetailResponse { thread, comments }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

async fn add_comment(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<Json<Comment>> {
    payload.validate().map_err(AppError::validation)?;

    let thread_service = ThreadService::new(state.db.clone());
    let comment = thread_service
        .add_comment(id, current_user.id, &payload.content)
        .await?;

    Ok(Json(comment))
}

async fn delete_thread(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Extension(level): Extension<AccessLevel>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let thread_service = ThreadService::new(state.db.clone());
    thread_service.delete(id, current_user.id, level).await?;

    Ok(Json(serde_json::json!({ "message": "Thread deleted" })))
}

async fn restore_thread(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Thread>> {
    let thread_service = ThreadService::new(state.db.clone());
    let thread = thread_service.restore(id).await?;

    Ok(Json(thread))
}

async fn delete_comment(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Extension(level): Extension<AccessLevel>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let thread_service = ThreadService::new(state.db.clone());
    thread_service
        .delete_comment(id, current_user.id, level)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Comment deleted" })))
}
