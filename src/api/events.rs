use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::{self, CurrentUser};
use crate::models::{Event, EventRegistration};
use crate::services::{CreateEvent, EventService, EventSummary};
use crate::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    let member = Router::new()
        .route("/", get(list_events))
        .route("/:id/register", post(register))
        .route("/:id/cancel", post(cancel))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_member,
        ));

    let admin = Router::new()
        .route("/", post(create_event))
        .route("/:id/attended", post(mark_attended))
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

async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<EventSummary>>> {
    let event_service = EventService::new(state.db.clone());
    let events = event_service.list_upcoming().await?;

    Ok(Json(events))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: i32,
    #[validate(range(min = 1))]
    pub capacity: Option<i32>,
}

async fn create_event(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<CreateEventRequest>,
) -> Result<Json<Event>> {
    payload.validate().map_err(AppError::validation)?;

    let event_service = EventService::new(state.db.clone());
    let event = event_service
        .create(
            current_user.id,
            CreateEvent {
                title: payload.title,
                description: payload.description,
                starts_at: payload.starts_at,
                duration_minutes: payload.duration_minutes,
                capacity: payload.capacity,
            },
        )
        .await?;

    Ok(Json(event))
}

async fn register(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<EventRegistration>> {
    let event_service = EventService::new(state.db.clone());
    let registration = event_service.register(id, current_user.id).await?;

    Ok(Json(registration))
}

async fn cancel(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let event_service = EventService::new(state.db.clone());
    event_service.cancel(id, current_user.id).await?;

    Ok(Json(serde_json::json!({ "message": "Registration cancelled" })))
}

#[derive(Debug, Deserialize)]
pub struct AttendanceRequest {
    pub user_id: Uuid,
}

async fn mark_attended(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttendanceRequest>,
) -> Result<Json<serde_json::Value>> {
    let event_service = EventService::new(state.db.clone());
    event_service.mark_attended(id, payload.user_id).await?;

    Ok(Json(serde_json::json!({ "message": "Attendance recorded" })))
}
