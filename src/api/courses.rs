use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware;
use crate::models::{Course, CourseModule, Lesson};
use crate::services::{AccessLevel, CourseDetail, CourseService, UpsertCourse};
use crate::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    let member = Router::new()
        .route("/", get(list_courses))
        .route("/:id", get(get_course))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_member,
        ));

    let admin = Router::new()
        .route("/", post(create_course))
        .route("/:id", put(update_course).delete(delete_course))
        .route("/:id/modules", post(create_module))
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

pub fn module_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/:id", put(update_module).delete(delete_module))
        .route("/:id/lessons", post(create_lesson))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
}

pub fn lesson_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/:id", put(update_lesson).delete(delete_lesson))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
}

async fn list_courses(
    State(state): State<AppState>,
    Extension(level): Extension<AccessLevel>,
) -> Result<Json<Vec<Course>>> {
    let course_service = CourseService::new(state.db.clone());
    let courses = course_service.list(level.is_admin()).await?;

    Ok(Json(courses))
}

async fn get_course(
    State(state): State<AppState>,
    Extension(level): Extension<AccessLevel>,
    Path(id): Path<Uuid>,
) -> Result<Json<CourseDetail>> {
    let course_service = CourseService::new(state.db.clone());
    let detail = course_service.get(id, level.is_admin()).await?;

    Ok(Json(detail))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default)]
    pub is_published: bool,
}

async fn create_course(
    State(state): State<AppState>,
    Json(payload): Json<CourseRequest>,
) -> Result<Json<Course>> {
    payload.validate().map_err(AppError::validation)?;

    let course_service = CourseService::new(state.db.clone());
    let course = course_service
        .create(UpsertCourse {
            title: payload.title,
            description: payload.description,
            order_index: payload.order_index,
            is_published: payload.is_published,
        })
        .await?;

    Ok(Json(course))
}

async fn update_course(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourseRequest>,
) -> Result<Json<Course>> {
    payload.validate().map_err(AppError::validation)?;

    let course_service = CourseService::new(state.db.clone());
    let course = course_service
        .update(
            id,
            UpsertCourse {
                title: payload.title,
                description: payload.description,
                order_index: payload.order_index,
                is_published: payload.is_published,
            },
        )
        .await?;

    Ok(Json(course))
}

async fn delete_course(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let course_service = CourseService::new(state.db.clone());
    course_service.delete(id).await?;

    Ok(Json(serde_json::json!({ "message": "Course deleted" })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ModuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub order_index: i32,
}

async fn create_module(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    Json(payload): Json<ModuleRequest>,
) -> Result<Json<CourseModule>> {
    payload.validate().map_err(AppError::validation)?;

    let course_service = CourseService::new(state.db.clone());
    let module = course_service
        .create_module(course_id, &payload.title, payload.order_index)
        .await?;

    Ok(Json(module))
}

async fn update_module(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ModuleRequest>,
) -> Result<Json<CourseModule>> {
    payload.validate().map_err(AppError::validation)?;

    let course_service = CourseService::new(state.db.clone());
    let module = course_service
        .update_module(id, &payload.title, payload.order_index)
        .await?;

    Ok(Json(module))
}

async fn delete_module(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let course_service = CourseService::new(state.db.clone());
    course_service.delete_module(id).await?;

    Ok(Json(serde_json::json!({ "message": "Module deleted" })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LessonRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(url)]
    pub video_url: Option<String>,
    pub duration_seconds: Option<i32>,
    #[serde(default)]
    pub order_index: i32,
}

async fn create_lesson(
    State(state): State<AppState>,
    Path(module_id): Path<Uuid>,
    Json(payload): Json<LessonRequest>,
) -> Result<Json<Lesson>> {
    payload.validate().map_err(AppError::validation)?;

    let course_service = CourseService::new(state.db.clone());
    let lesson = course_service
        .create_lesson(
            module_id,
            &payload.title,
            payload.video_url.as_deref(),
            payload.duration_seconds,
            payload.order_index,
        )
        .await?;

    Ok(Json(lesson))
}

async fn update_lesson(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LessonRequest>,
) -> Result<Json<Lesson>> {
    payload.validate().map_err(AppError::validation)?;

    let course_service = CourseService::new(state.db.clone());
    let lesson = course_service
        .update_lesson(
            id,
            &payload.title,
            payload.video_url.as_deref(),
            payload.duration_seconds,
            payload.order_index,
        )
        .await?;

    Ok(Json(lesson))
}

async fn delete_lesson(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let course_service = CourseService::new(state.db.clone());
    course_service.delete_lesson(id).await?;

    Ok(Json(serde_json::json!({ "message": "Lesson deleted" })))
}
