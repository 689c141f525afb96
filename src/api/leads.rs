use axum::{
    extract::{ConnectInfo, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware;
use crate::models::Lead;
use crate::services::{FunnelStats, LeadService, UpsertLead};
use crate::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/", get(funnel_overview))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .route("/", post(capture_lead))
        .route("/optout", post(optout))
        .merge(admin)
}

#[derive(Debug, Deserialize, Validate)]
pub struct LeadRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub utm_source: Option<String>,
    #[validate(length(max = 100))]
    pub utm_medium: Option<String>,
    #[validate(length(max = 100))]
    pub utm_campaign: Option<String>,
}

async fn capture_lead(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LeadRequest>,
) -> Result<Json<Lead>> {
    payload.validate().map_err(AppError::validation)?;

    state
        .rate_limiter
        .check(&format!("leads:{}", addr.ip()))
        .await?
        .into_result()?;

    let lead_service = LeadService::new(state.db.clone());
    let lead = lead_service
        .upsert(UpsertLead {
            email: payload.email,
            name: payload.name,
            utm_source: payload.utm_source,
            utm_medium: payload.utm_medium,
            utm_campaign: payload.utm_campaign,
        })
        .await?;

    Ok(Json(lead))
}

#[derive(Debug, Deserialize, Validate)]
pub struct OptoutRequest {
    #[validate(email)]
    pub email: String,
}

async fn optout(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<OptoutRequest>,
) -> Result<Json<serde_json::Value>> {
    payload.validate().map_err(AppError::validation)?;

    state
        .rate_limiter
        .check(&format!("leads:{}", addr.ip()))
        .await?
        .into_result()?;

    let lead_service = LeadService::new(state.db.clone());
    lead_service.optout(&payload.email).await?;

    Ok(Json(serde_json::json!({ "message": "Opt-out recorded" })))
}

#[derive(Debug, Serialize)]
pub struct FunnelOverviewResponse {
    pub stats: FunnelStats,
    pub recent: Vec<Lead>,
}

async fn funnel_overview(State(state): State<AppState>) -> Result<Json<FunnelOverviewResponse>> {
    let lead_service = LeadService::new(state.db.clone());
    let stats = lead_service.funnel_stats().await?;
    let recent = lead_service.recent(20).await?;

    Ok(Json(FunnelOverviewResponse { stats, recent }))
}
