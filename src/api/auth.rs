use axum::{
    extract::{ConnectInfo, Query, State},
    response::Redirect,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::{self, CurrentUser};
use crate::models::User;
use crate::services::{AuthService, AuthzService};
use crate::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    let authed = Router::new()
        .route("/me", get(me))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/recover", post(recover))
        .merge(authed)
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub redirect_to: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub is_admin: bool,
    pub membership_tier: String,
    pub founding_number: i32,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        UserInfo {
            id: user.id.to_string(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            is_admin: user.is_admin,
            membership_tier: user.membership_tier.clone(),
            founding_number: user.founding_number,
        }
    }
}

async fn signup(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<SessionResponse>> {
    // Validate before any backend work
    payload.validate().map_err(AppError::validation)?;

    state
        .rate_limiter
        .check(&format!("signup:{}", addr.ip()))
        .await?
        .into_result()?;

    let auth_service = AuthService::new(state.db.clone(), state.config.clone());
    let (user, access_token, refresh_token) = auth_service
        .signup(&payload.email, &payload.password, &payload.full_name)
        .await?;

    // A fresh account has no subscription; the redirect decision still goes
    // through the authorization service
    let authz = AuthzService::new(state.db.clone());
    let level = authz.classify_user(&user).await?;

    tracing::info!(user = %user.id, founding_number = user.founding_number, "New signup");

    Ok(Json(SessionResponse {
        access_token,
        refresh_token,
        redirect_to: level.redirect_target().to_string(),
        user: UserInfo::from(&user),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    payload.validate().map_err(AppError::validation)?;

    state
        .rate_limiter
        .check(&format!("login:{}", addr.ip()))
        .await?
        .into_result()?;

    let auth_service = AuthService::new(state.db.clone(), state.config.clone());
    let (user, access_token, refresh_token) = auth_service
        .authenticate(&payload.email, &payload.password)
        .await?;

    let authz = AuthzService::new(state.db.clone());
    let level = authz.classify_user(&user).await?;

    Ok(Json(SessionResponse {
        access_token,
        refresh_token,
        redirect_to: level.redirect_target().to_string(),
        user: UserInfo::from(&user),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>> {
    let auth_service = AuthService::new(state.db.clone(), state.config.clone());
    let (_user, access_token) = auth_service.refresh(&payload.refresh_token).await?;

    Ok(Json(RefreshResponse { access_token }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecoverRequest {
    #[validate(email)]
    pub email: String,
}

async fn recover(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<RecoverRequest>,
) -> Result<Json<serde_json::Value>> {
    payload.validate().map_err(AppError::validation)?;

    state
        .rate_limiter
        .check(&format!("recover:{}", addr.ip()))
        .await?
        .into_result()?;

    let auth_service = AuthService::new(state.db.clone(), state.config.clone());
    if let Some(code) = auth_service.issue_recovery_code(&payload.email).await? {
        // Delivery is the mail provider's job
        tracing::info!(email = %payload.email, code = %code, "Issued recovery code");
    }

    // Same response whether or not the account exists
    Ok(Json(serde_json::json!({
        "message": "If the account exists, a recovery email is on its way"
    })))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// `GET /auth/callback?code&type` - exchanges a one-time code for a session
/// and sends the browser onward. Recovery links land on the password reset
/// page instead of the usual redirect decision.
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<(CookieJar, Redirect)> {
    let auth_service = AuthService::new(state.db.clone(), state.config.clone());
    let (user, access_token, refresh_token, purpose) =
        auth_service.exchange_code(&query.code).await?;

    let jar = jar.add(
        Cookie::build(("access_token", access_token.clone()))
            .path("/")
            .http_only(true)
            .build(),
    );

    let is_recovery =
        purpose == "recovery" || query.kind.as_deref() == Some("recovery");

    let target = if is_recovery {
        "/reset-password".to_string()
    } else {
        let authz = AuthzService::new(state.db.clone());
        let level = authz.classify_user(&user).await?;
        level.redirect_target().to_string()
    };

    let location = format!(
        "{}#access_token={}&refresh_token={}",
        target, access_token, refresh_token
    );

    Ok((jar, Redirect::to(&location)))
}

async fn me(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(current_user.id)
        .fetch_optional(&state.db.pg)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let authz = AuthzService::new(state.db.clone());
    let level = authz.classify_user(&user).await?;

    Ok(Json(serde_json::json!({
        "user": UserInfo::from(&user),
        "access_level": level.as_str(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_password_fails_validation() {
        let payload = SignupRequest {
            email: "new@example.com".to_string(),
            password: "short7!".to_string(),
            full_name: "New User".to_string(),
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn eight_character_password_passes_validation() {
        let payload = SignupRequest {
            email: "new@example.com".to_string(),
            password: "12345678".to_string(),
            full_name: "New User".to_string(),
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn invalid_email_fails_validation() {
        let payload = SignupRequest {
            email: "not-an-email".to_string(),
            password: "longenough".to_string(),
            full_name: "New User".to_string(),
        };
        assert!(payload.validate().is_err());
    }
}
