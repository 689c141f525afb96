use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::{AccessLevel, AuthzService};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,       // User ID
    pub email: String,
    pub exp: usize,        // Expiration time
    pub iat: usize,        // Issued at
}

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
}

/// Pull the session token from the Authorization header, falling back to
/// the access_token cookie set for page navigation.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
    {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get("access_token")
        .map(|c| c.value().to_string())
}

fn decode_current_user(state: &AppState, token: &str) -> Option<CurrentUser> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?
    .claims;

    let id = Uuid::parse_str(&claims.sub).ok()?;
    Some(CurrentUser {
        id,
        email: claims.email,
    })
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = session_token(request.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    let current_user =
        decode_current_user(&state, &token).ok_or(StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(current_user);

    Ok(next.run(request).await)
}

/// Community routes: the authorization service decides, admins and active
/// subscribers pass.
pub async fn require_member(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let current_user = request
        .extensions()
        .get::<CurrentUser>()
        .cloned()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let authz = AuthzService::new(state.db.clone());
    let level = authz
        .classify_user_id(Some(current_user.id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if !level.can_access_community() {
        return Err(StatusCode::FORBIDDEN);
    }

    request.extensions_mut().insert(level);

    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let current_user = request
        .extensions()
        .get::<CurrentUser>()
        .cloned()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let authz = AuthzService::new(state.db.clone());
    let level = authz
        .classify_user_id(Some(current_user.id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if !level.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }

    request.extensions_mut().insert(level);

    Ok(next.run(request).await)
}

/// Page paths that require membership. API routes answer with status codes
/// instead and are not gated here.
const MEMBER_PAGE_PREFIXES: &[&str] = &["/threads", "/courses", "/events", "/calendar"];

pub fn requires_membership(path: &str) -> bool {
    MEMBER_PAGE_PREFIXES
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{}/", prefix)))
}

/// Route gating for page navigation: anonymous visitors go to login, free
/// users go to the payment page.
pub async fn gate_pages(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if !requires_membership(&path) {
        return next.run(request).await;
    }

    let user_id = session_token(request.headers())
        .and_then(|token| decode_current_user(&state, &token))
        .map(|u| u.id);

    let authz = AuthzService::new(state.db.clone());
    let level = match authz.classify_user_id(user_id).await {
        Ok(level) => level,
        Err(e) => return e.into_response(),
    };

    match level {
        AccessLevel::Anonymous => Redirect::to("/login").into_response(),
        AccessLevel::Free => Redirect::to("/payment").into_response(),
        _ => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_pages_are_gated() {
        assert!(requires_membership("/threads"));
        assert!(requires_membership("/threads/abc"));
        assert!(requires_membership("/courses/1/lessons/2"));
    }

    #[test]
    fn public_pages_are_not_gated() {
        assert!(!requires_membership("/"));
        assert!(!requires_membership("/about"));
        assert!(!requires_membership("/payment"));
        assert!(!requires_membership("/login"));
        assert!(!requires_membership("/threadsy"));
    }
}
