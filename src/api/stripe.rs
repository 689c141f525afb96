use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::middleware::{self, CurrentUser};
use crate::models::User;
use crate::services::{
    await_activation, is_supported_event, parse_subscription_object, verify_webhook_signature,
    ActivationOutcome, StripeService, WebhookEvent,
};
use crate::AppState;

/// Success-page reconciliation poll: fixed interval, bounded attempts.
const ACTIVATION_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);
const ACTIVATION_POLL_ATTEMPTS: u32 = 10;

pub fn routes(state: &AppState) -> Router<AppState> {
    let authed = Router::new()
        .route("/checkout", post(create_checkout))
        .route("/payment-intent", post(create_payment_intent))
        .route("/cancel-subscription", post(cancel_subscription))
        .route("/subscription", get(subscription_status))
        .route("/confirm", get(confirm_activation))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Webhook authenticates with its signature, not a session
    Router::new()
        .route("/webhook", post(webhook))
        .merge(authed)
}

async fn load_user(state: &AppState, current_user: &CurrentUser) -> Result<User> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(current_user.id)
        .fetch_optional(&state.db.pg)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(user)
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

async fn create_checkout(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<CheckoutResponse>> {
    let user = load_user(&state, &current_user).await?;

    let stripe_service = StripeService::new(state.db.clone(), state.stripe.clone());
    let customer_id = stripe_service.ensure_customer(&user).await?;

    let success_url = format!(
        "{}/payment/success?session_id={{CHECKOUT_SESSION_ID}}",
        state.config.server.base_url
    );
    let cancel_url = format!("{}/payment", state.config.server.base_url);

    let session = stripe_service
        .client()
        .create_checkout_session(&customer_id, user.id, &success_url, &cancel_url)
        .await?;

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}

#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub payment_intent_id: String,
    pub client_secret: String,
}

/// Embedded-confirmation flow. Creating the intent never touches membership
/// state; activation arrives through the webhook.
async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<PaymentIntentResponse>> {
    let user = load_user(&state, &current_user).await?;

    let stripe_service = StripeService::new(state.db.clone(), state.stripe.clone());
    let customer_id = stripe_service.ensure_customer(&user).await?;

    let intent = stripe_service
        .client()
        .create_payment_intent(
            &customer_id,
            state.config.stripe.amount_cents,
            &state.config.stripe.currency,
        )
        .await?;

    Ok(Json(PaymentIntentResponse {
        payment_intent_id: intent.id,
        client_secret: intent.client_secret,
    }))
}

async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>> {
    let stripe_service = StripeService::new(state.db.clone(), state.stripe.clone());
    let subscription = stripe_service.cancel_subscription(current_user.id).await?;

    Ok(Json(serde_json::json!({
        "message": "Subscription will end at period close",
        "current_period_end": subscription.current_period_end,
    })))
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    pub active: bool,
    pub status: Option<String>,
    pub cancel_at_period_end: bool,
}

async fn subscription_status(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<SubscriptionStatusResponse>> {
    let stripe_service = StripeService::new(state.db.clone(), state.stripe.clone());
    let subscription = stripe_service.subscription_for_user(current_user.id).await?;

    let response = match subscription {
        Some(sub) => SubscriptionStatusResponse {
            active: sub.grants_access(),
            status: Some(sub.status.clone()),
            cancel_at_period_end: sub.cancel_at_period_end,
        },
        None => SubscriptionStatusResponse {
            active: false,
            status: None,
            cancel_at_period_end: false,
        },
    };

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub outcome: ActivationOutcome,
}

/// Waits for the webhook to land after checkout. Polls the subscription row
/// at a fixed interval and gives up after the attempt budget rather than
/// hanging.
async fn confirm_activation(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ConfirmResponse>> {
    let stripe_service = StripeService::new(state.db.clone(), state.stripe.clone());

    let outcome = await_activation(
        || async {
            let subscription = stripe_service.subscription_for_user(current_user.id).await?;
            Ok(subscription.map(|s| s.grants_access()).unwrap_or(false))
        },
        ACTIVATION_POLL_INTERVAL,
        ACTIVATION_POLL_ATTEMPTS,
    )
    .await?;

    Ok(Json(ConfirmResponse { outcome }))
}

/// The authoritative path to member state. Signature-verified; subscription
/// lifecycle events are applied in one transaction.
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    verify_webhook_signature(&body, signature, &state.config.stripe.webhook_secret)?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Malformed webhook payload: {}", e)))?;

    if !is_supported_event(&event.event_type) {
        tracing::debug!(event = %event.event_type, "Ignoring unsupported webhook event");
        return Ok(Json(serde_json::json!({ "received": true })));
    }

    let update = parse_subscription_object(&event.data.object)?;

    let stripe_service = StripeService::new(state.db.clone(), state.stripe.clone());
    stripe_service.apply_subscription_update(update).await?;

    Ok(Json(serde_json::json!({ "received": true })))
}
