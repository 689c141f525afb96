// Stripe service - checkout/portal calls against the Stripe REST API plus
// webhook-driven subscription state. The webhook is the only path that
// mutates membership state; checkout and payment-intent creation never do.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::StripeConfig;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{LeadStage, MembershipTier, StripeSubscription, SubscriptionStatus, User};

type HmacSha256 = Hmac<Sha256>;

/// Signatures older than this are rejected.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Webhook event types this service acts on.
const SUPPORTED_EVENTS: &[&str] = &[
    "customer.subscription.created",
    "customer.subscription.updated",
    "customer.subscription.deleted",
];

pub fn is_supported_event(event_type: &str) -> bool {
    SUPPORTED_EVENTS.contains(&event_type)
}

/// Thin HTTP client for the Stripe REST API (form-encoded requests).
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct StripeCustomerObject {
    id: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.config.api_base, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Stripe(format!("request to {} failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Stripe(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Stripe(format!("invalid response from {}: {}", path, e)))
    }

    pub async fn create_customer(&self, email: &str, name: &str) -> Result<String> {
        let form = vec![
            ("email".to_string(), email.to_string()),
            ("name".to_string(), name.to_string()),
        ];
        let customer: StripeCustomerObject = self.post_form("/customers", &form).await?;
        Ok(customer.id)
    }

    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        user_id: Uuid,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession> {
        let form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("customer".to_string(), customer_id.to_string()),
            ("line_items[0][price]".to_string(), self.config.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), success_url.to_string()),
            ("cancel_url".to_string(), cancel_url.to_string()),
            (
                "subscription_data[metadata][user_id]".to_string(),
                user_id.to_string(),
            ),
        ];
        self.post_form("/checkout/sessions", &form).await
    }

    pub async fn create_payment_intent(
        &self,
        customer_id: &str,
        amount_cents: u64,
        currency: &str,
    ) -> Result<PaymentIntent> {
        let form = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("amount".to_string(), amount_cents.to_string()),
            ("currency".to_string(), currency.to_string()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        self.post_form("/payment_intents", &form).await
    }

    pub async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<()> {
        let form = vec![("cancel_at_period_end".to_string(), "true".to_string())];
        let _: serde_json::Value = self
            .post_form(&format!("/subscriptions/{}", subscription_id), &form)
            .await?;
        Ok(())
    }
}

/// Verify a `Stripe-Signature` header (`t=<ts>,v1=<hex hmac>`) against the
/// webhook secret. Comparison is constant-time; stale timestamps are
/// rejected.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    webhook_secret: &str,
) -> Result<()> {
    verify_webhook_signature_at(payload, signature_header, webhook_secret, Utc::now().timestamp())
}

fn verify_webhook_signature_at(
    payload: &[u8],
    signature_header: &str,
    webhook_secret: &str,
    now_unix: i64,
) -> Result<()> {
    let parts: std::collections::HashMap<&str, &str> = signature_header
        .split(',')
        .filter_map(|part| {
            let mut kv = part.splitn(2, '=');
            Some((kv.next()?, kv.next()?))
        })
        .collect();

    let timestamp = parts
        .get("t")
        .ok_or_else(|| AppError::BadRequest("Malformed signature header".to_string()))?;
    let signature = parts
        .get("v1")
        .ok_or_else(|| AppError::BadRequest("Malformed signature header".to_string()))?;

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| AppError::BadRequest("Malformed signature timestamp".to_string()))?;
    if (now_unix - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::Unauthorized);
    }

    let payload_str = std::str::from_utf8(payload)
        .map_err(|_| AppError::BadRequest("Webhook payload is not UTF-8".to_string()))?;
    let signed_payload = format!("{}.{}", timestamp, payload_str);

    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(signed_payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if expected.as_bytes().ct_eq(signature.as_bytes()).into() {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

/// Stripe webhook envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// Subscription fields pulled out of a webhook's subscription object.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
    pub status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub user_id: Option<Uuid>,
}

pub fn parse_subscription_object(object: &serde_json::Value) -> Result<SubscriptionUpdate> {
    let stripe_subscription_id = object
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::BadRequest("Subscription object missing id".to_string()))?
        .to_string();

    let stripe_customer_id = object
        .get("customer")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::BadRequest("Subscription object missing customer".to_string()))?
        .to_string();

    let status = object
        .get("status")
        .and_then(|v| v.as_str())
        .map(SubscriptionStatus::parse)
        .ok_or_else(|| AppError::BadRequest("Subscription object missing status".to_string()))?;

    let period_end_unix = object
        .get("current_period_end")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    let current_period_end = DateTime::<Utc>::from_timestamp(period_end_unix, 0)
        .ok_or_else(|| AppError::BadRequest("Invalid current_period_end".to_string()))?;

    let cancel_at_period_end = object
        .get("cancel_at_period_end")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let user_id = object
        .get("metadata")
        .and_then(|m| m.get("user_id"))
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());

    Ok(SubscriptionUpdate {
        stripe_subscription_id,
        stripe_customer_id,
        status,
        current_period_end,
        cancel_at_period_end,
        user_id,
    })
}

/// Outcome of waiting for asynchronous subscription activation.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivationOutcome {
    Active,
    TimedOut,
}

/// Poll the probe at a fixed interval until it reports an active
/// subscription or the attempt budget is spent. Never hangs.
pub async fn await_activation<F, Fut>(
    mut probe: F,
    interval: std::time::Duration,
    max_attempts: u32,
) -> Result<ActivationOutcome>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    for attempt in 0..max_attempts {
        if probe().await? {
            return Ok(ActivationOutcome::Active);
        }
        if attempt + 1 < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Ok(ActivationOutcome::TimedOut)
}

pub struct StripeService {
    db: Database,
    client: StripeClient,
}

impl StripeService {
    pub fn new(db: Database, client: StripeClient) -> Self {
        Self { db, client }
    }

    pub fn client(&self) -> &StripeClient {
        &self.client
    }

    /// Return the user's Stripe customer id, creating the customer on first
    /// use.
    pub async fn ensure_customer(&self, user: &User) -> Result<String> {
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT stripe_customer_id FROM stripe_customers WHERE user_id = $1",
        )
        .bind(user.id)
        .fetch_optional(&self.db.pg)
        .await?;

        if let Some(customer_id) = existing {
            return Ok(customer_id);
        }

        let customer_id = self.client.create_customer(&user.email, &user.full_name).await?;

        sqlx::query(
            r#"
            INSERT INTO stripe_customers (id, user_id, stripe_customer_id, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (user_id) DO UPDATE SET stripe_customer_id = EXCLUDED.stripe_customer_id, updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(&customer_id)
        .execute(&self.db.pg)
        .await?;

        Ok(customer_id)
    }

    pub async fn subscription_for_user(&self, user_id: Uuid) -> Result<Option<StripeSubscription>> {
        let subscription: Option<StripeSubscription> = sqlx::query_as(
            "SELECT * FROM stripe_subscriptions WHERE user_id = $1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.db.pg)
        .await?;

        Ok(subscription)
    }

    /// Apply a subscription lifecycle event. Customer mapping, subscription
    /// row, membership tier, and the funnel stage move together in one
    /// transaction, so a partial failure leaves no half-activated member.
    pub async fn apply_subscription_update(&self, update: SubscriptionUpdate) -> Result<()> {
        let user_id = match update.user_id {
            Some(id) => id,
            None => {
                // Fall back to the stored customer mapping
                sqlx::query_scalar(
                    "SELECT user_id FROM stripe_customers WHERE stripe_customer_id = $1",
                )
                .bind(&update.stripe_customer_id)
                .fetch_optional(&self.db.pg)
                .await?
                .ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "No user for Stripe customer {}",
                        update.stripe_customer_id
                    ))
                })?
            }
        };

        let grants_access = matches!(
            update.status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        );
        let tier = if grants_access {
            MembershipTier::Paid
        } else {
            MembershipTier::Free
        };

        let mut tx = self.db.pg.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO stripe_customers (id, user_id, stripe_customer_id, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (user_id) DO UPDATE SET stripe_customer_id = EXCLUDED.stripe_customer_id, updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&update.stripe_customer_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO stripe_subscriptions
                (id, user_id, stripe_subscription_id, stripe_customer_id, status, current_period_end, cancel_at_period_end, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            ON CONFLICT (stripe_subscription_id) DO UPDATE SET
                status = EXCLUDED.status,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&update.stripe_subscription_id)
        .bind(&update.stripe_customer_id)
        .bind(update.status.as_str())
        .bind(update.current_period_end)
        .bind(update.cancel_at_period_end)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET membership_tier = $1, updated_at = NOW() WHERE id = $2")
            .bind(tier.as_str())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if grants_access {
            sqlx::query(
                r#"
                UPDATE leads SET stage = $1, updated_at = NOW()
                WHERE email = (SELECT email FROM users WHERE id = $2) AND stage = 'lead'
                "#,
            )
            .bind(LeadStage::Member.as_str())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            subscription = %update.stripe_subscription_id,
            status = update.status.as_str(),
            "Applied subscription update"
        );

        Ok(())
    }

    /// Flag the subscription to end at period close, on Stripe first and
    /// then in the local mirror.
    pub async fn cancel_subscription(&self, user_id: Uuid) -> Result<StripeSubscription> {
        let subscription = self
            .subscription_for_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No subscription on file".to_string()))?;

        self.client
            .cancel_at_period_end(&subscription.stripe_subscription_id)
            .await?;

        let updated: StripeSubscription = sqlx::query_as(
            r#"
            UPDATE stripe_subscriptions SET cancel_at_period_end = true, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(subscription.id)
        .fetch_one(&self.db.pg)
        .await?;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let signed_payload = format!("{}.{}", timestamp, std::str::from_utf8(payload).unwrap());
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_valid_signature() {
        let secret = "whsec_test_secret";
        let payload = b"{\"type\":\"customer.subscription.updated\"}";
        let now = 1_700_000_000;
        let sig = sign(payload, secret, now);
        let header = format!("t={},v1={}", now, sig);

        assert!(verify_webhook_signature_at(payload, &header, secret, now).is_ok());
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let secret = "whsec_test_secret";
        let now = 1_700_000_000;
        let sig = sign(b"original", secret, now);
        let header = format!("t={},v1={}", now, sig);

        assert!(verify_webhook_signature_at(b"tampered", &header, secret, now).is_err());
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let secret = "whsec_test_secret";
        let payload = b"payload";
        let then = 1_700_000_000;
        let sig = sign(payload, secret, then);
        let header = format!("t={},v1={}", then, sig);

        let now = then + SIGNATURE_TOLERANCE_SECS + 1;
        assert!(verify_webhook_signature_at(payload, &header, secret, now).is_err());
    }

    #[test]
    fn rejects_a_malformed_header() {
        assert!(verify_webhook_signature_at(b"p", "v1=abc", "secret", 0).is_err());
        assert!(verify_webhook_signature_at(b"p", "nonsense", "secret", 0).is_err());
    }

    #[test]
    fn parses_a_subscription_object() {
        let user_id = Uuid::new_v4();
        let object = json!({
            "id": "sub_123",
            "customer": "cus_456",
            "status": "active",
            "current_period_end": 1_700_000_000,
            "cancel_at_period_end": false,
            "metadata": { "user_id": user_id.to_string() },
        });

        let update = parse_subscription_object(&object).unwrap();
        assert_eq!(update.stripe_subscription_id, "sub_123");
        assert_eq!(update.stripe_customer_id, "cus_456");
        assert_eq!(update.status, SubscriptionStatus::Active);
        assert_eq!(update.user_id, Some(user_id));
        assert!(!update.cancel_at_period_end);
    }

    #[test]
    fn subscription_object_without_id_is_rejected() {
        let object = json!({ "customer": "cus_456", "status": "active" });
        assert!(parse_subscription_object(&object).is_err());
    }

    #[test]
    fn supported_events_are_subscription_lifecycle() {
        assert!(is_supported_event("customer.subscription.created"));
        assert!(is_supported_event("customer.subscription.deleted"));
        assert!(!is_supported_event("invoice.finalized"));
    }

    #[tokio::test]
    async fn activation_wait_times_out_after_the_attempt_budget() {
        let mut attempts = 0u32;
        let outcome = await_activation(
            || {
                attempts += 1;
                async { Ok::<bool, AppError>(false) }
            },
            std::time::Duration::from_millis(1),
            5,
        )
        .await
        .unwrap();

        assert_eq!(outcome, ActivationOutcome::TimedOut);
        assert_eq!(attempts, 5);
    }

    #[tokio::test]
    async fn activation_wait_stops_as_soon_as_active() {
        let mut attempts = 0u32;
        let outcome = await_activation(
            || {
                attempts += 1;
                let active = attempts >= 2;
                async move { Ok::<bool, AppError>(active) }
            },
            std::time::Duration::from_millis(1),
            10,
        )
        .await
        .unwrap();

        assert_eq!(outcome, ActivationOutcome::Active);
        assert_eq!(attempts, 2);
    }
}
