use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Stripe customer linked to a local user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StripeCustomer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_customer_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Subscription row mirrored from Stripe webhook events.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StripeSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
    pub status: String,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StripeSubscription {
    pub fn status_enum(&self) -> SubscriptionStatus {
        SubscriptionStatus::parse(&self.status)
    }

    /// Whether this row grants member access.
    pub fn grants_access(&self) -> bool {
        matches!(
            self.status_enum(),
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Trialing,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "active" => SubscriptionStatus::Active,
            "canceled" => SubscriptionStatus::Canceled,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "past_due" => SubscriptionStatus::PastDue,
            "trialing" => SubscriptionStatus::Trialing,
            "unpaid" => SubscriptionStatus::Unpaid,
            "paused" => SubscriptionStatus::Paused,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Paused => "paused",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_subscription_status_round_trips_known_values() {
        for s in [
            "active",
            "canceled",
            "incomplete",
            "incomplete_expired",
            "past_due",
            "trialing",
            "unpaid",
            "paused",
        ] {
            assert_eq!(SubscriptionStatus::parse(s).as_str(), s);
        }
    }

    #[test]
    fn unknown_status_falls_back_to_incomplete() {
        assert_eq!(SubscriptionStatus::parse("whatever"), SubscriptionStatus::Incomplete);
    }
}
