// Authorization service - the one place access level is derived.
// Every boundary (middleware, handlers, gating) asks this service instead of
// re-deriving admin/subscription checks.

use serde::Serialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::Result;
use crate::models::User;

/// Access level for a request. Evaluation order is fixed:
/// no session -> Anonymous, is_admin -> Admin, active subscription -> Member,
/// otherwise Free.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Anonymous,
    Free,
    Member,
    Admin,
}

impl AccessLevel {
    pub fn can_access_community(&self) -> bool {
        matches!(self, AccessLevel::Member | AccessLevel::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AccessLevel::Admin)
    }

    /// Post-auth redirect decision: members land in the community area,
    /// everyone else is sent to the payment page.
    pub fn redirect_target(&self) -> &'static str {
        if self.can_access_community() {
            "/threads"
        } else {
            "/payment"
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Anonymous => "anonymous",
            AccessLevel::Free => "free",
            AccessLevel::Member => "member",
            AccessLevel::Admin => "admin",
        }
    }
}

/// Pure classification once the rows are known.
pub fn classify(user: Option<&User>, has_active_subscription: bool) -> AccessLevel {
    let Some(user) = user else {
        return AccessLevel::Anonymous;
    };
    if user.is_admin {
        return AccessLevel::Admin;
    }
    if has_active_subscription {
        return AccessLevel::Member;
    }
    AccessLevel::Free
}

pub struct AuthzService {
    db: Database,
}

impl AuthzService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn classify_user_id(&self, user_id: Option<Uuid>) -> Result<AccessLevel> {
        let Some(user_id) = user_id else {
            return Ok(AccessLevel::Anonymous);
        };

        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db.pg)
            .await?;

        let Some(user) = user else {
            return Ok(AccessLevel::Anonymous);
        };

        self.classify_user(&user).await
    }

    pub async fn classify_user(&self, user: &User) -> Result<AccessLevel> {
        // Admin short-circuits the subscription query
        if user.is_admin {
            return Ok(classify(Some(user), false));
        }

        let has_active = self.has_active_subscription(user.id).await?;
        Ok(classify(Some(user), has_active))
    }

    pub async fn has_active_subscription(&self, user_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM stripe_subscriptions WHERE user_id = $1 AND status IN ('active', 'trialing'))"
        )
        .bind(user_id)
        .fetch_one(&self.db.pg)
        .await?;

        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(is_admin: bool) -> User {
        User {
            id: Uuid::new_v4(),
            email: "member@example.com".to_string(),
            password_hash: "x".to_string(),
            full_name: "Test User".to_string(),
            is_admin,
            membership_tier: "free".to_string(),
            founding_number: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn admin_without_subscription_has_full_access() {
        let u = user(true);
        let level = classify(Some(&u), false);
        assert_eq!(level, AccessLevel::Admin);
        assert!(level.can_access_community());
    }

    #[test]
    fn active_subscriber_without_admin_has_full_access() {
        let u = user(false);
        let level = classify(Some(&u), true);
        assert_eq!(level, AccessLevel::Member);
        assert!(level.can_access_community());
    }

    #[test]
    fn neither_flag_is_denied_and_redirected_to_payment() {
        let u = user(false);
        let level = classify(Some(&u), false);
        assert_eq!(level, AccessLevel::Free);
        assert!(!level.can_access_community());
        assert_eq!(level.redirect_target(), "/payment");
    }

    #[test]
    fn no_session_is_anonymous() {
        assert_eq!(classify(None, false), AccessLevel::Anonymous);
        assert_eq!(classify(None, true), AccessLevel::Anonymous);
    }

    #[test]
    fn members_are_redirected_to_the_community() {
        assert_eq!(AccessLevel::Member.redirect_target(), "/threads");
        assert_eq!(AccessLevel::Admin.redirect_target(), "/threads");
    }
}
