// Lead service - marketing funnel rows, upserted by email.

use serde::Serialize;

use crate::db::Database;
use crate::error::Result;
use crate::models::Lead;

pub struct LeadService {
    db: Database,
}

#[derive(Debug, Clone, Default)]
pub struct UpsertLead {
    pub email: String,
    pub name: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FunnelStats {
    pub total: i64,
    pub leads: i64,
    pub members: i64,
    pub optouts: i64,
    pub last_30_days: i64,
}

/// Leads are keyed by lowercased email.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl LeadService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upsert a funnel entry. Conflict policy is update-in-place: repeated
    /// submissions refresh name/utm fields on the one existing row. The
    /// stage is never demoted here.
    pub async fn upsert(&self, input: UpsertLead) -> Result<Lead> {
        let email = normalize_email(&input.email);

        let lead: Lead = sqlx::query_as(
            r#"
            INSERT INTO leads (id, email, name, stage, utm_source, utm_medium, utm_campaign, created_at, updated_at)
            VALUES ($1, $2, $3, 'lead', $4, $5, $6, NOW(), NOW())
            ON CONFLICT (email) DO UPDATE SET
                name = COALESCE(EXCLUDED.name, leads.name),
                utm_source = COALESCE(EXCLUDED.utm_source, leads.utm_source),
                utm_medium = COALESCE(EXCLUDED.utm_medium, leads.utm_medium),
                utm_campaign = COALESCE(EXCLUDED.utm_campaign, leads.utm_campaign),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(&email)
        .bind(&input.name)
        .bind(&input.utm_source)
        .bind(&input.utm_medium)
        .bind(&input.utm_campaign)
        .fetch_one(&self.db.pg)
        .await?;

        Ok(lead)
    }

    /// Record a marketing opt-out. Only plain leads transition; members keep
    /// their stage. Idempotent for repeated opt-outs.
    pub async fn optout(&self, email: &str) -> Result<Lead> {
        let email = normalize_email(email);

        let lead: Lead = sqlx::query_as(
            r#"
            INSERT INTO leads (id, email, stage, created_at, updated_at)
            VALUES ($1, $2, 'optout', NOW(), NOW())
            ON CONFLICT (email) DO UPDATE SET
                stage = CASE WHEN leads.stage = 'lead' THEN 'optout' ELSE leads.stage END,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(&email)
        .fetch_one(&self.db.pg)
        .await?;

        Ok(lead)
    }

    pub async fn funnel_stats(&self) -> Result<FunnelStats> {
        let (total, leads, members, optouts, last_30_days): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE stage = 'lead'),
                    COUNT(*) FILTER (WHERE stage = 'member'),
                    COUNT(*) FILTER (WHERE stage = 'optout'),
                    COUNT(*) FILTER (WHERE created_at > NOW() - INTERVAL '30 days')
                FROM leads
                "#,
            )
            .fetch_one(&self.db.pg)
            .await?;

        Ok(FunnelStats {
            total,
            leads,
            members,
            optouts,
            last_30_days,
        })
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<Lead>> {
        let leads: Vec<Lead> =
            sqlx::query_as("SELECT * FROM leads ORDER BY created_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.db.pg)
                .await?;

        Ok(leads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized_to_lowercase() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
        assert_eq!(normalize_email("a@b.c"), "a@b.c");
    }
}
