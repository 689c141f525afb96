// Event service - scheduled occurrences with capacity-aware registration.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Event, EventRegistration, RegistrationStatus};

pub struct EventService {
    db: Database,
}

#[derive(Debug, Serialize)]
pub struct EventSummary {
    #[serde(flatten)]
    pub event: Event,
    pub registered_count: i64,
    pub waitlisted_count: i64,
}

#[derive(Debug)]
pub struct CreateEvent {
    pub title: String,
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub capacity: Option<i32>,
}

/// A full event waitlists instead of rejecting.
pub fn placement(capacity: Option<i32>, registered_count: i64) -> RegistrationStatus {
    match capacity {
        Some(cap) if registered_count >= cap as i64 => RegistrationStatus::Waitlisted,
        _ => RegistrationStatus::Registered,
    }
}

impl EventService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list_upcoming(&self) -> Result<Vec<EventSummary>> {
        let events: Vec<Event> = sqlx::query_as(
            "SELECT * FROM events WHERE starts_at > NOW() ORDER BY starts_at ASC",
        )
        .fetch_all(&self.db.pg)
        .await?;

        let mut summaries = Vec::with_capacity(events.len());
        for event in events {
            let (registered_count, waitlisted_count): (i64, i64) = sqlx::query_as(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE status = 'registered'),
                    COUNT(*) FILTER (WHERE status = 'waitlisted')
                FROM event_registrations WHERE event_id = $1
                "#,
            )
            .bind(event.id)
            .fetch_one(&self.db.pg)
            .await?;

            summaries.push(EventSummary {
                event,
                registered_count,
                waitlisted_count,
            });
        }

        Ok(summaries)
    }

    pub async fn create(&self, created_by: Uuid, input: CreateEvent) -> Result<Event> {
        let event: Event = sqlx::query_as(
            r#"
            INSERT INTO events (id, title, description, starts_at, duration_minutes, capacity, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.starts_at)
        .bind(input.duration_minutes)
        .bind(input.capacity)
        .bind(created_by)
        .fetch_one(&self.db.pg)
        .await?;

        Ok(event)
    }

    /// Register the user; if the event is at capacity the registration is
    /// waitlisted. Re-registering after a cancellation re-places the row.
    pub async fn register(&self, event_id: Uuid, user_id: Uuid) -> Result<EventRegistration> {
        let event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&self.db.pg)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        let existing: Option<EventRegistration> = sqlx::query_as(
            "SELECT * FROM event_registrations WHERE event_id = $1 AND user_id = $2",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.db.pg)
        .await?;

        if let Some(reg) = &existing {
            if RegistrationStatus::parse(&reg.status) != Some(RegistrationStatus::Cancelled) {
                return Err(AppError::Conflict("Already registered".to_string()));
            }
        }

        let registered_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM event_registrations WHERE event_id = $1 AND status = 'registered'",
        )
        .bind(event_id)
        .fetch_one(&self.db.pg)
        .await?;

        let status = placement(event.capacity, registered_count);

        let registration: EventRegistration = sqlx::query_as(
            r#"
            INSERT INTO event_registrations (id, event_id, user_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (event_id, user_id) DO UPDATE SET status = EXCLUDED.status, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(user_id)
        .bind(status.as_str())
        .fetch_one(&self.db.pg)
        .await?;

        Ok(registration)
    }

    /// Cancel the caller's registration. The first waitlisted registrant, if
    /// any, is promoted into the freed seat.
    pub async fn cancel(&self, event_id: Uuid, user_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE event_registrations SET status = 'cancelled', updated_at = NOW()
            WHERE event_id = $1 AND user_id = $2 AND status IN ('registered', 'waitlisted')
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .execute(&self.db.pg)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Registration not found".to_string()));
        }

        sqlx::query(
            r#"
            UPDATE event_registrations SET status = 'registered', updated_at = NOW()
            WHERE id = (
                SELECT id FROM event_registrations
                WHERE event_id = $1 AND status = 'waitlisted'
                ORDER BY created_at ASC
                LIMIT 1
            )
            "#,
        )
        .bind(event_id)
        .execute(&self.db.pg)
        .await?;

        Ok(())
    }

    /// Admin attendance marking after the event ran.
    pub async fn mark_attended(&self, event_id: Uuid, user_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE event_registrations SET status = 'attended', updated_at = NOW()
            WHERE event_id = $1 AND user_id = $2 AND status = 'registered'
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .execute(&self.db.pg)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Registration not found".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_beyond_capacity_is_waitlisted() {
        assert_eq!(placement(Some(2), 2), RegistrationStatus::Waitlisted);
        assert_eq!(placement(Some(2), 5), RegistrationStatus::Waitlisted);
    }

    #[test]
    fn registration_under_capacity_is_registered() {
        assert_eq!(placement(Some(2), 0), RegistrationStatus::Registered);
        assert_eq!(placement(Some(2), 1), RegistrationStatus::Registered);
    }

    #[test]
    fn unlimited_capacity_always_registers() {
        assert_eq!(placement(None, 10_000), RegistrationStatus::Registered);
    }
}
