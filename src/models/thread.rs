use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub category: String,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThreadCategory {
    General,
    Wins,
    Questions,
    Announcements,
}

impl ThreadCategory {
    pub fn parse(category: &str) -> Option<Self> {
        match category {
            "general" => Some(ThreadCategory::General),
            "wins" => Some(ThreadCategory::Wins),
            "questions" => Some(ThreadCategory::Questions),
            "announcements" => Some(ThreadCategory::Announcements),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadCategory::General => "general",
            ThreadCategory::Wins => "wins",
            ThreadCategory::Questions => "questions",
            ThreadCategory::Announcements => "announcements",
        }
    }

    /// Only admins may post announcements.
    pub fn admin_only(&self) -> bool {
        matches!(self, ThreadCategory::Announcements)
    }
}
