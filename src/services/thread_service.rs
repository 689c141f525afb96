// Thread service - discussion threads and comments. Deletion is logical
// (is_deleted flag) and restorable by admins.

use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Comment, Thread, ThreadCategory};
use crate::services::AccessLevel;

pub struct ThreadService {
    db: Database,
}

/// Thread listing uses a fixed page size.
pub const THREADS_PAGE_SIZE: i64 = 20;

#[derive(Debug)]
pub struct CreateThread {
    pub title: String,
    pub content: String,
    pub category: ThreadCategory,
}

/// The announcements category is reserved for admins.
pub fn ensure_can_post(category: ThreadCategory, level: AccessLevel) -> Result<()> {
    if category.admin_only() && !level.is_admin() {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

impl ThreadService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list(&self, page: u32, category: Option<ThreadCategory>) -> Result<(Vec<Thread>, i64)> {
        let offset = ((page.max(1) - 1) as i64) * THREADS_PAGE_SIZE;
        let category_str = category.map(|c| c.as_str());

        let threads: Vec<Thread> = sqlx::query_as(
            r#"
            SELECT * FROM threads
            WHERE is_deleted = false AND ($1::text IS NULL OR category = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(category_str)
        .bind(THREADS_PAGE_SIZE)
        .bind(offset)
        .fetch_all(&self.db.pg)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM threads WHERE is_deleted = false AND ($1::text IS NULL OR category = $1)",
        )
        .bind(category_str)
        .fetch_one(&self.db.pg)
        .await?;

        Ok((threads, total))
    }

    pub async fn get(&self, thread_id: Uuid) -> Result<(Thread, Vec<Comment>)> {
        let thread: Thread = sqlx::query_as(
            "SELECT * FROM threads WHERE id = $1 AND is_deleted = false",
        )
        .bind(thread_id)
        .fetch_optional(&self.db.pg)
        .await?
        .ok_or_else(|| AppError::NotFound("Thread not found".to_string()))?;

        let comments: Vec<Comment> = sqlx::query_as(
            "SELECT * FROM comments WHERE thread_id = $1 AND is_deleted = false ORDER BY created_at ASC",
        )
        .bind(thread_id)
        .fetch_all(&self.db.pg)
        .await?;

        Ok((thread, comments))
    }

    pub async fn create(&self, author_id: Uuid, level: AccessLevel, input: CreateThread) -> Result<Thread> {
        ensure_can_post(input.category, level)?;

        let thread: Thread = sqlx::query_as(
            r#"
            INSERT INTO threads (id, author_id, title, content, category, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(author_id)
        .bind(&input.title)
        .bind(&input.content)
        .bind(input.category.as_str())
        .fetch_one(&self.db.pg)
        .await?;

        Ok(thread)
    }

    pub async fn add_comment(&self, thread_id: Uuid, author_id: Uuid, content: &str) -> Result<Comment> {
        // The thread must exist and not be deleted
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM threads WHERE id = $1 AND is_deleted = false)",
        )
        .bind(thread_id)
        .fetch_one(&self.db.pg)
        .await?;
        if !exists {
            return Err(AppError::NotFound("Thread not found".to_string()));
        }

        let comment: Comment = sqlx::query_as(
            r#"
            INSERT INTO comments (id, thread_id, author_id, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(thread_id)
        .bind(author_id)
        .bind(content)
        .fetch_one(&self.db.pg)
        .await?;

        Ok(comment)
    }

    /// Soft delete. Authors may delete their own threads, admins any.
    pub async fn delete(&self, thread_id: Uuid, actor_id: Uuid, level: AccessLevel) -> Result<()> {
        let thread: Thread = sqlx::query_as(
            "SELECT * FROM threads WHERE id = $1 AND is_deleted = false",
        )
        .bind(thread_id)
        .fetch_optional(&self.db.pg)
        .await?
        .ok_or_else(|| AppError::NotFound("Thread not found".to_string()))?;

        if thread.author_id != actor_id && !level.is_admin() {
            return Err(AppError::Forbidden);
        }

        sqlx::query(
            "UPDATE threads SET is_deleted = true, deleted_at = NOW(), deleted_by = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(actor_id)
        .bind(thread_id)
        .execute(&self.db.pg)
        .await?;

        Ok(())
    }

    /// Admin-only restore of a soft-deleted thread.
    pub async fn restore(&self, thread_id: Uuid) -> Result<Thread> {
        let thread: Thread = sqlx::query_as(
            r#"
            UPDATE threads
            SET is_deleted = false, deleted_at = NULL, deleted_by = NULL, updated_at = NOW()
            WHERE id = $1 AND is_deleted = true
            RETURNING *
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&self.db.pg)
        .await?
        .ok_or_else(|| AppError::NotFound("Thread not found".to_string()))?;

        Ok(thread)
    }

    pub async fn delete_comment(&self, comment_id: Uuid, actor_id: Uuid, level: AccessLevel) -> Result<()> {
        let comment: Comment = sqlx::query_as(
            "SELECT * FROM comments WHERE id = $1 AND is_deleted = false",
        )
        .bind(comment_id)
        .fetch_optional(&self.db.pg)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

        if comment.author_id != actor_id && !level.is_admin() {
            return Err(AppError::Forbidden);
        }

        sqlx::query(
            "UPDATE comments SET is_deleted = true, deleted_at = NOW(), deleted_by = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(actor_id)
        .bind(comment_id)
        .execute(&self.db.pg)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_admin_cannot_post_announcements() {
        let err = ensure_can_post(ThreadCategory::Announcements, AccessLevel::Member).unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[test]
    fn admin_can_post_announcements() {
        assert!(ensure_can_post(ThreadCategory::Announcements, AccessLevel::Admin).is_ok());
    }

    #[test]
    fn members_can_post_regular_categories() {
        for category in [
            ThreadCategory::General,
            ThreadCategory::Wins,
            ThreadCategory::Questions,
        ] {
            assert!(ensure_can_post(category, AccessLevel::Member).is_ok());
        }
    }
}
