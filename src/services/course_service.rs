// Course service - the ordered course/module/lesson hierarchy.

use serde::Serialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Course, CourseModule, Lesson};

pub struct CourseService {
    db: Database,
}

#[derive(Debug, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub modules: Vec<ModuleDetail>,
}

#[derive(Debug, Serialize)]
pub struct ModuleDetail {
    #[serde(flatten)]
    pub module: CourseModule,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug)]
pub struct UpsertCourse {
    pub title: String,
    pub description: Option<String>,
    pub order_index: i32,
    pub is_published: bool,
}

impl CourseService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list(&self, include_unpublished: bool) -> Result<Vec<Course>> {
        let courses: Vec<Course> = sqlx::query_as(
            "SELECT * FROM courses WHERE ($1 OR is_published = true) ORDER BY order_index ASC, created_at ASC",
        )
        .bind(include_unpublished)
        .fetch_all(&self.db.pg)
        .await?;

        Ok(courses)
    }

    pub async fn get(&self, course_id: Uuid, include_unpublished: bool) -> Result<CourseDetail> {
        let course: Course = sqlx::query_as(
            "SELECT * FROM courses WHERE id = $1 AND ($2 OR is_published = true)",
        )
        .bind(course_id)
        .bind(include_unpublished)
        .fetch_optional(&self.db.pg)
        .await?
        .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        let modules: Vec<CourseModule> = sqlx::query_as(
            "SELECT * FROM course_modules WHERE course_id = $1 ORDER BY order_index ASC",
        )
        .bind(course_id)
        .fetch_all(&self.db.pg)
        .await?;

        let lessons: Vec<Lesson> = sqlx::query_as(
            r#"
            SELECT l.* FROM lessons l
            JOIN course_modules m ON m.id = l.module_id
            WHERE m.course_id = $1
            ORDER BY l.order_index ASC
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.db.pg)
        .await?;

        let modules = modules
            .into_iter()
            .map(|module| {
                let lessons = lessons
                    .iter()
                    .filter(|l| l.module_id == module.id)
                    .cloned()
                    .collect();
                ModuleDetail { module, lessons }
            })
            .collect();

        Ok(CourseDetail { course, modules })
    }

    pub async fn create(&self, input: UpsertCourse) -> Result<Course> {
        let course: Course = sqlx::query_as(
            r#"
            INSERT INTO courses (id, title, description, order_index, is_published, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.order_index)
        .bind(input.is_published)
        .fetch_one(&self.db.pg)
        .await?;

        Ok(course)
    }

    pub async fn update(&self, course_id: Uuid, input: UpsertCourse) -> Result<Course> {
        let course: Course = sqlx::query_as(
            r#"
            UPDATE courses
            SET title = $1, description = $2, order_index = $3, is_published = $4, updated_at = NOW()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.order_index)
        .bind(input.is_published)
        .bind(course_id)
        .fetch_optional(&self.db.pg)
        .await?
        .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        Ok(course)
    }

    pub async fn delete(&self, course_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(course_id)
            .execute(&self.db.pg)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Course not found".to_string()));
        }
        Ok(())
    }

    pub async fn create_module(&self, course_id: Uuid, title: &str, order_index: i32) -> Result<CourseModule> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM courses WHERE id = $1)")
            .bind(course_id)
            .fetch_one(&self.db.pg)
            .await?;
        if !exists {
            return Err(AppError::NotFound("Course not found".to_string()));
        }

        let module: CourseModule = sqlx::query_as(
            r#"
            INSERT INTO course_modules (id, course_id, title, order_index, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(title)
        .bind(order_index)
        .fetch_one(&self.db.pg)
        .await?;

        Ok(module)
    }

    pub async fn update_module(&self, module_id: Uuid, title: &str, order_index: i32) -> Result<CourseModule> {
        let module: CourseModule = sqlx::query_as(
            r#"
            UPDATE course_modules SET title = $1, order_index = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(title)
        .bind(order_index)
        .bind(module_id)
        .fetch_optional(&self.db.pg)
        .await?
        .ok_or_else(|| AppError::NotFound("Module not found".to_string()))?;

        Ok(module)
    }

    pub async fn delete_module(&self, module_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM course_modules WHERE id = $1")
            .bind(module_id)
            .execute(&self.db.pg)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Module not found".to_string()));
        }
        Ok(())
    }

    pub async fn create_lesson(
        &self,
        module_id: Uuid,
        title: &str,
        video_url: Option<&str>,
        duration_seconds: Option<i32>,
        order_index: i32,
    ) -> Result<Lesson> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM course_modules WHERE id = $1)")
                .bind(module_id)
                .fetch_one(&self.db.pg)
                .await?;
        if !exists {
            return Err(AppError::NotFound("Module not found".to_string()));
        }

        let lesson: Lesson = sqlx::query_as(
            r#"
            INSERT INTO lessons (id, module_id, title, video_url, duration_seconds, order_index, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(module_id)
        .bind(title)
        .bind(video_url)
        .bind(duration_seconds)
        .bind(order_index)
        .fetch_one(&self.db.pg)
        .await?;

        Ok(lesson)
    }

    pub async fn update_lesson(
        &self,
        lesson_id: Uuid,
        title: &str,
        video_url: Option<&str>,
        duration_seconds: Option<i32>,
        order_index: i32,
    ) -> Result<Lesson> {
        let lesson: Lesson = sqlx::query_as(
            r#"
            UPDATE lessons
            SET title = $1, video_url = $2, duration_seconds = $3, order_index = $4, updated_at = NOW()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(title)
        .bind(video_url)
        .bind(duration_seconds)
        .bind(order_index)
        .bind(lesson_id)
        .fetch_optional(&self.db.pg)
        .await?
        .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))?;

        Ok(lesson)
    }

    pub async fn delete_lesson(&self, lesson_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM lessons WHERE id = $1")
            .bind(lesson_id)
            .execute(&self.db.pg)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Lesson not found".to_string()));
        }
        Ok(())
    }
}
