use sqlx::{FromRow, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::ExamSchedule;

pub(crate) struct CreateAssignment<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) schedule_id: Option<&'a str>,
    pub(crate) max_attempts: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

/// An assignment joined with its schedule window. Null bounds mean the
/// assignment is always open.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct AssignmentWindowRow {
    pub(crate) assignment_id: String,
    pub(crate) student_id: String,
    pub(crate) schedule_id: Option<String>,
    pub(crate) max_attempts: i32,
    pub(crate) start_time: Option<PrimitiveDateTime>,
    pub(crate) end_time: Option<PrimitiveDateTime>,
}

pub(crate) async fn list_windows_for_student(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<Vec<AssignmentWindowRow>, sqlx::Error> {
    sqlx::query_as::<_, AssignmentWindowRow>(
        "SELECT a.id AS assignment_id, a.student_id, a.schedule_id, a.max_attempts,
                s.start_time, s.end_time
         FROM exam_assignments a
         LEFT JOIN exam_schedules s ON s.id = a.schedule_id
         WHERE a.exam_id = $1 AND a.student_id = $2",
    )
    .bind(exam_id)
    .bind(student_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_windows_for_students(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_ids: &[String],
) -> Result<Vec<AssignmentWindowRow>, sqlx::Error> {
    if student_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, AssignmentWindowRow>(
        "SELECT a.id AS assignment_id, a.student_id, a.schedule_id, a.max_attempts,
                s.start_time, s.end_time
         FROM exam_assignments a
         LEFT JOIN exam_schedules s ON s.id = a.schedule_id
         WHERE a.exam_id = $1 AND a.student_id = ANY($2)",
    )
    .bind(exam_id)
    .bind(student_ids)
    .fetch_all(executor)
    .await
}

pub(crate) async fn create_schedule(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    exam_id: &str,
    start_time: PrimitiveDateTime,
    end_time: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO exam_schedules (id, exam_id, start_time, end_time) VALUES ($1,$2,$3,$4)",
    )
    .bind(id)
    .bind(exam_id)
    .bind(start_time)
    .bind(end_time)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_schedule(
    pool: &PgPool,
    id: &str,
) -> Result<Option<ExamSchedule>, sqlx::Error> {
    sqlx::query_as::<_, ExamSchedule>(
        "SELECT id, exam_id, start_time, end_time FROM exam_schedules WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    assignment: CreateAssignment<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO exam_assignments (
            id, exam_id, student_id, schedule_id, max_attempts, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6)
        ON CONFLICT DO NOTHING",
    )
    .bind(assignment.id)
    .bind(assignment.exam_id)
    .bind(assignment.student_id)
    .bind(assignment.schedule_id)
    .bind(assignment.max_attempts)
    .bind(assignment.created_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM exam_assignments WHERE exam_id = $1")
        .bind(exam_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn update_max_attempts(
    pool: &PgPool,
    exam_id: &str,
    student_ids: &[String],
    max_attempts: i32,
) -> Result<u64, sqlx::Error> {
    if student_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "UPDATE exam_assignments SET max_attempts = $1
         WHERE exam_id = $2 AND student_id = ANY($3)",
    )
    .bind(max_attempts)
    .bind(exam_id)
    .bind(student_ids)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
