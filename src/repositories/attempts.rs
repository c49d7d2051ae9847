use sqlx::PgPool;

use crate::db::models::ExamAttempt;
use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, status, started_at, submitted_at, auto_submit, \
    total_score, current_question_id, created_at, updated_at";

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) started_at: time::PrimitiveDateTime,
    pub(crate) created_at: time::PrimitiveDateTime,
    pub(crate) updated_at: time::PrimitiveDateTime,
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!("SELECT {COLUMNS} FROM exam_attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_in_progress(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts \
         WHERE exam_id = $1 AND student_id = $2 AND status = $3"
    ))
    .bind(exam_id)
    .bind(student_id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn count_submitted(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM exam_attempts
         WHERE exam_id = $1 AND student_id = $2 AND status = $3",
    )
    .bind(exam_id)
    .bind(student_id)
    .bind(AttemptStatus::Submitted)
    .fetch_one(executor)
    .await
}

/// Insert guarded by the partial unique index on in-progress attempts.
/// Returns false when a concurrent start already created one.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: CreateAttempt<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO exam_attempts (
            id, exam_id, student_id, status, started_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7)
        ON CONFLICT DO NOTHING",
    )
    .bind(attempt.id)
    .bind(attempt.exam_id)
    .bind(attempt.student_id)
    .bind(AttemptStatus::InProgress)
    .bind(attempt.started_at)
    .bind(attempt.created_at)
    .bind(attempt.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Status-scoped transition InProgress -> Submitted. Only a row still in
/// progress is matched, so exactly one of two concurrent submits wins.
pub(crate) async fn claim_submit(
    pool: &PgPool,
    id: &str,
    auto_submit: bool,
    now: time::PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_attempts
         SET status = $1, submitted_at = $2, auto_submit = $3, updated_at = $2
         WHERE id = $4 AND status = $5",
    )
    .bind(AttemptStatus::Submitted)
    .bind(now)
    .bind(auto_submit)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn set_total_score(
    pool: &PgPool,
    id: &str,
    total_score: f64,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exam_attempts SET total_score = $1, updated_at = $2 WHERE id = $3")
        .bind(total_score)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Best-effort resume cursor; failures are the caller's to ignore.
pub(crate) async fn update_cursor(
    pool: &PgPool,
    id: &str,
    question_id: &str,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exam_attempts SET current_question_id = $1, updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(question_id)
    .bind(now)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .execute(pool)
    .await?;
    Ok(())
}
