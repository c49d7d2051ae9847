use sqlx::PgPool;

use crate::db::models::QuestionResponse;

pub(crate) const COLUMNS: &str = "\
    id, attempt_id, question_id, answer, marked_for_review, time_spent_seconds, \
    is_correct, marks_awarded, ai_feedback, created_at, updated_at";

pub(crate) struct UpsertResponse<'a> {
    pub(crate) id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) answer: serde_json::Value,
    pub(crate) marked_for_review: bool,
    pub(crate) time_spent_delta: i32,
    pub(crate) now: time::PrimitiveDateTime,
}

/// Idempotent per-question upsert: answer and the review flag take the
/// latest client value, time_spent accumulates and is never overwritten.
pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    response: UpsertResponse<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO question_responses (
            id, attempt_id, question_id, answer, marked_for_review,
            time_spent_seconds, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$7)
        ON CONFLICT (attempt_id, question_id) DO UPDATE SET
            answer = EXCLUDED.answer,
            marked_for_review = EXCLUDED.marked_for_review,
            time_spent_seconds = question_responses.time_spent_seconds
                + EXCLUDED.time_spent_seconds,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(response.id)
    .bind(response.attempt_id)
    .bind(response.question_id)
    .bind(response.answer)
    .bind(response.marked_for_review)
    .bind(response.time_spent_delta)
    .bind(response.now)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list_by_attempt(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<QuestionResponse>, sqlx::Error> {
    sqlx::query_as::<_, QuestionResponse>(&format!(
        "SELECT {COLUMNS} FROM question_responses WHERE attempt_id = $1"
    ))
    .bind(attempt_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn set_objective_result(
    pool: &PgPool,
    id: &str,
    is_correct: bool,
    marks_awarded: f64,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE question_responses
         SET is_correct = $1, marks_awarded = $2, updated_at = $3
         WHERE id = $4",
    )
    .bind(is_correct)
    .bind(marks_awarded)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn set_ai_result(
    pool: &PgPool,
    id: &str,
    marks_awarded: f64,
    ai_feedback: serde_json::Value,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE question_responses
         SET marks_awarded = $1, is_correct = $2, ai_feedback = $3, updated_at = $4
         WHERE id = $5",
    )
    .bind(marks_awarded)
    .bind(marks_awarded > 0.0)
    .bind(ai_feedback)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// The authoritative total: always recomputed from persisted rows, never
/// accumulated in memory across scoring phases.
pub(crate) async fn total_awarded(pool: &PgPool, attempt_id: &str) -> Result<f64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(marks_awarded), 0)::DOUBLE PRECISION
         FROM question_responses WHERE attempt_id = $1",
    )
    .bind(attempt_id)
    .fetch_one(pool)
    .await
}
