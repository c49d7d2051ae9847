use sqlx::PgPool;

use crate::db::models::{Exam, ExamSection, Question};

pub(crate) const EXAM_COLUMNS: &str = "\
    id, title, description, duration_minutes, total_marks, negative_marking, \
    pass_percentage, grading_instructions, created_by, created_at, updated_at";

pub(crate) const QUESTION_COLUMNS: &str = "\
    id, exam_id, section_id, parent_id, kind, text, options, correct_answers, \
    model_answer, explanation, marks, negative_marks, difficulty, order_index";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {EXAM_COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_sections(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<ExamSection>, sqlx::Error> {
    sqlx::query_as::<_, ExamSection>(
        "SELECT id, exam_id, title, order_index
         FROM exam_sections WHERE exam_id = $1 ORDER BY order_index, id",
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_questions(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions
         WHERE exam_id = $1 ORDER BY section_id, order_index, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn question_belongs_to_exam(
    pool: &PgPool,
    exam_id: &str,
    question_id: &str,
) -> Result<bool, sqlx::Error> {
    let found: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM questions WHERE id = $1 AND exam_id = $2")
            .bind(question_id)
            .bind(exam_id)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}
