use std::collections::HashMap;
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::task::JoinSet;

use crate::core::config::Settings;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, Question, QuestionResponse};
use crate::repositories;
use crate::services::ai_grading::{AiGradingService, GradingTask};
use crate::services::objective_scoring;

/// Score every saved response of a just-submitted attempt and persist the
/// total. Objective questions are scored synchronously; subjective ones
/// fan out to the AI provider and are awaited before the total is summed.
/// Per-row failures in either pass leave that row unscored and never block
/// submit; the total is always summed and persisted.
pub(crate) async fn score_attempt(
    pool: &PgPool,
    settings: &Settings,
    attempt_id: &str,
    exam: &Exam,
) -> Result<f64> {
    let questions = repositories::exams::list_questions(pool, &exam.id)
        .await
        .context("Failed to load exam questions")?;
    let responses = repositories::responses::list_by_attempt(pool, attempt_id)
        .await
        .context("Failed to load attempt responses")?;

    let by_question: HashMap<&str, &Question> =
        questions.iter().map(|q| (q.id.as_str(), q)).collect();

    let mut subjective: Vec<GradingTask> = Vec::new();
    let now = primitive_now_utc();

    for response in &responses {
        let Some(question) = by_question.get(response.question_id.as_str()) else {
            tracing::warn!(
                attempt_id = %attempt_id,
                question_id = %response.question_id,
                "Response references a question no longer on the exam, skipping"
            );
            continue;
        };

        if question.kind.is_objective() {
            // A bad row must not block the submission; the row stays
            // unscored and the total is summed from what did persist.
            if let Err(error) = score_one_objective(pool, exam, question, response, now).await {
                tracing::error!(
                    attempt_id = %attempt_id,
                    question_id = %question.id,
                    error = %error,
                    "Failed to score objective response, leaving unscored"
                );
            }
        } else if question.kind.is_subjective() {
            if let Some(task) = build_grading_task(exam, question, response) {
                subjective.push(task);
            }
        }
    }

    if !subjective.is_empty() {
        grade_subjective(pool, settings, attempt_id, subjective).await;
    }

    let total = repositories::responses::total_awarded(pool, attempt_id)
        .await
        .context("Failed to sum awarded marks")?;
    repositories::attempts::set_total_score(pool, attempt_id, total, primitive_now_utc())
        .await
        .context("Failed to persist attempt total")?;

    Ok(total)
}

async fn score_one_objective(
    pool: &PgPool,
    exam: &Exam,
    question: &Question,
    response: &QuestionResponse,
    now: time::PrimitiveDateTime,
) -> Result<()> {
    if question.correct_answers.0.is_empty() {
        tracing::warn!(
            question_id = %question.id,
            "Objective question has no correct answer set, leaving unscored"
        );
        return Ok(());
    }

    let Some(outcome) =
        objective_scoring::score_objective(question, &response.answer.0, exam.negative_marking)
    else {
        return Ok(());
    };

    repositories::responses::set_objective_result(
        pool,
        &response.id,
        outcome.is_correct,
        outcome.marks_awarded,
        now,
    )
    .await
    .context("Failed to persist objective score")?;
    Ok(())
}

fn build_grading_task(
    exam: &Exam,
    question: &Question,
    response: &QuestionResponse,
) -> Option<GradingTask> {
    let student_answer = answer_text(&response.answer.0)?;
    Some(GradingTask {
        response_id: response.id.clone(),
        question_text: question_text(question),
        student_answer,
        model_answer: question.model_answer.clone().or_else(|| question.explanation.clone()),
        max_marks: question.marks,
        grading_instructions: exam.grading_instructions.clone(),
    })
}

/// Fan the subjective grading tasks out on a JoinSet and persist each
/// result as it lands. Per-task failures are logged and counted, not
/// propagated.
async fn grade_subjective(
    pool: &PgPool,
    settings: &Settings,
    attempt_id: &str,
    tasks: Vec<GradingTask>,
) {
    let service = match AiGradingService::from_settings(settings) {
        Ok(service) => service,
        Err(err) => {
            tracing::error!(attempt_id = %attempt_id, error = %err, "AI grading unavailable");
            return;
        }
    };

    let mut join_set = JoinSet::new();
    for task in tasks {
        let service = service.clone();
        join_set.spawn(async move {
            let timer = Instant::now();
            let result = service.grade(&task).await;
            (task, result, timer.elapsed().as_secs_f64())
        });
    }

    while let Some(joined) = join_set.join_next().await {
        let (task, result, elapsed) = match joined {
            Ok(output) => output,
            Err(err) => {
                tracing::error!(attempt_id = %attempt_id, error = %err, "Grading task panicked");
                metrics::counter!("grading_tasks_total", "status" => "failed").increment(1);
                continue;
            }
        };
        metrics::histogram!("grading_duration_seconds").record(elapsed);

        match result {
            Ok(outcome) => {
                let feedback = json!({
                    "feedback": outcome.feedback,
                    "improvements": outcome.improvements,
                });
                let persisted = repositories::responses::set_ai_result(
                    pool,
                    &task.response_id,
                    outcome.score,
                    feedback,
                    primitive_now_utc(),
                )
                .await;
                match persisted {
                    Ok(()) => {
                        metrics::counter!("grading_tasks_total", "status" => "success")
                            .increment(1);
                    }
                    Err(err) => {
                        tracing::error!(
                            response_id = %task.response_id,
                            error = %err,
                            "Failed to persist AI grade"
                        );
                        metrics::counter!("grading_tasks_total", "status" => "failed")
                            .increment(1);
                    }
                }
            }
            Err(err) => {
                tracing::error!(
                    response_id = %task.response_id,
                    error = %err,
                    "AI grading failed, response left unscored"
                );
                metrics::counter!("grading_tasks_total", "status" => "failed").increment(1);
            }
        }
    }
}

fn question_text(question: &Question) -> String {
    question
        .text
        .0
        .get("en")
        .cloned()
        .or_else(|| question.text.0.values().next().cloned())
        .unwrap_or_default()
}

fn answer_text(answer: &Value) -> Option<String> {
    let text = match answer {
        Value::String(text) => text.trim().to_string(),
        Value::Null => return None,
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_text_skips_blank_answers() {
        assert_eq!(answer_text(&Value::Null), None);
        assert_eq!(answer_text(&json!("")), None);
        assert_eq!(answer_text(&json!("   ")), None);
        assert_eq!(answer_text(&json!("An essay.")), Some("An essay.".to_string()));
        assert_eq!(answer_text(&json!(["line one", "line two"])), Some("line one\nline two".to_string()));
        assert_eq!(answer_text(&json!(42)), Some("42".to_string()));
    }
}
