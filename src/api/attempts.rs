use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc, seconds_since};
use crate::db::models::{Exam, ExamAttempt, Question, User};
use crate::db::types::{AttemptStatus, UserRole};
use crate::repositories;
use crate::schemas::attempt::{
    BatchItemOutcome, BatchSaveRequest, SaveResponseRequest, StartAttemptResponse, SubmitRequest,
    SubmitResponse,
};
use crate::services::{attempt_finalize, result_stats, schedule_conflict::AssignmentWindow};

pub(crate) fn exam_router() -> Router<AppState> {
    Router::new()
        .route("/:exam_id/attempts", post(start_attempt))
        .route("/:exam_id/attempts/current", get(current_attempt))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:attempt_id", get(attempt_data))
        .route("/:attempt_id/responses", post(save_response).put(save_batch))
        .route("/:attempt_id/submit", post(submit))
        .route("/:attempt_id/result", get(result))
}

async fn start_attempt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(exam_id): Path<String>,
) -> Result<(StatusCode, Json<StartAttemptResponse>), ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    let windows = repositories::assignments::list_windows_for_student(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam assignments"))?;
    if windows.is_empty() {
        return Err(ApiError::Forbidden("You are not assigned to this exam"));
    }

    let now = primitive_now_utc();
    let Some(active) = windows.iter().find(|row| AssignmentWindow::from_row(row).contains(now))
    else {
        return Err(ApiError::BadRequest("Exam is not currently active for you".to_string()));
    };

    if let Some(existing) = repositories::attempts::find_in_progress(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to look up running attempt"))?
    {
        return Ok((StatusCode::OK, Json(resume_response(existing))));
    }

    let submitted = repositories::attempts::count_submitted(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count submitted attempts"))?;
    if submitted >= i64::from(active.max_attempts) {
        return Err(ApiError::Conflict("Maximum attempts for this exam reached".to_string()));
    }

    let attempt_id = Uuid::new_v4().to_string();
    let created = repositories::attempts::create(
        state.db(),
        repositories::attempts::CreateAttempt {
            id: &attempt_id,
            exam_id: &exam.id,
            student_id: &user.id,
            started_at: now,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create attempt"))?;

    if created {
        tracing::info!(attempt_id = %attempt_id, exam_id = %exam.id, student_id = %user.id, "Attempt started");
        return Ok((
            StatusCode::CREATED,
            Json(StartAttemptResponse {
                attempt_id,
                started_at: format_primitive(now),
                resumed: false,
            }),
        ));
    }

    // Lost the unique-index race: another request started the attempt first.
    let existing = repositories::attempts::find_in_progress(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load concurrent attempt"))?
        .ok_or_else(|| ApiError::Conflict("Attempt could not be started".to_string()))?;

    Ok((StatusCode::OK, Json(resume_response(existing))))
}

fn resume_response(attempt: ExamAttempt) -> StartAttemptResponse {
    StartAttemptResponse {
        attempt_id: attempt.id,
        started_at: format_primitive(attempt.started_at),
        resumed: true,
    }
}

async fn current_attempt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(exam_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let attempt = repositories::attempts::find_in_progress(state.db(), &exam_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to look up running attempt"))?;

    let Some(attempt) = attempt else {
        let submitted = repositories::attempts::count_submitted(state.db(), &exam_id, &user.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count submitted attempts"))?;
        if submitted > 0 {
            return Err(ApiError::Conflict("Attempt has already been submitted".to_string()));
        }
        return Err(ApiError::NotFound("No attempt in progress for this exam".to_string()));
    };

    attempt_payload(&state, attempt).await.map(Json)
}

async fn attempt_data(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(attempt_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let attempt = fetch_owned_attempt(&state, &user, &attempt_id).await?;
    if attempt.status == AttemptStatus::Submitted {
        return Err(ApiError::Conflict("Attempt has already been submitted".to_string()));
    }
    attempt_payload(&state, attempt).await.map(Json)
}

/// Payload for a running attempt. Callers reject submitted attempts first.
async fn attempt_payload(
    state: &AppState,
    attempt: ExamAttempt,
) -> Result<serde_json::Value, ApiError> {
    let exam = fetch_exam(state, &attempt.exam_id).await?;

    let sections = repositories::exams::list_sections(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam sections"))?;
    let questions = repositories::exams::list_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam questions"))?;
    let responses = repositories::responses::list_by_attempt(state.db(), &attempt.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load saved responses"))?;

    let elapsed = seconds_since(attempt.started_at, primitive_now_utc());
    let remaining_seconds = (i64::from(exam.duration_minutes) * 60 - elapsed).max(0);

    let questions: Vec<serde_json::Value> = questions.iter().map(question_for_student).collect();
    let responses: Vec<serde_json::Value> = responses
        .iter()
        .map(|r| {
            json!({
                "question_id": r.question_id,
                "answer": r.answer.0,
                "marked_for_review": r.marked_for_review,
                "time_spent_seconds": r.time_spent_seconds,
            })
        })
        .collect();

    Ok(json!({
        "attempt": {
            "id": attempt.id,
            "exam_id": attempt.exam_id,
            "status": attempt.status,
            "started_at": format_primitive(attempt.started_at),
            "remaining_seconds": remaining_seconds,
            "current_question_id": attempt.current_question_id,
        },
        "exam": {
            "id": exam.id,
            "title": exam.title.0,
            "duration_minutes": exam.duration_minutes,
            "total_marks": exam.total_marks,
            "negative_marking": exam.negative_marking,
        },
        "sections": sections,
        "questions": questions,
        "responses": responses,
    }))
}

/// Delivery view of a question. Answer keys and model answers never
/// leave the server while an attempt can still be edited.
fn question_for_student(question: &Question) -> serde_json::Value {
    json!({
        "id": question.id,
        "section_id": question.section_id,
        "parent_id": question.parent_id,
        "kind": question.kind,
        "text": question.text.0,
        "options": question.options.0,
        "marks": question.marks,
        "negative_marks": question.negative_marks,
        "difficulty": question.difficulty,
        "order_index": question.order_index,
    })
}

async fn save_response(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(attempt_id): Path<String>,
    Json(payload): Json<SaveResponseRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let attempt = fetch_owned_attempt(&state, &user, &attempt_id).await?;
    save_one(&state, &attempt, &payload).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn save_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(attempt_id): Path<String>,
    Json(payload): Json<BatchSaveRequest>,
) -> Result<Json<Vec<BatchItemOutcome>>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let attempt = fetch_owned_attempt(&state, &user, &attempt_id).await?;

    let mut outcomes = Vec::with_capacity(payload.responses.len());
    for item in &payload.responses {
        let outcome = match save_one(&state, &attempt, item).await {
            Ok(()) => BatchItemOutcome { question_id: item.question_id.clone(), ok: true, error: None },
            Err(err) => BatchItemOutcome {
                question_id: item.question_id.clone(),
                ok: false,
                error: Some(save_error_detail(&err)),
            },
        };
        outcomes.push(outcome);
    }

    Ok(Json(outcomes))
}

fn save_error_detail(err: &ApiError) -> String {
    match err {
        ApiError::BadRequest(detail) | ApiError::Conflict(detail) => detail.clone(),
        ApiError::TooManyRequests(detail) => (*detail).to_string(),
        _ => "Failed to save response".to_string(),
    }
}

async fn save_one(
    state: &AppState,
    attempt: &ExamAttempt,
    payload: &SaveResponseRequest,
) -> Result<(), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if attempt.status != AttemptStatus::InProgress {
        return Err(ApiError::Conflict("Attempt has already been submitted".to_string()));
    }

    let min_interval = state.settings().exam().save_min_interval_seconds;
    if min_interval > 0 {
        let rate_key = format!("rl:save:{}:{}", attempt.id, payload.question_id);
        let allowed =
            state.redis().rate_limit(&rate_key, 1, min_interval).await.unwrap_or(true);
        if !allowed {
            return Err(ApiError::TooManyRequests("Saving too frequently, slow down"));
        }
    }

    let belongs =
        repositories::exams::question_belongs_to_exam(state.db(), &attempt.exam_id, &payload.question_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to verify question"))?;
    if !belongs {
        return Err(ApiError::BadRequest("Question does not belong to this exam".to_string()));
    }

    let now = primitive_now_utc();
    repositories::responses::upsert(
        state.db(),
        repositories::responses::UpsertResponse {
            id: &Uuid::new_v4().to_string(),
            attempt_id: &attempt.id,
            question_id: &payload.question_id,
            answer: payload.answer.clone(),
            marked_for_review: payload.marked_for_review,
            time_spent_delta: payload.time_spent_delta,
            now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to save response"))?;

    if let Err(err) =
        repositories::attempts::update_cursor(state.db(), &attempt.id, &payload.question_id, now).await
    {
        tracing::debug!(attempt_id = %attempt.id, error = %err, "Failed to update resume cursor");
    }

    Ok(())
}

async fn submit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(attempt_id): Path<String>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let attempt = fetch_owned_attempt(&state, &user, &attempt_id).await?;
    let exam = fetch_exam(&state, &attempt.exam_id).await?;

    let claimed =
        repositories::attempts::claim_submit(state.db(), &attempt.id, payload.auto_submit, primitive_now_utc())
            .await
            .map_err(|e| ApiError::internal(e, "Failed to submit attempt"))?;
    if !claimed {
        return Err(ApiError::Conflict("Attempt has already been submitted".to_string()));
    }

    tracing::info!(
        attempt_id = %attempt.id,
        auto_submit = payload.auto_submit,
        "Attempt submitted, scoring"
    );

    let total_score =
        attempt_finalize::score_attempt(state.db(), state.settings(), &attempt.id, &exam)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to score attempt"))?;

    Ok(Json(SubmitResponse { attempt_id: attempt.id, total_score }))
}

async fn result(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(attempt_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let attempt = fetch_owned_attempt(&state, &user, &attempt_id).await?;
    if attempt.status != AttemptStatus::Submitted {
        return Err(ApiError::Conflict("Attempt has not been submitted yet".to_string()));
    }

    let exam = fetch_exam(&state, &attempt.exam_id).await?;
    let sections = repositories::exams::list_sections(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam sections"))?;
    let questions = repositories::exams::list_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam questions"))?;
    let responses = repositories::responses::list_by_attempt(state.db(), &attempt.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load responses"))?;

    let stats = result_stats::aggregate(&exam, &sections, &questions, &responses);
    let detail: Vec<serde_json::Value> = responses
        .iter()
        .map(|r| {
            json!({
                "question_id": r.question_id,
                "answer": r.answer.0,
                "is_correct": r.is_correct,
                "marks_awarded": r.marks_awarded,
                "ai_feedback": r.ai_feedback.as_ref().map(|f| f.0.clone()),
                "time_spent_seconds": r.time_spent_seconds,
            })
        })
        .collect();

    Ok(Json(json!({
        "attempt_id": attempt.id,
        "exam_id": exam.id,
        "submitted_at": attempt.submitted_at.map(format_primitive),
        "auto_submit": attempt.auto_submit,
        "stats": stats,
        "responses": detail,
    })))
}

async fn fetch_exam(state: &AppState, exam_id: &str) -> Result<Exam, ApiError> {
    repositories::exams::find_by_id(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))
}

async fn fetch_owned_attempt(
    state: &AppState,
    user: &User,
    attempt_id: &str,
) -> Result<ExamAttempt, ApiError> {
    let attempt = repositories::attempts::find_by_id(state.db(), attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempt"))?
        .ok_or_else(|| ApiError::NotFound("Attempt not found".to_string()))?;

    if attempt.student_id != user.id && user.role != UserRole::Admin {
        return Err(ApiError::Forbidden("Not your attempt"));
    }

    Ok(attempt)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::core::time::primitive_now_utc;
    use crate::db::types::{AttemptStatus, QuestionKind, UserRole};
    use crate::repositories;
    use crate::test_support;

    #[tokio::test]
    async fn second_submit_claim_observes_no_matching_row() {
        let ctx = test_support::setup_test_context().await;
        let pool = ctx.state.db();

        let student = test_support::insert_user(
            pool,
            "claim@example.com",
            "Claim Student",
            UserRole::Student,
            "student-pass",
        )
        .await;
        let exam_id = test_support::insert_exam(pool, &student.id, false).await;
        let attempt_id =
            test_support::insert_attempt(pool, &exam_id, &student.id, AttemptStatus::InProgress)
                .await;

        let now = primitive_now_utc();
        let first = repositories::attempts::claim_submit(pool, &attempt_id, false, now)
            .await
            .expect("first claim");
        let second = repositories::attempts::claim_submit(pool, &attempt_id, true, now)
            .await
            .expect("second claim");

        assert!(first);
        assert!(!second);

        let attempt = repositories::attempts::find_by_id(pool, &attempt_id)
            .await
            .expect("load attempt")
            .expect("attempt exists");
        assert_eq!(attempt.status, AttemptStatus::Submitted);
        // The losing claim must not overwrite the winner's auto_submit flag.
        assert!(!attempt.auto_submit);
    }

    #[tokio::test]
    async fn total_reconciles_when_a_grading_task_fails() {
        let ctx = test_support::setup_test_context().await;
        let pool = ctx.state.db();

        let student = test_support::insert_user(
            pool,
            "totals@example.com",
            "Totals Student",
            UserRole::Student,
            "student-pass",
        )
        .await;
        let exam_id = test_support::insert_exam(pool, &student.id, false).await;
        let section_id = test_support::insert_section(pool, &exam_id).await;
        let q1 = test_support::insert_question(
            pool,
            &exam_id,
            &section_id,
            QuestionKind::SingleChoice,
            json!(["a"]),
            6.0,
        )
        .await;
        let q2 = test_support::insert_question(
            pool,
            &exam_id,
            &section_id,
            QuestionKind::SingleChoice,
            json!(["b"]),
            10.0,
        )
        .await;
        let q3 = test_support::insert_question(
            pool,
            &exam_id,
            &section_id,
            QuestionKind::LongAnswer,
            json!([]),
            10.0,
        )
        .await;
        let attempt_id =
            test_support::insert_attempt(pool, &exam_id, &student.id, AttemptStatus::InProgress)
                .await;

        let r1 = test_support::insert_response(pool, &attempt_id, &q1, json!(["a"])).await;
        let r2 = test_support::insert_response(pool, &attempt_id, &q2, json!(["b"])).await;
        test_support::insert_response(pool, &attempt_id, &q3, json!("An essay answer")).await;

        let now = primitive_now_utc();
        repositories::responses::set_objective_result(pool, &r1, true, 6.0, now)
            .await
            .expect("score first row");
        repositories::responses::set_objective_result(pool, &r2, true, 10.0, now)
            .await
            .expect("score second row");
        // The subjective row stays unscored, as after a failed grading task.

        let total = repositories::responses::total_awarded(pool, &attempt_id)
            .await
            .expect("sum awarded");
        assert_eq!(total, 16.0);

        repositories::attempts::set_total_score(pool, &attempt_id, total, now)
            .await
            .expect("persist total");
        let attempt = repositories::attempts::find_by_id(pool, &attempt_id)
            .await
            .expect("load attempt")
            .expect("attempt exists");
        assert_eq!(attempt.total_score, Some(16.0));
    }

    #[tokio::test]
    async fn submitted_attempt_reads_return_conflict() {
        let ctx = test_support::setup_test_context().await;
        let pool = ctx.state.db();

        let student = test_support::insert_user(
            pool,
            "done@example.com",
            "Done Student",
            UserRole::Student,
            "student-pass",
        )
        .await;
        let exam_id = test_support::insert_exam(pool, &student.id, false).await;
        let attempt_id =
            test_support::insert_attempt(pool, &exam_id, &student.id, AttemptStatus::Submitted)
                .await;
        let token = test_support::bearer_token(&student.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/attempts/{attempt_id}"),
                Some(&token),
                None,
            ))
            .await
            .expect("attempt data");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/exams/{exam_id}/attempts/current"),
                Some(&token),
                None,
            ))
            .await
            .expect("current attempt");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // A student who never attempted the exam still sees 404, not 409.
        let other = test_support::insert_user(
            pool,
            "fresh@example.com",
            "Fresh Student",
            UserRole::Student,
            "student-pass",
        )
        .await;
        let other_token = test_support::bearer_token(&other.id, ctx.state.settings());
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/exams/{exam_id}/attempts/current"),
                Some(&other_token),
                None,
            ))
            .await
            .expect("current attempt");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn submit_persists_total_despite_unscorable_row() {
        let ctx = test_support::setup_test_context().await;
        let pool = ctx.state.db();

        let student = test_support::insert_user(
            pool,
            "partial@example.com",
            "Partial Student",
            UserRole::Student,
            "student-pass",
        )
        .await;
        let exam_id = test_support::insert_exam(pool, &student.id, false).await;
        let section_id = test_support::insert_section(pool, &exam_id).await;
        let good = test_support::insert_question(
            pool,
            &exam_id,
            &section_id,
            QuestionKind::SingleChoice,
            json!(["a"]),
            5.0,
        )
        .await;
        // An empty correct-answer set cannot be scored; the row is skipped.
        let broken = test_support::insert_question(
            pool,
            &exam_id,
            &section_id,
            QuestionKind::SingleChoice,
            json!([]),
            5.0,
        )
        .await;
        let attempt_id =
            test_support::insert_attempt(pool, &exam_id, &student.id, AttemptStatus::InProgress)
                .await;
        test_support::insert_response(pool, &attempt_id, &good, json!(["a"])).await;
        test_support::insert_response(pool, &attempt_id, &broken, json!(["a"])).await;
        let token = test_support::bearer_token(&student.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/{attempt_id}/submit"),
                Some(&token),
                Some(json!({})),
            ))
            .await
            .expect("submit");
        let status = response.status();
        let body = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {body}");
        assert_eq!(body["total_score"], 5.0);

        let attempt = repositories::attempts::find_by_id(pool, &attempt_id)
            .await
            .expect("load attempt")
            .expect("attempt exists");
        assert_eq!(attempt.status, AttemptStatus::Submitted);
        assert_eq!(attempt.total_score, Some(5.0));

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/{attempt_id}/submit"),
                Some(&token),
                Some(json!({})),
            ))
            .await
            .expect("second submit");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
