use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::repositories;
use crate::repositories::assignments::AssignmentWindowRow;
use crate::schemas::assignment::{
    AssignMode, AssignRequest, AssignResponse, ScheduleSelector, UpdateMaxAttemptsRequest,
};
use crate::services::schedule_conflict::{find_conflict, AssignmentWindow};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/:exam_id/assignments", post(assign).patch(update_max_attempts))
}

async fn assign(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(exam_id): Path<String>,
    Json(payload): Json<AssignRequest>,
) -> Result<(StatusCode, Json<AssignResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to open transaction"))?;

    let (schedule_id, window) = match &payload.schedule {
        ScheduleSelector::None => (None, AssignmentWindow::Open),
        ScheduleSelector::Existing { schedule_id } => {
            let schedule = repositories::assignments::find_schedule(state.db(), schedule_id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load schedule"))?
                .ok_or_else(|| ApiError::NotFound("Schedule not found".to_string()))?;
            if schedule.exam_id != exam.id {
                return Err(ApiError::BadRequest(
                    "Schedule belongs to a different exam".to_string(),
                ));
            }
            (
                Some(schedule.id.clone()),
                AssignmentWindow::Fixed { start: schedule.start_time, end: schedule.end_time },
            )
        }
        ScheduleSelector::New { start_time, end_time } => {
            if start_time >= end_time {
                return Err(ApiError::BadRequest(
                    "Schedule start must be before its end".to_string(),
                ));
            }
            let id = Uuid::new_v4().to_string();
            repositories::assignments::create_schedule(&mut *tx, &id, &exam.id, *start_time, *end_time)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to create schedule"))?;
            (Some(id), AssignmentWindow::Fixed { start: *start_time, end: *end_time })
        }
    };

    if payload.mode == AssignMode::Replace {
        let removed = repositories::assignments::delete_for_exam(&mut *tx, &exam.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to clear previous assignments"))?;
        tracing::info!(exam_id = %exam.id, removed, "Replacing exam assignments");
    }

    // Conflict check runs inside the transaction so a replace-mode batch
    // is validated against the post-delete state, not the old roster.
    let existing =
        repositories::assignments::list_windows_for_students(&mut *tx, &exam.id, &payload.student_ids)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load existing windows"))?;
    let mut by_student: HashMap<String, Vec<AssignmentWindowRow>> = HashMap::new();
    for row in existing {
        by_student.entry(row.student_id.clone()).or_default().push(row);
    }

    for student_id in &payload.student_ids {
        let theirs = by_student.get(student_id).map(Vec::as_slice).unwrap_or(&[]);
        if let Some(hit) = find_conflict(&window, theirs) {
            return Err(ApiError::ScheduleConflict {
                student_id: student_id.clone(),
                window: conflict_window_json(hit),
            });
        }
    }

    let now = primitive_now_utc();
    let mut assigned = 0usize;
    for student_id in &payload.student_ids {
        let inserted = repositories::assignments::insert(
            &mut *tx,
            repositories::assignments::CreateAssignment {
                id: &Uuid::new_v4().to_string(),
                exam_id: &exam.id,
                student_id,
                schedule_id: schedule_id.as_deref(),
                max_attempts: payload.max_attempts,
                created_at: now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create assignment"))?;
        if inserted {
            assigned += 1;
        }
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit assignments"))?;

    tracing::info!(
        exam_id = %exam.id,
        admin_id = %admin.id,
        assigned,
        "Exam assignments created"
    );

    Ok((StatusCode::CREATED, Json(AssignResponse { assigned, schedule_id })))
}

async fn update_max_attempts(
    State(state): State<AppState>,
    CurrentAdmin(_admin): CurrentAdmin,
    Path(exam_id): Path<String>,
    Json(payload): Json<UpdateMaxAttemptsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let updated = repositories::assignments::update_max_attempts(
        state.db(),
        &exam_id,
        &payload.student_ids,
        payload.max_attempts,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update max attempts"))?;

    Ok(Json(json!({ "updated": updated })))
}

fn conflict_window_json(row: &AssignmentWindowRow) -> serde_json::Value {
    json!({
        "schedule_id": row.schedule_id,
        "start_time": row.start_time.map(format_primitive),
        "end_time": row.end_time.map(format_primitive),
    })
}
