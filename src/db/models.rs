use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, QuestionKind, UserRole};

/// Language-tag to text map. Multilingual content is opaque to the engine.
pub(crate) type LocalizedText = Json<HashMap<String, String>>;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) hashed_password: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: LocalizedText,
    pub(crate) description: Option<String>,
    pub(crate) duration_minutes: i32,
    pub(crate) total_marks: f64,
    pub(crate) negative_marking: bool,
    pub(crate) pass_percentage: f64,
    pub(crate) grading_instructions: Option<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamSection {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) title: LocalizedText,
    pub(crate) order_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) section_id: String,
    pub(crate) parent_id: Option<String>,
    pub(crate) kind: QuestionKind,
    pub(crate) text: LocalizedText,
    pub(crate) options: Json<Vec<serde_json::Value>>,
    pub(crate) correct_answers: Json<Vec<serde_json::Value>>,
    pub(crate) model_answer: Option<String>,
    pub(crate) explanation: Option<String>,
    pub(crate) marks: f64,
    pub(crate) negative_marks: f64,
    pub(crate) difficulty: i16,
    pub(crate) order_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamSchedule {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamAttempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) auto_submit: bool,
    pub(crate) total_score: Option<f64>,
    pub(crate) current_question_id: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) answer: Json<serde_json::Value>,
    pub(crate) marked_for_review: bool,
    pub(crate) time_spent_seconds: i32,
    pub(crate) is_correct: Option<bool>,
    pub(crate) marks_awarded: Option<f64>,
    pub(crate) ai_feedback: Option<Json<serde_json::Value>>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
