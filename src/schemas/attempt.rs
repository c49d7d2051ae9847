use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize)]
pub(crate) struct StartAttemptResponse {
    pub(crate) attempt_id: String,
    pub(crate) started_at: String,
    pub(crate) resumed: bool,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub(crate) struct SaveResponseRequest {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) answer: serde_json::Value,
    #[serde(default)]
    #[serde(alias = "markedForReview")]
    pub(crate) marked_for_review: bool,
    #[serde(default)]
    #[serde(alias = "timeSpentDelta")]
    #[validate(range(min = 0, message = "time_spent_delta must be non-negative"))]
    pub(crate) time_spent_delta: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct BatchSaveRequest {
    #[validate(length(min = 1, message = "responses must not be empty"))]
    #[validate(nested)]
    pub(crate) responses: Vec<SaveResponseRequest>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchItemOutcome {
    pub(crate) question_id: String,
    pub(crate) ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    #[serde(default)]
    #[serde(alias = "autoSubmit")]
    pub(crate) auto_submit: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    pub(crate) attempt_id: String,
    pub(crate) total_score: f64,
}
