use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum AssignMode {
    Replace,
    Append,
}

fn default_assign_mode() -> AssignMode {
    AssignMode::Replace
}

fn default_max_attempts() -> i32 {
    1
}

/// Window selector for an assignment batch: reuse an existing schedule,
/// create a new one, or leave the exam always open.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub(crate) enum ScheduleSelector {
    None,
    Existing {
        #[serde(alias = "scheduleId")]
        schedule_id: String,
    },
    New {
        #[serde(alias = "startTime", with = "crate::schemas::assignment::rfc3339_primitive")]
        start_time: PrimitiveDateTime,
        #[serde(alias = "endTime", with = "crate::schemas::assignment::rfc3339_primitive")]
        end_time: PrimitiveDateTime,
    },
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AssignRequest {
    #[serde(alias = "studentIds")]
    #[validate(length(min = 1, message = "student_ids must not be empty"))]
    pub(crate) student_ids: Vec<String>,
    #[serde(default = "default_assign_mode")]
    pub(crate) mode: AssignMode,
    #[serde(default = "default_schedule_selector")]
    pub(crate) schedule: ScheduleSelector,
    #[serde(default = "default_max_attempts")]
    #[serde(alias = "maxAttempts")]
    #[validate(range(min = 1, max = 100, message = "max_attempts must be between 1 and 100"))]
    pub(crate) max_attempts: i32,
}

fn default_schedule_selector() -> ScheduleSelector {
    ScheduleSelector::None
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignResponse {
    pub(crate) assigned: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) schedule_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct UpdateMaxAttemptsRequest {
    #[serde(alias = "studentIds")]
    #[validate(length(min = 1, message = "student_ids must not be empty"))]
    pub(crate) student_ids: Vec<String>,
    #[serde(alias = "maxAttempts")]
    #[validate(range(min = 1, max = 100, message = "max_attempts must be between 1 and 100"))]
    pub(crate) max_attempts: i32,
}

/// RFC 3339 timestamps on the wire, stored naive in UTC.
pub(crate) mod rfc3339_primitive {
    use serde::{Deserialize, Deserializer};
    use time::format_description::well_known::Rfc3339;
    use time::{OffsetDateTime, PrimitiveDateTime};

    use crate::core::time::to_primitive_utc;

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<PrimitiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let parsed = OffsetDateTime::parse(&raw, &Rfc3339).map_err(serde::de::Error::custom)?;
        Ok(to_primitive_utc(parsed))
    }
}
