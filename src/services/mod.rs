pub(crate) mod ai_grading;
pub(crate) mod attempt_finalize;
pub(crate) mod objective_scoring;
pub(crate) mod result_stats;
pub(crate) mod schedule_conflict;
