pub(crate) mod assignments;
pub(crate) mod attempts;
pub(crate) mod exams;
pub(crate) mod responses;
pub(crate) mod users;
