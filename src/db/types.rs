use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Admin,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "questionkind", rename_all = "lowercase")]
pub(crate) enum QuestionKind {
    SingleChoice,
    MultiChoice,
    FillBlank,
    Numerical,
    TrueFalse,
    ShortAnswer,
    LongAnswer,
    Paragraph,
}

impl QuestionKind {
    /// Scored by exact answer-set comparison at submit time.
    pub(crate) fn is_objective(self) -> bool {
        matches!(
            self,
            Self::SingleChoice | Self::MultiChoice | Self::FillBlank | Self::Numerical
                | Self::TrueFalse
        )
    }

    /// Scored by the AI grading pipeline.
    pub(crate) fn is_subjective(self) -> bool {
        matches!(self, Self::ShortAnswer | Self::LongAnswer)
    }

    /// Paragraph parents only group sub-questions; they carry no marks.
    pub(crate) fn is_gradable(self) -> bool {
        !matches!(self, Self::Paragraph)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstatus", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Submitted,
}

#[cfg(test)]
mod tests {
    use super::QuestionKind;

    #[test]
    fn paragraph_parent_is_never_gradable() {
        assert!(!QuestionKind::Paragraph.is_gradable());
        assert!(!QuestionKind::Paragraph.is_objective());
        assert!(!QuestionKind::Paragraph.is_subjective());
    }

    #[test]
    fn objective_and_subjective_partition_gradable_kinds() {
        for kind in [
            QuestionKind::SingleChoice,
            QuestionKind::MultiChoice,
            QuestionKind::FillBlank,
            QuestionKind::Numerical,
            QuestionKind::TrueFalse,
            QuestionKind::ShortAnswer,
            QuestionKind::LongAnswer,
        ] {
            assert!(kind.is_gradable());
            assert!(kind.is_objective() != kind.is_subjective());
        }
    }
}
