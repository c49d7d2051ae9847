use serde_json::Value;

use crate::db::models::Question;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ObjectiveOutcome {
    pub(crate) is_correct: bool,
    pub(crate) marks_awarded: f64,
}

/// Coerce an answer value to a normalized set: arrays element-wise,
/// scalars as a one-element set, null/empty as the empty set. Elements are
/// stringified, trimmed, lower-cased and sorted so comparison is
/// order- and case-insensitive.
pub(crate) fn normalize_answer_set(value: &Value) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let mut normalized: Vec<String> = items
        .into_iter()
        .map(stringify)
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect();
    normalized.sort();
    normalized
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Score one objective response. `None` means the question is skipped:
/// no response, an empty answer, or a question without a correct-answer
/// set. Skipped questions earn no credit and no penalty.
pub(crate) fn score_objective(
    question: &Question,
    answer: &Value,
    negative_marking: bool,
) -> Option<ObjectiveOutcome> {
    let student = normalize_answer_set(answer);
    if student.is_empty() {
        return None;
    }

    let correct = normalize_answer_set(&Value::Array(question.correct_answers.0.clone()));
    if correct.is_empty() {
        return None;
    }

    if student == correct {
        Some(ObjectiveOutcome { is_correct: true, marks_awarded: question.marks })
    } else if negative_marking {
        Some(ObjectiveOutcome { is_correct: false, marks_awarded: -question.negative_marks })
    } else {
        Some(ObjectiveOutcome { is_correct: false, marks_awarded: 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::types::Json;

    use crate::db::types::QuestionKind;

    fn question(correct: Value, marks: f64, negative_marks: f64) -> Question {
        let correct_set = match correct {
            Value::Array(items) => items,
            other => vec![other],
        };
        Question {
            id: "q1".to_string(),
            exam_id: "e1".to_string(),
            section_id: "s1".to_string(),
            parent_id: None,
            kind: QuestionKind::MultiChoice,
            text: Json(Default::default()),
            options: Json(vec![]),
            correct_answers: Json(correct_set),
            model_answer: None,
            explanation: None,
            marks,
            negative_marks,
            difficulty: 3,
            order_index: 0,
        }
    }

    #[test]
    fn normalization_is_order_and_case_insensitive() {
        assert_eq!(
            normalize_answer_set(&json!(["B", " a "])),
            normalize_answer_set(&json!(["a", "b"]))
        );
    }

    #[test]
    fn normalization_coerces_scalars_and_numbers() {
        assert_eq!(normalize_answer_set(&json!("True")), vec!["true".to_string()]);
        assert_eq!(normalize_answer_set(&json!(42)), vec!["42".to_string()]);
        assert_eq!(normalize_answer_set(&json!(true)), vec!["true".to_string()]);
        assert!(normalize_answer_set(&Value::Null).is_empty());
        assert!(normalize_answer_set(&json!(["", "  "])).is_empty());
    }

    #[test]
    fn correct_answer_earns_full_marks() {
        let q = question(json!(["a", "b"]), 4.0, 1.0);
        let outcome = score_objective(&q, &json!(["B", "A"]), true).unwrap();
        assert!(outcome.is_correct);
        assert_eq!(outcome.marks_awarded, 4.0);
    }

    #[test]
    fn wrong_answer_with_negative_marking_penalizes() {
        let q = question(json!(["a"]), 4.0, 1.0);
        let outcome = score_objective(&q, &json!(["c"]), true).unwrap();
        assert!(!outcome.is_correct);
        assert_eq!(outcome.marks_awarded, -1.0);
    }

    #[test]
    fn wrong_answer_without_negative_marking_scores_zero() {
        let q = question(json!(["a"]), 4.0, 1.0);
        let outcome = score_objective(&q, &json!(["c"]), false).unwrap();
        assert!(!outcome.is_correct);
        assert_eq!(outcome.marks_awarded, 0.0);
    }

    #[test]
    fn empty_answer_is_skipped_never_penalized() {
        let q = question(json!(["a"]), 4.0, 1.0);
        assert_eq!(score_objective(&q, &Value::Null, true), None);
        assert_eq!(score_objective(&q, &json!([]), true), None);
        assert_eq!(score_objective(&q, &json!(""), true), None);
    }

    #[test]
    fn missing_correct_answer_set_is_skipped() {
        let q = question(json!([]), 4.0, 1.0);
        assert_eq!(score_objective(&q, &json!(["a"]), true), None);
    }

    #[test]
    fn partial_multi_select_is_wrong() {
        let q = question(json!(["a", "b"]), 4.0, 1.0);
        let outcome = score_objective(&q, &json!(["a"]), true).unwrap();
        assert!(!outcome.is_correct);
    }
}
