use std::collections::HashMap;

use serde::Serialize;

use crate::db::models::{Exam, ExamSection, Question, QuestionResponse};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SectionStats {
    pub(crate) section_id: String,
    pub(crate) title: serde_json::Value,
    pub(crate) max_marks: f64,
    pub(crate) score: f64,
    pub(crate) attempted: usize,
    pub(crate) correct: usize,
    pub(crate) incorrect: usize,
    pub(crate) unattended: usize,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AttemptStats {
    pub(crate) total_score: f64,
    pub(crate) max_marks: f64,
    pub(crate) percentage: f64,
    pub(crate) passed: bool,
    pub(crate) performance_factor: f64,
    pub(crate) sections: Vec<SectionStats>,
}

/// Build the per-section and overall breakdown for a finalized attempt.
/// Paragraph parents carry no marks and are excluded everywhere.
pub(crate) fn aggregate(
    exam: &Exam,
    sections: &[ExamSection],
    questions: &[Question],
    responses: &[QuestionResponse],
) -> AttemptStats {
    let by_question: HashMap<&str, &QuestionResponse> =
        responses.iter().map(|r| (r.question_id.as_str(), r)).collect();

    let mut section_stats: Vec<SectionStats> = sections
        .iter()
        .map(|section| SectionStats {
            section_id: section.id.clone(),
            title: serde_json::to_value(&section.title.0).unwrap_or_default(),
            max_marks: 0.0,
            score: 0.0,
            attempted: 0,
            correct: 0,
            incorrect: 0,
            unattended: 0,
        })
        .collect();
    let section_index: HashMap<&str, usize> =
        sections.iter().enumerate().map(|(i, s)| (s.id.as_str(), i)).collect();

    let mut total_score = 0.0;
    let mut max_marks = 0.0;
    let mut attempted_difficulty = 0i64;
    let mut attempted_count = 0usize;

    for question in questions.iter().filter(|q| q.kind.is_gradable()) {
        max_marks += question.marks;

        let Some(index) = section_index.get(question.section_id.as_str()) else {
            continue;
        };
        let stats = &mut section_stats[*index];
        stats.max_marks += question.marks;

        let response = by_question.get(question.id.as_str());
        // A saved row with no marks awarded means the scorer skipped it
        // (empty answer), which counts as unattended.
        let outcome = response.and_then(|r| r.marks_awarded.map(|marks| (marks, r.is_correct)));

        match outcome {
            Some((marks, is_correct)) => {
                stats.attempted += 1;
                stats.score += marks;
                total_score += marks;
                attempted_difficulty += i64::from(question.difficulty);
                attempted_count += 1;
                if is_correct == Some(true) {
                    stats.correct += 1;
                } else {
                    stats.incorrect += 1;
                }
            }
            None => stats.unattended += 1,
        }
    }

    let percentage = if max_marks > 0.0 { total_score / max_marks * 100.0 } else { 0.0 };
    let avg_difficulty = if attempted_count > 0 {
        attempted_difficulty as f64 / attempted_count as f64
    } else {
        0.0
    };
    let performance_factor = percentage * avg_difficulty / 5.0;

    AttemptStats {
        total_score,
        max_marks,
        percentage,
        passed: percentage >= exam.pass_percentage,
        performance_factor,
        sections: section_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::types::Json;
    use time::macros::datetime;

    use crate::db::types::QuestionKind;

    fn exam(pass_percentage: f64) -> Exam {
        Exam {
            id: "e1".to_string(),
            title: Json(Default::default()),
            description: None,
            duration_minutes: 60,
            total_marks: 20.0,
            negative_marking: true,
            pass_percentage,
            grading_instructions: None,
            created_by: "admin".to_string(),
            created_at: datetime!(2026-01-01 00:00),
            updated_at: datetime!(2026-01-01 00:00),
        }
    }

    fn section(id: &str) -> ExamSection {
        ExamSection {
            id: id.to_string(),
            exam_id: "e1".to_string(),
            title: Json(Default::default()),
            order_index: 0,
        }
    }

    fn question(id: &str, section_id: &str, kind: QuestionKind, marks: f64, difficulty: i16) -> Question {
        Question {
            id: id.to_string(),
            exam_id: "e1".to_string(),
            section_id: section_id.to_string(),
            parent_id: None,
            kind,
            text: Json(Default::default()),
            options: Json(vec![]),
            correct_answers: Json(vec![]),
            model_answer: None,
            explanation: None,
            marks,
            negative_marks: 1.0,
            difficulty,
            order_index: 0,
        }
    }

    fn response(question_id: &str, marks_awarded: Option<f64>, is_correct: Option<bool>) -> QuestionResponse {
        QuestionResponse {
            id: format!("r-{question_id}"),
            attempt_id: "a1".to_string(),
            question_id: question_id.to_string(),
            answer: Json(json!(["x"])),
            marked_for_review: false,
            time_spent_seconds: 30,
            is_correct,
            marks_awarded,
            ai_feedback: None,
            created_at: datetime!(2026-01-01 00:00),
            updated_at: datetime!(2026-01-01 00:00),
        }
    }

    #[test]
    fn aggregates_sections_and_totals() {
        let exam = exam(50.0);
        let sections = vec![section("s1"), section("s2")];
        let questions = vec![
            question("q1", "s1", QuestionKind::SingleChoice, 4.0, 2),
            question("q2", "s1", QuestionKind::MultiChoice, 4.0, 3),
            question("q3", "s2", QuestionKind::LongAnswer, 10.0, 4),
            question("q4", "s2", QuestionKind::Numerical, 2.0, 1),
        ];
        let responses = vec![
            response("q1", Some(4.0), Some(true)),
            response("q2", Some(-1.0), Some(false)),
            response("q3", Some(7.0), Some(true)),
        ];

        let stats = aggregate(&exam, &sections, &questions, &responses);

        assert_eq!(stats.max_marks, 20.0);
        assert_eq!(stats.total_score, 10.0);
        assert_eq!(stats.percentage, 50.0);
        assert!(stats.passed);

        let s1 = &stats.sections[0];
        assert_eq!(s1.attempted, 2);
        assert_eq!(s1.correct, 1);
        assert_eq!(s1.incorrect, 1);
        assert_eq!(s1.unattended, 0);
        assert_eq!(s1.score, 3.0);
        assert_eq!(s1.max_marks, 8.0);

        let s2 = &stats.sections[1];
        assert_eq!(s2.attempted, 1);
        assert_eq!(s2.unattended, 1);
        assert_eq!(s2.score, 7.0);

        // 50% at average difficulty (2 + 3 + 4) / 3 = 3 yields factor 30.
        assert!((stats.performance_factor - 30.0).abs() < 1e-9);
    }

    #[test]
    fn paragraph_parents_are_excluded() {
        let exam = exam(40.0);
        let sections = vec![section("s1")];
        let questions = vec![
            question("p1", "s1", QuestionKind::Paragraph, 0.0, 1),
            question("q1", "s1", QuestionKind::ShortAnswer, 5.0, 3),
        ];
        let responses = vec![response("q1", Some(5.0), Some(true))];

        let stats = aggregate(&exam, &sections, &questions, &responses);
        assert_eq!(stats.max_marks, 5.0);
        assert_eq!(stats.sections[0].attempted, 1);
        assert_eq!(stats.sections[0].unattended, 0);
        assert_eq!(stats.percentage, 100.0);
    }

    #[test]
    fn unscored_saved_response_counts_as_unattended() {
        let exam = exam(40.0);
        let sections = vec![section("s1")];
        let questions = vec![question("q1", "s1", QuestionKind::SingleChoice, 4.0, 2)];
        let responses = vec![response("q1", None, None)];

        let stats = aggregate(&exam, &sections, &questions, &responses);
        assert_eq!(stats.sections[0].attempted, 0);
        assert_eq!(stats.sections[0].unattended, 1);
        assert!(!stats.passed);
    }

    #[test]
    fn objective_exam_scores_nineteen_of_fifty() {
        // Five 10-mark questions, negative marking 1: two correct, one
        // wrong, two untouched.
        let exam = exam(40.0);
        let sections = vec![section("s1")];
        let questions: Vec<Question> = (1..=5)
            .map(|i| {
                let mut q =
                    question(&format!("q{i}"), "s1", QuestionKind::SingleChoice, 10.0, 3);
                q.correct_answers = Json(vec![json!("a")]);
                q
            })
            .collect();

        let answers = [("q1", json!(["a"])), ("q2", json!(["A "])), ("q3", json!(["b"]))];
        let responses: Vec<QuestionResponse> = answers
            .iter()
            .map(|(question_id, answer)| {
                let q = questions.iter().find(|q| q.id == *question_id).unwrap();
                let outcome =
                    crate::services::objective_scoring::score_objective(q, answer, true).unwrap();
                response(question_id, Some(outcome.marks_awarded), Some(outcome.is_correct))
            })
            .collect();

        let stats = aggregate(&exam, &sections, &questions, &responses);
        assert_eq!(stats.total_score, 19.0);
        assert_eq!(stats.max_marks, 50.0);
        assert_eq!(stats.sections[0].correct, 2);
        assert_eq!(stats.sections[0].incorrect, 1);
        assert_eq!(stats.sections[0].unattended, 2);
        assert!(!stats.passed);
    }

    #[test]
    fn empty_exam_yields_zero_percentage() {
        let exam = exam(40.0);
        let stats = aggregate(&exam, &[], &[], &[]);
        assert_eq!(stats.percentage, 0.0);
        assert_eq!(stats.performance_factor, 0.0);
        assert!(!stats.passed);
    }
}
