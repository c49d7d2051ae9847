use time::PrimitiveDateTime;

use crate::repositories::assignments::AssignmentWindowRow;

/// A student's access window for an exam. `Open` assignments have no
/// schedule and permit the attempt at any time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum AssignmentWindow {
    Open,
    Fixed {
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
    },
}

impl AssignmentWindow {
    pub(crate) fn from_row(row: &AssignmentWindowRow) -> Self {
        match (row.start_time, row.end_time) {
            (Some(start), Some(end)) => AssignmentWindow::Fixed { start, end },
            _ => AssignmentWindow::Open,
        }
    }

    /// Whether an attempt may start at `now`. Windows are half-open:
    /// the start instant is inside, the end instant is not.
    pub(crate) fn contains(&self, now: PrimitiveDateTime) -> bool {
        match self {
            AssignmentWindow::Open => true,
            AssignmentWindow::Fixed { start, end } => *start <= now && now < *end,
        }
    }

    /// Two windows conflict when a student could be expected in both at
    /// once. An always-open assignment overlaps every other window.
    pub(crate) fn conflicts_with(&self, other: &AssignmentWindow) -> bool {
        match (self, other) {
            (AssignmentWindow::Open, _) | (_, AssignmentWindow::Open) => true,
            (
                AssignmentWindow::Fixed { start: new_start, end: new_end },
                AssignmentWindow::Fixed { start: existing_start, end: existing_end },
            ) => new_start < existing_end && new_end > existing_start,
        }
    }
}

/// Find the first existing window that overlaps `candidate`, if any.
pub(crate) fn find_conflict<'a>(
    candidate: &AssignmentWindow,
    existing: &'a [AssignmentWindowRow],
) -> Option<&'a AssignmentWindowRow> {
    existing
        .iter()
        .find(|row| candidate.conflicts_with(&AssignmentWindow::from_row(row)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn fixed(start: PrimitiveDateTime, end: PrimitiveDateTime) -> AssignmentWindow {
        AssignmentWindow::Fixed { start, end }
    }

    fn row(schedule_id: Option<&str>, window: Option<(PrimitiveDateTime, PrimitiveDateTime)>) -> AssignmentWindowRow {
        AssignmentWindowRow {
            assignment_id: "a1".to_string(),
            student_id: "u1".to_string(),
            schedule_id: schedule_id.map(str::to_string),
            max_attempts: 1,
            start_time: window.map(|(start, _)| start),
            end_time: window.map(|(_, end)| end),
        }
    }

    #[test]
    fn touching_windows_do_not_conflict() {
        let morning = fixed(datetime!(2026-03-01 10:00), datetime!(2026-03-01 11:00));
        let noon = fixed(datetime!(2026-03-01 11:00), datetime!(2026-03-01 12:00));
        assert!(!morning.conflicts_with(&noon));
        assert!(!noon.conflicts_with(&morning));
    }

    #[test]
    fn contained_window_conflicts() {
        let outer = fixed(datetime!(2026-03-01 09:00), datetime!(2026-03-01 13:00));
        let inner = fixed(datetime!(2026-03-01 10:00), datetime!(2026-03-01 11:00));
        assert!(outer.conflicts_with(&inner));
        assert!(inner.conflicts_with(&outer));
    }

    #[test]
    fn always_open_conflicts_with_everything() {
        let window = fixed(datetime!(2026-03-01 10:00), datetime!(2026-03-01 11:00));
        assert!(AssignmentWindow::Open.conflicts_with(&window));
        assert!(window.conflicts_with(&AssignmentWindow::Open));
        assert!(AssignmentWindow::Open.conflicts_with(&AssignmentWindow::Open));
    }

    #[test]
    fn window_membership_is_half_open() {
        let window = fixed(datetime!(2026-03-01 10:00), datetime!(2026-03-01 11:00));
        assert!(window.contains(datetime!(2026-03-01 10:00)));
        assert!(window.contains(datetime!(2026-03-01 10:59:59)));
        assert!(!window.contains(datetime!(2026-03-01 11:00)));
        assert!(!window.contains(datetime!(2026-03-01 09:59:59)));
    }

    #[test]
    fn find_conflict_returns_first_overlap() {
        let candidate = fixed(datetime!(2026-03-01 10:30), datetime!(2026-03-01 11:30));
        let existing = vec![
            row(Some("s1"), Some((datetime!(2026-03-01 08:00), datetime!(2026-03-01 09:00)))),
            row(Some("s2"), Some((datetime!(2026-03-01 11:00), datetime!(2026-03-01 12:00)))),
        ];
        let hit = find_conflict(&candidate, &existing).unwrap();
        assert_eq!(hit.schedule_id.as_deref(), Some("s2"));
    }

    #[test]
    fn find_conflict_flags_open_rows() {
        let candidate = fixed(datetime!(2026-03-01 10:30), datetime!(2026-03-01 11:30));
        let existing = vec![row(None, None)];
        assert!(find_conflict(&candidate, &existing).is_some());
    }

    #[test]
    fn disjoint_windows_pass() {
        let candidate = fixed(datetime!(2026-03-01 14:00), datetime!(2026-03-01 15:00));
        let existing = vec![
            row(Some("s1"), Some((datetime!(2026-03-01 08:00), datetime!(2026-03-01 09:00)))),
        ];
        assert!(find_conflict(&candidate, &existing).is_none());
    }
}
