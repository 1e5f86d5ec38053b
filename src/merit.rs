use crate::model::{Mark, Student, Subject};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub subject: Subject,
    pub marks: i64,
}

/// One ranked row of the merit list. Derived on every request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeritEntry {
    pub student: Student,
    pub subjects: Vec<SubjectScore>,
    pub total_marks: i64,
    pub max_marks: i64,
    /// Unrounded; see [`round_2_decimals`] for display.
    pub percentage: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeritSummary {
    pub count: usize,
    pub average_percentage: f64,
    pub top_percentage: f64,
}

pub fn percentage(total_marks: i64, max_marks: i64) -> f64 {
    if max_marks <= 0 {
        return 0.0;
    }
    100.0 * (total_marks as f64) / (max_marks as f64)
}

pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn format_percentage(x: f64) -> String {
    format!("{:.2}%", x)
}

/// Build the ranked merit list.
///
/// A student's entry sums the marks whose own `semester` equals the
/// student's current semester; the subject's semester tag plays no part.
/// Marks pointing at an unknown subject are skipped, and a student left with
/// no contributing marks gets no entry at all.
///
/// Entries are ordered by percentage, highest first. Equal percentages keep
/// the order the students were supplied in, and ranks run 1, 2, 3, ...
/// without sharing.
pub fn compute_merit_list(
    students: &[Student],
    subjects: &[Subject],
    marks: &[Mark],
) -> Vec<MeritEntry> {
    let subject_by_id: HashMap<&str, &Subject> =
        subjects.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut marks_by_key: HashMap<(&str, &str), Vec<&Mark>> = HashMap::new();
    for m in marks {
        marks_by_key
            .entry((m.student_id.as_str(), m.semester.as_str()))
            .or_default()
            .push(m);
    }

    let mut entries: Vec<MeritEntry> = Vec::new();
    let mut skipped_dangling = 0usize;
    for student in students {
        let Some(group) = marks_by_key.get(&(student.id.as_str(), student.semester.as_str()))
        else {
            continue;
        };

        let mut scores: Vec<SubjectScore> = Vec::with_capacity(group.len());
        let mut total_marks = 0_i64;
        let mut max_marks = 0_i64;
        for m in group {
            let Some(subject) = subject_by_id.get(m.subject_id.as_str()) else {
                skipped_dangling += 1;
                continue;
            };
            // Rows written outside `save_marks` are not bounded.
            total_marks = total_marks.saturating_add(m.marks);
            max_marks = max_marks.saturating_add(subject.max_marks);
            scores.push(SubjectScore {
                subject: (*subject).clone(),
                marks: m.marks,
            });
        }
        if scores.is_empty() {
            continue;
        }

        entries.push(MeritEntry {
            student: student.clone(),
            subjects: scores,
            total_marks,
            max_marks,
            percentage: percentage(total_marks, max_marks),
            rank: 0,
        });
    }

    if skipped_dangling > 0 {
        tracing::warn!(
            count = skipped_dangling,
            "skipped marks referencing missing subjects"
        );
    }

    // sort_by is stable, which is what keeps tied students in input order.
    entries.sort_by(|a, b| {
        b.percentage
            .partial_cmp(&a.percentage)
            .unwrap_or(Ordering::Equal)
    });
    for (i, e) in entries.iter_mut().enumerate() {
        e.rank = i + 1;
    }
    entries
}

pub fn summarize(entries: &[MeritEntry]) -> MeritSummary {
    let count = entries.len();
    let average_percentage = if count > 0 {
        round_2_decimals(entries.iter().map(|e| e.percentage).sum::<f64>() / (count as f64))
    } else {
        0.0
    };
    let top_percentage = entries
        .iter()
        .map(|e| e.percentage)
        .fold(0.0_f64, f64::max);
    MeritSummary {
        count,
        average_percentage,
        top_percentage: round_2_decimals(top_percentage),
    }
}

/// Distinct non-blank semester labels, sorted.
pub fn semesters(students: &[Student]) -> Vec<String> {
    distinct_labels(students.iter().map(|s| s.semester.as_str()))
}

/// Distinct non-blank batch labels, sorted.
pub fn batches(students: &[Student]) -> Vec<String> {
    distinct_labels(students.iter().map(|s| s.batch.as_str()))
}

fn distinct_labels<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<String> {
    labels
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::{mark, student, subject};
    use super::*;

    fn ids(entries: &[MeritEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.student.id.as_str()).collect()
    }

    #[test]
    fn ranks_by_percentage_descending() {
        let students = vec![
            student("a", "A", "S1"),
            student("b", "B", "S1"),
            student("c", "C", "S1"),
        ];
        let subjects = vec![subject("math", 100, "S1")];
        let marks = vec![
            mark("a", "math", 60, "S1"),
            mark("b", "math", 90, "S1"),
            mark("c", "math", 45, "S1"),
        ];

        let list = compute_merit_list(&students, &subjects, &marks);
        assert_eq!(ids(&list), vec!["b", "a", "c"]);
        assert_eq!(
            list.iter().map(|e| e.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(list[0].percentage, 90.0);
        assert_eq!(list[1].percentage, 60.0);
        assert_eq!(list[2].percentage, 45.0);
    }

    #[test]
    fn ties_keep_input_order_and_sequential_ranks() {
        let students = vec![
            student("x", "X", "S1"),
            student("y", "Y", "S1"),
            student("z", "Z", "S1"),
        ];
        let subjects = vec![subject("math", 100, "S1")];
        let marks = vec![
            mark("z", "math", 70, "S1"),
            mark("y", "math", 70, "S1"),
            mark("x", "math", 70, "S1"),
        ];
        let list = compute_merit_list(&students, &subjects, &marks);
        assert_eq!(ids(&list), vec!["x", "y", "z"]);
        assert_eq!(
            list.iter().map(|e| e.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn totals_sum_across_subjects() {
        let students = vec![student("a", "A", "S1")];
        let subjects = vec![subject("math", 100, "S1"), subject("lab", 50, "S1")];
        let marks = vec![mark("a", "math", 80, "S1"), mark("a", "lab", 40, "S1")];
        let list = compute_merit_list(&students, &subjects, &marks);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].total_marks, 120);
        assert_eq!(list[0].max_marks, 150);
        assert!((list[0].percentage - 80.0).abs() < 1e-9);
        assert_eq!(
            list[0]
                .subjects
                .iter()
                .map(|s| s.subject.id.as_str())
                .collect::<Vec<_>>(),
            vec!["math", "lab"]
        );
    }

    #[test]
    fn dangling_subject_is_skipped_and_lone_dangling_student_excluded() {
        let students = vec![student("d", "D", "S1"), student("e", "E", "S1")];
        let subjects = vec![subject("math", 100, "S1")];
        let marks = vec![
            mark("d", "deleted", 99, "S1"),
            mark("e", "deleted", 99, "S1"),
            mark("e", "math", 50, "S1"),
        ];
        let list = compute_merit_list(&students, &subjects, &marks);
        assert_eq!(ids(&list), vec!["e"]);
        assert_eq!(list[0].total_marks, 50);
        assert_eq!(list[0].max_marks, 100);
    }

    #[test]
    fn students_without_marks_are_excluded() {
        let students = vec![student("a", "A", "S1"), student("b", "B", "S1")];
        let subjects = vec![subject("math", 100, "S1")];
        let marks = vec![mark("a", "math", 10, "S1")];
        let list = compute_merit_list(&students, &subjects, &marks);
        assert_eq!(ids(&list), vec!["a"]);
    }

    #[test]
    fn mark_semester_scopes_the_sum() {
        // Student moved to S2 after S1 marks were recorded; the subject
        // itself is tagged S3 but the mark's own semester is what counts.
        let students = vec![student("a", "A", "S2")];
        let subjects = vec![subject("math", 100, "S3"), subject("phy", 100, "S1")];
        let marks = vec![mark("a", "phy", 90, "S1"), mark("a", "math", 30, "S2")];
        let list = compute_merit_list(&students, &subjects, &marks);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].total_marks, 30);
        assert_eq!(list[0].subjects.len(), 1);
    }

    #[test]
    fn zero_max_marks_is_zero_percent() {
        assert_eq!(percentage(10, 0), 0.0);
        let students = vec![student("a", "A", "S1")];
        let subjects = vec![subject("free", 0, "S1")];
        let marks = vec![mark("a", "free", 0, "S1")];
        let list = compute_merit_list(&students, &subjects, &marks);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].percentage, 0.0);
    }

    #[test]
    fn empty_inputs_give_empty_list() {
        assert!(compute_merit_list(&[], &[], &[]).is_empty());
        let subjects = vec![subject("math", 100, "S1")];
        let marks = vec![mark("ghost", "math", 50, "S1")];
        assert!(compute_merit_list(&[], &subjects, &marks).is_empty());
    }

    #[test]
    fn ranking_uses_unrounded_percentages() {
        // 2/3 and 200/300 tie exactly; 201/300 rounds to 67.00 but must
        // still beat them on the raw value.
        let students = vec![
            student("a", "A", "S1"),
            student("b", "B", "S1"),
            student("c", "C", "S1"),
        ];
        let subjects = vec![subject("q", 3, "S1"), subject("big", 300, "S1")];
        let marks = vec![
            mark("a", "q", 2, "S1"),
            mark("b", "big", 201, "S1"),
            mark("c", "big", 200, "S1"),
        ];
        let list = compute_merit_list(&students, &subjects, &marks);
        assert_eq!(ids(&list), vec!["b", "a", "c"]);
        assert_eq!(round_2_decimals(list[1].percentage), 66.67);
        assert_eq!(format_percentage(list[1].percentage), "66.67%");
    }

    #[test]
    fn properties_hold_over_mixed_input() {
        let semesters_in = ["S1", "S2"];
        let mut students = Vec::new();
        let mut marks = Vec::new();
        let subjects = vec![
            subject("m1", 100, "S1"),
            subject("m2", 40, "S1"),
            subject("m3", 75, "S2"),
        ];
        for i in 0..24_i64 {
            let id = format!("s{i}");
            let sem = semesters_in[(i % 2) as usize];
            students.push(student(&id, &format!("Student {i}"), sem));
            if i % 5 == 0 {
                continue;
            }
            marks.push(mark(&id, "m1", (i * 7) % 101, sem));
            marks.push(mark(&id, "m2", (i * 3) % 41, sem));
            if i % 3 == 0 {
                marks.push(mark(&id, "m3", (i * 11) % 76, sem));
            }
        }

        let first = compute_merit_list(&students, &subjects, &marks);
        let second = compute_merit_list(&students, &subjects, &marks);
        assert_eq!(first, second);
        assert!(!first.is_empty());

        for (i, e) in first.iter().enumerate() {
            assert_eq!(e.rank, i + 1);
            if e.max_marks > 0 {
                assert!((0.0..=100.0).contains(&e.percentage));
            } else {
                assert_eq!(e.percentage, 0.0);
            }
        }
        for pair in first.windows(2) {
            assert!(pair[0].percentage >= pair[1].percentage);
        }
    }

    #[test]
    fn oversized_marks_saturate_instead_of_overflowing() {
        let students = vec![student("a", "A", "S1")];
        let subjects = vec![subject("x", i64::MAX, "S1"), subject("y", i64::MAX, "S1")];
        let marks = vec![mark("a", "x", i64::MAX, "S1"), mark("a", "y", 1, "S1")];
        let list = compute_merit_list(&students, &subjects, &marks);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].total_marks, i64::MAX);
        assert_eq!(list[0].max_marks, i64::MAX);
        assert!((list[0].percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn summary_is_simple_mean() {
        let list = vec![
            super::fixtures::entry("a", "A", "S1", 90, 1),
            super::fixtures::entry("b", "B", "S1", 60, 2),
            super::fixtures::entry("c", "C", "S1", 45, 3),
        ];
        let summary = summarize(&list);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average_percentage, 65.0);
        assert_eq!(summary.top_percentage, 90.0);
        assert_eq!(summarize(&[]).average_percentage, 0.0);
        assert_eq!(summarize(&[]).top_percentage, 0.0);
    }

    #[test]
    fn labels_are_distinct_and_sorted() {
        let mut b = student("b", "B", "S2");
        b.batch = " ".into();
        let students = vec![student("a", "A", "S2"), b, student("c", "C", "S1")];
        assert_eq!(semesters(&students), vec!["S1", "S2"]);
        assert_eq!(batches(&students), vec!["2024"]);
    }
}
