use std::cmp::Ordering;
use std::collections::HashMap;

use clap::ValueEnum;
use tracing::warn;
use uuid::Uuid;

use crate::db::ResultsStore;
use crate::error::ReportError;
use crate::models::{
    AttendanceCount, AttendanceTally, ClassReport, EnrolledStudent, GradeRow, ReportCard,
    StudentReport, SubjectScore, Verdict,
};

/// Minimum average required to pass. Fixed, not configurable.
pub const PASS_MARK: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RankMode {
    /// Every student gets a distinct 1-based position; tied averages are
    /// separated by roster order.
    Sequential,
    /// Tied averages share a rank, the next distinct average takes the next
    /// one (1, 2, 2, 3).
    Dense,
}

/// Ranked results for every student enrolled in a class, for one exam type.
///
/// Students with no grade rows are still listed, with average 0. The three
/// reads are not wrapped in a snapshot; a report generated during concurrent
/// grade entry may observe a partially updated state.
pub async fn compute_class_report<S: ResultsStore + ?Sized>(
    store: &S,
    class_id: Uuid,
    exam_type: &str,
    rank_mode: RankMode,
) -> Result<ClassReport, ReportError> {
    validate_exam_type(exam_type)?;

    let class_info = store
        .class_meta(class_id)
        .await?
        .ok_or_else(|| ReportError::NotFound(format!("class {class_id}")))?;

    let students = store.enrolled_students(class_id).await?;
    let grades = store.grades(class_id, exam_type).await?;
    let attendance = store.attendance_counts(class_id).await?;

    Ok(ClassReport {
        class_info,
        exam_type: exam_type.to_string(),
        student_results: rank_students(&students, &grades, &attendance, rank_mode),
    })
}

/// One student's report card. The rank is always relative to the student's
/// class: the full class standing is recomputed and this student's entry
/// extracted from it.
pub async fn compute_report_card<S: ResultsStore + ?Sized>(
    store: &S,
    student_id: Uuid,
    exam_type: &str,
    rank_mode: RankMode,
) -> Result<ReportCard, ReportError> {
    validate_exam_type(exam_type)?;

    let meta = store
        .student_meta(student_id)
        .await?
        .ok_or_else(|| ReportError::NotFound(format!("student {student_id}")))?;

    let class_id = match meta.class_ids.as_slice() {
        [] => {
            return Err(ReportError::NotFound(format!(
                "enrollment for student {student_id}"
            )))
        }
        [class_id] => *class_id,
        many => {
            return Err(ReportError::Validation(format!(
                "student {student_id} is enrolled in {} classes; a report card needs exactly one",
                many.len()
            )))
        }
    };

    let class_report = compute_class_report(store, class_id, exam_type, rank_mode).await?;
    let class_size = class_report.student_results.len();
    let student = class_report
        .student_results
        .into_iter()
        .find(|report| report.student_id == student_id)
        .ok_or_else(|| {
            ReportError::NotFound(format!("student {student_id} on the roster of {class_id}"))
        })?;

    Ok(ReportCard {
        class_info: class_report.class_info,
        exam_type: exam_type.to_string(),
        class_size,
        student,
    })
}

fn validate_exam_type(exam_type: &str) -> Result<(), ReportError> {
    if exam_type.trim().is_empty() {
        return Err(ReportError::Validation("exam type must not be blank".into()));
    }
    Ok(())
}

/// Pure ranking step: per-student aggregation, then a stable sort by
/// descending average so tied students keep their roster order.
pub fn rank_students(
    students: &[EnrolledStudent],
    grades: &[GradeRow],
    attendance: &[AttendanceCount],
    rank_mode: RankMode,
) -> Vec<StudentReport> {
    let mut grades_by_student: HashMap<Uuid, Vec<SubjectScore>> = HashMap::new();
    for grade in grades {
        grades_by_student
            .entry(grade.student_id)
            .or_default()
            .push(SubjectScore {
                subject: grade.subject_name.clone(),
                score: grade.score,
            });
    }

    let mut attendance_by_student: HashMap<Uuid, AttendanceTally> = HashMap::new();
    for entry in attendance {
        let tally = attendance_by_student.entry(entry.student_id).or_default();
        match entry.status.as_str() {
            "present" => tally.present += entry.count,
            "absent" => tally.absent += entry.count,
            "late" => tally.late += entry.count,
            other => warn!(
                status = other,
                student_id = %entry.student_id,
                "dropping unknown attendance status from tally"
            ),
        }
    }

    let mut reports: Vec<StudentReport> = students
        .iter()
        .map(|student| {
            let grades = grades_by_student.remove(&student.id).unwrap_or_default();
            let scored: Vec<f64> = grades.iter().filter_map(|entry| entry.score).collect();
            let total_score: f64 = scored.iter().sum();
            let average = if scored.is_empty() {
                0.0
            } else {
                round_half_even(total_score / scored.len() as f64, 2)
            };

            StudentReport {
                student_id: student.id,
                student_name: student.name.clone(),
                grades,
                attendance: attendance_by_student
                    .get(&student.id)
                    .copied()
                    .unwrap_or_default(),
                total_score,
                average,
                result: if average >= PASS_MARK {
                    Verdict::Pass
                } else {
                    Verdict::Fail
                },
                rank: 0,
            }
        })
        .collect();

    reports.sort_by(|a, b| b.average.partial_cmp(&a.average).unwrap_or(Ordering::Equal));

    match rank_mode {
        RankMode::Sequential => {
            for (position, report) in reports.iter_mut().enumerate() {
                report.rank = position + 1;
            }
        }
        RankMode::Dense => {
            let mut rank = 0usize;
            let mut previous: Option<f64> = None;
            for report in reports.iter_mut() {
                if previous != Some(report.average) {
                    rank += 1;
                    previous = Some(report.average);
                }
                report.rank = rank;
            }
        }
    }

    reports
}

/// Round to `places` decimals, ties to even. Only an exactly representable
/// half needs the even tie-break; everything else rounds normally.
pub fn round_half_even(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let scaled = value * factor;
    let floor = scaled.floor();

    let rounded = if scaled - floor == 0.5 {
        if (floor as i64) % 2 == 0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        scaled.round()
    };

    rounded / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use crate::models::{ClassMeta, StudentMeta};

    struct FakeStore {
        class: Option<ClassMeta>,
        students: Vec<EnrolledStudent>,
        grades: Vec<GradeRow>,
        attendance: Vec<AttendanceCount>,
        student_meta: HashMap<Uuid, StudentMeta>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                class: Some(ClassMeta {
                    name: "Grade 7A".to_string(),
                    academic_year: Some("2025-2026".to_string()),
                    teacher_name: Some("Sok Dara".to_string()),
                }),
                students: Vec::new(),
                grades: Vec::new(),
                attendance: Vec::new(),
                student_meta: HashMap::new(),
            }
        }
    }

    #[async_trait]
    impl ResultsStore for FakeStore {
        async fn class_meta(&self, _class_id: Uuid) -> Result<Option<ClassMeta>, ReportError> {
            Ok(self.class.clone())
        }

        async fn student_meta(
            &self,
            student_id: Uuid,
        ) -> Result<Option<StudentMeta>, ReportError> {
            Ok(self.student_meta.get(&student_id).cloned())
        }

        async fn enrolled_students(
            &self,
            _class_id: Uuid,
        ) -> Result<Vec<EnrolledStudent>, ReportError> {
            Ok(self.students.clone())
        }

        async fn grades(
            &self,
            _class_id: Uuid,
            exam_type: &str,
        ) -> Result<Vec<GradeRow>, ReportError> {
            Ok(self
                .grades
                .iter()
                .filter(|_| exam_type == "Monthly")
                .cloned()
                .collect())
        }

        async fn attendance_counts(
            &self,
            _class_id: Uuid,
        ) -> Result<Vec<AttendanceCount>, ReportError> {
            Ok(self.attendance.clone())
        }
    }

    fn student(name: &str) -> EnrolledStudent {
        EnrolledStudent {
            id: Uuid::new_v4(),
            name: name.to_string(),
        }
    }

    fn grade(student_id: Uuid, subject: &str, score: Option<f64>) -> GradeRow {
        GradeRow {
            student_id,
            subject_name: subject.to_string(),
            score,
        }
    }

    fn scenario_store() -> (FakeStore, Uuid, Uuid, Uuid) {
        let a = student("Chan Vathana");
        let b = student("Mao Sreyneang");
        let c = student("Rin Piseth");
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);

        let mut store = FakeStore::new();
        store.grades = vec![
            grade(a_id, "Mathematics", Some(80.0)),
            grade(a_id, "Khmer Literature", Some(90.0)),
            grade(b_id, "Mathematics", Some(70.0)),
        ];
        store.attendance = vec![
            AttendanceCount {
                student_id: a_id,
                status: "present".to_string(),
                count: 2,
            },
            AttendanceCount {
                student_id: b_id,
                status: "late".to_string(),
                count: 1,
            },
            AttendanceCount {
                student_id: c_id,
                status: "absent".to_string(),
                count: 2,
            },
        ];
        store.students = vec![a, b, c];
        (store, a_id, b_id, c_id)
    }

    #[tokio::test]
    async fn class_report_ranks_by_descending_average() {
        let (store, a_id, b_id, c_id) = scenario_store();
        let report = compute_class_report(&store, Uuid::new_v4(), "Monthly", RankMode::Sequential)
            .await
            .unwrap();

        let results = &report.student_results;
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].student_id, a_id);
        assert_eq!(results[0].average, 85.0);
        assert_eq!(results[0].total_score, 170.0);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[0].result, Verdict::Pass);

        assert_eq!(results[1].student_id, b_id);
        assert_eq!(results[1].average, 70.0);
        assert_eq!(results[1].rank, 2);
        assert_eq!(results[1].result, Verdict::Pass);

        assert_eq!(results[2].student_id, c_id);
        assert_eq!(results[2].average, 0.0);
        assert_eq!(results[2].total_score, 0.0);
        assert_eq!(results[2].rank, 3);
        assert_eq!(results[2].result, Verdict::Fail);
    }

    #[tokio::test]
    async fn ranks_are_a_permutation() {
        let (store, _, _, _) = scenario_store();
        let report = compute_class_report(&store, Uuid::new_v4(), "Monthly", RankMode::Sequential)
            .await
            .unwrap();

        let mut ranks: Vec<usize> = report
            .student_results
            .iter()
            .map(|result| result.rank)
            .collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_class_is_not_found() {
        let mut store = FakeStore::new();
        store.class = None;

        let err = compute_class_report(&store, Uuid::new_v4(), "Monthly", RankMode::Sequential)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
    }

    #[tokio::test]
    async fn blank_exam_type_is_rejected() {
        let (store, _, _, _) = scenario_store();
        let err = compute_class_report(&store, Uuid::new_v4(), "  ", RankMode::Sequential)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
    }

    #[tokio::test]
    async fn unmatched_exam_type_yields_empty_grades_not_an_error() {
        let (store, _, _, _) = scenario_store();
        let report = compute_class_report(&store, Uuid::new_v4(), "Finall", RankMode::Sequential)
            .await
            .unwrap();

        assert!(report
            .student_results
            .iter()
            .all(|result| result.grades.is_empty() && result.average == 0.0));
    }

    #[test]
    fn null_scores_are_excluded_from_sum_and_count() {
        let s = student("Chan Vathana");
        let grades = vec![
            grade(s.id, "Mathematics", Some(80.0)),
            grade(s.id, "English", None),
        ];
        let results = rank_students(&[s], &grades, &[], RankMode::Sequential);

        assert_eq!(results[0].grades.len(), 2);
        assert_eq!(results[0].total_score, 80.0);
        assert_eq!(results[0].average, 80.0);
    }

    #[test]
    fn tied_averages_get_distinct_consecutive_ranks() {
        let first = student("Chan Vathana");
        let second = student("Mao Sreyneang");
        let third = student("Rin Piseth");
        let grades = vec![
            grade(first.id, "Mathematics", Some(80.0)),
            grade(second.id, "Mathematics", Some(75.0)),
            grade(third.id, "Mathematics", Some(75.0)),
        ];

        let results = rank_students(
            &[first, second.clone(), third.clone()],
            &grades,
            &[],
            RankMode::Sequential,
        );

        assert_eq!(results[1].average, results[2].average);
        assert_eq!(results[1].rank, 2);
        assert_eq!(results[2].rank, 3);
        // Stable sort: the tie keeps roster order.
        assert_eq!(results[1].student_id, second.id);
        assert_eq!(results[2].student_id, third.id);
    }

    #[test]
    fn dense_mode_shares_ranks_on_ties() {
        let first = student("Chan Vathana");
        let second = student("Mao Sreyneang");
        let third = student("Rin Piseth");
        let fourth = student("Keo Sokha");
        let grades = vec![
            grade(first.id, "Mathematics", Some(90.0)),
            grade(second.id, "Mathematics", Some(75.0)),
            grade(third.id, "Mathematics", Some(75.0)),
            grade(fourth.id, "Mathematics", Some(60.0)),
        ];

        let results = rank_students(
            &[first, second, third, fourth],
            &grades,
            &[],
            RankMode::Dense,
        );

        let ranks: Vec<usize> = results.iter().map(|result| result.rank).collect();
        assert_eq!(ranks, vec![1, 2, 2, 3]);
    }

    #[test]
    fn unknown_attendance_status_is_dropped() {
        let s = student("Chan Vathana");
        let attendance = vec![
            AttendanceCount {
                student_id: s.id,
                status: "present".to_string(),
                count: 3,
            },
            AttendanceCount {
                student_id: s.id,
                status: "excused".to_string(),
                count: 5,
            },
            AttendanceCount {
                student_id: s.id,
                status: "late".to_string(),
                count: 1,
            },
        ];

        let results = rank_students(&[s], &[], &attendance, RankMode::Sequential);
        let tally = results[0].attendance;
        assert_eq!(tally.present + tally.absent + tally.late, 4);
        assert_eq!(tally.present, 3);
        assert_eq!(tally.absent, 0);
        assert_eq!(tally.late, 1);
    }

    #[tokio::test]
    async fn recomputation_is_identical() {
        let (store, _, _, _) = scenario_store();
        let class_id = Uuid::new_v4();
        let first = compute_class_report(&store, class_id, "Monthly", RankMode::Sequential)
            .await
            .unwrap();
        let second = compute_class_report(&store, class_id, "Monthly", RankMode::Sequential)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn rounding_is_half_even_at_the_boundary() {
        // .125 and .375 are exact in binary, so both hit the tie branch.
        assert_eq!(round_half_even(84.125, 2), 84.12);
        assert_eq!(round_half_even(84.375, 2), 84.38);
        assert_eq!(round_half_even(84.12, 2), 84.12);
        assert_eq!(round_half_even(84.379, 2), 84.38);
    }

    #[test]
    fn averages_use_half_even_rounding() {
        let s = student("Chan Vathana");
        let grades = vec![
            grade(s.id, "Mathematics", Some(84.25)),
            grade(s.id, "English", Some(84.0)),
        ];
        let results = rank_students(&[s], &grades, &[], RankMode::Sequential);
        assert_eq!(results[0].average, 84.12);
    }

    #[tokio::test]
    async fn report_card_ranks_within_the_class() {
        let (mut store, _, b_id, _) = scenario_store();
        let class_id = Uuid::new_v4();
        store.student_meta.insert(
            b_id,
            StudentMeta {
                name: "Mao Sreyneang".to_string(),
                class_ids: vec![class_id],
            },
        );

        let card = compute_report_card(&store, b_id, "Monthly", RankMode::Sequential)
            .await
            .unwrap();

        assert_eq!(card.class_size, 3);
        assert_eq!(card.student.rank, 2);
        assert_eq!(card.student.average, 70.0);
        assert_eq!(card.class_info.name, "Grade 7A");
    }

    #[tokio::test]
    async fn unknown_student_is_not_found() {
        let (store, _, _, _) = scenario_store();
        let err = compute_report_card(&store, Uuid::new_v4(), "Monthly", RankMode::Sequential)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
    }

    #[tokio::test]
    async fn unenrolled_student_is_not_found() {
        let (mut store, a_id, _, _) = scenario_store();
        store.student_meta.insert(
            a_id,
            StudentMeta {
                name: "Chan Vathana".to_string(),
                class_ids: vec![],
            },
        );

        let err = compute_report_card(&store, a_id, "Monthly", RankMode::Sequential)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
    }

    #[tokio::test]
    async fn multi_enrollment_is_rejected() {
        let (mut store, a_id, _, _) = scenario_store();
        store.student_meta.insert(
            a_id,
            StudentMeta {
                name: "Chan Vathana".to_string(),
                class_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            },
        );

        let err = compute_report_card(&store, a_id, "Monthly", RankMode::Sequential)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
    }

    #[tokio::test]
    async fn ungraded_student_is_still_ranked_on_a_report_card() {
        let (mut store, _, _, c_id) = scenario_store();
        let class_id = Uuid::new_v4();
        store.student_meta.insert(
            c_id,
            StudentMeta {
                name: "Rin Piseth".to_string(),
                class_ids: vec![class_id],
            },
        );

        let card = compute_report_card(&store, c_id, "Monthly", RankMode::Sequential)
            .await
            .unwrap();

        assert_eq!(card.student.average, 0.0);
        assert_eq!(card.student.rank, 3);
        assert_eq!(card.student.result, Verdict::Fail);
        assert_eq!(card.student.attendance.absent, 2);
    }
}
