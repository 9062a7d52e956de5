use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// Roster entry for a class, as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrolledStudent {
    pub id: Uuid,
    pub name: String,
}

/// One grade row for a class and exam type. A `None` score means the grade
/// has not been entered yet and is excluded from aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeRow {
    pub student_id: Uuid,
    pub subject_name: String,
    pub score: Option<f64>,
}

/// Attendance rows pre-aggregated by status for one class.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceCount {
    pub student_id: Uuid,
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMeta {
    pub name: String,
    pub academic_year: Option<String>,
    pub teacher_name: Option<String>,
}

/// Student identity plus every class the student is enrolled in. The
/// aggregator enforces the one-class rule, so all enrollments are surfaced.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentMeta {
    pub name: String,
    pub class_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectScore {
    pub subject: String,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AttendanceTally {
    pub present: i64,
    pub absent: i64,
    pub late: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "Pass"),
            Verdict::Fail => write!(f, "Fail"),
        }
    }
}

/// One student's computed results for a single exam type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentReport {
    pub student_id: Uuid,
    pub student_name: String,
    pub grades: Vec<SubjectScore>,
    pub attendance: AttendanceTally,
    pub total_score: f64,
    pub average: f64,
    pub result: Verdict,
    pub rank: usize,
}

/// Ranked results for a whole class, ordered by descending average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassReport {
    pub class_info: ClassMeta,
    pub exam_type: String,
    pub student_results: Vec<StudentReport>,
}

/// A single student's report card, with the class context the rank is
/// relative to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportCard {
    pub class_info: ClassMeta,
    pub exam_type: String,
    pub class_size: usize,
    pub student: StudentReport,
}

/// Raw attendance row, used by the month grid.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRow {
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthDetails {
    pub year: i32,
    pub month: u32,
    pub num_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentMonthAttendance {
    pub student_id: Uuid,
    pub student_name: String,
    /// Day of month -> recorded status.
    pub days: BTreeMap<u32, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceGrid {
    pub month: MonthDetails,
    pub rows: Vec<StudentMonthAttendance>,
}
