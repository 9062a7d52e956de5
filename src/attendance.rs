use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use uuid::Uuid;

use crate::models::{
    AttendanceGrid, AttendanceRow, EnrolledStudent, MonthDetails, StudentMonthAttendance,
};

/// Parse a `YYYY-MM` month label.
pub fn parse_month(input: &str) -> Option<(i32, u32)> {
    let (year, month) = input.split_once('-')?;
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    if (1..=12).contains(&month) {
        Some((year, month))
    } else {
        None
    }
}

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }?;
    Some((next - first).num_days() as u32)
}

/// Month-shaped attendance grid for a class roster: one row per student with
/// a day-of-month -> status map. Rows dated outside the month are ignored;
/// students with no recorded days still get a row.
pub fn build_month_grid(
    students: &[EnrolledStudent],
    rows: &[AttendanceRow],
    year: i32,
    month: u32,
) -> Option<AttendanceGrid> {
    let num_days = days_in_month(year, month)?;

    let mut by_student: HashMap<Uuid, BTreeMap<u32, String>> = HashMap::new();
    for row in rows {
        if row.date.year() == year && row.date.month() == month {
            by_student
                .entry(row.student_id)
                .or_default()
                .insert(row.date.day(), row.status.clone());
        }
    }

    let rows = students
        .iter()
        .map(|student| StudentMonthAttendance {
            student_id: student.id,
            student_name: student.name.clone(),
            days: by_student.remove(&student.id).unwrap_or_default(),
        })
        .collect();

    Some(AttendanceGrid {
        month: MonthDetails {
            year,
            month,
            num_days,
        },
        rows,
    })
}
