use std::fmt::Write;

use crate::models::{ClassReport, ReportCard, StudentReport};

pub fn render_class_report(report: &ClassReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Class Results: {}", report.class_info.name);
    if let Some(year) = &report.class_info.academic_year {
        let _ = writeln!(output, "Academic year: {year}");
    }
    if let Some(teacher) = &report.class_info.teacher_name {
        let _ = writeln!(output, "Homeroom teacher: {teacher}");
    }
    let _ = writeln!(output, "Exam: {}", report.exam_type);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Standings");

    if report.student_results.is_empty() {
        let _ = writeln!(output, "No students enrolled in this class.");
    } else {
        for result in report.student_results.iter() {
            let _ = writeln!(
                output,
                "- #{} {}: average {:.2} ({}), total {:.2} across {} graded subjects",
                result.rank,
                result.student_name,
                result.average,
                result.result,
                result.total_score,
                result.grades.iter().filter(|g| g.score.is_some()).count()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance");

    if report.student_results.is_empty() {
        let _ = writeln!(output, "No attendance recorded.");
    } else {
        for result in report.student_results.iter() {
            let _ = writeln!(
                output,
                "- {}: {} present, {} absent, {} late",
                result.student_name,
                result.attendance.present,
                result.attendance.absent,
                result.attendance.late
            );
        }
    }

    output
}

pub fn render_report_card(card: &ReportCard) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Report Card: {}", card.student.student_name);
    let _ = writeln!(output, "Class: {}", card.class_info.name);
    if let Some(year) = &card.class_info.academic_year {
        let _ = writeln!(output, "Academic year: {year}");
    }
    if let Some(teacher) = &card.class_info.teacher_name {
        let _ = writeln!(output, "Homeroom teacher: {teacher}");
    }
    let _ = writeln!(output, "Exam: {}", card.exam_type);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grades");
    write_subject_lines(&mut output, &card.student);

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Total {:.2}, average {:.2}: {}",
        card.student.total_score, card.student.average, card.student.result
    );
    let _ = writeln!(
        output,
        "Rank {} of {} in class",
        card.student.rank, card.class_size
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance");
    let _ = writeln!(
        output,
        "{} present, {} absent, {} late",
        card.student.attendance.present,
        card.student.attendance.absent,
        card.student.attendance.late
    );

    output
}

fn write_subject_lines(output: &mut String, student: &StudentReport) {
    if student.grades.is_empty() {
        let _ = writeln!(output, "No grades entered for this exam.");
        return;
    }

    for entry in student.grades.iter() {
        match entry.score {
            Some(score) => {
                let _ = writeln!(output, "- {}: {:.2}", entry.subject, score);
            }
            None => {
                let _ = writeln!(output, "- {}: not yet graded", entry.subject);
            }
        }
    }
}
