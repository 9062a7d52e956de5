use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::ReportError;
use crate::models::{
    AttendanceCount, AttendanceRow, ClassMeta, EnrolledStudent, GradeRow, StudentMeta,
};

/// Read interface the aggregator consumes. Handed in explicitly so the
/// computation never reaches into ambient connection state, and so tests can
/// substitute an in-memory store.
#[async_trait]
pub trait ResultsStore: Send + Sync {
    async fn class_meta(&self, class_id: Uuid) -> Result<Option<ClassMeta>, ReportError>;

    async fn student_meta(&self, student_id: Uuid) -> Result<Option<StudentMeta>, ReportError>;

    /// Roster for a class, ordered by student id. Rank tie-breaks follow this
    /// order.
    async fn enrolled_students(&self, class_id: Uuid)
        -> Result<Vec<EnrolledStudent>, ReportError>;

    /// All grade rows for a class and exam type, every student and subject.
    /// The exam type label is matched exactly, case included.
    async fn grades(&self, class_id: Uuid, exam_type: &str)
        -> Result<Vec<GradeRow>, ReportError>;

    /// Attendance counts per student and status, cumulative over every date
    /// recorded for the class.
    async fn attendance_counts(&self, class_id: Uuid)
        -> Result<Vec<AttendanceCount>, ReportError>;
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultsStore for PgStore {
    async fn class_meta(&self, class_id: Uuid) -> Result<Option<ClassMeta>, ReportError> {
        let row = sqlx::query(
            "SELECT c.name, c.academic_year, t.name AS teacher_name \
             FROM class_results.classes c \
             LEFT JOIN class_results.teachers t ON t.id = c.teacher_id \
             WHERE c.id = $1",
        )
        .bind(class_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ClassMeta {
            name: row.get("name"),
            academic_year: row.get("academic_year"),
            teacher_name: row.get("teacher_name"),
        }))
    }

    async fn student_meta(&self, student_id: Uuid) -> Result<Option<StudentMeta>, ReportError> {
        let row = sqlx::query("SELECT name FROM class_results.students WHERE id = $1")
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let enrollments = sqlx::query(
            "SELECT class_id FROM class_results.enrollments \
             WHERE student_id = $1 ORDER BY enrolled_at",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(StudentMeta {
            name: row.get("name"),
            class_ids: enrollments.iter().map(|r| r.get("class_id")).collect(),
        }))
    }

    async fn enrolled_students(
        &self,
        class_id: Uuid,
    ) -> Result<Vec<EnrolledStudent>, ReportError> {
        let rows = sqlx::query(
            "SELECT s.id, s.name FROM class_results.students s \
             JOIN class_results.enrollments e ON e.student_id = s.id \
             WHERE e.class_id = $1 \
             ORDER BY s.id",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| EnrolledStudent {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn grades(
        &self,
        class_id: Uuid,
        exam_type: &str,
    ) -> Result<Vec<GradeRow>, ReportError> {
        let rows = sqlx::query(
            "SELECT g.student_id, g.score, su.name AS subject_name \
             FROM class_results.grades g \
             JOIN class_results.subjects su ON su.id = g.subject_id \
             WHERE g.class_id = $1 AND g.exam_type = $2 \
             ORDER BY su.name, g.grade_date",
        )
        .bind(class_id)
        .bind(exam_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| GradeRow {
                student_id: row.get("student_id"),
                subject_name: row.get("subject_name"),
                score: row.get("score"),
            })
            .collect())
    }

    async fn attendance_counts(
        &self,
        class_id: Uuid,
    ) -> Result<Vec<AttendanceCount>, ReportError> {
        let rows = sqlx::query(
            "SELECT student_id, status, COUNT(id) AS count \
             FROM class_results.attendance \
             WHERE class_id = $1 \
             GROUP BY student_id, status \
             ORDER BY student_id, status",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AttendanceCount {
                student_id: row.get("student_id"),
                status: row.get("status"),
                count: row.get("count"),
            })
            .collect())
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Raw attendance rows for one calendar month, for the month grid.
pub async fn fetch_month_attendance(
    pool: &PgPool,
    class_id: Uuid,
    year: i32,
    month: u32,
) -> anyhow::Result<Vec<AttendanceRow>> {
    let start = NaiveDate::from_ymd_opt(year, month, 1).context("invalid month")?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .context("invalid month")?;

    let rows = sqlx::query(
        "SELECT student_id, attendance_date, status \
         FROM class_results.attendance \
         WHERE class_id = $1 AND attendance_date >= $2 AND attendance_date < $3 \
         ORDER BY student_id, attendance_date",
    )
    .bind(class_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| AttendanceRow {
            student_id: row.get("student_id"),
            date: row.get("attendance_date"),
            status: row.get("status"),
        })
        .collect())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<Uuid> {
    let teacher_id = Uuid::parse_str("8f0c3a77-55d1-4b3e-9a02-6cf2f1f6b9a4")?;
    sqlx::query(
        r#"
        INSERT INTO class_results.teachers (id, name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE
        SET name = EXCLUDED.name
        "#,
    )
    .bind(teacher_id)
    .bind("Sok Dara")
    .bind("dara.sok@yatai.school")
    .execute(pool)
    .await?;

    let class_id = Uuid::parse_str("4b1d2f60-8a7e-4c11-b3d5-2f9f0a6c5e18")?;
    sqlx::query(
        r#"
        INSERT INTO class_results.classes (id, name, academic_year, teacher_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name, academic_year = EXCLUDED.academic_year,
            teacher_id = EXCLUDED.teacher_id
        "#,
    )
    .bind(class_id)
    .bind("Grade 7A")
    .bind("2025-2026")
    .bind(teacher_id)
    .execute(pool)
    .await?;

    let subjects = vec![
        (
            Uuid::parse_str("0a5b9c2e-1d34-4f67-8b90-c1d2e3f4a5b6")?,
            "Mathematics",
        ),
        (
            Uuid::parse_str("1b6c0d3f-2e45-4a78-9c01-d2e3f4a5b6c7")?,
            "Khmer Literature",
        ),
        (
            Uuid::parse_str("2c7d1e40-3f56-4b89-ad12-e3f4a5b6c7d8")?,
            "English",
        ),
    ];

    for (id, name) in &subjects {
        sqlx::query(
            r#"
            INSERT INTO class_results.subjects (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE
            SET name = EXCLUDED.name
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let students = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Chan Vathana",
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Mao Sreyneang",
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Rin Piseth",
        ),
    ];

    for (id, name) in &students {
        sqlx::query(
            r#"
            INSERT INTO class_results.students (id, name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO class_results.enrollments (id, student_id, class_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (student_id, class_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(class_id)
        .execute(pool)
        .await?;
    }

    let grade_date = NaiveDate::from_ymd_opt(2026, 2, 2).context("invalid date")?;
    let grades: Vec<(Uuid, Uuid, Option<f64>)> = vec![
        (students[0].0, subjects[0].0, Some(80.0)),
        (students[0].0, subjects[1].0, Some(90.0)),
        (students[1].0, subjects[0].0, Some(70.0)),
        // Entered on the sheet but not yet scored.
        (students[2].0, subjects[0].0, None),
    ];

    for (student_id, subject_id, score) in grades {
        sqlx::query(
            r#"
            INSERT INTO class_results.grades
            (id, student_id, class_id, subject_id, exam_type, score, grade_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (student_id, class_id, subject_id, exam_type, grade_date)
            DO UPDATE SET score = EXCLUDED.score
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(class_id)
        .bind(subject_id)
        .bind("Monthly")
        .bind(score)
        .bind(grade_date)
        .execute(pool)
        .await?;
    }

    let attendance = vec![
        (students[0].0, NaiveDate::from_ymd_opt(2026, 2, 2), "present"),
        (students[0].0, NaiveDate::from_ymd_opt(2026, 2, 3), "present"),
        (students[1].0, NaiveDate::from_ymd_opt(2026, 2, 2), "present"),
        (students[1].0, NaiveDate::from_ymd_opt(2026, 2, 3), "late"),
        (students[2].0, NaiveDate::from_ymd_opt(2026, 2, 2), "absent"),
        (students[2].0, NaiveDate::from_ymd_opt(2026, 2, 3), "absent"),
    ];

    for (student_id, date, status) in attendance {
        sqlx::query(
            r#"
            INSERT INTO class_results.attendance
            (id, student_id, class_id, attendance_date, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id, class_id, attendance_date)
            DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(class_id)
        .bind(date.context("invalid date")?)
        .bind(status)
        .execute(pool)
        .await?;
    }

    Ok(class_id)
}

pub async fn import_grades(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: Uuid,
        class_id: Uuid,
        subject: String,
        exam_type: String,
        grade_date: NaiveDate,
        score: Option<f64>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut written = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;

        let subject_id: Uuid = sqlx::query(
            r#"
            INSERT INTO class_results.subjects (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE
            SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.subject)
        .fetch_one(pool)
        .await?
        .get("id");

        let result = sqlx::query(
            r#"
            INSERT INTO class_results.grades
            (id, student_id, class_id, subject_id, exam_type, score, grade_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (student_id, class_id, subject_id, exam_type, grade_date)
            DO UPDATE SET score = EXCLUDED.score
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.student_id)
        .bind(row.class_id)
        .bind(subject_id)
        .bind(&row.exam_type)
        .bind(row.score)
        .bind(row.grade_date)
        .execute(pool)
        .await?;

        written += result.rows_affected() as usize;
    }

    Ok(written)
}

pub async fn import_attendance(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: Uuid,
        class_id: Uuid,
        attendance_date: NaiveDate,
        status: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut written = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;

        let result = sqlx::query(
            r#"
            INSERT INTO class_results.attendance
            (id, student_id, class_id, attendance_date, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id, class_id, attendance_date)
            DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.student_id)
        .bind(row.class_id)
        .bind(row.attendance_date)
        .bind(&row.status)
        .execute(pool)
        .await?;

        written += result.rows_affected() as usize;
    }

    Ok(written)
}
