use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod attendance;
mod db;
mod error;
mod models;
mod report;
mod results;

use db::ResultsStore;
use results::RankMode;

#[derive(Parser)]
#[command(name = "yatai-class-results")]
#[command(about = "Class results and report card generator for YATAI School", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import grade rows from a CSV file
    ImportGrades {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import attendance rows from a CSV file
    ImportAttendance {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Ranked results for every student in a class
    ClassReport {
        #[arg(long)]
        class: Uuid,
        #[arg(long)]
        exam_type: String,
        #[arg(long, value_enum, default_value = "sequential")]
        rank_mode: RankMode,
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// A single student's report card with class-relative rank
    ReportCard {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        exam_type: String,
        #[arg(long, value_enum, default_value = "sequential")]
        rank_mode: RankMode,
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Month-shaped attendance grid for a class
    AttendanceGrid {
        #[arg(long)]
        class: Uuid,
        /// Month in YYYY-MM form
        #[arg(long)]
        month: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let class_id = db::seed(&pool).await?;
            println!("Seed data inserted. Try --class {class_id} --exam-type Monthly.");
        }
        Commands::ImportGrades { csv } => {
            let written = db::import_grades(&pool, &csv).await?;
            println!("Wrote {written} grade rows from {}.", csv.display());
        }
        Commands::ImportAttendance { csv } => {
            let written = db::import_attendance(&pool, &csv).await?;
            println!("Wrote {written} attendance rows from {}.", csv.display());
        }
        Commands::ClassReport {
            class,
            exam_type,
            rank_mode,
            format,
            out,
        } => {
            let store = db::PgStore::new(pool.clone());
            let report = results::compute_class_report(&store, class, &exam_type, rank_mode).await?;
            let body = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&report)?,
                OutputFormat::Markdown => report::render_class_report(&report),
            };
            emit(body, out)?;
        }
        Commands::ReportCard {
            student,
            exam_type,
            rank_mode,
            format,
            out,
        } => {
            let store = db::PgStore::new(pool.clone());
            let card = results::compute_report_card(&store, student, &exam_type, rank_mode).await?;
            let body = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&card)?,
                OutputFormat::Markdown => report::render_report_card(&card),
            };
            emit(body, out)?;
        }
        Commands::AttendanceGrid { class, month } => {
            let (year, month_num) = attendance::parse_month(&month)
                .with_context(|| format!("invalid month {month:?}, expected YYYY-MM"))?;

            let store = db::PgStore::new(pool.clone());
            store
                .class_meta(class)
                .await?
                .with_context(|| format!("class {class} not found"))?;

            let students = store.enrolled_students(class).await?;
            let rows = db::fetch_month_attendance(&pool, class, year, month_num).await?;
            let grid = attendance::build_month_grid(&students, &rows, year, month_num)
                .context("invalid month")?;
            println!("{}", serde_json::to_string_pretty(&grid)?);
        }
    }

    Ok(())
}

fn emit(body: String, out: Option<PathBuf>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(&path, body)?;
            println!("Report written to {}.", path.display());
        }
        None => println!("{body}"),
    }
    Ok(())
}
