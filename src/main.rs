use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use tutoring_weekly_risk::{db, report, EvaluateOptions, RiskEvaluator, WeekWindows};

#[derive(Parser)]
#[command(name = "weekly-risk")]
#[command(about = "Weekly risk scoring for tutoring-program students", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import study sessions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Evaluate a single student
    Score {
        #[arg(long)]
        student: Uuid,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
        /// Skip the audit history write
        #[arg(long)]
        no_history: bool,
    },
    /// Evaluate every student with the bulk reporting path
    Sweep {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Generate a markdown report for the whole cohort
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
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
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_sessions_csv(&pool, &csv).await?;
            println!("Inserted {inserted} study sessions from {}.", csv.display());
        }
        Commands::Score {
            student,
            json,
            no_history,
        } => {
            let evaluator = RiskEvaluator::new(pool.clone());
            let result = evaluator
                .evaluate_with(
                    student,
                    EvaluateOptions {
                        record_history: !no_history,
                    },
                )
                .await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "Student {} scored {} ({})",
                    student, result.risk_score, result.level
                );
                for reason in &result.reasons {
                    println!("- {reason}");
                }
            }
        }
        Commands::Sweep { limit } => {
            let students = db::fetch_students(&pool).await?;
            if students.is_empty() {
                println!("No students found.");
                return Ok(());
            }

            let ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();
            let names: HashMap<Uuid, String> = students
                .into_iter()
                .map(|s| (s.id, s.full_name))
                .collect();

            let evaluator = RiskEvaluator::new(pool.clone());
            let mut results = evaluator.evaluate_batch(&ids).await;
            results.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));

            println!("Top students by weekly risk score:");
            for result in results.iter().take(limit) {
                let name = names
                    .get(&result.student_id)
                    .map(String::as_str)
                    .unwrap_or("unknown student");
                println!(
                    "- {} score {} ({}) across {} reasons",
                    name,
                    result.risk_score,
                    result.level,
                    result.reasons.len()
                );
            }
        }
        Commands::Report { out } => {
            let students = db::fetch_students(&pool).await?;
            let ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();
            let names: HashMap<Uuid, String> = students
                .into_iter()
                .map(|s| (s.id, s.full_name))
                .collect();

            let evaluator = RiskEvaluator::new(pool.clone());
            let results = evaluator.evaluate_batch(&ids).await;

            let windows = WeekWindows::for_today(Utc::now().date_naive());
            let report = report::build_report(windows.this_week.start, &results, &names);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
