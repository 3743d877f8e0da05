use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::debug;
use uuid::Uuid;

mod db;
mod metrics;
mod models;
mod report;

#[derive(Parser)]
#[command(name = "branch-experience")]
#[command(about = "Survey experience metrics for coffee-shop branches", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Create a branch or rename an existing one
    AddBranch {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
    },
    /// List branches
    ListBranches,
    /// Delete a branch and its surveys
    RemoveBranch {
        #[arg(long)]
        code: String,
    },
    /// Register a survey link for a branch
    AddSurvey {
        #[arg(long)]
        branch: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        form_url: String,
    },
    /// List survey links
    ListSurveys,
    /// Delete a survey link
    RemoveSurvey {
        #[arg(long)]
        id: Uuid,
    },
    /// Log a QR scan against a survey and print its form URL
    RecordScan {
        #[arg(long)]
        survey: Uuid,
        #[arg(long)]
        referer: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
    },
    /// Import survey responses from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute experience metrics across responses
    Metrics {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        /// Emit the summary as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the most recent responses
    Responses {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value_t = 7)]
        limit: i64,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

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
        Commands::AddBranch { code, name } => {
            db::upsert_branch(&pool, &code, &name).await?;
            println!("Branch {code} saved.");
        }
        Commands::ListBranches => {
            let branches = db::list_branches(&pool).await?;
            if branches.is_empty() {
                println!("No branches registered.");
            } else {
                for branch in branches {
                    println!("- {} ({})", branch.name, branch.code);
                }
            }
        }
        Commands::RemoveBranch { code } => {
            let removed = db::remove_branch(&pool, &code).await?;
            if removed > 0 {
                println!("Branch {code} removed.");
            } else {
                println!("No branch with code {code}.");
            }
        }
        Commands::AddSurvey {
            branch,
            title,
            form_url,
        } => {
            let id = db::add_survey(&pool, &branch, &title, &form_url).await?;
            println!("Survey {id} registered for branch {branch}.");
        }
        Commands::ListSurveys => {
            let surveys = db::list_surveys(&pool).await?;
            if surveys.is_empty() {
                println!("No surveys registered.");
            } else {
                for survey in surveys {
                    println!(
                        "- {} [{}] {} -> {}",
                        survey.id, survey.branch_code, survey.title, survey.form_url
                    );
                }
            }
        }
        Commands::RemoveSurvey { id } => {
            let removed = db::remove_survey(&pool, id).await?;
            if removed > 0 {
                println!("Survey {id} removed.");
            } else {
                println!("No survey with id {id}.");
            }
        }
        Commands::RecordScan {
            survey,
            referer,
            user_agent,
        } => {
            let form_url =
                db::record_scan(&pool, survey, referer.as_deref(), user_agent.as_deref()).await?;
            println!("{form_url}");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} responses from {}.", csv.display());
        }
        Commands::Metrics {
            branch,
            since_days,
            json,
        } => {
            let since = metrics::cutoff(since_days);
            let responses = db::fetch_responses(&pool, since, branch.as_deref()).await?;
            let invitations =
                db::fetch_invitation_count(&pool, since, branch.as_deref()).await?;
            debug!(
                "aggregating {} responses against {} invitations",
                responses.len(),
                invitations
            );
            let summary = metrics::calculate_metrics(&responses, invitations);

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                let scope = branch.as_deref().unwrap_or("all branches");
                println!("Experience metrics for {scope} (last {since_days} days):");
                println!(
                    "  responses: {} (opened {}, started {}, completed {})",
                    summary.total_responses,
                    summary.opened_count,
                    summary.started_count,
                    summary.completed_count
                );
                println!("  open rate: {}", report::fmt_rate(summary.open_rate));
                println!(
                    "  response rate: {}",
                    report::fmt_rate(Some(summary.response_rate))
                );
                println!(
                    "  abandonment rate: {}",
                    report::fmt_rate(Some(summary.abandonment_rate))
                );
                println!("  NPS: {}", report::fmt_score(summary.nps));
                println!("  CSAT: {}", report::fmt_rate(summary.csat));
            }
        }
        Commands::Responses { branch, limit } => {
            let responses =
                db::fetch_recent_responses(&pool, branch.as_deref(), limit).await?;
            if responses.is_empty() {
                println!("No responses recorded.");
            } else {
                for response in responses {
                    let nps = response
                        .nps_score
                        .map_or_else(|| "—".to_string(), |s| s.to_string());
                    let csat = response
                        .csat_score
                        .map_or_else(|| "—".to_string(), |s| format!("{s:.1}"));
                    println!(
                        "- {} [{}] NPS {} · CSAT {} · {} · {}",
                        response.id,
                        response.branch_code,
                        nps,
                        csat,
                        response.submitted_at.format("%Y-%m-%d %H:%M"),
                        response.comment.as_deref().unwrap_or("—")
                    );
                }
            }
        }
        Commands::Report {
            branch,
            since_days,
            out,
        } => {
            let since = metrics::cutoff(since_days);
            let responses = db::fetch_responses(&pool, since, branch.as_deref()).await?;
            let invitations =
                db::fetch_invitation_count(&pool, since, branch.as_deref()).await?;
            let report =
                report::build_report(branch.as_deref(), since, &responses, invitations);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
