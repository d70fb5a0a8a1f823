use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::io::BufReader;
use tracing::{info, warn};

mod blink;
mod capture;
mod config;
mod db;
mod export;
mod eyes;
mod focus;
mod logging;
mod models;
mod report;
mod session;

use config::{EngineArgs, EngineConfig};
use logging::LogConfig;
use models::FocusState;
use report::SessionSummary;
use session::FocusEngine;

#[derive(Parser)]
#[command(name = "focustrack")]
#[command(
    about = "Real-time attention tracking from face and eye detector output",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    log: LogConfig,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a live session from detector frames (JSON Lines)
    Run {
        /// Frame input file; stdin when omitted or "-"
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Frames buffered between the reader and the engine
        #[arg(long, default_value_t = 64)]
        queue: usize,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Print the statistics of an exported session log
    Summary {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report from a session log
    Report {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Create or upgrade the archive schema
    InitDb,
    /// Store an exported session log in the archive
    Archive {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List archived sessions, newest first
    Trends {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&cli.log)?;

    match cli.command {
        Commands::Run {
            input,
            out_dir,
            queue,
            engine,
        } => {
            let config = EngineConfig::try_from(engine)?;
            run_session(config, input, &out_dir, queue).await?;
        }
        Commands::Summary { csv, json } => {
            let entries = export::read_log(&csv)?;
            let summary = SessionSummary::from_log(&entries);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Commands::Report { csv, out } => {
            let entries = export::read_log(&csv)?;
            let summary = SessionSummary::from_log(&entries);
            let report = report::build_report(&source_key(&csv), &summary, &entries);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Archive { csv } => {
            let pool = connect().await?;
            let entries = export::read_log(&csv)?;
            let key = source_key(&csv);
            if db::archive_log(&pool, &key, &entries).await? {
                println!("Archived {} entries from {}.", entries.len(), csv.display());
            } else {
                println!("{key} is already archived.");
            }
        }
        Commands::Trends { limit } => {
            let pool = connect().await?;
            let trends = db::fetch_trends(&pool, limit).await?;

            if trends.is_empty() {
                println!("No archived sessions.");
                return Ok(());
            }

            println!("Recent sessions:");
            for trend in trends {
                println!(
                    concat!(
                        "- {} ({}, {} entries, {}) ",
                        "focused {:.1}% distracted {:.1}% drowsy {:.1}% blinks {:.1}/min"
                    ),
                    trend.source_key,
                    trend.started_at,
                    trend.entry_count,
                    report::format_duration(trend.duration_secs.max(0) as u64),
                    trend.focused_pct,
                    trend.distracted_pct,
                    trend.drowsy_pct,
                    trend.avg_blinks_per_min
                );
            }
        }
    }

    Ok(())
}

async fn run_session(
    config: EngineConfig,
    input: Option<PathBuf>,
    out_dir: &Path,
    queue: usize,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory {}", out_dir.display()))?;

    let (mut frames, reader) = match input.filter(|path| path.as_os_str() != "-") {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open frame input {}", path.display()))?;
            capture::spawn_reader(BufReader::new(file), queue)
        }
        None => capture::spawn_reader(BufReader::new(tokio::io::stdin()), queue),
    };

    let mut engine = FocusEngine::new(config, Local::now().naive_local());
    info!(session_id = %engine.session().id(), "tracking, press Ctrl-C to stop and save");

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let stopped_at = capture::drive(&mut engine, &mut frames, shutdown).await?;

    frames.close();
    if reader.is_finished() {
        match reader.await {
            Ok(Ok(count)) => info!(frames = count, "frame input drained"),
            Ok(Err(err)) => warn!(error = %err, "frame input ended with an error"),
            Err(err) => warn!(error = %err, "frame reader failed"),
        }
    } else {
        reader.abort();
    }

    match engine.finalize(stopped_at, out_dir) {
        Ok(finalized) => {
            print_summary(&finalized.summary);
            match finalized.path {
                Some(path) => println!("\nSaved: {}", path.display()),
                None => println!("\nNo data logged"),
            }
            Ok(())
        }
        Err(err) => {
            print_summary(&err.summary);
            Err(err.into())
        }
    }
}

fn print_summary(summary: &SessionSummary) {
    println!("SESSION SUMMARY");
    println!("Duration: {}", report::format_duration(summary.duration_secs));
    println!("Data points: {}", summary.entries);
    if let Some(total_blinks) = summary.total_blinks {
        println!("Total blinks detected: {total_blinks}");
    }
    println!("Productivity: {}%", summary.productivity());
    println!("Average blink rate: {:.1}/min", summary.avg_blinks_per_minute);
    if let Some(emotion) = &summary.top_emotion {
        println!("Top emotion: {}", emotion.as_str().to_uppercase());
    }

    println!("\nFocus breakdown:");
    for state in FocusState::ALL {
        println!("- {}: {:.1}%", state, summary.percent_of(state));
    }

    println!("\nBlink state analysis:");
    for (category, count) in &summary.blink_states {
        println!("- {category}: {count}");
    }
}

fn source_key(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance for the archive")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}
