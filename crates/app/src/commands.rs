//! Command-line interface and command handlers

use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use fieldclock_core::ActiveSessionStatus;
use fieldclock_domain::{FieldClockError, Result, SessionType};
use fieldclock_infra::scheduling::JobStatus;
use serde::Serialize;
use tracing::{info, warn};

use crate::context::AppContext;

/// Attendance reconciliation for field staff: nightly backfill of missing
/// punches and auto-disconnection of forgotten sessions.
#[derive(Parser, Debug)]
#[command(name = "fieldclock", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML or JSON). Without it, `FIELDCLOCK_*`
    /// variables and the standard file locations are used.
    #[arg(global = true, short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// One subcommand and its arguments.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the nightly scheduler until interrupted
    Serve,
    /// Backfill the previous day now and print the summary
    RunBackfill,
    /// Run the disconnect sweep now and print the summary
    RunDisconnect,
    /// Evaluate the disconnect rules for one worker without closing anything
    Probe {
        /// Worker identifier
        worker_id: String,
    },
    /// List active sessions and the state of both nightly jobs
    Status,
    /// Open a session for a worker
    PunchIn {
        /// Worker identifier
        worker_id: String,
        /// start_service, start_break, end_break, end_service or general
        #[arg(value_parser = parse_session_type)]
        session_type: SessionType,
    },
    /// Close the worker's active session
    PunchOut {
        /// Worker identifier
        worker_id: String,
    },
    /// Show the punch sequence of one worker-local day
    Day {
        /// Worker identifier
        worker_id: String,
        /// Day to analyse (YYYY-MM-DD)
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },
}

fn parse_session_type(raw: &str) -> std::result::Result<SessionType, String> {
    raw.parse::<SessionType>().map_err(|e| e.to_string())
}

fn parse_date(raw: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

/// Execute one command against a wired context.
pub async fn execute(ctx: &mut AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Serve => serve(ctx).await,
        Commands::RunBackfill => print_json(&ctx.scheduler.run_backfill_now().await?),
        Commands::RunDisconnect => print_json(&ctx.scheduler.run_disconnect_now().await?),
        Commands::Probe { worker_id } => {
            let probe = ctx.service.probe_worker(&worker_id, Utc::now()).await?;
            match probe {
                Some(probe) => print_json(&probe),
                None => print_json(&serde_json::json!({
                    "worker_id": worker_id,
                    "active_session": false,
                })),
            }
        }
        Commands::Status => {
            let scheduler = ctx.scheduler.status().await?;
            let active_sessions = ctx.service.active_status(Utc::now()).await?;
            print_json(&StatusView {
                timezone: scheduler.timezone,
                jobs: scheduler.jobs,
                active_sessions,
            })
        }
        Commands::PunchIn { worker_id, session_type } => {
            let worker = ctx.worker(&worker_id).await?;
            let session =
                ctx.punches.start_session(&worker, session_type, None, None, Utc::now()).await?;
            print_json(&session)
        }
        Commands::PunchOut { worker_id } => {
            let worker = ctx.worker(&worker_id).await?;
            let session = ctx.punches.end_session(&worker, None, None, Utc::now()).await?;
            print_json(&session)
        }
        Commands::Day { worker_id, date } => {
            let worker = ctx.worker(&worker_id).await?;
            print_json(&ctx.punches.day_analysis(&worker, date).await?)
        }
    }
}

/// Job state comes from the shared store, so a one-shot `status` sees what
/// the `serve` daemon is doing.
#[derive(Serialize)]
struct StatusView {
    timezone: String,
    jobs: Vec<JobStatus>,
    active_sessions: Vec<ActiveSessionStatus>,
}

/// Daemon mode: run the scheduler until Ctrl-C, then let in-flight runs
/// finish their current worker.
async fn serve(ctx: &mut AppContext) -> Result<()> {
    if !ctx.config.scheduler.enabled {
        warn!("scheduler disabled in configuration; nothing to serve");
        return Ok(());
    }

    ctx.scheduler.start().await?;
    info!("fieldclock scheduler running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| FieldClockError::Internal(format!("failed to listen for shutdown: {e}")))?;

    info!("shutdown requested");
    ctx.scheduler.shutdown().await?;
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_text(text: &str) {
    println!("{text}");
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| FieldClockError::Internal(format!("failed to encode output: {e}")))?;
    print_text(&text);
    Ok(())
}
