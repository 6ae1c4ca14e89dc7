//! Plain-text rendering of run summaries for people.

use std::fmt::Write as _;

use chrono_tz::Tz;
use fieldclock_domain::{BackfillReport, DisconnectReport, RunOutcome, RunSummary, WorkerFailure};

/// One-line subject with the headline counts.
pub fn subject(summary: &RunSummary) -> String {
    match summary {
        RunSummary::Backfill(report) => format!(
            "[FieldClock] backfill {}: {} corrections, {} errors{}",
            report.day,
            report.total_corrections,
            report.errors.len(),
            outcome_suffix(report.outcome)
        ),
        RunSummary::Disconnect(report) => format!(
            "[FieldClock] disconnect sweep: {} disconnected, {} errors{}",
            report.disconnected,
            report.errors.len(),
            outcome_suffix(report.outcome)
        ),
    }
}

/// Full body with times shown in `tz`.
pub fn render_text(summary: &RunSummary, tz: Tz) -> String {
    let mut out = String::new();
    match summary {
        RunSummary::Backfill(report) => render_backfill(&mut out, report, tz),
        RunSummary::Disconnect(report) => render_disconnect(&mut out, report, tz),
    }
    out
}

fn outcome_suffix(outcome: RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed => "",
        RunOutcome::PartialFailure => " (partial failure)",
        RunOutcome::Interrupted => " (interrupted)",
    }
}

fn render_backfill(out: &mut String, report: &BackfillReport, tz: Tz) {
    let _ = writeln!(out, "Backfill for {}", report.day);
    let _ = writeln!(
        out,
        "Workers processed: {}, skipped: {}, corrections: {}",
        report.workers_processed, report.workers_skipped, report.total_corrections
    );

    for worker in &report.corrections {
        let _ = writeln!(out);
        let _ = writeln!(out, "{} ({})", worker.worker.full_name, worker.worker.username);
        for item in &worker.items {
            let _ = writeln!(
                out,
                "  - {} at {}: {}",
                item.session_type.label(),
                item.time.with_timezone(&tz).format("%H:%M"),
                item.detail
            );
        }
    }

    render_errors(out, &report.errors);
}

fn render_disconnect(out: &mut String, report: &DisconnectReport, tz: Tz) {
    let _ = writeln!(
        out,
        "Disconnect sweep at {}",
        report.started_at.with_timezone(&tz).format("%Y-%m-%d %H:%M")
    );
    let _ = writeln!(
        out,
        "Active sessions: {}, disconnected: {}, retained: {}, already closed: {}",
        report.processed, report.disconnected, report.retained, report.already_closed
    );

    if !report.disconnections.is_empty() {
        let _ = writeln!(out);
    }
    for item in &report.disconnections {
        let _ = writeln!(
            out,
            "  - {} ({}, {}): {}",
            item.worker.full_name, item.worker.username, item.role, item.reason
        );
    }

    render_errors(out, &report.errors);
}

fn render_errors(out: &mut String, errors: &[WorkerFailure]) {
    if errors.is_empty() {
        return;
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Errors ({}):", errors.len());
    for failure in errors {
        let name = failure.worker_name.as_deref().unwrap_or(&failure.worker_id);
        let _ = writeln!(out, "  - {name}: {}", failure.message);
    }
}
