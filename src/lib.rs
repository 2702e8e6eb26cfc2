//! courtpilot -- multi-profile facility booking automation.
//!
//! One invocation fans submission agents out across the configured profiles
//! under a bounded worker pool, files screenshot evidence per run, and
//! atomically publishes the ordered outcome list for the dashboard to poll.

pub mod agent;
pub mod artifacts;
pub mod config;
pub mod dashboard;
pub mod dispatch;
pub mod pool;
pub mod session;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use agent::RunOptions;
use artifacts::RunId;
use config::Config;
use session::SessionFactory;
use status::OutcomeRecord;

/// What a completed run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub outcomes: Vec<OutcomeRecord>,
    pub screenshots: Vec<PathBuf>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == status::BookingStatus::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Execute a full booking run with the real browser backend.
pub async fn run_booking(config: &Config, options: RunOptions, run_id: RunId) -> Result<RunSummary> {
    run_booking_with(Arc::new(session::chrome::ChromeFactory), config, options, run_id).await
}

/// Execute a full booking run against any session backend.
///
/// Profile-level failures never abort the run; the only run-fatal step here
/// is publishing the status document.
pub async fn run_booking_with(
    factory: Arc<dyn SessionFactory>,
    config: &Config,
    options: RunOptions,
    run_id: RunId,
) -> Result<RunSummary> {
    info!(%run_id, profiles = config.profiles.len(), "booking run started");

    let reports = pool::run_pool(factory, &config.profiles, &options).await;

    let mut outcomes = Vec::with_capacity(reports.len());
    let mut screenshots = Vec::new();
    for report in reports {
        if let Some(bytes) = &report.screenshot {
            match artifacts::write_screenshot(
                &config.run.screenshots_dir,
                &run_id,
                &report.outcome.user,
                bytes,
            ) {
                Ok(path) => screenshots.push(path),
                // Evidence loss is logged, never run-fatal; the outcome
                // record is the authoritative result.
                Err(e) => error!(profile = %report.outcome.user, error = %e, "screenshot not saved"),
            }
        }
        outcomes.push(report.outcome);
    }

    status::publish(&config.run.status_path, &outcomes)
        .context("failed to publish status document")?;

    let summary = RunSummary {
        outcomes,
        screenshots,
    };
    info!(
        %run_id,
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        screenshots = summary.screenshots.len(),
        "booking run finished"
    );
    Ok(summary)
}
