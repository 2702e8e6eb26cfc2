use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use courtpilot::agent::RunOptions;
use courtpilot::artifacts::RunId;
use courtpilot::config::Config;
use courtpilot::status::BookingStatus;

#[derive(Parser)]
#[command(
    name = "courtpilot",
    about = "Multi-profile facility booking automation with screenshot evidence and a status dashboard",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the booking configuration file
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Only log errors (RUST_LOG is ignored)
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a booking run across all configured profiles
    Run {
        /// Run the browser without a visible window
        #[arg(long)]
        headless: bool,

        /// Capture a screenshot of each profile's final state
        #[arg(long)]
        screenshots: bool,

        /// Maximum concurrently running agents (overrides config)
        #[arg(long)]
        max_workers: Option<usize>,

        /// Per-day run sequence number from the invoking environment
        #[arg(long, default_value = "1")]
        run_sequence: u32,

        /// Book the literal dates in the config instead of today + days_ahead
        #[arg(long)]
        use_config_date: bool,
    },

    /// Validate the configuration without running anything
    Validate,

    /// Print the last published status document
    Status,

    /// Generate the static dashboard page
    Dashboard,

    /// Request a new run via the dispatch endpoint
    Trigger {
        /// Dispatch token (falls back to $COURTPILOT_DISPATCH_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("error")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            headless,
            screenshots,
            max_workers,
            run_sequence,
            use_config_date,
        } => {
            let mut config = Config::load(&cli.config)?;
            if !use_config_date {
                config.apply_relative_date();
            }

            let options = RunOptions {
                headless,
                capture_screenshots: screenshots,
                max_workers: max_workers.unwrap_or(config.run.max_workers),
                profile_timeout: std::time::Duration::from_secs(config.run.profile_timeout_secs),
            };
            let run_id = RunId::today(run_sequence);

            tracing::info!(%run_id, "starting booking run");
            let summary = courtpilot::run_booking(&config, options, run_id).await?;

            println!("\nBooking Results:");
            println!("{:<12} | {:<8} | Details", "User", "Status");
            println!("{:-<12}-|-{:-<8}-|-{:-<40}", "", "", "");
            for outcome in &summary.outcomes {
                let status = match outcome.status {
                    BookingStatus::Success => "Success",
                    BookingStatus::Failed => "Failed",
                    BookingStatus::Pending => "Pending",
                };
                println!(
                    "{:<12} | {:<8} | {}",
                    outcome.user,
                    status,
                    outcome.details.as_deref().unwrap_or("")
                );
            }
            println!(
                "\n{} succeeded, {} failed, {} screenshot(s) saved",
                summary.succeeded(),
                summary.failed(),
                summary.screenshots.len()
            );
        }

        Commands::Validate => {
            let config = Config::load(&cli.config)?;
            println!(
                "Configuration OK: {} profile(s): {}",
                config.profiles.len(),
                config
                    .profiles
                    .iter()
                    .map(|p| p.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Commands::Status => {
            let config = Config::load(&cli.config)?;
            let records = courtpilot::status::read(&config.run.status_path)?;
            if records.is_empty() {
                println!("No outcome records published yet.");
            } else {
                println!(
                    "{:<12} | {:<8} | {:<25} | Details",
                    "User", "Status", "Timestamp"
                );
                println!("{:-<12}-|-{:-<8}-|-{:-<25}-|-{:-<30}", "", "", "", "");
                for record in records {
                    println!(
                        "{:<12} | {:<8} | {:<25} | {}",
                        record.user,
                        format!("{:?}", record.status),
                        record.timestamp.to_rfc3339(),
                        record.details.as_deref().unwrap_or("")
                    );
                }
            }
        }

        Commands::Dashboard => {
            let config = Config::load(&cli.config)?;
            let path =
                courtpilot::dashboard::generate(&config.dashboard, &config.run.screenshots_dir)?;
            println!("Dashboard written to {}", path.display());
        }

        Commands::Trigger { token } => {
            let config = Config::load(&cli.config)?;
            let token = match token {
                Some(token) => token,
                None => std::env::var("COURTPILOT_DISPATCH_TOKEN")
                    .context("no --token and COURTPILOT_DISPATCH_TOKEN is not set")?,
            };
            anyhow::ensure!(
                !config.dashboard.dispatch_url.is_empty(),
                "dashboard.dispatch_url is not configured"
            );
            courtpilot::dispatch::trigger(
                &config.dashboard.dispatch_url,
                &token,
                &config.dashboard.dispatch_event,
                serde_json::json!({ "source": "cli" }),
            )
            .await?;
            println!("Run dispatched; results will appear on the dashboard once published.");
        }
    }

    Ok(())
}
