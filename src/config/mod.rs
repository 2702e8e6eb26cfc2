//! TOML configuration: booking profiles plus run and dashboard settings.
//!
//! Profiles are validated eagerly and exhaustively at load time so that one
//! malformed profile does not mask problems in another. Declaration order in
//! the file is the canonical ordering for the whole pipeline.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("no booking profiles defined")]
    NoProfiles,

    #[error("invalid profiles:\n{}", .issues.join("\n"))]
    InvalidProfiles { issues: Vec<String> },
}

/// Login credentials for one profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Login {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Desired slot for one profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    /// Booking date, `YYYY-MM-DD`. May be replaced by a computed date, see
    /// [`RunSettings::days_ahead`].
    pub date: String,
    /// Desired start time, e.g. `"7:00 pm"` or `"19:00"`.
    pub time: String,
    /// Facility keyword to match against search results, e.g. `"badminton"`.
    pub facility: String,
    /// Preferred court number within the facility; any court when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court_number: Option<String>,
    pub cell_number: String,
    pub booking_reason: String,
}

/// One independent booking attempt: credentials plus desired slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub login: Login,
    pub booking: Booking,
}

/// Run-wide settings, all optional in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Where the status document is published.
    pub status_path: PathBuf,
    /// Root of the screenshot artifact tree.
    pub screenshots_dir: PathBuf,
    /// Maximum concurrently running agents.
    pub max_workers: usize,
    /// Per-profile wall-clock budget in seconds.
    pub profile_timeout_secs: u64,
    /// When set, replace every profile's booking date with today + N days
    /// (the booking site opens slots N days out). `--use-config-date`
    /// bypasses this.
    pub days_ahead: Option<i64>,
    /// Timezone the booking site counts its days in. The computed date uses
    /// this, not UTC; around midnight the two can differ by a day.
    pub timezone: Tz,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            status_path: PathBuf::from("dashboard/status.json"),
            screenshots_dir: PathBuf::from("screenshots"),
            max_workers: 2,
            profile_timeout_secs: 180,
            days_ahead: None,
            timezone: Tz::UTC,
        }
    }
}

/// Settings for the generated dashboard page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    /// Output directory for the rendered page.
    pub out_dir: PathBuf,
    /// Status document URL relative to the page.
    pub status_url: String,
    /// Poll interval for the status document, in seconds.
    pub poll_interval_secs: u64,
    /// Daily trigger time shown in the countdown, `HH:MM` (viewer-local).
    pub trigger_time: String,
    /// Dispatch endpoint the "Run now" button posts to.
    pub dispatch_url: String,
    /// Event identifier sent with a manual trigger.
    pub dispatch_event: String,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("dashboard"),
            status_url: "status.json".to_string(),
            poll_interval_secs: 30,
            trigger_time: "07:00".to_string(),
            dispatch_url: String::new(),
            dispatch_event: "booking-run".to_string(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub profiles: Vec<Profile>,
    pub run: RunSettings,
    pub dashboard: DashboardSettings,
}

// Raw mirror with optional fields so validation can collect every missing
// field instead of stopping at the first serde error.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    profile: Vec<RawProfile>,
    #[serde(default)]
    run: RunSettings,
    #[serde(default)]
    dashboard: DashboardSettings,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    id: Option<String>,
    login: Option<RawLogin>,
    booking: Option<RawBooking>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLogin {
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBooking {
    date: Option<String>,
    time: Option<String>,
    facility: Option<String>,
    court_number: Option<String>,
    cell_number: Option<String>,
    booking_reason: Option<String>,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_raw(raw)?;
        info!(
            path = %path.display(),
            profiles = config.profiles.len(),
            "loaded booking configuration"
        );
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.profile.is_empty() {
            return Err(ConfigError::NoProfiles);
        }

        let mut issues = Vec::new();
        let mut profiles = Vec::with_capacity(raw.profile.len());

        for (idx, p) in raw.profile.into_iter().enumerate() {
            let label = p.id.clone().unwrap_or_else(|| format!("#{}", idx + 1));
            let mut missing = |field: &str| {
                issues.push(format!("profile '{label}': missing field '{field}'"));
            };

            if p.id.is_none() {
                missing("id");
            }
            let login = p.login.unwrap_or_default();
            if login.url.is_none() {
                missing("login.url");
            }
            if login.username.is_none() {
                missing("login.username");
            }
            if login.password.is_none() {
                missing("login.password");
            }
            let booking = p.booking.unwrap_or_default();
            if booking.date.is_none() {
                missing("booking.date");
            }
            if booking.time.is_none() {
                missing("booking.time");
            }
            if booking.facility.is_none() {
                missing("booking.facility");
            }
            if booking.cell_number.is_none() {
                missing("booking.cell_number");
            }
            if booking.booking_reason.is_none() {
                missing("booking.booking_reason");
            }

            // Only assemble the profile when every field is present; the
            // issue list decides whether loading fails.
            if let (
                Some(id),
                Some(url),
                Some(username),
                Some(password),
                Some(date),
                Some(time),
                Some(facility),
                Some(cell_number),
                Some(booking_reason),
            ) = (
                p.id,
                login.url,
                login.username,
                login.password,
                booking.date,
                booking.time,
                booking.facility,
                booking.cell_number,
                booking.booking_reason,
            ) {
                profiles.push(Profile {
                    id,
                    login: Login {
                        url,
                        username,
                        password,
                    },
                    booking: Booking {
                        date,
                        time,
                        facility,
                        court_number: booking.court_number,
                        cell_number,
                        booking_reason,
                    },
                });
            }
        }

        if !issues.is_empty() {
            return Err(ConfigError::InvalidProfiles { issues });
        }

        Ok(Self {
            profiles,
            run: raw.run,
            dashboard: raw.dashboard,
        })
    }

    /// Replace every profile's booking date with today + `days_ahead`, when
    /// configured. The booking site opens its reservation window a fixed
    /// number of days out, so the date in the file is usually stale. "Today"
    /// is taken in `run.timezone`, matching the site's local day.
    pub fn apply_relative_date(&mut self) {
        let Some(days) = self.run.days_ahead else {
            return;
        };
        let date = relative_date(Utc::now(), self.run.timezone, days);
        info!(%date, days, timezone = %self.run.timezone, "using computed booking date");
        for profile in &mut self.profiles {
            profile.booking.date = date.clone();
        }
    }
}

/// `YYYY-MM-DD` for `now + days`, with the day boundary taken in `tz`.
fn relative_date(now: DateTime<Utc>, tz: Tz, days: i64) -> String {
    (now.with_timezone(&tz) + ChronoDuration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}
