//! Submission agent: drives one profile through login, facility search, slot
//! selection, checkout, and confirmation.
//!
//! The agent never lets an error escape. Every exit path, including browser
//! launch failure, produces an [`AgentReport`] and tears the session down.
//! Retry policy lives above this layer; a login rejection here is final.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Profile;
use crate::session::{SessionError, SessionFactory, WebSession};
use crate::status::OutcomeRecord;

/// CSS anchors on the booking site, taken from its live markup.
pub mod selectors {
    pub const LOGIN_USERNAME: &str = "#weblogin_username";
    pub const LOGIN_PASSWORD: &str = "#weblogin_password";
    pub const LOGIN_SUBMIT: &str = "#weblogin_buttonlogin";
    /// Interstitial shown when a previous session is still alive.
    pub const RESUME_SESSION: &str = "#loginresumesession_buttoncontinue";
    /// Signed-in account menu; its presence is the post-login marker.
    pub const ACCOUNT_MENU: &str = ".menuitem__title";
    /// Landing tile for the facility booking area.
    pub const FACILITY_TILE: &str = "a.tile";
    pub const DATE_FIELD: &str = "#frwebsearch_date";
    pub const SEARCH_BUTTON: &str = "#frwebsearch_buttonsearch";
    pub const ADD_TO_CART: &str = ".multiselectlist__addbutton";
    pub const CELL_FIELD: &str = "#question150906610";
    pub const REASON_FIELD: &str = "#question150906642";
    pub const CONTINUE_BUTTON: &str = "#processingprompts_buttoncontinue";
    /// Checkout prompt header; its presence confirms the reservation.
    pub const CONFIRMATION_HEADER: &str = "#processingprompts_header";
    pub const LOGOUT_MENU: &str = ".menuitem__text";
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("login failed: {0}")]
    Auth(String),

    #[error("slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("booking not confirmed: {0}")]
    Verify(String),

    #[error("unparseable booking time {0:?}")]
    BadTime(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Options shared by every agent in a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub headless: bool,
    pub capture_screenshots: bool,
    pub max_workers: usize,
    pub profile_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            headless: true,
            capture_screenshots: false,
            max_workers: 2,
            profile_timeout: Duration::from_secs(180),
        }
    }
}

/// What one agent hands back to the pool: the outcome record plus the
/// evidence screenshot, when one was captured.
#[derive(Debug)]
pub struct AgentReport {
    pub outcome: OutcomeRecord,
    pub screenshot: Option<Vec<u8>>,
}

impl AgentReport {
    pub fn failed(profile_id: &str, details: impl Into<String>) -> Self {
        Self {
            outcome: OutcomeRecord::failed(profile_id, details),
            screenshot: None,
        }
    }
}

/// Run one profile's booking attempt to completion.
pub async fn execute(
    factory: &dyn SessionFactory,
    profile: &Profile,
    options: &RunOptions,
) -> AgentReport {
    info!(profile = %profile.id, "starting booking attempt");

    let mut session = match factory.connect(options.headless).await {
        Ok(session) => session,
        Err(e) => {
            warn!(profile = %profile.id, error = %e, "browser launch failed");
            return AgentReport::failed(&profile.id, format!("browser: {e}"));
        }
    };

    let result = drive(session.as_mut(), profile).await;

    // Capture whatever state the session ended in, success or failure, so the
    // artifact documents the final screen reached.
    let screenshot = if options.capture_screenshots {
        match session.screenshot().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(profile = %profile.id, error = %e, "screenshot capture failed");
                None
            }
        }
    } else {
        None
    };

    session.close().await;

    match result {
        Ok(confirmation) => {
            info!(profile = %profile.id, "booking confirmed");
            AgentReport {
                outcome: OutcomeRecord::success(&profile.id, confirmation),
                screenshot,
            }
        }
        Err(e) => {
            warn!(profile = %profile.id, error = %e, "booking attempt failed");
            AgentReport {
                outcome: OutcomeRecord::failed(&profile.id, e.to_string()),
                screenshot,
            }
        }
    }
}

/// The sequential state machine. Any error aborts the remaining states.
async fn drive(session: &mut dyn WebSession, profile: &Profile) -> Result<String, AgentError> {
    login(session, profile).await?;
    search(session, profile).await?;
    select_slot(session, profile).await?;
    let confirmation = finalize(session, profile).await?;

    // Best-effort; a failed logout never changes the outcome.
    if let Err(e) = session.click(selectors::LOGOUT_MENU).await {
        debug!(profile = %profile.id, error = %e, "logout skipped");
    }

    Ok(confirmation)
}

async fn login(session: &mut dyn WebSession, profile: &Profile) -> Result<(), AgentError> {
    let auth = |e: SessionError| AgentError::Auth(e.to_string());

    session.open(&profile.login.url).await.map_err(auth)?;
    session
        .fill(selectors::LOGIN_USERNAME, &profile.login.username)
        .await
        .map_err(auth)?;
    session
        .fill(selectors::LOGIN_PASSWORD, &profile.login.password)
        .await
        .map_err(auth)?;
    session.click(selectors::LOGIN_SUBMIT).await.map_err(auth)?;

    // A stale session sometimes interposes a "resume session" prompt.
    if session
        .read_text(selectors::RESUME_SESSION)
        .await
        .map_err(auth)?
        .is_some()
    {
        session
            .click(selectors::RESUME_SESSION)
            .await
            .map_err(auth)?;
    }

    match session
        .read_text(selectors::ACCOUNT_MENU)
        .await
        .map_err(auth)?
    {
        Some(_) => {
            debug!(profile = %profile.id, "login successful");
            Ok(())
        }
        None => Err(AgentError::Auth(
            "no signed-in account menu after submitting credentials".to_string(),
        )),
    }
}

async fn search(session: &mut dyn WebSession, profile: &Profile) -> Result<(), AgentError> {
    session.click(selectors::FACILITY_TILE).await?;
    session
        .fill(selectors::DATE_FIELD, &profile.booking.date)
        .await?;
    session.click(selectors::SEARCH_BUTTON).await?;
    debug!(profile = %profile.id, date = %profile.booking.date, "facility search submitted");
    Ok(())
}

async fn select_slot(session: &mut dyn WebSession, profile: &Profile) -> Result<(), AgentError> {
    let booking = &profile.booking;
    let (hour, minute) = parse_time(&booking.time)
        .ok_or_else(|| AgentError::BadTime(booking.time.clone()))?;
    let queries = slot_queries(
        &booking.facility,
        booking.court_number.as_deref(),
        hour,
        minute,
    );

    for selector in &queries {
        match session.click(selector).await {
            Ok(()) => {
                debug!(
                    profile = %profile.id,
                    %selector,
                    facility = %booking.facility,
                    "slot selected"
                );
                return Ok(());
            }
            Err(SessionError::WaitTimeout { .. }) | Err(SessionError::ElementNotFound { .. }) => {
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AgentError::SlotUnavailable(format!(
        "no {} slot at {} on {}",
        booking.facility,
        slot_label(hour, minute),
        booking.date
    )))
}

async fn finalize(session: &mut dyn WebSession, profile: &Profile) -> Result<String, AgentError> {
    session.click(selectors::ADD_TO_CART).await?;
    session
        .fill(selectors::CELL_FIELD, &profile.booking.cell_number)
        .await?;
    session
        .fill(selectors::REASON_FIELD, &profile.booking.booking_reason)
        .await?;
    session.click(selectors::CONTINUE_BUTTON).await?;

    // Success needs a positive confirmation marker; ambiguity is failure.
    match session.read_text(selectors::CONFIRMATION_HEADER).await? {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        Some(_) | None => Err(AgentError::Verify(
            "no confirmation prompt after submitting the reservation".to_string(),
        )),
    }
}

/// Parse a human-entered time ("7 pm", "7:30pm", "19:00") into 24-hour
/// hour/minute.
pub fn parse_time(raw: &str) -> Option<(u32, u32)> {
    let clean = raw.trim().to_lowercase();
    let pm = clean.contains("pm") || clean.contains("p.m");
    let am = clean.contains("am") || clean.contains("a.m");
    let numeric: String = clean
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ':')
        .collect();

    let (hour_str, minute_str) = match numeric.split_once(':') {
        Some((h, m)) => (h, m),
        None => (numeric.as_str(), ""),
    };
    let mut hour: u32 = hour_str.parse().ok()?;
    let minute: u32 = if minute_str.is_empty() {
        0
    } else {
        minute_str.parse().ok()?
    };
    if hour > 23 || minute > 59 {
        return None;
    }

    if pm && hour < 12 {
        hour += 12;
    } else if am && hour == 12 {
        hour = 0;
    }
    Some((hour, minute))
}

fn half(hour: u32) -> &'static str {
    if hour < 12 {
        "am"
    } else {
        "pm"
    }
}

fn twelve(hour: u32) -> u32 {
    if hour % 12 == 0 {
        12
    } else {
        hour % 12
    }
}

/// Display label for a one-hour slot, matching the site's listing format.
pub fn slot_label(hour: u32, minute: u32) -> String {
    let end = (hour + 1) % 24;
    format!(
        "{}:{:02} {} - {}:{:02} {}",
        twelve(hour),
        minute,
        half(hour),
        twelve(end),
        minute,
        half(end)
    )
}

/// Candidate selectors for an available slot button, most specific first.
///
/// The site is inconsistent about how slot links are labelled: some pages use
/// the full range ("7:00 pm - 8:00 pm"), others just the start ("7:00 pm" or
/// "7 pm" on the hour). Court-qualified candidates come first so a preferred
/// court wins whenever it is open, with any court as the fallback.
pub fn slot_queries(
    facility: &str,
    court_number: Option<&str>,
    hour: u32,
    minute: u32,
) -> Vec<String> {
    let mut labels = vec![
        slot_label(hour, minute),
        format!("{}:{:02} {}", twelve(hour), minute, half(hour)),
    ];
    if minute == 0 {
        labels.push(format!("{} {}", twelve(hour), half(hour)));
    }

    let query = |court: Option<&str>, label: &str| {
        let court_clause = court
            .map(|c| format!(r#"[aria-label*="court {c}" i]"#))
            .unwrap_or_default();
        format!(
            r#"a.cart-button.success[aria-label*="{facility}" i]{court_clause}[aria-label*="{label}" i]"#
        )
    };

    let mut queries = Vec::new();
    if let Some(court) = court_number {
        for label in &labels {
            queries.push(query(Some(court), label));
        }
    }
    for label in &labels {
        queries.push(query(None, label));
    }
    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Booking, Login};
    use crate::session::fake::{FakeFactory, Script};
    use crate::status::BookingStatus;

    fn profile(id: &str, username: &str) -> Profile {
        Profile {
            id: id.to_string(),
            login: Login {
                url: "https://example.test/login".to_string(),
                username: username.to_string(),
                password: "secret".to_string(),
            },
            booking: Booking {
                date: "2024-01-01".to_string(),
                time: "7:00 pm".to_string(),
                facility: "badminton".to_string(),
                court_number: None,
                cell_number: "555-0100".to_string(),
                booking_reason: "weekly game".to_string(),
            },
        }
    }

    fn options(screenshots: bool) -> RunOptions {
        RunOptions {
            capture_screenshots: screenshots,
            ..RunOptions::default()
        }
    }

    #[tokio::test]
    async fn successful_booking_yields_success_record() {
        let factory = FakeFactory::new();
        let report = execute(&factory, &profile("user1", "alice"), &options(false)).await;

        assert_eq!(report.outcome.status, BookingStatus::Success);
        assert_eq!(report.outcome.user, "user1");
        assert!(report.screenshot.is_none());
        assert_eq!(factory.open_sessions(), 0, "session must be released");
    }

    #[tokio::test]
    async fn rejected_login_fails_with_login_details() {
        let factory = FakeFactory::new().with_script("alice", Script::LoginRejected);
        let report = execute(&factory, &profile("user1", "alice"), &options(false)).await;

        assert_eq!(report.outcome.status, BookingStatus::Failed);
        let details = report.outcome.details.unwrap();
        assert!(details.contains("login"), "{details}");
        assert_eq!(factory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn missing_slot_fails_as_unavailable() {
        let factory = FakeFactory::new().with_script("alice", Script::SlotMissing);
        let report = execute(&factory, &profile("user1", "alice"), &options(false)).await;

        assert_eq!(report.outcome.status, BookingStatus::Failed);
        let details = report.outcome.details.unwrap();
        assert!(details.contains("slot unavailable"), "{details}");
    }

    #[tokio::test]
    async fn absent_confirmation_is_failure_not_success() {
        let factory = FakeFactory::new().with_script("alice", Script::ConfirmationMissing);
        let report = execute(&factory, &profile("user1", "alice"), &options(false)).await;

        assert_eq!(report.outcome.status, BookingStatus::Failed);
        assert!(report.outcome.details.unwrap().contains("not confirmed"));
    }

    #[tokio::test]
    async fn screenshot_captured_on_failure_too() {
        let factory = FakeFactory::new().with_script("alice", Script::SlotMissing);
        let report = execute(&factory, &profile("user1", "alice"), &options(true)).await;

        assert_eq!(report.outcome.status, BookingStatus::Failed);
        assert!(report.screenshot.is_some());
    }

    #[tokio::test]
    async fn launch_failure_still_produces_a_record() {
        let factory = FakeFactory::launch_fails();
        let report = execute(&factory, &profile("user1", "alice"), &options(false)).await;

        assert_eq!(report.outcome.status, BookingStatus::Failed);
        assert!(report.outcome.details.unwrap().contains("browser"));
    }

    #[test]
    fn parses_common_time_spellings() {
        assert_eq!(parse_time("7:00 pm"), Some((19, 0)));
        assert_eq!(parse_time("7pm"), Some((19, 0)));
        assert_eq!(parse_time("7:30 P.M."), Some((19, 30)));
        assert_eq!(parse_time("19:00"), Some((19, 0)));
        assert_eq!(parse_time("12:15 am"), Some((0, 15)));
        assert_eq!(parse_time("noonish"), None);
        assert_eq!(parse_time("25:00"), None);
    }

    #[test]
    fn slot_label_wraps_midnight_and_noon() {
        assert_eq!(slot_label(19, 0), "7:00 pm - 8:00 pm");
        assert_eq!(slot_label(11, 30), "11:30 am - 12:30 pm");
        assert_eq!(slot_label(23, 0), "11:00 pm - 12:00 am");
    }

    #[test]
    fn slot_queries_cover_alternate_time_spellings() {
        let queries = slot_queries("badminton", None, 19, 0);
        assert_eq!(queries.len(), 3);
        assert!(queries[0].contains("7:00 pm - 8:00 pm"));
        assert!(queries[1].contains(r#"aria-label*="7:00 pm""#));
        assert!(queries[2].contains(r#"aria-label*="7 pm""#));

        // Off the hour there is no bare-hour spelling.
        let queries = slot_queries("badminton", None, 19, 30);
        assert_eq!(queries.len(), 2);
        assert!(queries[1].contains("7:30 pm"));
    }

    #[test]
    fn slot_queries_prefer_the_configured_court() {
        let queries = slot_queries("badminton", Some("3"), 19, 0);
        assert_eq!(queries.len(), 6);
        // Court-qualified candidates come before the any-court fallbacks.
        assert!(queries[..3].iter().all(|q| q.contains("court 3")));
        assert!(queries[3..].iter().all(|q| !q.contains("court 3")));
        assert!(queries.iter().all(|q| q.contains("badminton")));
    }

    #[tokio::test]
    async fn missing_slot_exhausts_every_candidate_before_failing() {
        let factory = FakeFactory::new().with_script("alice", Script::SlotMissing);
        let mut profile = profile("user1", "alice");
        profile.booking.court_number = Some("3".to_string());
        let report = execute(&factory, &profile, &options(false)).await;

        assert_eq!(report.outcome.status, BookingStatus::Failed);
        let details = report.outcome.details.unwrap();
        assert!(details.contains("slot unavailable"), "{details}");
        assert_eq!(factory.open_sessions(), 0);
    }
}
