//! Bounded-concurrency fan-out of submission agents.
//!
//! Up to `max_workers` agents run at once; the rest queue on a semaphore.
//! Results land in by-index slots so the returned order is always the
//! profile-declaration order, whatever the completion order. One agent's
//! failure, timeout, or panic never touches its siblings.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::agent::{self, AgentReport, RunOptions};
use crate::config::Profile;
use crate::session::SessionFactory;

/// Run every profile's agent and return one report per profile, in
/// declaration order.
pub async fn run_pool(
    factory: Arc<dyn SessionFactory>,
    profiles: &[Profile],
    options: &RunOptions,
) -> Vec<AgentReport> {
    let workers = options.max_workers.max(1);
    info!(
        profiles = profiles.len(),
        max_workers = workers,
        timeout_secs = options.profile_timeout.as_secs(),
        "dispatching booking agents"
    );

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks: JoinSet<(usize, AgentReport)> = JoinSet::new();

    for (index, profile) in profiles.iter().cloned().enumerate() {
        let factory = factory.clone();
        let options = options.clone();
        let semaphore = semaphore.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                // Only reachable if the semaphore is closed, which we never do.
                return (index, AgentReport::failed(&profile.id, "worker pool shut down"));
            };

            let report = match tokio::time::timeout(
                options.profile_timeout,
                agent::execute(factory.as_ref(), &profile, &options),
            )
            .await
            {
                Ok(report) => report,
                Err(_) => {
                    // Dropping the timed-out future tears the session down.
                    error!(profile = %profile.id, "agent exceeded timeout");
                    AgentReport::failed(&profile.id, "timeout")
                }
            };
            (index, report)
        });
    }

    let mut slots: Vec<Option<AgentReport>> = Vec::new();
    slots.resize_with(profiles.len(), || None);

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, report)) => slots[index] = Some(report),
            Err(e) => {
                // The panicking task's slot stays empty and is backfilled
                // below; we cannot know which index it held.
                error!(error = %e, "agent task panicked");
            }
        }
    }

    slots
        .into_iter()
        .zip(profiles)
        .map(|(slot, profile)| {
            slot.unwrap_or_else(|| AgentReport::failed(&profile.id, "agent panicked"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::{Booking, Login};
    use crate::session::fake::{FakeFactory, Script};
    use crate::status::BookingStatus;

    fn profile(id: &str) -> Profile {
        Profile {
            id: id.to_string(),
            login: Login {
                url: "https://example.test/login".to_string(),
                username: id.to_string(),
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

    fn options(max_workers: usize, timeout: Duration) -> RunOptions {
        RunOptions {
            max_workers,
            profile_timeout: timeout,
            ..RunOptions::default()
        }
    }

    #[tokio::test]
    async fn one_report_per_profile_in_declaration_order() {
        let factory = Arc::new(
            FakeFactory::new()
                .with_script("user2", Script::LoginRejected)
                .with_step_delay(Duration::from_millis(20)),
        );
        let profiles = vec![profile("user1"), profile("user2"), profile("user3")];

        let reports = run_pool(
            factory.clone(),
            &profiles,
            &options(2, Duration::from_secs(30)),
        )
        .await;

        let users: Vec<_> = reports.iter().map(|r| r.outcome.user.as_str()).collect();
        assert_eq!(users, vec!["user1", "user2", "user3"]);
        assert_eq!(reports[0].outcome.status, BookingStatus::Success);
        assert_eq!(reports[1].outcome.status, BookingStatus::Failed);
        assert!(reports[1].outcome.details.as_ref().unwrap().contains("login"));
        assert_eq!(reports[2].outcome.status, BookingStatus::Success);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_max_workers() {
        let factory = Arc::new(FakeFactory::new().with_step_delay(Duration::from_millis(50)));
        let profiles: Vec<Profile> = (1..=6).map(|i| profile(&format!("user{i}"))).collect();

        run_pool(
            factory.clone(),
            &profiles,
            &options(2, Duration::from_secs(30)),
        )
        .await;

        assert!(
            factory.peak_concurrency() <= 2,
            "peak was {}",
            factory.peak_concurrency()
        );
        assert_eq!(factory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn timed_out_agent_fails_with_timeout_and_releases_session() {
        let factory = Arc::new(FakeFactory::new().with_default_script(Script::Hangs));
        let profiles = vec![profile("user1")];

        let reports = run_pool(
            factory.clone(),
            &profiles,
            &options(1, Duration::from_millis(100)),
        )
        .await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome.status, BookingStatus::Failed);
        assert_eq!(reports[0].outcome.details.as_deref(), Some("timeout"));
        assert_eq!(factory.open_sessions(), 0, "session must be released");
    }

    #[tokio::test]
    async fn hung_sibling_does_not_block_others() {
        let factory = Arc::new(FakeFactory::new().with_script("user1", Script::Hangs));
        let profiles = vec![profile("user1"), profile("user2")];

        let reports = run_pool(
            factory.clone(),
            &profiles,
            &options(2, Duration::from_millis(200)),
        )
        .await;

        assert_eq!(reports[0].outcome.details.as_deref(), Some("timeout"));
        assert_eq!(reports[1].outcome.status, BookingStatus::Success);
    }

    #[tokio::test]
    async fn more_profiles_than_workers_all_complete() {
        let factory = Arc::new(FakeFactory::new());
        let profiles: Vec<Profile> = (1..=5).map(|i| profile(&format!("user{i}"))).collect();

        let reports = run_pool(
            factory.clone(),
            &profiles,
            &options(1, Duration::from_secs(30)),
        )
        .await;

        assert_eq!(reports.len(), 5);
        assert!(reports
            .iter()
            .all(|r| r.outcome.status == BookingStatus::Success));
    }
}
