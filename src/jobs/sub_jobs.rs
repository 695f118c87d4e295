//! Scan and opt-out sub-jobs.
//!
//! Wrap a runner invocation with the bookkeeping around it: history events,
//! rescheduling, newly found profiles and confirmed removals.

use chrono::{DateTime, TimeDelta, Utc};

use super::cancellation::JobCancellation;
use super::dependencies::{BrokerProfileJobDependencies, BrokerProfileRepository};
use super::events::JobEvent;
use super::{BrokerProfileQueryData, HistoryEvent, HistoryEventType, OptOutJobData};
use crate::broker::ExtractedProfile;
use crate::error::JobError;
use crate::runner::stage::StageTracker;

/// What a sub-job did with the job it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubJobOutcome {
    Completed,
    /// Nothing left to do; the runner was never invoked.
    Skipped,
}

fn profile_query_id(query_data: &BrokerProfileQueryData) -> Result<i64, JobError> {
    query_data
        .profile_query_id()
        .ok_or_else(|| JobError::unknown("profile query has not been saved"))
}

fn error_event(error: &JobError) -> HistoryEventType {
    HistoryEventType::Error {
        kind: error.kind().to_string(),
        message: error.to_string(),
    }
}

/// `now` pushed back by a broker-supplied number of hours.
pub fn hours_after(now: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>, JobError> {
    TimeDelta::try_hours(hours)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| JobError::unknown(format!("cannot schedule {hours}h after {now}")))
}

fn into_job_error(err: anyhow::Error) -> JobError {
    err.downcast::<JobError>().unwrap_or_else(JobError::repository)
}

pub async fn run_scan_job(
    query_data: &BrokerProfileQueryData,
    deps: &BrokerProfileJobDependencies,
    show_web_view: bool,
    cancellation: &JobCancellation,
) -> Result<SubJobOutcome, JobError> {
    let broker_id = query_data.data_broker.id.as_str();
    let query_id = profile_query_id(query_data)?;
    let repo = deps.repository.as_ref();

    repo.add_history_event(&HistoryEvent::now(
        broker_id,
        query_id,
        None,
        HistoryEventType::ScanStarted,
    ))
    .map_err(JobError::repository)?;
    repo.update_scan_last_run_date(broker_id, query_id, Utc::now())
        .map_err(JobError::repository)?;
    deps.event_sink.fire(JobEvent::ScanStarted {
        broker_id: broker_id.to_string(),
        profile_query_id: query_id,
    });

    let stage = StageTracker::start();
    let runner = deps.make_runner(query_data, stage.clone());
    let outcome = match runner.scan(query_data, show_web_view, cancellation).await {
        Ok(profiles) => record_scan_result(repo, query_data, query_id, &profiles, Utc::now())
            .map(|()| profiles.len())
            .map_err(into_job_error),
        Err(error) => Err(error),
    };

    match outcome {
        Ok(matches) => {
            deps.event_sink.fire(JobEvent::ScanFinished {
                broker_id: broker_id.to_string(),
                profile_query_id: query_id,
                matches,
                duration: stage.elapsed(),
            });
            Ok(SubJobOutcome::Completed)
        }
        Err(error) => {
            record_scan_error(deps, query_data, &error);
            deps.event_sink.fire(JobEvent::ScanFailed {
                broker_id: broker_id.to_string(),
                profile_query_id: query_id,
                error: error.kind().to_string(),
                stage: stage.current_stage(),
                duration: stage.elapsed(),
            });
            Err(error)
        }
    }
}

fn record_scan_result(
    repo: &dyn BrokerProfileRepository,
    query_data: &BrokerProfileQueryData,
    query_id: i64,
    profiles: &[ExtractedProfile],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let broker_id = query_data.data_broker.id.as_str();
    let next_scan = hours_after(now, query_data.data_broker.scheduling_config.maintenance_scan)?;

    if profiles.is_empty() {
        repo.add_history_event(&HistoryEvent::now(
            broker_id,
            query_id,
            None,
            HistoryEventType::NoMatchFound,
        ))?;
    } else {
        repo.add_history_event(&HistoryEvent::now(
            broker_id,
            query_id,
            None,
            HistoryEventType::MatchesFound {
                count: profiles.len(),
            },
        ))?;

        for profile in profiles {
            let known = query_data
                .opt_out_jobs_data
                .iter()
                .find(|job| job.extracted_profile.identifier == profile.identifier);
            match known {
                None => {
                    let id = repo.save_extracted_profile(broker_id, query_id, profile)?;
                    tracing::info!("New match {} on {broker_id} (id {id})", profile.identifier);
                }
                Some(job) if job.extracted_profile.removed_date.is_some() => {
                    let Some(id) = job.extracted_profile_id() else {
                        continue;
                    };
                    tracing::info!("Match {} reappeared on {broker_id}", profile.identifier);
                    repo.update_removed_date(id, None)?;
                    repo.add_history_event(&HistoryEvent::now(
                        broker_id,
                        query_id,
                        Some(id),
                        HistoryEventType::ReAppearance,
                    ))?;
                    repo.update_opt_out_preferred_run_date(id, Some(now))?;
                }
                Some(_) => {}
            }
        }
    }

    // Requested opt-outs whose listing is gone have been honoured.
    for job in &query_data.opt_out_jobs_data {
        let Some(id) = job.extracted_profile_id() else {
            continue;
        };
        let still_listed = profiles
            .iter()
            .any(|p| p.identifier == job.extracted_profile.identifier);
        let requested = job
            .history_events
            .iter()
            .any(|e| e.event_type == HistoryEventType::OptOutRequested);
        if job.extracted_profile.removed_date.is_none() && requested && !still_listed {
            repo.update_removed_date(id, Some(now))?;
            repo.add_history_event(&HistoryEvent::now(
                broker_id,
                query_id,
                Some(id),
                HistoryEventType::OptOutConfirmed,
            ))?;
        }
    }

    repo.update_scan_preferred_run_date(
        broker_id,
        query_id,
        Some(next_scan),
    )
}

/// Log a failed scan and push it back by the broker's retry interval.
///
/// A cancelled scan keeps its date so the next pass picks it up again.
pub fn record_scan_error(
    deps: &BrokerProfileJobDependencies,
    query_data: &BrokerProfileQueryData,
    error: &JobError,
) {
    let Some(query_id) = query_data.profile_query_id() else {
        return;
    };
    let broker = &query_data.data_broker;
    let repo = deps.repository.as_ref();

    let result = repo
        .add_history_event(&HistoryEvent::now(
            &broker.id,
            query_id,
            None,
            error_event(error),
        ))
        .and_then(|()| {
            if *error == JobError::Cancelled {
                return Ok(());
            }
            let retry_at = hours_after(Utc::now(), broker.scheduling_config.retry_error)?;
            repo.update_scan_preferred_run_date(&broker.id, query_id, Some(retry_at))
        });
    if let Err(e) = result {
        tracing::warn!("Could not record scan error for {}: {e}", broker.id);
    }
}

pub async fn run_opt_out_job(
    query_data: &BrokerProfileQueryData,
    job: &OptOutJobData,
    deps: &BrokerProfileJobDependencies,
    show_web_view: bool,
    cancellation: &JobCancellation,
) -> Result<SubJobOutcome, JobError> {
    let broker = &query_data.data_broker;
    let query_id = profile_query_id(query_data)?;
    let profile = &job.extracted_profile;
    let extracted_id = profile
        .id
        .ok_or_else(|| JobError::unknown("extracted profile has not been saved"))?;

    if job.is_settled(&broker.scheduling_config) {
        tracing::debug!(
            "Skipping opt-out of {} on {}: removed or out of attempts",
            profile.identifier,
            broker.id
        );
        return Ok(SubJobOutcome::Skipped);
    }

    let repo = deps.repository.as_ref();
    repo.add_history_event(&HistoryEvent::now(
        &broker.id,
        query_id,
        Some(extracted_id),
        HistoryEventType::OptOutStarted,
    ))
    .and_then(|()| repo.increment_opt_out_attempt_count(extracted_id))
    .and_then(|()| repo.update_opt_out_last_run_date(extracted_id, Utc::now()))
    .map_err(JobError::repository)?;
    deps.event_sink.fire(JobEvent::OptOutStarted {
        broker_id: broker.id.clone(),
        extracted_profile_id: extracted_id,
    });

    let stage = StageTracker::start();
    let runner = deps.make_runner(query_data, stage.clone());
    let outcome = match runner
        .opt_out(query_data, profile, show_web_view, cancellation)
        .await
    {
        Ok(()) => record_opt_out_requested(repo, query_data, query_id, extracted_id, Utc::now()),
        Err(error) => Err(error),
    };

    match outcome {
        Ok(()) => {
            deps.event_sink.fire(JobEvent::OptOutRequested {
                broker_id: broker.id.clone(),
                extracted_profile_id: extracted_id,
                duration: stage.elapsed(),
            });
            Ok(SubJobOutcome::Completed)
        }
        Err(error) => {
            record_opt_out_error(deps, query_data, job, &error);
            deps.event_sink.fire(JobEvent::OptOutFailed {
                broker_id: broker.id.clone(),
                extracted_profile_id: extracted_id,
                error: error.kind().to_string(),
                stage: stage.current_stage(),
                duration: stage.elapsed(),
            });
            Err(error)
        }
    }
}

fn record_opt_out_requested(
    repo: &dyn BrokerProfileRepository,
    query_data: &BrokerProfileQueryData,
    query_id: i64,
    extracted_id: i64,
    now: DateTime<Utc>,
) -> Result<(), JobError> {
    let broker = &query_data.data_broker;
    let schedule = &broker.scheduling_config;
    let next_opt_out = hours_after(now, schedule.maintenance_scan)?;
    let confirm_scan = hours_after(now, schedule.confirm_opt_out_scan)?;

    repo.add_history_event(&HistoryEvent::now(
        &broker.id,
        query_id,
        Some(extracted_id),
        HistoryEventType::OptOutRequested,
    ))
    .and_then(|()| repo.update_opt_out_preferred_run_date(extracted_id, Some(next_opt_out)))
    .and_then(|()| repo.update_scan_preferred_run_date(&broker.id, query_id, Some(confirm_scan)))
    .map_err(JobError::repository)
}

/// Log a failed opt-out and push it back by the broker's retry interval.
pub fn record_opt_out_error(
    deps: &BrokerProfileJobDependencies,
    query_data: &BrokerProfileQueryData,
    job: &OptOutJobData,
    error: &JobError,
) {
    let (Some(query_id), Some(extracted_id)) =
        (query_data.profile_query_id(), job.extracted_profile_id())
    else {
        return;
    };
    let broker = &query_data.data_broker;
    let repo = deps.repository.as_ref();

    let result = repo
        .add_history_event(&HistoryEvent::now(
            &broker.id,
            query_id,
            Some(extracted_id),
            error_event(error),
        ))
        .and_then(|()| {
            if *error == JobError::Cancelled {
                return Ok(());
            }
            let retry_at = hours_after(Utc::now(), broker.scheduling_config.retry_error)?;
            repo.update_opt_out_preferred_run_date(extracted_id, Some(retry_at))
        });
    if let Err(e) = result {
        tracing::warn!("Could not record opt-out error for {}: {e}", broker.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::broker::DataBroker;
    use crate::db::Database;
    use crate::jobs::events::RecordingEventSink;
    use crate::jobs::execution::test_support::{Behaviour, ScriptedRunnerFactory, deps, fast_config};
    use crate::jobs::fixtures::{broker, profile, query};

    struct Setup {
        db: Arc<Database>,
        factory: Arc<ScriptedRunnerFactory>,
        events: Arc<RecordingEventSink>,
        deps: Arc<BrokerProfileJobDependencies>,
        query_id: i64,
    }

    fn setup_with(data_broker: DataBroker, behaviours: Vec<Behaviour>) -> Setup {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.upsert_broker(&data_broker).unwrap();
        let mut q = query(0);
        q.id = None;
        let query_id = db.add_profile_query(&q).unwrap();
        let factory = Arc::new(ScriptedRunnerFactory::with(behaviours));
        let events = Arc::new(RecordingEventSink::default());
        let deps = deps(db.clone(), factory.clone(), events.clone(), fast_config());
        Setup {
            db,
            factory,
            events,
            deps,
            query_id,
        }
    }

    fn setup(behaviours: Vec<Behaviour>) -> Setup {
        setup_with(broker("acme"), behaviours)
    }

    fn load(setup: &Setup) -> BrokerProfileQueryData {
        setup
            .db
            .fetch_broker_profile_query_data("acme", setup.query_id)
            .unwrap()
            .unwrap()
    }

    fn scan_events(data: &BrokerProfileQueryData) -> Vec<HistoryEventType> {
        data.scan_job_data
            .as_ref()
            .unwrap()
            .history_events
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    fn found(identifier: &str) -> ExtractedProfile {
        let mut p = profile(0, identifier);
        p.id = None;
        p
    }

    /// Saves a listing as if an earlier scan had found it.
    fn known_listing(setup: &Setup, identifier: &str) -> i64 {
        setup
            .db
            .save_extracted_profile("acme", setup.query_id, &found(identifier))
            .unwrap()
    }

    #[tokio::test]
    async fn test_scan_saves_new_matches() {
        let setup = setup(vec![Behaviour::Succeed(vec![found("jane-smith")])]);
        let data = load(&setup);

        run_scan_job(&data, &setup.deps, false, &JobCancellation::default())
            .await
            .unwrap();

        let data = load(&setup);
        assert_eq!(
            scan_events(&data),
            vec![
                HistoryEventType::ScanStarted,
                HistoryEventType::MatchesFound { count: 1 }
            ]
        );
        let scan = data.scan_job_data.as_ref().unwrap();
        assert!(scan.last_run_date.is_some());
        assert!(scan.preferred_run_date.unwrap() > Utc::now() + Duration::hours(119));

        assert_eq!(data.opt_out_jobs_data.len(), 1);
        let opt_out = &data.opt_out_jobs_data[0];
        assert_eq!(opt_out.extracted_profile.identifier, "jane-smith");
        assert_eq!(opt_out.preferred_run_date, None);

        let events = setup.events.events();
        assert!(matches!(events[0], JobEvent::ScanStarted { .. }));
        assert!(matches!(events[1], JobEvent::ScanFinished { matches: 1, .. }));
    }

    #[tokio::test]
    async fn test_scan_without_matches() {
        let setup = setup(vec![Behaviour::Succeed(vec![])]);

        run_scan_job(&load(&setup), &setup.deps, false, &JobCancellation::default())
            .await
            .unwrap();

        let data = load(&setup);
        assert_eq!(
            scan_events(&data).last(),
            Some(&HistoryEventType::NoMatchFound)
        );
        assert!(data.opt_out_jobs_data.is_empty());
    }

    #[tokio::test]
    async fn test_requested_opt_out_confirmed_when_listing_gone() {
        let setup = setup(vec![Behaviour::Succeed(vec![found("someone-else")])]);
        let id = known_listing(&setup, "jane-smith");
        setup
            .db
            .add_history_event(&HistoryEvent::now(
                "acme",
                setup.query_id,
                Some(id),
                HistoryEventType::OptOutRequested,
            ))
            .unwrap();

        run_scan_job(&load(&setup), &setup.deps, false, &JobCancellation::default())
            .await
            .unwrap();

        let data = load(&setup);
        let job = data
            .opt_out_jobs_data
            .iter()
            .find(|j| j.extracted_profile_id() == Some(id))
            .unwrap();
        assert!(job.extracted_profile.removed_date.is_some());
        assert_eq!(
            job.history_events.last().map(|e| &e.event_type),
            Some(&HistoryEventType::OptOutConfirmed)
        );
        // The other listing is new and gets its own opt-out
        assert_eq!(data.opt_out_jobs_data.len(), 2);
    }

    #[tokio::test]
    async fn test_unrequested_listing_is_not_confirmed() {
        let setup = setup(vec![Behaviour::Succeed(vec![])]);
        let id = known_listing(&setup, "jane-smith");

        run_scan_job(&load(&setup), &setup.deps, false, &JobCancellation::default())
            .await
            .unwrap();

        let data = load(&setup);
        let job = &data.opt_out_jobs_data[0];
        assert_eq!(job.extracted_profile_id(), Some(id));
        assert!(job.extracted_profile.removed_date.is_none());
    }

    #[tokio::test]
    async fn test_removed_listing_reappears() {
        let setup = setup(vec![Behaviour::Succeed(vec![found("jane-smith")])]);
        let id = known_listing(&setup, "jane-smith");
        setup
            .db
            .update_removed_date(id, Some(Utc::now() - Duration::days(10)))
            .unwrap();
        setup
            .db
            .update_opt_out_preferred_run_date(id, Some(Utc::now() + Duration::days(30)))
            .unwrap();

        run_scan_job(&load(&setup), &setup.deps, false, &JobCancellation::default())
            .await
            .unwrap();

        let data = load(&setup);
        assert_eq!(data.opt_out_jobs_data.len(), 1);
        let job = &data.opt_out_jobs_data[0];
        assert!(job.extracted_profile.removed_date.is_none());
        assert!(job.preferred_run_date.unwrap() <= Utc::now());
        assert_eq!(
            job.history_events.last().map(|e| &e.event_type),
            Some(&HistoryEventType::ReAppearance)
        );
    }

    #[tokio::test]
    async fn test_scan_error_reschedules() {
        let setup = setup(vec![Behaviour::Fail(JobError::unknown("page changed"))]);

        let result =
            run_scan_job(&load(&setup), &setup.deps, false, &JobCancellation::default()).await;
        assert_eq!(result, Err(JobError::unknown("page changed")));

        let data = load(&setup);
        assert!(matches!(
            scan_events(&data).last(),
            Some(HistoryEventType::Error { kind, .. }) if kind == "unknown"
        ));
        let next = data.scan_job_data.unwrap().preferred_run_date.unwrap();
        assert!(next > Utc::now() + Duration::hours(47));
        assert!(
            setup
                .events
                .events()
                .iter()
                .any(|e| matches!(e, JobEvent::ScanFailed { error, .. } if error == "unknown"))
        );
    }

    #[tokio::test]
    async fn test_cancelled_scan_keeps_its_date() {
        let setup = setup(vec![Behaviour::Fail(JobError::Cancelled)]);
        let before = load(&setup).scan_job_data.unwrap().preferred_run_date;

        let result =
            run_scan_job(&load(&setup), &setup.deps, false, &JobCancellation::default()).await;
        assert_eq!(result, Err(JobError::Cancelled));

        let data = load(&setup);
        assert!(matches!(
            scan_events(&data).last(),
            Some(HistoryEventType::Error { kind, .. }) if kind == "cancelled"
        ));
        assert_eq!(data.scan_job_data.unwrap().preferred_run_date, before);
    }

    #[tokio::test]
    async fn test_opt_out_success_schedules_confirmation() {
        let setup = setup(vec![]);
        let id = known_listing(&setup, "jane-smith");
        let data = load(&setup);

        run_opt_out_job(
            &data,
            &data.opt_out_jobs_data[0],
            &setup.deps,
            false,
            &JobCancellation::default(),
        )
        .await
        .unwrap();

        let data = load(&setup);
        let job = &data.opt_out_jobs_data[0];
        assert_eq!(job.attempt_count, 1);
        assert!(job.last_run_date.is_some());
        let events: Vec<_> = job.history_events.iter().map(|e| &e.event_type).collect();
        assert_eq!(
            events,
            vec![
                &HistoryEventType::OptOutStarted,
                &HistoryEventType::OptOutRequested
            ]
        );
        assert!(job.preferred_run_date.unwrap() > Utc::now() + Duration::hours(119));

        let scan_date = data.scan_job_data.unwrap().preferred_run_date.unwrap();
        assert!(scan_date > Utc::now() + Duration::hours(71));
        assert!(scan_date < Utc::now() + Duration::hours(73));

        assert_eq!(setup.factory.runs(), vec![("acme".to_string(), setup.query_id, Some(id))]);
    }

    #[tokio::test]
    async fn test_opt_out_failure_reschedules() {
        let setup = setup(vec![Behaviour::Fail(JobError::NoOptOutStep)]);
        known_listing(&setup, "jane-smith");
        let data = load(&setup);

        let result = run_opt_out_job(
            &data,
            &data.opt_out_jobs_data[0],
            &setup.deps,
            false,
            &JobCancellation::default(),
        )
        .await;
        assert_eq!(result, Err(JobError::NoOptOutStep));

        let data = load(&setup);
        let job = &data.opt_out_jobs_data[0];
        assert_eq!(job.attempt_count, 1);
        assert!(job.preferred_run_date.unwrap() > Utc::now() + Duration::hours(47));
        assert!(matches!(
            job.history_events.last().map(|e| &e.event_type),
            Some(HistoryEventType::Error { kind, .. }) if kind == "no_opt_out_step"
        ));
    }

    #[tokio::test]
    async fn test_opt_out_skipped_after_max_attempts() {
        let mut limited = broker("acme");
        limited.scheduling_config.max_attempts = Some(2);
        let setup = setup_with(limited, vec![]);
        let id = known_listing(&setup, "jane-smith");
        setup.db.increment_opt_out_attempt_count(id).unwrap();
        setup.db.increment_opt_out_attempt_count(id).unwrap();
        let data = load(&setup);

        let outcome = run_opt_out_job(
            &data,
            &data.opt_out_jobs_data[0],
            &setup.deps,
            false,
            &JobCancellation::default(),
        )
        .await;

        assert_eq!(outcome, Ok(SubJobOutcome::Skipped));
        assert!(setup.factory.runs().is_empty());
        assert!(load(&setup).opt_out_jobs_data[0].history_events.is_empty());
    }

    #[tokio::test]
    async fn test_opt_out_skipped_when_removed() {
        let setup = setup(vec![]);
        let id = known_listing(&setup, "jane-smith");
        setup.db.update_removed_date(id, Some(Utc::now())).unwrap();
        let data = load(&setup);

        let outcome = run_opt_out_job(
            &data,
            &data.opt_out_jobs_data[0],
            &setup.deps,
            false,
            &JobCancellation::default(),
        )
        .await;

        assert_eq!(outcome, Ok(SubJobOutcome::Skipped));
        assert!(setup.factory.runs().is_empty());
        assert_eq!(load(&setup).opt_out_jobs_data[0].attempt_count, 0);
    }

    #[test]
    fn test_hours_after_rejects_out_of_range() {
        let now = Utc::now();
        assert_eq!(hours_after(now, 48).unwrap(), now + Duration::hours(48));
        assert!(matches!(
            hours_after(now, 10_000_000_000),
            Err(JobError::Unknown(_))
        ));
        assert!(hours_after(now, i64::MAX).is_err());
    }

    #[tokio::test]
    async fn test_unrepresentable_maintenance_interval_fails_the_scan() {
        let mut far = broker("acme");
        far.scheduling_config.maintenance_scan = 10_000_000_000;
        let setup = setup_with(far, vec![Behaviour::Succeed(vec![])]);

        let result =
            run_scan_job(&load(&setup), &setup.deps, false, &JobCancellation::default()).await;
        assert!(matches!(result, Err(JobError::Unknown(_))));

        // Nothing of the result was written; the scan is retried later.
        let data = load(&setup);
        let events = scan_events(&data);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], HistoryEventType::Error { kind, .. } if kind == "unknown"));
        let next = data.scan_job_data.unwrap().preferred_run_date.unwrap();
        assert!(next > Utc::now() + Duration::hours(47));
        assert!(
            setup
                .events
                .events()
                .iter()
                .any(|e| matches!(e, JobEvent::ScanFailed { .. }))
        );
    }

    #[tokio::test]
    async fn test_unrepresentable_intervals_fail_the_opt_out() {
        let mut far = broker("acme");
        far.scheduling_config.confirm_opt_out_scan = i64::MAX;
        far.scheduling_config.retry_error = -i64::MAX;
        let setup = setup_with(far, vec![]);
        known_listing(&setup, "jane-smith");
        let data = load(&setup);

        let result = run_opt_out_job(
            &data,
            &data.opt_out_jobs_data[0],
            &setup.deps,
            false,
            &JobCancellation::default(),
        )
        .await;
        assert!(matches!(result, Err(JobError::Unknown(_))));

        let job = &load(&setup).opt_out_jobs_data[0];
        assert_eq!(job.attempt_count, 1);
        assert_eq!(job.preferred_run_date, None);
        assert!(matches!(
            job.history_events.last().map(|e| &e.event_type),
            Some(HistoryEventType::Error { kind, .. }) if kind == "unknown"
        ));
    }
}
