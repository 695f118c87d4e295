//! Drives one scan or opt-out through a broker's action script.

pub mod actions;
pub mod stage;
pub mod surface;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::broker::{Action, ActionType, ExtractedProfile, Step};
use crate::error::JobError;
use crate::jobs::BrokerProfileQueryData;
use crate::jobs::cancellation::JobCancellation;
use crate::jobs::dependencies::SubJobRunnerFactory;
use crate::jobs::events::{EventSink, JobEvent};
use actions::ActionsHandler;
use stage::StageTracker;
use surface::{ActionContext, ActionOutcome, AutomationSurface, SurfaceFactory};

/// A single-use runner bound to one broker profile query.
#[async_trait]
pub trait BrokerJobRunner: Send {
    async fn scan(
        self: Box<Self>,
        query_data: &BrokerProfileQueryData,
        show_web_view: bool,
        cancellation: &JobCancellation,
    ) -> Result<Vec<ExtractedProfile>, JobError>;

    async fn opt_out(
        self: Box<Self>,
        query_data: &BrokerProfileQueryData,
        extracted_profile: &ExtractedProfile,
        show_web_view: bool,
        cancellation: &JobCancellation,
    ) -> Result<(), JobError>;
}

/// How many times a failing action is re-attempted before the job fails.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub default: u32,
    pub per_action_type: HashMap<ActionType, u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // One retry for expectation checks, none for anything else.
        Self {
            default: 0,
            per_action_type: HashMap::from([(ActionType::Expectation, 1)]),
        }
    }
}

impl RetryPolicy {
    pub fn retries_for(&self, action_type: ActionType) -> u32 {
        self.per_action_type
            .get(&action_type)
            .copied()
            .unwrap_or(self.default)
    }
}

/// Runs a broker step on an [`AutomationSurface`].
pub struct ActionScriptRunner {
    surface: Box<dyn AutomationSurface>,
    action_await_time: Duration,
    retry_policy: RetryPolicy,
    events: Arc<dyn EventSink>,
    stage: StageTracker,
}

impl ActionScriptRunner {
    pub fn new(
        surface: Box<dyn AutomationSurface>,
        action_await_time: Duration,
        retry_policy: RetryPolicy,
        events: Arc<dyn EventSink>,
        stage: StageTracker,
    ) -> Self {
        Self {
            surface,
            action_await_time,
            retry_policy,
            events,
            stage,
        }
    }

    async fn run_step(
        &mut self,
        step: &Step,
        context: &ActionContext,
        show_web_view: bool,
        cancellation: &JobCancellation,
    ) -> Result<Vec<ExtractedProfile>, JobError> {
        self.stage.begin("initialize");
        if let Err(err) = self.surface.initialize(show_web_view).await {
            self.surface.finish().await;
            return Err(JobError::Unknown(format!("surface failed to start: {err}")));
        }

        let result = self.run_actions(step, context, cancellation).await;
        self.surface.finish().await;
        result
    }

    async fn run_actions(
        &mut self,
        step: &Step,
        context: &ActionContext,
        cancellation: &JobCancellation,
    ) -> Result<Vec<ExtractedProfile>, JobError> {
        let mut handler = ActionsHandler::new(step);
        let mut extracted = Vec::new();

        loop {
            tokio::time::sleep(self.action_await_time).await;
            if !cancellation.should_run_next_step() {
                tracing::info!(
                    "Stopping {} with {} action(s) left: cancelled",
                    context.broker.id,
                    handler.remaining()
                );
                return Err(JobError::Cancelled);
            }
            let Some(action) = handler.next_action() else {
                return Ok(extracted);
            };

            self.stage.begin(format!("action:{}", action.id));
            match self.run_action(action, context, cancellation).await? {
                ActionOutcome::Completed => {}
                ActionOutcome::ExtractedProfiles(profiles) => {
                    tracing::debug!(
                        "Action {} extracted {} profile(s)",
                        action.id,
                        profiles.len()
                    );
                    extracted.extend(profiles);
                }
            }
        }
    }

    /// Run one action, re-attempting it on failure within its retry budget.
    async fn run_action(
        &mut self,
        action: &Action,
        context: &ActionContext,
        cancellation: &JobCancellation,
    ) -> Result<ActionOutcome, JobError> {
        let retries = self.retry_policy.retries_for(action.action_type);
        let mut attempt = 0;

        loop {
            match self.surface.run_action(action, context).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if !cancellation.should_run_next_step() => {
                    tracing::info!(
                        "Action {} on {} failed after cancellation: {err}",
                        action.id,
                        context.broker.id
                    );
                    return Err(JobError::Cancelled);
                }
                Err(err) if attempt < retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Action {} on {} failed, retrying ({attempt}/{retries}): {err}",
                        action.id,
                        context.broker.id
                    );
                    self.events.fire(JobEvent::ActionRetried {
                        broker_id: context.broker.id.clone(),
                        action_id: action.id.clone(),
                        attempt,
                    });
                    tokio::time::sleep(self.action_await_time).await;
                }
                Err(err) => {
                    return Err(JobError::Unknown(format!(
                        "action {} failed: {err}",
                        action.id
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl BrokerJobRunner for ActionScriptRunner {
    async fn scan(
        self: Box<Self>,
        query_data: &BrokerProfileQueryData,
        show_web_view: bool,
        cancellation: &JobCancellation,
    ) -> Result<Vec<ExtractedProfile>, JobError> {
        let step = query_data
            .data_broker
            .scan_step()
            .ok_or(JobError::NoScanStep)?;
        let context = ActionContext {
            broker: query_data.data_broker.clone(),
            profile_query: query_data.profile_query.clone(),
            extracted_profile: None,
        };
        let mut runner = self;
        runner
            .run_step(step, &context, show_web_view, cancellation)
            .await
    }

    async fn opt_out(
        self: Box<Self>,
        query_data: &BrokerProfileQueryData,
        extracted_profile: &ExtractedProfile,
        show_web_view: bool,
        cancellation: &JobCancellation,
    ) -> Result<(), JobError> {
        let step = query_data
            .data_broker
            .opt_out_step()
            .ok_or(JobError::NoOptOutStep)?;
        let context = ActionContext {
            broker: query_data.data_broker.clone(),
            profile_query: query_data.profile_query.clone(),
            extracted_profile: Some(extracted_profile.clone()),
        };
        let mut runner = self;
        runner
            .run_step(step, &context, show_web_view, cancellation)
            .await
            .map(|_| ())
    }
}

/// Builds an [`ActionScriptRunner`] on a fresh surface for every job.
pub struct ActionRunnerFactory {
    surfaces: Arc<dyn SurfaceFactory>,
    action_await_time: Duration,
    retry_policy: RetryPolicy,
    events: Arc<dyn EventSink>,
}

impl ActionRunnerFactory {
    pub fn new(
        surfaces: Arc<dyn SurfaceFactory>,
        action_await_time: Duration,
        retry_policy: RetryPolicy,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            surfaces,
            action_await_time,
            retry_policy,
            events,
        }
    }
}

impl SubJobRunnerFactory for ActionRunnerFactory {
    fn make_runner(
        &self,
        _query_data: &BrokerProfileQueryData,
        stage: StageTracker,
    ) -> Box<dyn BrokerJobRunner> {
        Box::new(ActionScriptRunner::new(
            self.surfaces.make_surface(),
            self.action_await_time,
            self.retry_policy.clone(),
            Arc::clone(&self.events),
            stage,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::broker::StepType;
    use crate::jobs::events::RecordingEventSink;
    use crate::jobs::fixtures::{broker, profile, query};

    type Script = Arc<Mutex<VecDeque<anyhow::Result<ActionOutcome>>>>;

    /// Replays scripted results; anything past the script completes.
    struct ScriptedSurface {
        script: Script,
        calls: Arc<Mutex<Vec<String>>>,
        finished: Arc<Mutex<bool>>,
        cancel_after_first: Option<JobCancellation>,
        fail_initialize: bool,
    }

    #[async_trait]
    impl AutomationSurface for ScriptedSurface {
        async fn initialize(&mut self, _show_web_view: bool) -> anyhow::Result<()> {
            if self.fail_initialize {
                anyhow::bail!("browser crashed on launch");
            }
            Ok(())
        }

        async fn run_action(
            &mut self,
            action: &Action,
            _context: &ActionContext,
        ) -> anyhow::Result<ActionOutcome> {
            self.calls.lock().unwrap().push(action.id.clone());
            if let Some(cancellation) = &self.cancel_after_first {
                cancellation.cancel();
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(ActionOutcome::Completed))
        }

        async fn finish(&mut self) {
            *self.finished.lock().unwrap() = true;
        }
    }

    struct Harness {
        calls: Arc<Mutex<Vec<String>>>,
        finished: Arc<Mutex<bool>>,
        events: Arc<RecordingEventSink>,
    }

    fn runner(
        script: Vec<anyhow::Result<ActionOutcome>>,
        cancel_after_first: Option<JobCancellation>,
    ) -> (Box<dyn BrokerJobRunner>, Harness) {
        build_runner(script, cancel_after_first, false)
    }

    fn build_runner(
        script: Vec<anyhow::Result<ActionOutcome>>,
        cancel_after_first: Option<JobCancellation>,
        fail_initialize: bool,
    ) -> (Box<dyn BrokerJobRunner>, Harness) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(Mutex::new(false));
        let events = Arc::new(RecordingEventSink::default());
        let surface = ScriptedSurface {
            script: Arc::new(Mutex::new(script.into())),
            calls: Arc::clone(&calls),
            finished: Arc::clone(&finished),
            cancel_after_first,
            fail_initialize,
        };
        let runner = ActionScriptRunner::new(
            Box::new(surface),
            Duration::ZERO,
            RetryPolicy::default(),
            events.clone(),
            StageTracker::start(),
        );
        (
            Box::new(runner),
            Harness {
                calls,
                finished,
                events,
            },
        )
    }

    fn query_data() -> BrokerProfileQueryData {
        BrokerProfileQueryData {
            data_broker: broker("acme"),
            profile_query: query(1),
            scan_job_data: None,
            opt_out_jobs_data: vec![],
        }
    }

    fn action(id: &str, action_type: ActionType) -> Action {
        Action {
            id: id.into(),
            action_type,
            payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_scan_collects_every_extraction() {
        let mut data = query_data();
        data.data_broker.steps[0].actions = vec![
            action("extract-1", ActionType::Extract),
            action("extract-2", ActionType::Extract),
        ];
        let (runner, harness) = runner(
            vec![
                Ok(ActionOutcome::ExtractedProfiles(vec![profile(1, "a")])),
                Ok(ActionOutcome::ExtractedProfiles(vec![
                    profile(2, "b"),
                    profile(3, "c"),
                ])),
            ],
            None,
        );

        let cancellation = JobCancellation::default();
        let profiles = runner.scan(&data, false, &cancellation).await.unwrap();

        let ids: Vec<_> = profiles.iter().map(|p| p.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(*harness.calls.lock().unwrap(), vec!["extract-1", "extract-2"]);
        assert!(*harness.finished.lock().unwrap());
    }

    #[tokio::test]
    async fn test_opt_out_without_step_fails_fast() {
        let mut data = query_data();
        data.data_broker.steps.retain(|s| s.step_type == StepType::Scan);
        let (runner, harness) = runner(vec![], None);

        let result = runner
            .opt_out(&data, &profile(1, "a"), false, &JobCancellation::default())
            .await;

        assert_eq!(result, Err(JobError::NoOptOutStep));
        assert!(harness.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_opt_out_completes_when_script_exhausted() {
        let (runner, harness) = runner(vec![], None);
        let result = runner
            .opt_out(
                &query_data(),
                &profile(1, "a"),
                false,
                &JobCancellation::default(),
            )
            .await;
        assert_eq!(result, Ok(()));
        assert_eq!(*harness.calls.lock().unwrap(), vec!["submit"]);
    }

    #[tokio::test]
    async fn test_cancellation_between_actions() {
        let cancellation = JobCancellation::new(CancellationToken::new());
        let (runner, harness) = runner(vec![], Some(cancellation.clone()));

        let result = runner.scan(&query_data(), false, &cancellation).await;

        assert_eq!(result, Err(JobError::Cancelled));
        assert_eq!(*harness.calls.lock().unwrap(), vec!["nav"]);
        assert!(*harness.finished.lock().unwrap());
    }

    #[tokio::test]
    async fn test_expectation_retried_once() {
        let mut data = query_data();
        data.data_broker.steps[0].actions = vec![action("expect", ActionType::Expectation)];
        let (runner, harness) = runner(
            vec![Err(anyhow::anyhow!("bridge lost")), Ok(ActionOutcome::Completed)],
            None,
        );

        let result = runner.scan(&data, false, &JobCancellation::default()).await;

        assert_eq!(result, Ok(vec![]));
        assert_eq!(*harness.calls.lock().unwrap(), vec!["expect", "expect"]);
        assert_eq!(harness.events.events().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let mut data = query_data();
        data.data_broker.steps[0].actions = vec![
            action("expect", ActionType::Expectation),
            action("never", ActionType::Click),
        ];
        let (runner, harness) = runner(
            vec![
                Err(anyhow::anyhow!("bridge lost")),
                Err(anyhow::anyhow!("bridge lost again")),
            ],
            None,
        );

        let result = runner.scan(&data, false, &JobCancellation::default()).await;

        assert!(matches!(result, Err(JobError::Unknown(msg)) if msg.contains("expect")));
        assert_eq!(*harness.calls.lock().unwrap(), vec!["expect", "expect"]);
        assert!(*harness.finished.lock().unwrap());
    }

    #[tokio::test]
    async fn test_non_retryable_action_fails_immediately() {
        let (runner, harness) = runner(vec![Err(anyhow::anyhow!("404"))], None);
        let result = runner
            .scan(&query_data(), false, &JobCancellation::default())
            .await;
        assert!(matches!(result, Err(JobError::Unknown(_))));
        assert_eq!(*harness.calls.lock().unwrap(), vec!["nav"]);
        assert!(harness.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_action_failing_after_cancellation_is_cancelled() {
        let mut data = query_data();
        data.data_broker.steps[0].actions = vec![action("expect", ActionType::Expectation)];
        let cancellation = JobCancellation::new(CancellationToken::new());
        let (runner, harness) = runner(
            vec![Err(anyhow::anyhow!("bridge lost"))],
            Some(cancellation.clone()),
        );

        let result = runner.scan(&data, false, &cancellation).await;

        assert_eq!(result, Err(JobError::Cancelled));
        assert_eq!(*harness.calls.lock().unwrap(), vec!["expect"]);
        assert!(harness.events.events().is_empty());
        assert!(*harness.finished.lock().unwrap());
    }

    #[tokio::test]
    async fn test_surface_released_when_initialize_fails() {
        let (runner, harness) = build_runner(vec![], None, true);

        let result = runner
            .scan(&query_data(), false, &JobCancellation::default())
            .await;

        assert!(matches!(result, Err(JobError::Unknown(msg)) if msg.contains("crashed")));
        assert!(harness.calls.lock().unwrap().is_empty());
        assert!(*harness.finished.lock().unwrap());
    }

    #[test]
    fn test_retry_policy_lookup() {
        let mut policy = RetryPolicy::default();
        assert_eq!(policy.retries_for(ActionType::Expectation), 1);
        assert_eq!(policy.retries_for(ActionType::Navigate), 0);

        policy.per_action_type.insert(ActionType::SolveCaptcha, 2);
        policy.default = 1;
        assert_eq!(policy.retries_for(ActionType::SolveCaptcha), 2);
        assert_eq!(policy.retries_for(ActionType::Click), 1);
    }
}
