use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Inner {
    started: Instant,
    stage: String,
    stage_started: Instant,
}

/// Tracks which stage a job is in and how long it has been running.
///
/// Cloned into the runner; the sub-job reads it back to attribute failures.
#[derive(Debug, Clone)]
pub struct StageTracker {
    inner: Arc<Mutex<Inner>>,
}

impl StageTracker {
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                started: now,
                stage: "start".into(),
                stage_started: now,
            })),
        }
    }

    pub fn begin(&self, stage: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        let stage = stage.into();
        tracing::trace!(
            "Stage {} finished after {:?}, entering {}",
            inner.stage,
            inner.stage_started.elapsed(),
            stage
        );
        inner.stage = stage;
        inner.stage_started = Instant::now();
    }

    pub fn current_stage(&self) -> String {
        self.inner.lock().unwrap().stage.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.lock().unwrap().started.elapsed()
    }
}
