use tokio_util::sync::CancellationToken;

/// Cancellation state seen by a running job.
///
/// Composes the unit's own cancel flag with the ambient shutdown token. Passed
/// down to the action runner, which checks it before every action.
#[derive(Debug, Clone, Default)]
pub struct JobCancellation {
    local: CancellationToken,
    ambient: CancellationToken,
}

impl JobCancellation {
    pub fn new(ambient: CancellationToken) -> Self {
        Self {
            local: CancellationToken::new(),
            ambient,
        }
    }

    /// Cancel this unit only. The ambient token is left untouched.
    pub fn cancel(&self) {
        self.local.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.local.is_cancelled() || self.ambient.is_cancelled()
    }

    pub fn should_run_next_step(&self) -> bool {
        !self.is_cancelled()
    }

    /// Resolves once either signal fires.
    pub async fn cancelled(&self) {
        tokio::select! {
            _ = self.local.cancelled() => {}
            _ = self.ambient.cancelled() => {}
        }
    }
}
