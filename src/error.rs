use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Broker not found: {0}")]
    BrokerNotFound(String),

    #[error("Profile query not found: {0}")]
    ProfileQueryNotFound(i64),

    #[error("Extracted profile not found: {0}")]
    ExtractedProfileNotFound(i64),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure of a single scan or opt-out job.
///
/// None of these abort a scheduling pass: the execution unit reports them to
/// the error delegate and moves on to the next job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("job was cancelled")]
    Cancelled,

    #[error("broker has no opt-out step")]
    NoOptOutStep,

    #[error("broker has no scan step")]
    NoScanStep,

    #[error("job timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("{0}")]
    Unknown(String),
}

impl JobError {
    pub fn unknown(err: impl std::fmt::Display) -> Self {
        JobError::Unknown(err.to_string())
    }

    pub fn repository(err: impl std::fmt::Display) -> Self {
        JobError::Repository(err.to_string())
    }

    /// Short machine-readable name used in history events and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Cancelled => "cancelled",
            JobError::NoOptOutStep => "no_opt_out_step",
            JobError::NoScanStep => "no_scan_step",
            JobError::Timeout(_) => "timeout",
            JobError::Repository(_) => "repository",
            JobError::Unknown(_) => "unknown",
        }
    }
}
