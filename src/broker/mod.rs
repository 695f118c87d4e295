pub mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who to look for: the search terms submitted to a broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileQuery {
    pub id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub birth_year: Option<u16>,
    /// Superseded by an edited profile; scans skip deprecated queries.
    #[serde(default)]
    pub deprecated: bool,
}

impl ProfileQuery {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A matched listing found on a broker site during a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedProfile {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub age: Option<u32>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub relatives: Vec<String>,
    pub profile_url: Option<String>,
    /// Broker-stable key used to recognise the same listing across scans.
    pub identifier: String,
    pub removed_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Navigate,
    Extract,
    FillForm,
    Click,
    Expectation,
    EmailConfirmation,
    GetCaptchaInfo,
    SolveCaptcha,
    Condition,
}

/// One step of a broker script. The payload is opaque to the scheduler and is
/// only interpreted by the automation surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepType {
    Scan,
    OptOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub step_type: StepType,
    pub actions: Vec<Action>,
}

/// Rescheduling intervals, in hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulingConfig {
    pub retry_error: i64,
    pub confirm_opt_out_scan: i64,
    pub maintenance_scan: i64,
    pub max_attempts: Option<u32>,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            retry_error: 48,
            confirm_opt_out_scan: 72,
            maintenance_scan: 120,
            max_attempts: None,
        }
    }
}

/// A broker descriptor as published in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBroker {
    pub id: String,
    pub name: String,
    pub url: String,
    pub version: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub scheduling_config: SchedulingConfig,
}

impl DataBroker {
    pub fn step(&self, step_type: StepType) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_type == step_type)
    }

    pub fn scan_step(&self) -> Option<&Step> {
        self.step(StepType::Scan)
    }

    pub fn opt_out_step(&self) -> Option<&Step> {
        self.step(StepType::OptOut)
    }
}
