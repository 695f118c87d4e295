use async_trait::async_trait;
use chrono::{Datelike, Utc};

use crate::broker::{Action, ActionType, DataBroker, ExtractedProfile, ProfileQuery};

/// What a runner hands the surface alongside each action.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub broker: DataBroker,
    pub profile_query: ProfileQuery,
    /// Present for opt-outs.
    pub extracted_profile: Option<ExtractedProfile>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Completed,
    ExtractedProfiles(Vec<ExtractedProfile>),
}

/// A browser-like session that can execute broker script actions.
#[async_trait]
pub trait AutomationSurface: Send {
    async fn initialize(&mut self, show_web_view: bool) -> anyhow::Result<()>;
    async fn run_action(
        &mut self,
        action: &Action,
        context: &ActionContext,
    ) -> anyhow::Result<ActionOutcome>;
    async fn finish(&mut self);
}

pub trait SurfaceFactory: Send + Sync {
    fn make_surface(&self) -> Box<dyn AutomationSurface>;
}

/// A stand-in surface that completes every action without touching the
/// network. `extract` actions report one listing built from the query.
#[derive(Debug, Default)]
pub struct SimulatedSurface {
    initialized: bool,
}

#[async_trait]
impl AutomationSurface for SimulatedSurface {
    async fn initialize(&mut self, show_web_view: bool) -> anyhow::Result<()> {
        if show_web_view {
            tracing::info!("Simulated surface has no web view to show");
        }
        self.initialized = true;
        Ok(())
    }

    async fn run_action(
        &mut self,
        action: &Action,
        context: &ActionContext,
    ) -> anyhow::Result<ActionOutcome> {
        if !self.initialized {
            anyhow::bail!("surface used before initialize");
        }
        tracing::debug!(
            "Simulating {:?} action {} on {}",
            action.action_type,
            action.id,
            context.broker.id
        );

        if action.action_type != ActionType::Extract {
            return Ok(ActionOutcome::Completed);
        }

        let query = &context.profile_query;
        let slug = format!("{}-{}", query.first_name, query.last_name).to_lowercase();
        let address = match (&query.city, &query.state) {
            (Some(city), Some(state)) => vec![format!("{city}, {state}")],
            _ => vec![],
        };
        let age = query
            .birth_year
            .map(|y| (Utc::now().year() - i32::from(y)).max(0) as u32);
        Ok(ActionOutcome::ExtractedProfiles(vec![ExtractedProfile {
            id: None,
            name: Some(query.full_name()),
            age,
            addresses: address,
            relatives: vec![],
            profile_url: Some(format!("{}/profile/{slug}", context.broker.url)),
            identifier: slug,
            removed_date: None,
        }]))
    }

    async fn finish(&mut self) {
        self.initialized = false;
    }
}

#[derive(Debug, Default)]
pub struct SimulatedSurfaceFactory;

impl SurfaceFactory for SimulatedSurfaceFactory {
    fn make_surface(&self) -> Box<dyn AutomationSurface> {
        Box::new(SimulatedSurface::default())
    }
}
