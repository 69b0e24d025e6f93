/// Orchestrator module - wires the engine together
///
/// The orchestrator owns the agent pool, the store and one tier scheduler
/// per configured tier. It is the only surface offered upward: start all
/// tiers, or run a single tier's tick on demand.

#[cfg(test)]
mod tests;

use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::info;

use crate::agents::{AgentDirectory, RoundRobinSelector};
use crate::config::Config;
use crate::database::{Database, open_database};
use crate::monitoring::{
    AgentClient, Dispatcher, HttpAgentClient, ScheduleTier, TickOverlap, TickReport, TierSchedule,
    TierScheduler,
};
use crate::pool;

/// Engine settings that do not come from collaborators
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub probe_timeout: Duration,
    pub schedules: Vec<TierSchedule>,
    pub max_concurrent_checks: Option<usize>,
    pub tick_overlap: TickOverlap,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            probe_timeout: config.probe_timeout()?,
            schedules: config.tier_schedules()?,
            max_concurrent_checks: config.max_concurrent_checks()?,
            tick_overlap: config.scheduler.tick_overlap,
        })
    }
}

/// Main orchestrator for the uptrack service
pub struct Orchestrator {
    database: Arc<dyn Database>,
    schedulers: BTreeMap<ScheduleTier, Arc<TierScheduler>>,
}

impl Orchestrator {
    /// Build the engine from collaborators
    pub fn new(
        directory: AgentDirectory,
        client: Arc<dyn AgentClient>,
        database: Arc<dyn Database>,
        settings: EngineSettings,
    ) -> Self {
        let selector = Arc::new(RoundRobinSelector::new(directory));
        let dispatcher =
            Arc::new(Dispatcher::new(selector, client, database.clone(), settings.probe_timeout));
        let limiter = settings.max_concurrent_checks.map(|cap| Arc::new(Semaphore::new(cap)));

        let schedulers = settings
            .schedules
            .into_iter()
            .map(|schedule| {
                let mut scheduler = TierScheduler::new(schedule, dispatcher.clone())
                    .with_overlap(settings.tick_overlap);
                if let Some(limiter) = &limiter {
                    scheduler = scheduler.with_limiter(limiter.clone());
                }
                (schedule.tier, Arc::new(scheduler))
            })
            .collect();

        Self { database, schedulers }
    }

    /// Validate the config, open the store and create the HTTP agent client.
    ///
    /// Fails when the agent directory is empty: there is no useful mode
    /// without at least one agent.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let directory = config.agent_directory()?;
        let settings = EngineSettings::from_config(config)?;

        info!("Opening database at {}", config.database.path.display());
        let pool = pool::open_local(&config.database.path).await?;
        let database: Arc<dyn Database> = Arc::new(open_database(pool).await?);

        let client: Arc<dyn AgentClient> = Arc::new(HttpAgentClient::new(config.agents.token.clone())?);

        info!("Loaded {} check agents", directory.size());
        Ok(Self::new(directory, client, database, settings))
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn tiers(&self) -> impl Iterator<Item = ScheduleTier> + '_ {
        self.schedulers.keys().copied()
    }

    /// Run one tier's tick immediately and wait for all of its checks
    pub async fn run_tier_now(&self, tier: ScheduleTier) -> Result<TickReport> {
        let scheduler = self
            .schedulers
            .get(&tier)
            .ok_or_else(|| anyhow!("schedule tier {} is not configured", tier))?;
        Ok(scheduler.run_tick().await)
    }

    /// Start every tier scheduler; tiers tick independently
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.schedulers
            .values()
            .map(|scheduler| {
                let schedule = scheduler.schedule();
                info!(
                    "Starting tier {} (every {:?}, stale after {:?})",
                    schedule.tier, schedule.interval, schedule.staleness
                );
                scheduler.clone().spawn()
            })
            .collect()
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let handles = self.start();
        info!("Orchestrator started with {} tiers", handles.len());

        tokio::signal::ctrl_c().await?;
        info!("Shutting down schedulers");
        for handle in handles {
            handle.abort();
        }
        Ok(())
    }
}
