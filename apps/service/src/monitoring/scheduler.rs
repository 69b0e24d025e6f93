use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

use super::dispatcher::{DispatchError, Dispatcher};
use super::types::ScheduleTier;

/// What happens when a tick is still running as the next one comes due
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickOverlap {
    /// Start the next tick on time, alongside the unfinished one
    #[default]
    Allow,
    /// Wait for the running tick; check intervals drift under load
    Queue,
}

impl fmt::Display for TickOverlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickOverlap::Allow => write!(f, "allow"),
            TickOverlap::Queue => write!(f, "queue"),
        }
    }
}

/// Timing of one schedule tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSchedule {
    pub tier: ScheduleTier,
    /// Time between ticks
    pub interval: Duration,
    /// A monitor is due once its last check is at least this old
    pub staleness: Duration,
}

impl TierSchedule {
    pub fn new(tier: ScheduleTier) -> Self {
        Self { tier, interval: tier.period(), staleness: tier.default_staleness() }
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn stale_before(&self, now: SystemTime) -> SystemTime {
        now.checked_sub(self.staleness).unwrap_or(UNIX_EPOCH)
    }
}

/// Outcome counts of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub recorded: usize,
    pub abandoned: usize,
    pub persistence_failures: usize,
    /// Check tasks that panicked
    pub crashed: usize,
}

/// Periodically checks every due monitor of one tier
pub struct TierScheduler {
    schedule: TierSchedule,
    dispatcher: Arc<Dispatcher>,
    limiter: Option<Arc<Semaphore>>,
    overlap: TickOverlap,
}

impl TierScheduler {
    pub fn new(schedule: TierSchedule, dispatcher: Arc<Dispatcher>) -> Self {
        Self { schedule, dispatcher, limiter: None, overlap: TickOverlap::default() }
    }

    /// Share a cap on in-flight checks, typically across all tiers
    pub fn with_limiter(mut self, limiter: Arc<Semaphore>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_overlap(mut self, overlap: TickOverlap) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn schedule(&self) -> &TierSchedule {
        &self.schedule
    }

    /// Run one tick now: fetch the due set and check every monitor concurrently.
    ///
    /// Never fails; problems are logged and counted in the report.
    pub async fn run_tick(&self) -> TickReport {
        let tier = self.schedule.tier;
        let stale_before = self.schedule.stale_before(SystemTime::now());

        let monitors = match self.dispatcher.database().find_due_monitors(tier, stale_before).await {
            Ok(monitors) => monitors,
            Err(e) => {
                error!("Failed to load due monitors for tier {}: {:#}", tier, e);
                return TickReport::default();
            }
        };

        let mut report = TickReport { due: monitors.len(), ..TickReport::default() };
        if monitors.is_empty() {
            return report;
        }

        let checks = monitors.into_iter().map(|monitor| {
            let dispatcher = self.dispatcher.clone();
            let limiter = self.limiter.clone();
            tokio::spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                dispatcher.check_monitor(&monitor).await
            })
        });

        for outcome in futures::future::join_all(checks).await {
            match outcome {
                Ok(Ok(_event)) => report.recorded += 1,
                Ok(Err(e @ DispatchError::ExhaustedAgents { .. })) => {
                    report.abandoned += 1;
                    warn!("Check abandoned until next tick: {}", e);
                }
                Ok(Err(e @ DispatchError::Persistence { .. })) => {
                    report.persistence_failures += 1;
                    error!("{}", e);
                }
                Err(e) => {
                    report.crashed += 1;
                    error!("Check task for tier {} crashed: {}", tier, e);
                }
            }
        }

        info!(
            "Tier {} tick: {} due, {} recorded, {} abandoned, {} persistence failures, {} crashed",
            tier, report.due, report.recorded, report.abandoned, report.persistence_failures, report.crashed
        );
        report
    }

    /// Tick forever on the tier's interval, the first tick fires immediately
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.schedule.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;
                match self.overlap {
                    TickOverlap::Allow => {
                        let scheduler = self.clone();
                        tokio::spawn(async move {
                            scheduler.run_tick().await;
                        });
                    }
                    TickOverlap::Queue => {
                        self.run_tick().await;
                    }
                }
            }
        })
    }
}
