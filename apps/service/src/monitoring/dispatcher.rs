//! Per-monitor check: select, probe, fail over, verify, persist.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::client::AgentClient;
use super::types::ProbeTarget;
use super::verification::Verdict;
use crate::agents::{AgentEndpoint, RoundRobinSelector};
use crate::database::{Database, Monitor, UptimeEvent};

/// Write that failed while recording a check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStage {
    Event,
    Timestamp,
}

impl std::fmt::Display for PersistStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistStage::Event => write!(f, "uptime event"),
            PersistStage::Timestamp => write!(f, "last-checked timestamp"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Primary and failover agents both failed; the check is skipped this tick
    #[error("no agent could probe monitor {monitor_id} (tried {})", format_agents(.tried))]
    ExhaustedAgents { monitor_id: Uuid, tried: Vec<AgentEndpoint> },

    #[error("failed to store {stage} for monitor {monitor_id}: {source:#}")]
    Persistence {
        monitor_id: Uuid,
        stage: PersistStage,
        #[source]
        source: anyhow::Error,
    },
}

fn format_agents(agents: &[AgentEndpoint]) -> String {
    agents.iter().map(AgentEndpoint::as_str).collect::<Vec<_>>().join(", ")
}

/// Runs one check per call against the shared agent pool
pub struct Dispatcher {
    selector: Arc<RoundRobinSelector>,
    client: Arc<dyn AgentClient>,
    database: Arc<dyn Database>,
    deadline: Duration,
}

impl Dispatcher {
    pub fn new(
        selector: Arc<RoundRobinSelector>,
        client: Arc<dyn AgentClient>,
        database: Arc<dyn Database>,
        deadline: Duration,
    ) -> Self {
        Self { selector, client, database, deadline }
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn selector(&self) -> &Arc<RoundRobinSelector> {
        &self.selector
    }

    /// Check one monitor and record the outcome.
    ///
    /// Exactly one event and one timestamp update are written for a
    /// completed check. When no agent answers nothing is written and the
    /// monitor stays due for the next tick.
    pub async fn check_monitor(&self, monitor: &Monitor) -> Result<UptimeEvent, DispatchError> {
        let target = monitor.target();
        let started = Instant::now();

        let primary = self.selector.next();
        let mut verdict = self.probe_with_failover(monitor.id, &target, primary).await?;

        if verdict.needs_verification() {
            verdict = self.verify(monitor.id, &target, verdict).await;
        }

        let response_time = started.elapsed();
        let event = UptimeEvent::from_verdict(monitor.id, &verdict, response_time);

        debug!(
            "Monitor {} - {} - {} via {} ({}) in {}ms",
            monitor.id,
            target,
            event.availability,
            event.confirmed_by_agent,
            event.verification,
            event.response_time_ms()
        );

        self.persist(event).await
    }

    async fn probe_with_failover(
        &self,
        monitor_id: Uuid,
        target: &ProbeTarget,
        primary: AgentEndpoint,
    ) -> Result<Verdict, DispatchError> {
        let primary_error = match self.client.probe(&primary, target, self.deadline).await {
            Ok(report) => return Ok(Verdict::provisional(primary, report)),
            Err(e) => e,
        };
        warn!("Probe of {} via {} failed: {}", target, primary, primary_error);

        let Some(alternate) = self.selector.pick_other_than(&primary) else {
            return Err(DispatchError::ExhaustedAgents { monitor_id, tried: vec![primary] });
        };

        match self.client.probe(&alternate, target, self.deadline).await {
            Ok(report) => Ok(Verdict::provisional(alternate, report)),
            Err(e) => {
                warn!("Failover probe of {} via {} failed: {}", target, alternate, e);
                Err(DispatchError::ExhaustedAgents { monitor_id, tried: vec![primary, alternate] })
            }
        }
    }

    async fn verify(&self, monitor_id: Uuid, target: &ProbeTarget, verdict: Verdict) -> Verdict {
        let Some(verifier) = self.selector.pick_other_than(&verdict.confirmed_by) else {
            debug!("Monitor {} is down and no second agent exists to verify", monitor_id);
            return verdict;
        };

        match self.client.probe(&verifier, target, self.deadline).await {
            Ok(second) => verdict.reconcile(verifier, second),
            Err(e) => {
                warn!(
                    "Verification of {} via {} failed, keeping unverified result from {}: {}",
                    target, verifier, verdict.confirmed_by, e
                );
                verdict
            }
        }
    }

    /// Both writes are always attempted; the first failure is reported.
    async fn persist(&self, mut event: UptimeEvent) -> Result<UptimeEvent, DispatchError> {
        let monitor_id = event.monitor_id;
        let saved = self.database.save_event(&event).await;
        let stamped = self.database.update_monitor_timestamp(monitor_id, SystemTime::now()).await;

        match (saved, stamped) {
            (Ok(id), Ok(())) => {
                event.id = Some(id);
                Ok(event)
            }
            (Err(source), _) => {
                Err(DispatchError::Persistence { monitor_id, stage: PersistStage::Event, source })
            }
            (Ok(_), Err(source)) => {
                Err(DispatchError::Persistence { monitor_id, stage: PersistStage::Timestamp, source })
            }
        }
    }
}
