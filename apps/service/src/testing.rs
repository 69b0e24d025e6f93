//! In-memory stand-ins for the store and the agent client.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use uuid::Uuid;

use crate::agents::AgentEndpoint;
use crate::database::{Database, Monitor, UptimeEvent};
use crate::monitoring::client::{AgentClient, ProbeError};
use crate::monitoring::types::{
    Availability, PingReachability, PortState, ProbeReport, ProbeTarget, ScheduleTier,
};

pub fn agent(name: &str) -> AgentEndpoint {
    format!("http://{name}.local/check").parse().expect("valid test endpoint")
}

pub fn up() -> ProbeReport {
    ProbeReport {
        availability: Availability::Up,
        ping: PingReachability::Reachable,
        port: PortState::Open,
    }
}

pub fn down() -> ProbeReport {
    ProbeReport {
        availability: Availability::Down,
        ping: PingReachability::Unreachable,
        port: PortState::Closed,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Report(ProbeReport),
    Fail,
    FailAfter(Duration),
    Delayed(Duration, ProbeReport),
}

/// Agent client answering from per-agent scripts.
///
/// Each agent pops replies in order and repeats its last one forever.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<AgentEndpoint, VecDeque<Reply>>>,
    calls: Mutex<Vec<AgentEndpoint>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, name: &str, reply: Reply) -> Self {
        self.replies(name, [reply])
    }

    pub fn replies(self, name: &str, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.scripts.lock().unwrap().entry(agent(name)).or_default().extend(replies);
        self
    }

    pub fn calls(&self) -> Vec<AgentEndpoint> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, agent: &AgentEndpoint) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(agent) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::Fail),
            Some(queue) => queue.front().copied().unwrap_or(Reply::Fail),
            None => Reply::Fail,
        }
    }
}

#[async_trait]
impl AgentClient for ScriptedClient {
    async fn probe(
        &self,
        agent: &AgentEndpoint,
        _target: &ProbeTarget,
        deadline: Duration,
    ) -> Result<ProbeReport, ProbeError> {
        self.calls.lock().unwrap().push(agent.clone());
        let reply = self.next_reply(agent);

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let result = match reply {
            Reply::Report(report) => Ok(report),
            Reply::Fail => Err(ProbeError::Timeout(deadline)),
            Reply::FailAfter(delay) => {
                tokio::time::sleep(delay).await;
                Err(ProbeError::Timeout(deadline))
            }
            Reply::Delayed(delay, report) => {
                tokio::time::sleep(delay).await;
                Ok(report)
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Store keeping everything in memory, with switchable write failures
#[derive(Default)]
pub struct MemoryDatabase {
    monitors: Mutex<HashMap<Uuid, Monitor>>,
    events: Mutex<Vec<UptimeEvent>>,
    fail_event_writes: AtomicBool,
    due_queries: AtomicUsize,
}

impl MemoryDatabase {
    pub fn insert_monitor(&self, monitor: Monitor) {
        self.monitors.lock().unwrap().insert(monitor.id, monitor);
    }

    pub fn monitor(&self, id: Uuid) -> Option<Monitor> {
        self.monitors.lock().unwrap().get(&id).cloned()
    }

    pub fn events(&self) -> Vec<UptimeEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn fail_event_writes(&self, fail: bool) {
        self.fail_event_writes.store(fail, Ordering::SeqCst);
    }

    pub fn due_queries(&self) -> usize {
        self.due_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn find_due_monitors(&self, tier: ScheduleTier, stale_before: SystemTime) -> Result<Vec<Monitor>> {
        self.due_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .monitors
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.tier == tier && m.is_due(stale_before))
            .cloned()
            .collect())
    }

    async fn save_event(&self, event: &UptimeEvent) -> Result<i64> {
        if self.fail_event_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("event store unavailable"));
        }
        let mut events = self.events.lock().unwrap();
        events.push(event.clone());
        Ok(events.len() as i64)
    }

    async fn update_monitor_timestamp(&self, monitor_id: Uuid, checked_at: SystemTime) -> Result<()> {
        let mut monitors = self.monitors.lock().unwrap();
        let monitor = monitors.get_mut(&monitor_id).ok_or_else(|| anyhow!("no monitor {monitor_id}"))?;
        monitor.last_checked_at = Some(checked_at);
        Ok(())
    }

    async fn save_monitor(&self, monitor: &Monitor) -> Result<()> {
        self.insert_monitor(monitor.clone());
        Ok(())
    }

    async fn get_monitor(&self, monitor_id: Uuid) -> Result<Option<Monitor>> {
        Ok(self.monitor(monitor_id))
    }

    async fn list_monitors_for_owner(&self, owner: &str) -> Result<Vec<Monitor>> {
        Ok(self.monitors.lock().unwrap().values().filter(|m| m.owner == owner).cloned().collect())
    }

    async fn get_events_for_monitor(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<UptimeEvent>> {
        let events = self.events.lock().unwrap();
        Ok(events.iter().rev().filter(|e| e.monitor_id == monitor_id).take(limit).cloned().collect())
    }

    async fn pause_monitor(&self, monitor_id: Uuid) -> Result<bool> {
        let mut monitors = self.monitors.lock().unwrap();
        Ok(monitors.get_mut(&monitor_id).map(|m| m.is_paused = true).is_some())
    }
}
