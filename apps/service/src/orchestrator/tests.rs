/// End-to-end tests for the orchestrator
///
/// Real libsql store in a temp dir, real HTTP agent client, and wiremock
/// servers standing in for the check agents.
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::agents::{AgentDirectory, AgentEndpoint};
use crate::config::{Config, ConfigError};
use crate::database::{Database, Monitor, test_database};
use crate::monitoring::types::{Availability, PingReachability, PortState};
use crate::monitoring::verification::Verification;
use crate::monitoring::{
    AgentClient, HttpAgentClient, ScheduleTier, TickOverlap, TickReport, TierSchedule,
};
use crate::orchestrator::{EngineSettings, Orchestrator};

fn endpoint(server: &MockServer) -> AgentEndpoint {
    format!("{}/check", server.uri()).parse().unwrap()
}

async fn agent_answering(body: serde_json::Value, calls: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(calls)
        .mount(&server)
        .await;
    server
}

async fn agent_failing(calls: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/check"))
        .respond_with(ResponseTemplate::new(502))
        .expect(calls)
        .mount(&server)
        .await;
    server
}

/// Orchestrator over the given agents with only the 1-minute tier configured
async fn create_test_orchestrator(agents: &[&MockServer]) -> Result<(Orchestrator, TempDir)> {
    let (database, temp_dir) = test_database().await?;
    let directory = AgentDirectory::new(agents.iter().map(|server| endpoint(server)).collect())?;
    let client: Arc<dyn AgentClient> = Arc::new(HttpAgentClient::new("test-token")?);
    let settings = EngineSettings {
        probe_timeout: Duration::from_secs(2),
        schedules: vec![TierSchedule::new(ScheduleTier::OneMinute)],
        max_concurrent_checks: None,
        tick_overlap: TickOverlap::Allow,
    };

    let orchestrator = Orchestrator::new(directory, client, Arc::new(database), settings);
    Ok((orchestrator, temp_dir))
}

async fn add_monitor(orchestrator: &Orchestrator) -> Result<Monitor> {
    let monitor = Monitor::new("user-1", "https://example.com", Some(443), ScheduleTier::OneMinute);
    orchestrator.database().save_monitor(&monitor).await?;
    Ok(monitor)
}

#[tokio::test]
async fn test_down_confirmed_by_second_agent() -> Result<()> {
    let a = agent_answering(json!({ "availability": "Down" }), 1).await;
    let b = agent_answering(json!({ "availability": "Down" }), 1).await;
    let (orchestrator, _dir) = create_test_orchestrator(&[&a, &b]).await?;
    let monitor = add_monitor(&orchestrator).await?;

    let report = orchestrator.run_tier_now(ScheduleTier::OneMinute).await?;
    assert_eq!(report, TickReport { due: 1, recorded: 1, ..TickReport::default() });

    let events = orchestrator.database().get_events_for_monitor(monitor.id, 10).await?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].availability, Availability::Down);
    assert_eq!(events[0].confirmed_by_agent, endpoint(&b).to_string());
    assert_eq!(events[0].verification, Verification::Verified);
    assert_eq!(events[0].ping, PingReachability::Unreachable);
    assert_eq!(events[0].port, PortState::Closed);
    Ok(())
}

#[tokio::test]
async fn test_failover_up_skips_verification() -> Result<()> {
    let a = agent_failing(1).await;
    let b = agent_answering(json!({ "availability": "Up", "ping": "Reachable", "port": "Open" }), 1).await;
    let (orchestrator, _dir) = create_test_orchestrator(&[&a, &b]).await?;
    let monitor = add_monitor(&orchestrator).await?;

    orchestrator.run_tier_now(ScheduleTier::OneMinute).await?;

    let events = orchestrator.database().get_events_for_monitor(monitor.id, 10).await?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].availability, Availability::Up);
    assert_eq!(events[0].ping, PingReachability::Reachable);
    assert_eq!(events[0].port, PortState::Open);
    assert_eq!(events[0].confirmed_by_agent, endpoint(&b).to_string());
    assert_eq!(events[0].verification, Verification::NotRequired);
    // `expect(1)` on both servers proves no verification call was made.
    Ok(())
}

#[tokio::test]
async fn test_up_uses_single_agent() -> Result<()> {
    let a = agent_answering(json!({ "availability": "Up", "ping": "Reachable", "port": "Open" }), 1).await;
    let b = agent_answering(json!({ "availability": "Up" }), 0).await;
    let (orchestrator, _dir) = create_test_orchestrator(&[&a, &b]).await?;
    let monitor = add_monitor(&orchestrator).await?;

    orchestrator.run_tier_now(ScheduleTier::OneMinute).await?;

    let events = orchestrator.database().get_events_for_monitor(monitor.id, 10).await?;
    assert_eq!(events[0].confirmed_by_agent, endpoint(&a).to_string());
    Ok(())
}

#[tokio::test]
async fn test_down_overturned_by_verification() -> Result<()> {
    let a = agent_answering(json!({ "availability": "Down", "ping": "Unreachable", "port": "Closed" }), 1).await;
    let b = agent_answering(json!({ "availability": "Up", "ping": "Reachable", "port": "Open" }), 1).await;
    let (orchestrator, _dir) = create_test_orchestrator(&[&a, &b]).await?;
    let monitor = add_monitor(&orchestrator).await?;

    orchestrator.run_tier_now(ScheduleTier::OneMinute).await?;

    let events = orchestrator.database().get_events_for_monitor(monitor.id, 10).await?;
    assert_eq!(events[0].availability, Availability::Up);
    assert_eq!(events[0].confirmed_by_agent, endpoint(&b).to_string());
    Ok(())
}

#[tokio::test]
async fn test_down_kept_when_verification_fails() -> Result<()> {
    let a = agent_answering(json!({ "availability": "Down" }), 1).await;
    let b = agent_failing(1).await;
    let (orchestrator, _dir) = create_test_orchestrator(&[&a, &b]).await?;
    let monitor = add_monitor(&orchestrator).await?;

    orchestrator.run_tier_now(ScheduleTier::OneMinute).await?;

    let events = orchestrator.database().get_events_for_monitor(monitor.id, 10).await?;
    assert_eq!(events[0].availability, Availability::Down);
    assert_eq!(events[0].confirmed_by_agent, endpoint(&a).to_string());
    assert_eq!(events[0].verification, Verification::Unverified);
    Ok(())
}

#[tokio::test]
async fn test_exhausted_agents_leave_monitor_due() -> Result<()> {
    let a = agent_failing(2).await;
    let b = agent_failing(2).await;
    let (orchestrator, _dir) = create_test_orchestrator(&[&a, &b]).await?;
    let monitor = add_monitor(&orchestrator).await?;

    let report = orchestrator.run_tier_now(ScheduleTier::OneMinute).await?;
    assert_eq!(report, TickReport { due: 1, abandoned: 1, ..TickReport::default() });

    assert!(orchestrator.database().get_events_for_monitor(monitor.id, 10).await?.is_empty());
    let stored = orchestrator.database().get_monitor(monitor.id).await?.expect("monitor");
    assert_eq!(stored.last_checked_at, None);

    // Still due on the next tick.
    let report = orchestrator.run_tier_now(ScheduleTier::OneMinute).await?;
    assert_eq!(report.due, 1);
    Ok(())
}

#[tokio::test]
async fn test_completed_check_refreshes_timestamp() -> Result<()> {
    let a = agent_answering(json!({ "availability": "Up" }), 1).await;
    let (orchestrator, _dir) = create_test_orchestrator(&[&a]).await?;
    let monitor = add_monitor(&orchestrator).await?;
    let before = SystemTime::now();

    orchestrator.run_tier_now(ScheduleTier::OneMinute).await?;

    let stored = orchestrator.database().get_monitor(monitor.id).await?.expect("monitor");
    let checked = stored.last_checked_at.expect("timestamp refreshed");
    assert!(checked + Duration::from_millis(1) >= before);

    let report = orchestrator.run_tier_now(ScheduleTier::OneMinute).await?;
    assert_eq!(report.due, 0, "fresh monitor is not due again");
    Ok(())
}

#[tokio::test]
async fn test_paused_monitor_is_skipped() -> Result<()> {
    let a = agent_answering(json!({ "availability": "Up" }), 0).await;
    let (orchestrator, _dir) = create_test_orchestrator(&[&a]).await?;
    let monitor = add_monitor(&orchestrator).await?;
    assert!(orchestrator.database().pause_monitor(monitor.id).await?);

    let report = orchestrator.run_tier_now(ScheduleTier::OneMinute).await?;
    assert_eq!(report.due, 0);
    Ok(())
}

#[tokio::test]
async fn test_round_robin_spreads_monitors() -> Result<()> {
    let a = agent_answering(json!({ "availability": "Up" }), 2).await;
    let b = agent_answering(json!({ "availability": "Up" }), 2).await;
    let (orchestrator, _dir) = create_test_orchestrator(&[&a, &b]).await?;
    for _ in 0..4 {
        add_monitor(&orchestrator).await?;
    }

    let report = orchestrator.run_tier_now(ScheduleTier::OneMinute).await?;
    assert_eq!(report.recorded, 4);
    Ok(())
}

#[tokio::test]
async fn test_unconfigured_tier_is_an_error() -> Result<()> {
    let a = agent_answering(json!({ "availability": "Up" }), 0).await;
    let (orchestrator, _dir) = create_test_orchestrator(&[&a]).await?;

    assert!(orchestrator.run_tier_now(ScheduleTier::SixtyMinutes).await.is_err());
    assert_eq!(orchestrator.tiers().collect::<Vec<_>>(), vec![ScheduleTier::OneMinute]);
    Ok(())
}

#[tokio::test]
async fn test_from_config_requires_agents() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let mut config = Config::default();
    config.database.path = temp_dir.path().join("engine.db");
    config.agents.endpoints.clear();

    let error = Orchestrator::from_config(&config).await.err().expect("empty directory is fatal");
    assert!(matches!(error.downcast_ref::<ConfigError>(), Some(ConfigError::NoAgents)));

    config.agents.endpoints = vec!["http://127.0.0.1:9/check".into()];
    let orchestrator = Orchestrator::from_config(&config).await?;
    assert_eq!(orchestrator.tiers().count(), 5);
    Ok(())
}
