//! Probe client: one bounded-time request to one check agent.
//!
//! The client never retries. Every way a request can fail (timeout, refused
//! connection, non-2xx status, unreadable body) comes back as a
//! [`ProbeError`] and the dispatcher decides what to do next.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use super::types::{Availability, PingReachability, PortState, ProbeReport, ProbeTarget};
use crate::agents::AgentEndpoint;

/// Transport-level failure talking to an agent
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("agent did not answer within {0:?}")]
    Timeout(Duration),

    #[error("connection to agent failed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("agent answered with HTTP status {0}")]
    Status(u16),

    #[error("agent response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("agent request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl ProbeError {
    fn classify(error: reqwest::Error, deadline: Duration) -> Self {
        if error.is_timeout() {
            ProbeError::Timeout(deadline)
        } else if error.is_connect() {
            ProbeError::Connect(error)
        } else if error.is_decode() {
            ProbeError::Decode(error)
        } else if let Some(status) = error.status() {
            ProbeError::Status(status.as_u16())
        } else {
            ProbeError::Request(error)
        }
    }
}

/// Something that can ask a check agent to probe a target
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn probe(
        &self,
        agent: &AgentEndpoint,
        target: &ProbeTarget,
        deadline: Duration,
    ) -> Result<ProbeReport, ProbeError>;
}

/// Body posted to an agent
#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    url: &'a str,
    port: Option<u16>,
    token: &'a str,
}

/// Normalize an agent's JSON answer, unknown or missing values are negative
pub fn report_from_json(body: &Value) -> ProbeReport {
    let field = |name: &str| body.get(name).and_then(Value::as_str);
    ProbeReport {
        availability: Availability::from_agent(field("availability")),
        ping: PingReachability::from_agent(field("ping")),
        port: PortState::from_agent(field("port")),
    }
}

/// HTTP client speaking the check agent JSON contract
pub struct HttpAgentClient {
    client: reqwest::Client,
    token: String,
}

impl HttpAgentClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("uptrack/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, token: token.into() })
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn probe(
        &self,
        agent: &AgentEndpoint,
        target: &ProbeTarget,
        deadline: Duration,
    ) -> Result<ProbeReport, ProbeError> {
        let request = AgentRequest { url: &target.url, port: target.port, token: &self.token };

        let response = self
            .client
            .post(agent.url().clone())
            .bearer_auth(&self.token)
            .timeout(deadline)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProbeError::classify(e, deadline))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let body: Value =
            response.json().await.map_err(|e| ProbeError::classify(e, deadline))?;

        Ok(report_from_json(&body))
    }
}
