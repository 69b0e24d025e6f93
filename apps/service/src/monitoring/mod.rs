pub mod client;
/// Monitoring engine module - schedules and dispatches uptime checks
///
/// This module is responsible for:
/// - Talking to remote check agents over their JSON contract
/// - Failing over and verifying `Down` results with a second agent
/// - Running one scheduler per schedule tier
pub mod dispatcher;
pub mod scheduler;
pub mod types;
pub mod validation;
pub mod verification;

pub use client::{AgentClient, HttpAgentClient, ProbeError};
pub use dispatcher::{DispatchError, Dispatcher};
pub use scheduler::{TickOverlap, TickReport, TierSchedule, TierScheduler};
pub use types::{ProbeReport, ProbeTarget, ScheduleTier};
