use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::monitoring::types::{
    Availability, PingReachability, PortState, ProbeTarget, ScheduleTier,
};
use crate::monitoring::verification::{Verdict, Verification};

/// Convert SystemTime to Unix milliseconds
pub fn timestamp_to_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// Convert Unix milliseconds to SystemTime
pub fn millis_to_timestamp(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}

/// Monitor model - a host checked on a fixed schedule tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Uuid,
    /// Opaque reference to the owning user
    pub owner: String,
    pub url: String,
    pub port: Option<u16>,
    pub tier: ScheduleTier,
    pub is_paused: bool,
    /// `None` until the first completed check
    pub last_checked_at: Option<SystemTime>,
    pub created_at: SystemTime,
}

impl Monitor {
    /// Create a new, active monitor
    pub fn new(owner: impl Into<String>, url: impl Into<String>, port: Option<u16>, tier: ScheduleTier) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            url: url.into(),
            port,
            tier,
            is_paused: false,
            last_checked_at: None,
            created_at: SystemTime::now(),
        }
    }

    pub fn target(&self) -> ProbeTarget {
        ProbeTarget::new(self.url.clone(), self.port)
    }

    /// Due when never checked or last checked at or before `stale_before`
    pub fn is_due(&self, stale_before: SystemTime) -> bool {
        !self.is_paused && self.last_checked_at.is_none_or(|checked| checked <= stale_before)
    }
}

/// UptimeEvent model - immutable record of one completed check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeEvent {
    pub id: Option<i64>,
    pub monitor_id: Uuid,
    pub timestamp: SystemTime,
    pub availability: Availability,
    pub ping: PingReachability,
    pub port: PortState,
    /// Wall clock from agent selection to the last answer, failover included
    pub response_time: Duration,
    pub confirmed_by_agent: String,
    pub verification: Verification,
}

impl UptimeEvent {
    pub fn from_verdict(monitor_id: Uuid, verdict: &Verdict, response_time: Duration) -> Self {
        Self {
            id: None,
            monitor_id,
            timestamp: SystemTime::now(),
            availability: verdict.report.availability,
            ping: verdict.report.ping,
            port: verdict.report.port,
            response_time,
            confirmed_by_agent: verdict.confirmed_by.to_string(),
            verification: verdict.verification,
        }
    }

    pub fn response_time_ms(&self) -> i64 {
        self.response_time.as_millis() as i64
    }
}
