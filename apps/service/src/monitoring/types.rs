use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Final availability verdict of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Up,
    Down,
}

/// Whether the agent could ping the target host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PingReachability {
    Reachable,
    Unreachable,
}

/// Whether the target port accepted a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortState {
    Open,
    Closed,
}

impl Availability {
    /// Only the exact agent string `"Up"` counts as up.
    pub fn from_agent(raw: Option<&str>) -> Self {
        match raw {
            Some("Up") => Availability::Up,
            _ => Availability::Down,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Up => "Up",
            Availability::Down => "Down",
        }
    }

    pub fn parse(raw: &str) -> Self {
        Self::from_agent(Some(raw))
    }
}

impl PingReachability {
    pub fn from_agent(raw: Option<&str>) -> Self {
        match raw {
            Some("Reachable") => PingReachability::Reachable,
            _ => PingReachability::Unreachable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PingReachability::Reachable => "Reachable",
            PingReachability::Unreachable => "Unreachable",
        }
    }

    pub fn parse(raw: &str) -> Self {
        Self::from_agent(Some(raw))
    }
}

impl PortState {
    pub fn from_agent(raw: Option<&str>) -> Self {
        match raw {
            Some("Open") => PortState::Open,
            _ => PortState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PortState::Open => "Open",
            PortState::Closed => "Closed",
        }
    }

    pub fn parse(raw: &str) -> Self {
        Self::from_agent(Some(raw))
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PingReachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host a check agent is asked to probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub url: String,
    pub port: Option<u16>,
}

impl ProbeTarget {
    pub fn new(url: impl Into<String>, port: Option<u16>) -> Self {
        Self { url: url.into(), port }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.url, port),
            None => f.write_str(&self.url),
        }
    }
}

/// Normalized result reported by one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub availability: Availability,
    pub ping: PingReachability,
    pub port: PortState,
}

impl ProbeReport {
    pub fn is_down(&self) -> bool {
        self.availability == Availability::Down
    }
}

/// Schedule tiers a monitor can be assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ScheduleTier {
    OneMinute,
    FiveMinutes,
    TenMinutes,
    ThirtyMinutes,
    SixtyMinutes,
}

impl ScheduleTier {
    pub const ALL: [ScheduleTier; 5] = [
        ScheduleTier::OneMinute,
        ScheduleTier::FiveMinutes,
        ScheduleTier::TenMinutes,
        ScheduleTier::ThirtyMinutes,
        ScheduleTier::SixtyMinutes,
    ];

    pub fn minutes(&self) -> u32 {
        match self {
            ScheduleTier::OneMinute => 1,
            ScheduleTier::FiveMinutes => 5,
            ScheduleTier::TenMinutes => 10,
            ScheduleTier::ThirtyMinutes => 30,
            ScheduleTier::SixtyMinutes => 60,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.minutes() == minutes)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(u64::from(self.minutes()) * 60)
    }

    /// Default staleness threshold: three quarters of the period
    pub fn default_staleness(&self) -> Duration {
        self.period() * 3 / 4
    }
}

impl TryFrom<u32> for ScheduleTier {
    type Error = String;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::from_minutes(minutes)
            .ok_or_else(|| format!("unsupported schedule tier: {minutes} minutes"))
    }
}

impl From<ScheduleTier> for u32 {
    fn from(tier: ScheduleTier) -> Self {
        tier.minutes()
    }
}

impl fmt::Display for ScheduleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.minutes())
    }
}
