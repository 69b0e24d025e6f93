//! Second-opinion policy for negative results.
//!
//! Only a `Down` reading is re-checked, by a different agent than the one
//! that produced it. When the second agent answers, its availability replaces
//! the first one outright: this is a two-opinion override, not a vote. `Up`
//! readings are trusted from a single agent.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::ProbeReport;
use crate::agents::AgentEndpoint;

/// How the final availability of a check came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// Provisional result was `Up`, no second probe issued
    NotRequired,
    /// A second agent answered and its availability was kept
    Verified,
    /// Result was `Down` but no second agent could confirm it
    Unverified,
}

impl Verification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verification::NotRequired => "not_required",
            Verification::Verified => "verified",
            Verification::Unverified => "unverified",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "not_required" => Some(Verification::NotRequired),
            "verified" => Some(Verification::Verified),
            "unverified" => Some(Verification::Unverified),
            _ => None,
        }
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A probe result together with the agent it is attributed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub report: ProbeReport,
    pub confirmed_by: AgentEndpoint,
    pub verification: Verification,
}

impl Verdict {
    /// First successful answer of a check, before any verification
    pub fn provisional(confirmed_by: AgentEndpoint, report: ProbeReport) -> Self {
        let verification = if needs_verification(&report) {
            Verification::Unverified
        } else {
            Verification::NotRequired
        };
        Self { report, confirmed_by, verification }
    }

    pub fn needs_verification(&self) -> bool {
        self.verification == Verification::Unverified
    }

    /// Apply the second agent's answer. Availability and attribution move to
    /// the verifier; ping and port readings stay with the provisional result.
    pub fn reconcile(self, verifier: AgentEndpoint, second: ProbeReport) -> Self {
        let report = ProbeReport { availability: second.availability, ..self.report };
        Self { report, confirmed_by: verifier, verification: Verification::Verified }
    }
}

/// Verification runs iff the reading is `Down`
pub fn needs_verification(report: &ProbeReport) -> bool {
    report.is_down()
}
