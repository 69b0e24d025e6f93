//! uptrack - tiered uptime checks dispatched to remote check agents
//!
//! Monitors are grouped into schedule tiers. On every tick a tier loads its
//! due monitors and checks them concurrently: each check goes to the next
//! agent in round-robin order, fails over to another agent on transport
//! errors, and has any `Down` result verified by a second agent before the
//! uptime event is stored.

pub mod agents;
pub mod config;
pub mod database;
pub mod monitoring;
pub mod orchestrator;
pub mod pool;

#[cfg(test)]
mod testing;

pub use orchestrator::Orchestrator;
