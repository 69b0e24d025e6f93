use std::sync::atomic::{AtomicUsize, Ordering};

use super::directory::{AgentDirectory, AgentEndpoint};

/// Round-robin load balancer over the agent directory.
///
/// The cursor is advanced with a single compare-and-swap, so concurrent
/// checks each get a distinct position in the cycle.
#[derive(Debug)]
pub struct RoundRobinSelector {
    directory: AgentDirectory,
    cursor: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new(directory: AgentDirectory) -> Self {
        Self { directory, cursor: AtomicUsize::new(0) }
    }

    pub fn directory(&self) -> &AgentDirectory {
        &self.directory
    }

    /// Next agent in the cycle
    pub fn next(&self) -> AgentEndpoint {
        let size = self.directory.size();
        // The closure always returns Some, so both arms carry the previous cursor.
        let index = match self.cursor.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
            Some((cursor + 1) % size)
        }) {
            Ok(previous) | Err(previous) => previous,
        };
        self.directory.at(index).clone()
    }

    /// First agent in directory order that differs from `endpoint`
    pub fn pick_other_than(&self, endpoint: &AgentEndpoint) -> Option<AgentEndpoint> {
        self.directory.iter().find(|candidate| *candidate != endpoint).cloned()
    }
}
