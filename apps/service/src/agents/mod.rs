/// Check agent pool
///
/// The directory is the ordered, read-only list of agent endpoints loaded at
/// startup. The selector hands endpoints out round-robin and picks an
/// alternate agent for failover and verification.
pub mod directory;
pub mod selector;

pub use directory::{AgentDirectory, AgentEndpoint};
pub use selector::RoundRobinSelector;
