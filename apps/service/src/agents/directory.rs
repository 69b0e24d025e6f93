use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::config::ConfigError;

/// Address of one remote check agent
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentEndpoint(Url);

impl AgentEndpoint {
    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for AgentEndpoint {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidAgentEndpoint {
            endpoint: raw.to_string(),
            source,
        })?;

        match url.scheme() {
            "http" | "https" => Ok(Self(url)),
            scheme => Err(ConfigError::UnsupportedAgentScheme {
                endpoint: raw.to_string(),
                scheme: scheme.to_string(),
            }),
        }
    }
}

impl From<Url> for AgentEndpoint {
    fn from(url: Url) -> Self {
        Self(url)
    }
}

impl fmt::Display for AgentEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Ordered, immutable list of check agents. Never empty.
#[derive(Debug, Clone)]
pub struct AgentDirectory {
    endpoints: Vec<AgentEndpoint>,
}

impl AgentDirectory {
    pub fn new(endpoints: Vec<AgentEndpoint>) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::NoAgents);
        }
        Ok(Self { endpoints })
    }

    /// Parse every endpoint, failing on the first invalid one
    pub fn from_strings<S: AsRef<str>>(raw: &[S]) -> Result<Self, ConfigError> {
        let endpoints = raw
            .iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<AgentEndpoint>, _>>()?;
        Self::new(endpoints)
    }

    pub fn size(&self) -> usize {
        self.endpoints.len()
    }

    /// Wraps around, so any index is valid
    pub fn at(&self, index: usize) -> &AgentEndpoint {
        &self.endpoints[index % self.endpoints.len()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentEndpoint> {
        self.endpoints.iter()
    }
}
