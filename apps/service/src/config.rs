use std::collections::HashSet;
use std::time::Duration;
use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::AgentDirectory;
use crate::monitoring::scheduler::{TickOverlap, TierSchedule};
use crate::monitoring::types::ScheduleTier;

/// Overrides `agents.token` when set
pub const TOKEN_ENV_VAR: &str = "UPTRACK_AGENT_TOKEN";

pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to write config file {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("No config path available: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,

    #[error("Agent directory is empty, at least one check agent is required")]
    NoAgents,

    #[error("Invalid agent endpoint {endpoint:?}: {source}")]
    InvalidAgentEndpoint { endpoint: String, source: url::ParseError },

    #[error("Agent endpoint {endpoint:?} uses unsupported scheme {scheme:?}")]
    UnsupportedAgentScheme { endpoint: String, scheme: String },

    #[error("Schedule tier {0} is configured more than once")]
    DuplicateTier(ScheduleTier),

    #[error("No schedule tiers configured")]
    NoTiers,

    #[error("Probe timeout must be greater than zero")]
    ZeroTimeout,

    #[error("max_concurrent_checks must be greater than zero")]
    ZeroConcurrency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub agents: Agents,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agents {
    /// Check agent URLs, in round-robin order
    pub endpoints: Vec<String>,
    /// Bearer token attached to every agent request
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub path: path::PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Cap on in-flight checks across all tiers, unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_checks: Option<usize>,
    #[serde(default)]
    pub tick_overlap: TickOverlap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSettings {
    pub minutes: ScheduleTier,
    /// Defaults to three quarters of the tier period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staleness_seconds: Option<u64>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

fn default_tiers() -> Vec<TierSettings> {
    ScheduleTier::ALL
        .into_iter()
        .map(|tier| TierSettings {
            minutes: tier,
            staleness_seconds: Some(tier.default_staleness().as_secs()),
        })
        .collect()
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/uptrack/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("uptrack/config.toml"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agents: Agents {
                endpoints: vec!["http://127.0.0.1:8081/check".into()],
                token: String::new(),
                timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            },
            database: DatabaseSettings { path: "uptrack.db".into() },
            scheduler: SchedulerSettings::default(),
            tiers: default_tiers(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Agents")?;
        for (index, endpoint) in self.agents.endpoints.iter().enumerate() {
            write_2(f, &format!("#{index}"), endpoint)?;
        }
        write_1(f, "Token", &if self.agents.token.is_empty() { "<unset>" } else { "<set>" })?;
        write_1(f, "Timeout (ms)", &self.agents.timeout_ms)?;

        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;

        write_title_1(f, "Scheduler")?;
        match self.scheduler.max_concurrent_checks {
            Some(cap) => write_1(f, "Max Concurrent Checks", &cap)?,
            None => write_1(f, "Max Concurrent Checks", &"unbounded")?,
        }
        write_1(f, "Tick Overlap", &self.scheduler.tick_overlap)?;

        write_title_1(f, "Tiers")?;
        for tier in &self.tiers {
            let staleness = tier.staleness().as_secs();
            write_2(f, &tier.minutes.to_string(), &format!("stale after {staleness}s"))?;
        }

        Ok(())
    }
}

impl TierSettings {
    pub fn staleness(&self) -> Duration {
        self.staleness_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.minutes.default_staleness())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uptrack/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// use uptrack_service::config::Config;
    ///
    /// let cfg = Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), uptrack_service::config::ConfigError>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let mut config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            Self::from_toml_str(&raw_string)?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })?;
        }

        std::fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = env::var(TOKEN_ENV_VAR) {
            self.agents.token = token;
        }
    }

    /// Build the agent directory, fails if it would be empty
    pub fn agent_directory(&self) -> Result<AgentDirectory, ConfigError> {
        AgentDirectory::from_strings(&self.agents.endpoints)
    }

    pub fn probe_timeout(&self) -> Result<Duration, ConfigError> {
        match self.agents.timeout_ms {
            0 => Err(ConfigError::ZeroTimeout),
            ms => Ok(Duration::from_millis(ms)),
        }
    }

    pub fn max_concurrent_checks(&self) -> Result<Option<usize>, ConfigError> {
        match self.scheduler.max_concurrent_checks {
            Some(0) => Err(ConfigError::ZeroConcurrency),
            cap => Ok(cap),
        }
    }

    /// One schedule per configured tier, in configuration order
    pub fn tier_schedules(&self) -> Result<Vec<TierSchedule>, ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::NoTiers);
        }

        let mut seen = HashSet::new();
        self.tiers
            .iter()
            .map(|settings| {
                if !seen.insert(settings.minutes) {
                    return Err(ConfigError::DuplicateTier(settings.minutes));
                }
                Ok(TierSchedule::new(settings.minutes).with_staleness(settings.staleness()))
            })
            .collect()
    }

    /// Check everything the engine needs before it starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.agent_directory()?;
        self.probe_timeout()?;
        self.max_concurrent_checks()?;
        self.tier_schedules()?;
        Ok(())
    }
}
