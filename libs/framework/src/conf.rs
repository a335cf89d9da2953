//! Scheduler configuration.
//!
//! The scheduler configuration names the actions run each cycle, in order,
//! and the plugin tiers that make up the policy registry:
//!
//! ```toml
//! actions = ["allocate", "backfill"]
//!
//! [[tiers]]
//! [[tiers.plugins]]
//! name = "priority"
//!
//! [[tiers.plugins]]
//! name = "gang"
//! enabled_preemptable = false
//! ```
//!
//! Process-level settings (cycle period, where the file lives, log level)
//! come from the environment; see [`WorkerConfig::from_env`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Configuration used when no file is given.
pub const DEFAULT_SCHEDULER_CONF: &str = r#"
actions = ["allocate", "backfill"]

[[tiers]]
[[tiers.plugins]]
name = "priority"

[[tiers.plugins]]
name = "gang"

[[tiers]]
[[tiers.plugins]]
name = "predicates"

[[tiers.plugins]]
name = "proportion"
"#;

/// Default scheduling period.
pub const DEFAULT_SCHEDULE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfiguration {
    pub actions: Vec<String>,
    #[serde(default)]
    pub tiers: Vec<Tier>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Tier {
    #[serde(default)]
    pub plugins: Vec<PluginOption>,
}

/// One policy kind a plugin may contribute to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    JobOrder,
    QueueOrder,
    TaskOrder,
    Predicate,
    Preemptable,
    Reclaimable,
    Overused,
    JobReady,
    JobValid,
}

/// A plugin entry in a tier. Every `enabled_*` flag defaults to enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PluginOption {
    pub name: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
    pub enabled_job_order: Option<bool>,
    pub enabled_queue_order: Option<bool>,
    pub enabled_task_order: Option<bool>,
    pub enabled_predicate: Option<bool>,
    pub enabled_preemptable: Option<bool>,
    pub enabled_reclaimable: Option<bool>,
    pub enabled_overused: Option<bool>,
    pub enabled_job_ready: Option<bool>,
    pub enabled_job_valid: Option<bool>,
}

impl PluginOption {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn enabled(&self, kind: PolicyKind) -> bool {
        let flag = match kind {
            PolicyKind::JobOrder => self.enabled_job_order,
            PolicyKind::QueueOrder => self.enabled_queue_order,
            PolicyKind::TaskOrder => self.enabled_task_order,
            PolicyKind::Predicate => self.enabled_predicate,
            PolicyKind::Preemptable => self.enabled_preemptable,
            PolicyKind::Reclaimable => self.enabled_reclaimable,
            PolicyKind::Overused => self.enabled_overused,
            PolicyKind::JobReady => self.enabled_job_ready,
            PolicyKind::JobValid => self.enabled_job_valid,
        };
        flag.unwrap_or(true)
    }
}

impl SchedulerConfiguration {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let conf: Self = toml::from_str(s)?;
        if conf.actions.is_empty() {
            return Err(ConfigError::EmptyActions);
        }
        Ok(conf)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}

impl Default for SchedulerConfiguration {
    fn default() -> Self {
        Self {
            actions: vec!["allocate".to_string(), "backfill".to_string()],
            tiers: vec![
                Tier {
                    plugins: vec![PluginOption::new("priority"), PluginOption::new("gang")],
                },
                Tier {
                    plugins: vec![
                        PluginOption::new("predicates"),
                        PluginOption::new("proportion"),
                    ],
                },
            ],
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Process-level settings for the periodic scheduler.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Time between scheduling cycles.
    pub schedule_period: Duration,

    /// Scheduler configuration file; the built-in default when unset.
    pub scheduler_conf: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let schedule_period = match std::env::var("GANGPLANK_SCHEDULE_PERIOD_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidEnv {
                    var: "GANGPLANK_SCHEDULE_PERIOD_SECS",
                    value: raw,
                })?,
            Err(_) => DEFAULT_SCHEDULE_PERIOD,
        };

        let scheduler_conf = std::env::var("GANGPLANK_SCHEDULER_CONF")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let log_level = match std::env::var("GANGPLANK_LOG_LEVEL") {
            Ok(raw) if LOG_LEVELS.contains(&raw.to_ascii_lowercase().as_str()) => {
                raw.to_ascii_lowercase()
            }
            Ok(raw) => {
                return Err(ConfigError::InvalidEnv {
                    var: "GANGPLANK_LOG_LEVEL",
                    value: raw,
                })
            }
            Err(_) => "info".to_string(),
        };

        Ok(Self {
            schedule_period,
            scheduler_conf,
            log_level,
        })
    }

    /// `EnvFilter` directive for the embedding process: the configured level
    /// for the scheduler's own targets, `warn` for everything else.
    pub fn log_filter(&self) -> String {
        format!(
            "warn,gangplank_framework={0},gangplank_id={0}",
            self.log_level
        )
    }

    /// Reads the configured scheduler configuration, or the default.
    pub fn scheduler_configuration(&self) -> Result<SchedulerConfiguration, ConfigError> {
        match &self.scheduler_conf {
            Some(path) => SchedulerConfiguration::load(path),
            None => SchedulerConfiguration::from_toml_str(DEFAULT_SCHEDULER_CONF),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_conf_parses_to_default() {
        let parsed = SchedulerConfiguration::from_toml_str(DEFAULT_SCHEDULER_CONF).unwrap();
        assert_eq!(parsed, SchedulerConfiguration::default());
    }

    #[test]
    fn test_enabled_flags() {
        let conf = SchedulerConfiguration::from_toml_str(
            r#"
            actions = ["preempt"]

            [[tiers]]
            [[tiers.plugins]]
            name = "gang"
            enabled_job_ready = false
            arguments = { min_ratio = "0.5" }
            "#,
        )
        .unwrap();

        let gang = &conf.tiers[0].plugins[0];
        assert!(!gang.enabled(PolicyKind::JobReady));
        assert!(gang.enabled(PolicyKind::JobOrder));
        assert_eq!(gang.arguments["min_ratio"], "0.5");
    }

    #[test]
    fn test_empty_actions_rejected() {
        let err = SchedulerConfiguration::from_toml_str("actions = []").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyActions));
    }

    #[test]
    fn test_malformed_toml() {
        let err = SchedulerConfiguration::from_toml_str("actions = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "actions = [\"allocate\"]").unwrap();

        let conf = SchedulerConfiguration::load(file.path()).unwrap();
        assert_eq!(conf.actions, vec!["allocate"]);
        assert!(conf.tiers.is_empty());
    }

    const ENV_VARS: [&str; 3] = [
        "GANGPLANK_SCHEDULE_PERIOD_SECS",
        "GANGPLANK_SCHEDULER_CONF",
        "GANGPLANK_LOG_LEVEL",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    // One test owns the GANGPLANK_* variables so parallel tests never race.
    #[test]
    fn test_worker_config_from_env() {
        clear_env();
        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.schedule_period, DEFAULT_SCHEDULE_PERIOD);
        assert!(config.scheduler_conf.is_none());
        assert_eq!(config.log_level, "info");
        assert_eq!(
            config.log_filter(),
            "warn,gangplank_framework=info,gangplank_id=info"
        );
        assert_eq!(
            config.scheduler_configuration().unwrap(),
            SchedulerConfiguration::default()
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "actions = [\"backfill\"]").unwrap();
        std::env::set_var("GANGPLANK_SCHEDULE_PERIOD_SECS", "5");
        std::env::set_var("GANGPLANK_SCHEDULER_CONF", file.path());
        std::env::set_var("GANGPLANK_LOG_LEVEL", "DEBUG");
        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.schedule_period, Duration::from_secs(5));
        assert_eq!(config.scheduler_conf.as_deref(), Some(file.path()));
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.scheduler_configuration().unwrap().actions,
            vec!["backfill"]
        );

        std::env::set_var("GANGPLANK_SCHEDULER_CONF", "");
        let config = WorkerConfig::from_env().unwrap();
        assert!(config.scheduler_conf.is_none());

        for (var, value) in [
            ("GANGPLANK_SCHEDULE_PERIOD_SECS", "0"),
            ("GANGPLANK_SCHEDULE_PERIOD_SECS", "soon"),
            ("GANGPLANK_LOG_LEVEL", "loud"),
        ] {
            clear_env();
            std::env::set_var(var, value);
            let err = WorkerConfig::from_env().unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidEnv { var: v, value: got } if *v == var && got == value),
                "{var}={value}: {err}"
            );
        }
        clear_env();
    }

    #[test]
    fn test_load_missing_file() {
        let err = SchedulerConfiguration::load(Path::new("/nonexistent/gangplank.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
