//! Configuration for sift-runtime.
//!
//! Durations are written as humantime strings (`"250ms"`, `"2s"`). Every
//! field has a default, so an empty document is a valid configuration.
//!
//! ```yaml
//! latency_budget: 250ms
//! global_timeout: 2s
//! timeouts:
//!   tokenizer: 50ms
//!   knowledge: 80ms
//! max_depth: 9
//! attempts_per_depth: 3
//! disclosure: open
//! knowledge:
//!   path: knowledge.yaml
//!   strict: false
//! determinism:
//!   resolved_at: "2025-01-01T00:00:00Z"
//! history:
//!   max_turns_considered: 20
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use sift_core::{
    CollaboratorTimeouts, DisclosureLevel, Engine, EngineLimits, HeuristicTokenizer, KnowledgeBase,
    KnowledgeError, LatencyBudget, LoadMode, LoadedKnowledge, MAX_ATTEMPTS_PER_DEPTH, MAX_DEPTH,
};

/// Errors from loading or checking a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Knowledge tables: {0}")]
    Knowledge(#[from] KnowledgeError),
}

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Wall-clock allowance for one resolution
    #[serde(with = "humantime_serde", default = "default_latency_budget")]
    pub latency_budget: Duration,

    /// Hard ceiling on one turn, including scheduling
    #[serde(with = "humantime_serde", default = "default_global_timeout")]
    pub global_timeout: Duration,

    /// Collaborator call timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Deepest layer searched (1..=9)
    #[serde(default = "default_max_depth")]
    pub max_depth: u8,

    /// Attempts per depth (1..=3)
    #[serde(default = "default_attempts_per_depth")]
    pub attempts_per_depth: u8,

    /// Disclosure level for new conversations
    #[serde(default)]
    pub disclosure: DisclosureLevel,

    /// Knowledge table overrides
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Determinism configuration
    #[serde(default)]
    pub determinism: DeterminismConfig,

    /// Conversation history configuration
    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_latency_budget() -> Duration {
    LatencyBudget::DEFAULT.limit()
}

fn default_global_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_max_depth() -> u8 {
    MAX_DEPTH
}

fn default_attempts_per_depth() -> u8 {
    MAX_ATTEMPTS_PER_DEPTH
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            latency_budget: default_latency_budget(),
            global_timeout: default_global_timeout(),
            timeouts: TimeoutConfig::default(),
            max_depth: MAX_DEPTH,
            attempts_per_depth: MAX_ATTEMPTS_PER_DEPTH,
            disclosure: DisclosureLevel::default(),
            knowledge: KnowledgeConfig::default(),
            determinism: DeterminismConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. `.json` files are read as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Reject values outside what the engine allows. Configuration can
    /// tighten the search, never widen it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_DEPTH).contains(&self.max_depth) {
            return Err(ConfigError::Invalid(format!(
                "max_depth must be within 1..={}, got {}",
                MAX_DEPTH, self.max_depth
            )));
        }
        if !(1..=MAX_ATTEMPTS_PER_DEPTH).contains(&self.attempts_per_depth) {
            return Err(ConfigError::Invalid(format!(
                "attempts_per_depth must be within 1..={}, got {}",
                MAX_ATTEMPTS_PER_DEPTH, self.attempts_per_depth
            )));
        }
        if self.global_timeout.is_zero() {
            return Err(ConfigError::Invalid("global_timeout must be positive".to_string()));
        }
        if self.global_timeout < self.latency_budget {
            return Err(ConfigError::Invalid(format!(
                "global_timeout ({}) is shorter than latency_budget ({})",
                humantime::format_duration(self.global_timeout),
                humantime::format_duration(self.latency_budget)
            )));
        }
        if self.timeouts.tokenizer.is_zero() || self.timeouts.knowledge.is_zero() {
            return Err(ConfigError::Invalid(
                "collaborator timeouts must be positive".to_string(),
            ));
        }
        if self.history.max_turns_considered == 0 {
            return Err(ConfigError::Invalid(
                "history.max_turns_considered must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn budget(&self) -> LatencyBudget {
        LatencyBudget::new(self.latency_budget)
    }

    pub fn limits(&self) -> EngineLimits {
        EngineLimits {
            max_depth: self.max_depth,
            attempts_per_depth: self.attempts_per_depth,
        }
    }

    pub fn collaborator_timeouts(&self) -> CollaboratorTimeouts {
        CollaboratorTimeouts {
            tokenizer: self.timeouts.tokenizer,
            knowledge: self.timeouts.knowledge,
        }
    }

    /// Load the configured knowledge tables. Built-ins when no path is set.
    pub fn load_knowledge(&self) -> Result<LoadedKnowledge, KnowledgeError> {
        let mode = if self.knowledge.strict {
            LoadMode::Strict
        } else {
            LoadMode::Degrade
        };
        KnowledgeBase::load(self.knowledge.path.as_deref(), mode)
    }

    /// The standard engine under this configuration.
    pub fn build_engine(&self) -> Result<Engine, ConfigError> {
        self.validate()?;
        Ok(Engine::builder()
            .loaded_knowledge(self.load_knowledge()?)
            .tokenizer(HeuristicTokenizer)
            .table_lookup()
            .timeouts(self.collaborator_timeouts())
            .limits(self.limits())
            .build())
    }

    /// Timestamp for a resolution: the fixed one if configured, else now.
    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.determinism.resolved_at.unwrap_or_else(Utc::now)
    }
}

/// Collaborator timeout configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutConfig {
    /// Tokenizer call timeout
    #[serde(with = "humantime_serde", default = "default_tokenizer_timeout")]
    pub tokenizer: Duration,

    /// Knowledge lookup call timeout
    #[serde(with = "humantime_serde", default = "default_knowledge_timeout")]
    pub knowledge: Duration,
}

fn default_tokenizer_timeout() -> Duration {
    CollaboratorTimeouts::default().tokenizer
}

fn default_knowledge_timeout() -> Duration {
    CollaboratorTimeouts::default().knowledge
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tokenizer: default_tokenizer_timeout(),
            knowledge: default_knowledge_timeout(),
        }
    }
}

/// Where knowledge overrides come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeConfig {
    /// YAML or JSON file merged over the built-in tables
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Fail on an unusable file instead of falling back to built-ins
    #[serde(default)]
    pub strict: bool,
}

/// Determinism configuration for reproducible runs.
///
/// When `resolved_at` is set, every resolution is stamped with it, matching
/// the CLI's `--resolved-at` flag.
///
/// ```yaml
/// determinism:
///   resolved_at: "2025-12-20T10:00:00Z"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DeterminismConfig {
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Conversation history configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    /// Most recent turns a resolution sees
    #[serde(default = "default_max_turns")]
    pub max_turns_considered: usize,
}

fn default_max_turns() -> usize {
    20
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns_considered: default_max_turns(),
        }
    }
}

// Custom serialization for Duration using humantime format
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.latency_budget, Duration::from_millis(250));
        assert_eq!(config.max_depth, 9);
        assert_eq!(config.attempts_per_depth, 3);
        assert_eq!(config.history.max_turns_considered, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = RuntimeConfig::from_yaml("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_humantime_fields() {
        let config = RuntimeConfig::from_yaml(
            r#"
latency_budget: 120ms
global_timeout: 1s
timeouts:
  tokenizer: 30ms
max_depth: 4
disclosure: taste
"#,
        )
        .unwrap();
        assert_eq!(config.latency_budget, Duration::from_millis(120));
        assert_eq!(config.timeouts.tokenizer, Duration::from_millis(30));
        assert_eq!(config.timeouts.knowledge, Duration::from_millis(80));
        assert_eq!(config.limits().max_depth, 4);
        assert_eq!(config.disclosure, DisclosureLevel::Taste);
    }

    #[test]
    fn test_validation_rejects_widening() {
        let err = RuntimeConfig::from_yaml("max_depth: 12").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = RuntimeConfig::from_yaml("attempts_per_depth: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = RuntimeConfig::from_yaml("latency_budget: 5s\nglobal_timeout: 1s").unwrap_err();
        assert!(err.to_string().contains("shorter than latency_budget"));
    }

    #[test]
    fn test_bad_duration_is_a_parse_error() {
        let err = RuntimeConfig::from_yaml("latency_budget: soon").unwrap_err();
        assert!(matches!(err, ConfigError::YamlError(_)));
    }

    #[test]
    fn test_determinism_config_serialization() {
        let mut config = RuntimeConfig::default();
        let fixed_time = Utc.with_ymd_and_hms(2025, 12, 20, 10, 0, 0).unwrap();
        config.determinism.resolved_at = Some(fixed_time);

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("resolved_at"));
        assert!(json.contains("250ms"));

        let parsed = RuntimeConfig::from_json(&json).unwrap();
        assert_eq!(parsed.resolved_at(), fixed_time);
    }

    #[test]
    fn test_strict_knowledge_failure_surfaces() {
        let mut config = RuntimeConfig::default();
        config.knowledge.path = Some(PathBuf::from("/nonexistent/sift-knowledge.yaml"));
        assert!(config.build_engine().is_ok());

        config.knowledge.strict = true;
        assert!(matches!(config.build_engine(), Err(ConfigError::Knowledge(_))));
    }
}
