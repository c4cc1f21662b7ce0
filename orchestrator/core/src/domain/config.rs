// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration Types
//
// Defines the configuration schema consumed by the lifecycle core:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Discovery backend selection, intervals, backoff and conflict policy
// - Health monitor cadence, timeouts and thresholds
// - Ordered healing strategy list
// - Logging and metrics settings for the composition root

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::discovery::{ConflictPolicy, ServiceDescriptor};
use crate::domain::healing::{default_strategies, HealingCondition, HealingStrategy};
use crate::domain::registry::RegistryPolicy;

pub const API_VERSION: &str = "ouroboros.ai/v1";
pub const KIND: &str = "OrchestratorConfig";

/// Top-level Kubernetes-style orchestrator configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfigManifest {
    /// API version (must be "ouroboros.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "OrchestratorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: OrchestratorSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable orchestrator name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorSpec {
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub healing: HealingConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiscoveryBackendConfig {
    /// Fixed list, for environments without external coordination
    Static {
        #[serde(default)]
        services: Vec<ServiceDescriptor>,
    },
    /// Consul agent HTTP API
    Consul {
        /// Base URL, e.g. "http://localhost:8500"
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datacenter: Option<String>,
    },
}

impl Default for DiscoveryBackendConfig {
    fn default() -> Self {
        Self::Static { services: vec![] }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub backend: DiscoveryBackendConfig,

    /// Time between discovery cycles
    #[serde(default = "default_discovery_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Upper bound for every backend call
    #[serde(default = "default_call_timeout", with = "humantime_serde")]
    pub call_timeout: Duration,

    /// First retry delay after a failed cycle; doubles up to `backoff_max`
    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,

    #[serde(default = "default_backoff_max", with = "humantime_serde")]
    pub backoff_max: Duration,

    #[serde(default)]
    pub conflict_policy: ConflictPolicy,

    /// Descriptor under which the orchestrator announces itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_registration: Option<ServiceDescriptor>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            backend: DiscoveryBackendConfig::default(),
            interval: default_discovery_interval(),
            call_timeout: default_call_timeout(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
            conflict_policy: ConflictPolicy::default(),
            self_registration: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Per-agent bound on `health_check()`
    #[serde(default = "default_check_timeout", with = "humantime_serde")]
    pub check_timeout: Duration,

    /// Agents without a successful check for this long are pruned
    #[serde(default = "default_heartbeat_timeout", with = "humantime_serde")]
    pub heartbeat_timeout: Duration,

    /// Scores below this are failing samples
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: f64,

    /// Consecutive failing samples before healing kicks in
    #[serde(default = "default_failures_before_healing")]
    pub failures_before_healing: u32,

    /// Bound on simultaneous in-flight checks
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: default_health_interval(),
            check_timeout: default_check_timeout(),
            heartbeat_timeout: default_heartbeat_timeout(),
            unhealthy_threshold: default_unhealthy_threshold(),
            failures_before_healing: default_failures_before_healing(),
            max_concurrent_checks: default_max_concurrent_checks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingConfig {
    /// Ordered, first match wins. Empty means the built-in list.
    #[serde(default)]
    pub strategies: Vec<HealingStrategy>,

    /// Upper bound for one remediation action
    #[serde(default = "default_remediation_timeout", with = "humantime_serde")]
    pub remediation_timeout: Duration,

    /// Delay before the first attempt; later attempts scale by the strategy's backoff_factor
    #[serde(default = "default_remediation_backoff", with = "humantime_serde")]
    pub base_backoff: Duration,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            strategies: vec![],
            remediation_timeout: default_remediation_timeout(),
            base_backoff: default_remediation_backoff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// How long stop() waits for loops before aborting them
    #[serde(default = "default_shutdown_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,

    /// Upper bound for one agent's initialize()
    #[serde(default = "default_init_timeout", with = "humantime_serde")]
    pub init_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: default_shutdown_grace(),
            init_timeout: default_init_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required setting: {0}")]
    Missing(String),
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_discovery_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(60)
}

fn default_health_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_heartbeat_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_unhealthy_threshold() -> f64 {
    0.5
}

fn default_failures_before_healing() -> u32 {
    1
}

fn default_max_concurrent_checks() -> usize {
    64
}

fn default_remediation_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_remediation_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_init_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for OrchestratorConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "ouroboros".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: OrchestratorSpec::default(),
        }
    }
}

impl OrchestratorConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. OUROBOROS_CONFIG_PATH environment variable
    /// 2. ./ouroboros-config.yaml (working directory)
    /// 3. ~/.ouroboros/config.yaml (user home)
    /// 4. /etc/ouroboros/config.yaml (Unix) or C:\ProgramData\Ouroboros\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("OUROBOROS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./ouroboros-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".ouroboros").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/ouroboros/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Ouroboros\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = explicit_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Override source is injectable so tests never touch the process environment.
    ///
    /// - `OUROBOROS_DISCOVERY_BACKEND=static|consul` switches the backend
    /// - `CONSUL_HOST` / `CONSUL_PORT` rewrite the Consul address
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(backend) = lookup("OUROBOROS_DISCOVERY_BACKEND") {
            match backend.to_lowercase().as_str() {
                "consul" => {
                    if !matches!(self.spec.discovery.backend, DiscoveryBackendConfig::Consul { .. }) {
                        tracing::info!("Environment override: OUROBOROS_DISCOVERY_BACKEND=consul");
                        self.spec.discovery.backend = DiscoveryBackendConfig::Consul {
                            address: "http://localhost:8500".to_string(),
                            token: None,
                            datacenter: None,
                        };
                    }
                }
                "static" | "memory" => {
                    if !matches!(self.spec.discovery.backend, DiscoveryBackendConfig::Static { .. }) {
                        tracing::info!("Environment override: OUROBOROS_DISCOVERY_BACKEND=static");
                        self.spec.discovery.backend = DiscoveryBackendConfig::default();
                    }
                }
                other => {
                    tracing::warn!(
                        "Invalid value for OUROBOROS_DISCOVERY_BACKEND: '{}'. Expected static/consul. Ignoring.",
                        other
                    );
                }
            }
        }

        let host = lookup("CONSUL_HOST");
        let port = lookup("CONSUL_PORT");
        if host.is_none() && port.is_none() {
            return;
        }
        if let DiscoveryBackendConfig::Consul { address, .. } = &mut self.spec.discovery.backend {
            let host = host.unwrap_or_else(|| "localhost".to_string());
            let port = match port.as_deref().map(str::parse::<u16>) {
                Some(Ok(port)) => port,
                Some(Err(_)) => {
                    tracing::warn!("Invalid value for CONSUL_PORT. Using 8500.");
                    8500
                }
                None => 8500,
            };
            *address = format!("http://{}:{}", host, port);
            tracing::info!("Environment override: consul address {}", address);
        }
    }

    /// Strategies in effect: the configured list, or the built-in one.
    pub fn effective_strategies(&self) -> Vec<HealingStrategy> {
        if self.spec.healing.strategies.is_empty() {
            default_strategies(self.spec.health.unhealthy_threshold)
        } else {
            self.spec.healing.strategies.clone()
        }
    }

    pub fn registry_policy(&self) -> RegistryPolicy {
        RegistryPolicy {
            health_threshold: self.spec.health.unhealthy_threshold,
            stale_after: self.spec.health.heartbeat_timeout,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.api_version != API_VERSION {
            return Err(ConfigurationError::Invalid(format!(
                "apiVersion '{}' must be '{}'",
                self.api_version, API_VERSION
            )));
        }
        if self.kind != KIND {
            return Err(ConfigurationError::Invalid(format!(
                "kind '{}' must be '{}'",
                self.kind, KIND
            )));
        }
        if self.metadata.name.is_empty() {
            return Err(ConfigurationError::Missing("metadata.name".to_string()));
        }

        let discovery = &self.spec.discovery;
        require_positive("spec.discovery.interval", discovery.interval)?;
        require_positive("spec.discovery.call_timeout", discovery.call_timeout)?;
        if discovery.backoff_base > discovery.backoff_max {
            return Err(ConfigurationError::Invalid(
                "spec.discovery.backoff_base exceeds backoff_max".to_string(),
            ));
        }
        match &discovery.backend {
            DiscoveryBackendConfig::Static { services } => {
                if services.iter().any(|s| s.id.as_str().is_empty()) {
                    return Err(ConfigurationError::Invalid(
                        "static discovery service with empty id".to_string(),
                    ));
                }
            }
            DiscoveryBackendConfig::Consul { address, .. } => {
                if address.is_empty() {
                    return Err(ConfigurationError::Missing(
                        "spec.discovery.backend.address".to_string(),
                    ));
                }
                if !address.starts_with("http://") && !address.starts_with("https://") {
                    return Err(ConfigurationError::Invalid(format!(
                        "consul address '{}' must start with http:// or https://",
                        address
                    )));
                }
            }
        }

        let health = &self.spec.health;
        require_positive("spec.health.interval", health.interval)?;
        require_positive("spec.health.check_timeout", health.check_timeout)?;
        require_positive("spec.health.heartbeat_timeout", health.heartbeat_timeout)?;
        if !(health.unhealthy_threshold > 0.0 && health.unhealthy_threshold <= 1.0) {
            return Err(ConfigurationError::Invalid(format!(
                "spec.health.unhealthy_threshold {} must be in (0, 1]",
                health.unhealthy_threshold
            )));
        }
        if health.failures_before_healing == 0 {
            return Err(ConfigurationError::Invalid(
                "spec.health.failures_before_healing must be at least 1".to_string(),
            ));
        }
        if health.max_concurrent_checks == 0 {
            return Err(ConfigurationError::Invalid(
                "spec.health.max_concurrent_checks must be at least 1".to_string(),
            ));
        }

        require_positive("spec.healing.remediation_timeout", self.spec.healing.remediation_timeout)?;
        let mut names = HashSet::new();
        for strategy in &self.spec.healing.strategies {
            if strategy.name.is_empty() {
                return Err(ConfigurationError::Missing("healing strategy name".to_string()));
            }
            if !names.insert(strategy.name.as_str()) {
                return Err(ConfigurationError::Invalid(format!(
                    "duplicate healing strategy '{}'",
                    strategy.name
                )));
            }
            if !strategy.backoff_factor.is_finite() || strategy.backoff_factor < 1.0 {
                return Err(ConfigurationError::Invalid(format!(
                    "strategy '{}' backoff_factor must be >= 1.0",
                    strategy.name
                )));
            }
            if let HealingCondition::HealthBelow { threshold } = strategy.condition {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(ConfigurationError::Invalid(format!(
                        "strategy '{}' threshold {} outside [0, 1]",
                        strategy.name, threshold
                    )));
                }
            }
        }

        require_positive("spec.lifecycle.shutdown_grace", self.spec.lifecycle.shutdown_grace)?;
        require_positive("spec.lifecycle.init_timeout", self.spec.lifecycle.init_timeout)?;

        Ok(())
    }
}

fn require_positive(field: &str, value: Duration) -> Result<(), ConfigurationError> {
    if value.is_zero() {
        return Err(ConfigurationError::Invalid(format!("{} must be greater than zero", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::healing::HealingAction;

    #[test]
    fn test_default_manifest() {
        let manifest = OrchestratorConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.health.failures_before_healing, 1);
        assert_eq!(manifest.spec.discovery.conflict_policy, ConflictPolicy::MostRecentWins);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
apiVersion: ouroboros.ai/v1
kind: OrchestratorConfig
metadata:
  name: test-orchestrator
spec:
  discovery:
    backend:
      type: consul
      address: http://consul:8500
    interval: 10s
    call_timeout: 750ms
    conflict_policy: first_seen_wins
  health:
    interval: 2s
    heartbeat_timeout: 1m
    unhealthy_threshold: 0.6
    failures_before_healing: 2
  healing:
    strategies:
      - name: restart
        condition:
          type: health_below
          threshold: 0.6
        action:
          type: restart_in_place
        max_retries: 4
"#;
        let manifest = OrchestratorConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "test-orchestrator");
        assert_eq!(
            manifest.spec.discovery.backend,
            DiscoveryBackendConfig::Consul {
                address: "http://consul:8500".to_string(),
                token: None,
                datacenter: None,
            }
        );
        assert_eq!(manifest.spec.discovery.interval, Duration::from_secs(10));
        assert_eq!(manifest.spec.discovery.call_timeout, Duration::from_millis(750));
        assert_eq!(manifest.spec.discovery.conflict_policy, ConflictPolicy::FirstSeenWins);
        assert_eq!(manifest.spec.health.heartbeat_timeout, Duration::from_secs(60));
        assert_eq!(manifest.spec.health.check_timeout, Duration::from_secs(2));
        assert_eq!(manifest.spec.health.failures_before_healing, 2);

        let strategies = manifest.effective_strategies();
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].action, HealingAction::RestartInPlace);
        assert_eq!(strategies[0].max_retries, 4);

        let policy = manifest.registry_policy();
        assert_eq!(policy.health_threshold, 0.6);
        assert_eq!(policy.stale_after, Duration::from_secs(60));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_default_strategies_when_none_configured() {
        let manifest = OrchestratorConfigManifest::default();
        let names: Vec<_> = manifest.effective_strategies().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["restart-stale", "restart-on-crash", "constrain-memory", "restart-degraded"]
        );
    }

    #[test]
    fn test_validation() {
        let mut manifest = OrchestratorConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.metadata.name = "".to_string();
        assert_eq!(
            manifest.validate(),
            Err(ConfigurationError::Missing("metadata.name".to_string()))
        );
        manifest.metadata.name = "orch".to_string();

        manifest.spec.health.unhealthy_threshold = 1.5;
        assert!(manifest.validate().is_err());
        manifest.spec.health.unhealthy_threshold = 0.5;

        manifest.spec.health.failures_before_healing = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.health.failures_before_healing = 1;

        manifest.spec.health.check_timeout = Duration::ZERO;
        assert!(manifest.validate().is_err());
        manifest.spec.health.check_timeout = Duration::from_secs(1);

        manifest.spec.discovery.backend = DiscoveryBackendConfig::Consul {
            address: "consul:8500".to_string(),
            token: None,
            datacenter: None,
        };
        assert!(manifest.validate().is_err());
        manifest.spec.discovery.backend = DiscoveryBackendConfig::default();

        let strategy = HealingStrategy::new("dup", HealingCondition::Always, HealingAction::RestartInPlace);
        manifest.spec.healing.strategies = vec![strategy.clone(), strategy];
        assert!(manifest.validate().is_err());

        manifest.spec.healing.strategies = vec![
            HealingStrategy::new("slow", HealingCondition::Always, HealingAction::RestartInPlace)
                .with_backoff_factor(0.5),
        ];
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut manifest = OrchestratorConfigManifest::default();
        manifest.apply_overrides_from(|key| match key {
            "OUROBOROS_DISCOVERY_BACKEND" => Some("consul".to_string()),
            "CONSUL_HOST" => Some("consul.internal".to_string()),
            "CONSUL_PORT" => Some("8600".to_string()),
            _ => None,
        });
        assert_eq!(
            manifest.spec.discovery.backend,
            DiscoveryBackendConfig::Consul {
                address: "http://consul.internal:8600".to_string(),
                token: None,
                datacenter: None,
            }
        );

        // CONSUL_* alone does not switch a static backend
        let mut manifest = OrchestratorConfigManifest::default();
        manifest.apply_overrides_from(|key| match key {
            "CONSUL_HOST" => Some("consul.internal".to_string()),
            _ => None,
        });
        assert_eq!(manifest.spec.discovery.backend, DiscoveryBackendConfig::default());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ouroboros-config.yaml");

        let mut manifest = OrchestratorConfigManifest::default();
        manifest.metadata.name = "file-test".to_string();
        manifest.spec.health.interval = Duration::from_millis(1500);
        manifest.to_yaml_file(&path).unwrap();

        let loaded = OrchestratorConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "file-test");
        assert_eq!(loaded.spec.health.interval, Duration::from_millis(1500));

        let missing = dir.path().join("missing.yaml");
        assert!(OrchestratorConfigManifest::load_or_default(Some(missing)).is_err());
    }
}
