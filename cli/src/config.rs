// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Governance Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) for the
// governance CLI:
// - Checkpoint backend and location
// - Approval policy thresholds
// - Telemetry channel sizing
// - Health probe default

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use aegis_governance::domain::context::{HealthStatus, RiskLevel};

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "GovernanceConfig";

/// Environment variable pointing at a configuration file
pub const CONFIG_PATH_ENV: &str = "AEGIS_GOVERNANCE_CONFIG";
/// Environment variable overriding `spec.checkpoint.path`
pub const CHECKPOINT_DIR_ENV: &str = "AEGIS_CHECKPOINT_DIR";

/// Top-level governance configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GovernanceConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: GovernanceConfigSpec,
}

pub type GovernanceConfig = GovernanceConfigManifest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceConfigSpec {
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Local,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub backend: CheckpointBackend,

    /// Root directory for the local backend (default: ~/.aegis/checkpoints)
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::default(),
            path: default_checkpoint_path(),
        }
    }
}

impl CheckpointConfig {
    /// `path` with a leading `~` expanded to the home directory
    pub fn resolved_path(&self) -> PathBuf {
        match (self.path.strip_prefix("~"), dirs_next::home_dir()) {
            (Ok(rest), Some(home)) => home.join(rest),
            _ => self.path.clone(),
        }
    }
}

fn default_checkpoint_path() -> PathBuf {
    dirs_next::home_dir()
        .map(|home| home.join(".aegis").join("checkpoints"))
        .unwrap_or_else(|| PathBuf::from(".aegis/checkpoints"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Highest risk level the policy gate may approve on its own
    #[serde(default = "default_auto_approve_max_level")]
    pub auto_approve_max_level: RiskLevel,

    /// Lowest risk level the policy gate refuses outright (unset: never)
    #[serde(default = "default_auto_reject_min_level")]
    pub auto_reject_min_level: Option<RiskLevel>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            auto_approve_max_level: default_auto_approve_max_level(),
            auto_reject_min_level: default_auto_reject_min_level(),
        }
    }
}

fn default_auto_approve_max_level() -> RiskLevel {
    RiskLevel::SystemMeta
}

fn default_auto_reject_min_level() -> Option<RiskLevel> {
    Some(RiskLevel::IllegalOrHarmful)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Witness record buffer of the event bus
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Status reported by the static health probe
    #[serde(default = "default_health_status")]
    pub default_status: HealthStatus,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            default_status: default_health_status(),
        }
    }
}

fn default_health_status() -> HealthStatus {
    HealthStatus::Healthy
}

impl Default for GovernanceConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "default-governance".to_string(),
                version: None,
                labels: None,
            },
            spec: GovernanceConfigSpec::default(),
        }
    }
}

impl GovernanceConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Standard discovery locations, in precedence order (after `--config`).
    pub fn discovery_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("./aegis-governance.yaml"));
        if let Some(home) = dirs_next::home_dir() {
            paths.push(home.join(".aegis").join("governance.yaml"));
        }
        #[cfg(unix)]
        paths.push(PathBuf::from("/etc/aegis/governance.yaml"));
        #[cfg(windows)]
        paths.push(PathBuf::from("C:\\ProgramData\\Aegis\\governance.yaml"));
        paths
    }

    /// First existing file among the discovery paths
    pub fn discover_config() -> Option<PathBuf> {
        Self::discovery_paths().into_iter().find(|path| path.exists())
    }

    /// Load from an explicit path (must exist), else discovery, else defaults.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)
                .with_context(|| format!("Failed to load config at {:?}", path))?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(&path)
                .with_context(|| format!("Failed to load config at {:?}", path))?
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(CHECKPOINT_DIR_ENV) {
            if dir.trim().is_empty() {
                tracing::warn!("Ignoring empty {}", CHECKPOINT_DIR_ENV);
            } else {
                tracing::info!("Environment override: {}={}", CHECKPOINT_DIR_ENV, dir);
                self.spec.checkpoint.path = PathBuf::from(dir);
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.checkpoint.backend == CheckpointBackend::Local
            && self.spec.checkpoint.path.as_os_str().is_empty()
        {
            anyhow::bail!("spec.checkpoint.path cannot be empty for the local backend");
        }

        if self.spec.approval.auto_approve_max_level.requires_approval() {
            anyhow::bail!(
                "spec.approval.auto_approve_max_level '{}' requires human approval and cannot be auto-approved",
                self.spec.approval.auto_approve_max_level
            );
        }

        if let Some(min) = self.spec.approval.auto_reject_min_level {
            if min <= self.spec.approval.auto_approve_max_level {
                anyhow::bail!(
                    "spec.approval.auto_reject_min_level '{}' overlaps the auto-approved range",
                    min
                );
            }
        }

        if self.spec.telemetry.channel_capacity == 0 {
            anyhow::bail!("spec.telemetry.channel_capacity must be greater than zero");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest_is_valid() {
        let manifest = GovernanceConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert_eq!(manifest.spec.checkpoint.backend, CheckpointBackend::Local);
        assert_eq!(manifest.spec.telemetry.channel_capacity, 1000);
        manifest.validate().unwrap();
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: GovernanceConfig
metadata:
  name: edge-governance
spec:
  checkpoint:
    backend: memory
  approval:
    auto_approve_max_level: safe_info
"#;
        let manifest = GovernanceConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.checkpoint.backend, CheckpointBackend::Memory);
        assert_eq!(manifest.spec.approval.auto_approve_max_level, RiskLevel::SafeInfo);
        assert_eq!(
            manifest.spec.approval.auto_reject_min_level,
            Some(RiskLevel::IllegalOrHarmful)
        );
        assert_eq!(manifest.spec.health.default_status, HealthStatus::Healthy);
        manifest.validate().unwrap();
    }

    #[test]
    fn test_validation_failures() {
        let mut manifest = GovernanceConfigManifest::default();
        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = GovernanceConfigManifest::default();
        manifest.spec.approval.auto_approve_max_level = RiskLevel::DataAccess;
        assert!(manifest.validate().is_err());

        let mut manifest = GovernanceConfigManifest::default();
        manifest.spec.telemetry.channel_capacity = 0;
        assert!(manifest.validate().is_err());

        let mut manifest = GovernanceConfigManifest::default();
        manifest.spec.checkpoint.path = PathBuf::new();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_checkpoint_path_expands_home() {
        let config = CheckpointConfig {
            backend: CheckpointBackend::Local,
            path: PathBuf::from("~/.aegis/checkpoints"),
        };
        if let Some(home) = dirs_next::home_dir() {
            assert_eq!(config.resolved_path(), home.join(".aegis/checkpoints"));
        }

        let absolute = CheckpointConfig {
            backend: CheckpointBackend::Local,
            path: PathBuf::from("/var/lib/aegis/checkpoints"),
        };
        assert_eq!(absolute.resolved_path(), PathBuf::from("/var/lib/aegis/checkpoints"));
    }

    #[test]
    fn test_yaml_roundtrip_keeps_spec() {
        let mut manifest = GovernanceConfigManifest::default();
        manifest.spec.health.default_status = HealthStatus::Warning;
        let yaml = manifest.to_yaml_string().unwrap();
        assert!(yaml.contains("default_status: WARNING"));

        let parsed = GovernanceConfigManifest::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.spec.health.default_status, HealthStatus::Warning);
    }
}
