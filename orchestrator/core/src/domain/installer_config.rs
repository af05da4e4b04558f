// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Installer Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing one
// installer service instance:
// - session store location, TTL and sweep cadence
// - provisioning tool binary, work directory and phase deadline
// - HTTP bind address
// - cloud backend selection and logging

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "kuberstack.io/v1";
pub const KIND: &str = "InstallerConfig";

/// Top-level installer configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfigManifest {
    /// API version (must be "kuberstack.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "InstallerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: InstallerConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallerConfigSpec {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub provisioner: ProvisionerConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub cloud: CloudConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory of the embedded database
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Lifetime of a session record after its last write
    #[serde(default = "default_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    /// Interval between expiry sweeps
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Unix permission bits of the database directory
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            ttl: default_ttl(),
            sweep_interval: default_sweep_interval(),
            file_mode: default_file_mode(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Provisioning tool executable, resolved through PATH when relative
    #[serde(default = "default_tool_path")]
    pub tool_path: PathBuf,

    /// Parent of the per-session home directories
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Hard deadline of a single tool invocation. Exceeding it terminates
    /// the service.
    #[serde(default = "default_phase_timeout", with = "humantime_serde")]
    pub phase_timeout: Duration,

    /// Run a forced rolling update after the update phase
    #[serde(default)]
    pub rolling_update: bool,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            tool_path: default_tool_path(),
            work_dir: default_work_dir(),
            phase_timeout: default_phase_timeout(),
            rolling_update: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudBackend {
    /// Process-local providers, for demos and tests
    #[default]
    Memory,
}

impl CloudBackend {
    /// Backends that never touch a real provider account
    pub fn is_simulated(self) -> bool {
        matches!(self, CloudBackend::Memory)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default)]
    pub backend: CloudBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
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

fn default_store_path() -> PathBuf {
    PathBuf::from("/var/lib/kuberstack/sessions")
}

fn default_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_file_mode() -> u32 {
    0o750
}

fn default_tool_path() -> PathBuf {
    PathBuf::from("kops")
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("kuberstack")
}

fn default_phase_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for InstallerConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "kuberstack-installer".to_string(),
                labels: None,
            },
            spec: InstallerConfigSpec::default(),
        }
    }
}

impl InstallerConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. KUBERSTACK_CONFIG_PATH environment variable
    /// 2. ./kuberstack-config.yaml (working directory)
    /// 3. ~/.kuberstack/config.yaml (user home)
    /// 4. /etc/kuberstack/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("KUBERSTACK_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./kuberstack-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".kuberstack").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/kuberstack/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
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

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("KUBERSTACK_STORE_TTL") {
            match humantime_serde::re::humantime::parse_duration(&val) {
                Ok(ttl) => {
                    tracing::info!("Environment override: KUBERSTACK_STORE_TTL={}", val);
                    self.spec.store.ttl = ttl;
                }
                Err(e) => tracing::warn!(
                    "Invalid value for KUBERSTACK_STORE_TTL: '{}' ({}). Ignoring.",
                    val,
                    e
                ),
            }
        }

        if let Some(val) = lookup("KUBERSTACK_TOOL_TIMEOUT") {
            match humantime_serde::re::humantime::parse_duration(&val) {
                Ok(timeout) => {
                    tracing::info!("Environment override: KUBERSTACK_TOOL_TIMEOUT={}", val);
                    self.spec.provisioner.phase_timeout = timeout;
                }
                Err(e) => tracing::warn!(
                    "Invalid value for KUBERSTACK_TOOL_TIMEOUT: '{}' ({}). Ignoring.",
                    val,
                    e
                ),
            }
        }

        if let Some(val) = lookup("KUBERSTACK_TOOL_PATH") {
            tracing::info!("Environment override: KUBERSTACK_TOOL_PATH={}", val);
            self.spec.provisioner.tool_path = PathBuf::from(val);
        }
    }

    /// Validate configuration
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

        if self.spec.store.ttl.is_zero() {
            anyhow::bail!("spec.store.ttl must be greater than zero");
        }

        if self.spec.store.sweep_interval.is_zero() {
            anyhow::bail!("spec.store.sweep_interval must be greater than zero");
        }

        if self.spec.provisioner.phase_timeout.is_zero() {
            anyhow::bail!("spec.provisioner.phase_timeout must be greater than zero");
        }

        if self.spec.provisioner.tool_path.as_os_str().is_empty() {
            anyhow::bail!("spec.provisioner.tool_path cannot be empty");
        }

        Ok(())
    }
}
