//! Provider configuration: the advertised node capacity and the embedded
//! scheduler section, loaded from a TOML file.

use std::path::Path;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use mesos_scheduler::config::Config as SchedulerConfig;
use mesos_scheduler::quantity;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CPU_CAPACITY: &str = "20";
const DEFAULT_MEMORY_CAPACITY: &str = "100Gi";
const DEFAULT_STORAGE_CAPACITY: &str = "40Gi";
const DEFAULT_POD_CAPACITY: &str = "20";

const MIN_CPU_CAPACITY: &str = "250m";
const MIN_MEMORY_CAPACITY: &str = "512Mi";
const MIN_POD_CAPACITY: &str = "1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid CPU value {0}")]
    InvalidCpu(String),
    #[error("CPU value {0} is less than the minimum {MIN_CPU_CAPACITY}")]
    CpuBelowMinimum(String),
    #[error("Invalid memory value {0}")]
    InvalidMemory(String),
    #[error("Memory value {0} is less than the minimum {MIN_MEMORY_CAPACITY}")]
    MemoryBelowMinimum(String),
    #[error("Invalid storage value {0}")]
    InvalidStorage(String),
    #[error("Invalid pods value {0}")]
    InvalidPods(String),
    #[error("Pod value {0} is less than the minimum {MIN_POD_CAPACITY}")]
    PodsBelowMinimum(String),
}

/// Configurable parameters of the virtual node. The capacity fields are
/// Kubernetes quantity strings and become the node's advertised capacity.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub cpu: String,
    pub memory: String,
    pub storage: String,
    pub pods: String,
    pub scheduler: SchedulerConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            cpu: DEFAULT_CPU_CAPACITY.to_string(),
            memory: DEFAULT_MEMORY_CAPACITY.to_string(),
            storage: DEFAULT_STORAGE_CAPACITY.to_string(),
            pods: DEFAULT_POD_CAPACITY.to_string(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    /// Parses and validates configuration from TOML text. Missing fields
    /// keep their defaults.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: ProviderConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let cpu = quantity::cpu_cores(&Quantity(self.cpu.clone()))
            .map_err(|_| ConfigError::InvalidCpu(self.cpu.clone()))?;
        let min_cpu = quantity::cpu_cores(&Quantity(MIN_CPU_CAPACITY.to_string()))
            .expect("minimum cpu capacity must parse");
        if cpu < min_cpu {
            return Err(ConfigError::CpuBelowMinimum(self.cpu.clone()));
        }

        let memory = quantity::memory_bytes(&Quantity(self.memory.clone()))
            .map_err(|_| ConfigError::InvalidMemory(self.memory.clone()))?;
        let min_memory = quantity::memory_bytes(&Quantity(MIN_MEMORY_CAPACITY.to_string()))
            .expect("minimum memory capacity must parse");
        if memory < min_memory {
            return Err(ConfigError::MemoryBelowMinimum(self.memory.clone()));
        }

        quantity::memory_bytes(&Quantity(self.storage.clone()))
            .map_err(|_| ConfigError::InvalidStorage(self.storage.clone()))?;

        let pods = quantity::count(&Quantity(self.pods.clone()))
            .map_err(|_| ConfigError::InvalidPods(self.pods.clone()))?;
        if pods < 1 {
            return Err(ConfigError::PodsBelowMinimum(self.pods.clone()));
        }

        Ok(())
    }
}
