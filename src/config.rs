//! Steward configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::ConfigError;
use crate::manifest::{DigestApprover, Manifest};
use crate::transport::{KeyStoreLocation, MemoryTransport};
use crate::types::{ApplicationInfo, ClaimState, RunningState};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Key store backing identities and guilds (transport default if absent)
    #[serde(default)]
    pub key_store: Option<KeyStoreLocation>,

    #[serde(default)]
    pub approval: ApprovalConfig,

    /// Applications seeded into the simulated fleet
    #[serde(default)]
    pub fleet: Vec<FleetApplication>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Display name of the administrative identity
    #[serde(default = "default_user_name")]
    pub user_name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_name: default_user_name(),
        }
    }
}

/// Manifest approval policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Approve every manifest
    #[serde(default)]
    pub auto_approve: bool,

    /// Hex SHA-256 digests of approved manifests
    #[serde(default)]
    pub trusted_digests: Vec<String>,
}

impl ApprovalConfig {
    pub fn approver(&self) -> DigestApprover {
        DigestApprover::new(self.auto_approve, self.trusted_digests.iter().cloned())
    }
}

/// One application in the simulated fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetApplication {
    pub id: String,
    pub name: String,
    pub device: String,
    #[serde(default = "default_claim_state")]
    pub claim_state: ClaimState,
    #[serde(default = "default_running_state")]
    pub running_state: RunningState,
    /// Manifest contents; the UTF-8 bytes are used as-is
    #[serde(default)]
    pub manifest: String,
}

impl FleetApplication {
    pub fn info(&self) -> ApplicationInfo {
        ApplicationInfo::new(self.id.as_str(), self.name.as_str(), self.device.as_str())
            .with_claim_state(self.claim_state)
            .with_running_state(self.running_state)
    }

    pub fn manifest(&self) -> Manifest {
        Manifest::from_bytes(self.manifest.as_bytes().to_vec())
    }
}

fn default_user_name() -> String { "admin".to_string() }
fn default_claim_state() -> ClaimState { ClaimState::Claimable }
fn default_running_state() -> RunningState { RunningState::Running }

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path`, or fall back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            info!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Build a simulated transport populated with `[[fleet]]`.
    pub fn seed_transport(&self) -> MemoryTransport {
        let transport = MemoryTransport::new();
        for app in &self.fleet {
            transport.add_application(app.info(), app.manifest());
        }
        transport
    }
}
