//! Core value types shared by the registry and the coordinator
//!
//! Application snapshots arrive from the transport and are never edited
//! locally. Identity and guild are owned by a single coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 16-byte identifier for identities and guilds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Guid([u8; 16]);

impl Guid {
    /// Reserved GUID of the default guild and the default identity.
    pub const DEFAULT: Guid = Guid([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<String> for Guid {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = hex::decode(&value).map_err(|e| format!("invalid GUID {value}: {e}"))?;
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|_| format!("GUID {value} is not 16 bytes"))?;
        Ok(Self(bytes))
    }
}

impl From<Guid> for String {
    fn from(guid: Guid) -> Self {
        guid.to_string()
    }
}

/// Stable identifier of an application, unique across the fleet
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApplicationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Claim state as reported by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    /// Cannot be claimed (e.g. no claim capability advertised)
    #[default]
    Unclaimable,
    /// Waiting for an administrator
    Claimable,
    /// Claim in progress
    Claiming,
    /// Owned by an administrator
    Claimed,
    /// Claimed, but its security configuration is behind the administrator's
    NeedUpdate,
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimState::Unclaimable => write!(f, "unclaimable"),
            ClaimState::Claimable => write!(f, "claimable"),
            ClaimState::Claiming => write!(f, "claiming"),
            ClaimState::Claimed => write!(f, "claimed"),
            ClaimState::NeedUpdate => write!(f, "need_update"),
        }
    }
}

impl std::str::FromStr for ClaimState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unclaimable" | "not_claimable" => Ok(ClaimState::Unclaimable),
            "claimable" => Ok(ClaimState::Claimable),
            "claiming" => Ok(ClaimState::Claiming),
            "claimed" => Ok(ClaimState::Claimed),
            "need_update" => Ok(ClaimState::NeedUpdate),
            other => Err(format!("unknown claim state: {other}")),
        }
    }
}

/// Whether the application is currently reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    Running,
    NotRunning,
    #[default]
    Unknown,
}

impl fmt::Display for RunningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunningState::Running => write!(f, "running"),
            RunningState::NotRunning => write!(f, "not_running"),
            RunningState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Snapshot of an application delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub id: ApplicationId,
    pub application_name: String,
    pub device_name: String,
    pub claim_state: ClaimState,
    pub running_state: RunningState,
}

impl ApplicationInfo {
    pub fn new(
        id: impl Into<ApplicationId>,
        application_name: impl Into<String>,
        device_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            application_name: application_name.into(),
            device_name: device_name.into(),
            claim_state: ClaimState::default(),
            running_state: RunningState::default(),
        }
    }

    pub fn with_claim_state(mut self, state: ClaimState) -> Self {
        self.claim_state = state;
        self
    }

    pub fn with_running_state(mut self, state: RunningState) -> Self {
        self.running_state = state;
        self
    }

    pub fn is_claimable(&self) -> bool {
        self.claim_state == ClaimState::Claimable
    }
}

/// Administrative identity that claimed applications act on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    name: String,
    guid: Guid,
}

impl Identity {
    pub fn new(name: impl Into<String>, guid: Guid) -> Self {
        Self {
            name: name.into(),
            guid,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

/// Named group sharing a policy scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    name: String,
    description: String,
    guid: Guid,
}

/// Name given to the guild created on first run.
pub const DEFAULT_GUILD_NAME: &str = "defaultGuild";

/// Description given to the guild created on first run.
pub const DEFAULT_GUILD_DESCRIPTION: &str = "The default guild of this security manager";

impl Guild {
    pub fn new(name: impl Into<String>, description: impl Into<String>, guid: Guid) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            guid,
        }
    }

    /// The reserved guild every claimed application joins.
    pub fn default_guild() -> Self {
        Self::new(DEFAULT_GUILD_NAME, DEFAULT_GUILD_DESCRIPTION, Guid::DEFAULT)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }
}
