//! Error taxonomy
//!
//! `TransportError` is what the device layer reports. `CoordinatorError`
//! wraps it with the bootstrap stage or claim step that was running, keeping
//! the transport cause intact.

use std::fmt;

use crate::types::{ApplicationId, ClaimState, Guid};

/// Failures reported by a `DeviceTransport`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{what} {guid} not found")]
    NotFound { what: &'static str, guid: Guid },

    #[error("{what} {guid} already exists")]
    AlreadyExists { what: &'static str, guid: Guid },

    #[error("Unknown application: {0}")]
    UnknownApplication(ApplicationId),

    #[error("Application {id} is not claimable (state: {state})")]
    NotClaimable { id: ApplicationId, state: ClaimState },

    #[error("Manifest of application {0} was rejected")]
    ManifestRejected(ApplicationId),

    #[error("No manifest approver registered")]
    NoManifestApprover,

    #[error("Transport failure: {0}")]
    Failed(String),
}

impl TransportError {
    /// Only "does not exist" is recoverable during bootstrap.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound { .. })
    }
}

/// Provisioning step of a claim, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStep {
    Claim,
    InstallMembership,
    InstallPolicy,
}

impl fmt::Display for ClaimStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimStep::Claim => write!(f, "claim"),
            ClaimStep::InstallMembership => write!(f, "membership install"),
            ClaimStep::InstallPolicy => write!(f, "policy install"),
        }
    }
}

/// Bootstrap stage that was running when construction failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStage {
    OpenKeyStore,
    LoadGuild,
    CreateGuild,
    LoadIdentity,
    CreateIdentity,
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapStage::OpenKeyStore => write!(f, "opening key store"),
            BootstrapStage::LoadGuild => write!(f, "loading guild"),
            BootstrapStage::CreateGuild => write!(f, "creating guild"),
            BootstrapStage::LoadIdentity => write!(f, "loading identity"),
            BootstrapStage::CreateIdentity => write!(f, "creating identity"),
        }
    }
}

/// Errors surfaced by the `TrustCoordinator`
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Rejected before any transport call, e.g. an empty name passed to
    /// `TrustCoordinator::set_user_name`.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Bootstrap failed while {stage}: {source}")]
    BootstrapFailed {
        stage: BootstrapStage,
        #[source]
        source: TransportError,
    },

    #[error("Claim of {app} failed at {step}: {source}")]
    ClaimFailed {
        app: ApplicationId,
        step: ClaimStep,
        #[source]
        source: TransportError,
    },

    #[error("Identity update failed: {0}")]
    IdentityUpdateFailed(#[source] TransportError),

    #[error("Application lookup failed: {0}")]
    LookupFailed(#[source] TransportError),
}

impl CoordinatorError {
    /// The transport failure underneath, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            CoordinatorError::BootstrapFailed { source, .. }
            | CoordinatorError::ClaimFailed { source, .. }
            | CoordinatorError::IdentityUpdateFailed(source)
            | CoordinatorError::LookupFailed(source) => Some(source),
            CoordinatorError::InvalidConfiguration(_) | CoordinatorError::InvalidArgument(_) => {
                None
            }
        }
    }

    /// The claim step that failed, for claim errors.
    pub fn claim_step(&self) -> Option<ClaimStep> {
        match self {
            CoordinatorError::ClaimFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
