//! trust-steward: claim and provision fleet applications under one
//! administrative identity
//!
//! Two pieces sit side by side over the same device transport:
//! - `ApplicationRegistry` keeps the latest snapshot of every application the
//!   transport reports and mirrors changes to an attached view
//! - `TrustCoordinator` owns the identity and the default guild, and turns an
//!   unmanaged application into a claimed one with guild membership and an
//!   access policy
//!
//! ```text
//!            ┌──────────────────┐
//!            │ DeviceTransport  │
//!            └───┬──────────▲───┘
//!       events   │          │ claim / membership / policy
//!                ▼          │
//! ┌──────────────────────┐ ┌┴─────────────────┐
//! │ ApplicationRegistry  │ │ TrustCoordinator │
//! └──────────┬───────────┘ └──────────────────┘
//!            ▼
//!      ApplicationView
//! ```

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod manifest;
pub mod policy;
pub mod registry;
pub mod transport;
pub mod types;

pub use config::Config;
pub use coordinator::{CoordinatorConfig, TrustCoordinator};
pub use error::{BootstrapStage, ClaimStep, ConfigError, CoordinatorError, TransportError};
pub use manifest::{DigestApprover, Manifest, ManifestApprover};
pub use policy::{default_policy, Peer, PeerType, Policy, Rule, Term};
pub use registry::{ApplicationRegistry, ApplicationView, RegistryEntry};
pub use transport::{
    ApplicationEventListener, DeviceTransport, KeyStoreLocation, MemoryTransport, TransportOp,
};
pub use types::{ApplicationId, ApplicationInfo, ClaimState, Guid, Guild, Identity, RunningState};
