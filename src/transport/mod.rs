//! Device transport capability
//!
//! The transport discovers applications and executes operations on them over
//! a secure channel. This crate only drives it; discovery, sessions and key
//! material live behind this trait.
//!
//! Calls are blocking. Timeouts and retries belong to the implementation.

pub mod memory;

pub use memory::{MemoryTransport, TransportOp};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::TransportError;
use crate::manifest::ManifestApprover;
use crate::policy::Policy;
use crate::types::{ApplicationId, ApplicationInfo, Guid, Guild, Identity};

/// Receives application state changes from the transport.
///
/// May be called from several delivery threads at once.
pub trait ApplicationEventListener: Send + Sync {
    fn on_application_event(&self, new: &ApplicationInfo, old: Option<&ApplicationInfo>);
}

/// Location and credentials of the store holding identity key material
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStoreLocation {
    pub path: PathBuf,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for KeyStoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStoreLocation")
            .field("path", &self.path)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Operations the coordinator needs from the device layer.
pub trait DeviceTransport: Send + Sync {
    fn list_applications(&self) -> Result<Vec<ApplicationInfo>, TransportError>;

    /// Current state of one application. Fails with
    /// `TransportError::UnknownApplication` if the transport has not seen it.
    fn get_application(&self, id: &ApplicationId) -> Result<ApplicationInfo, TransportError> {
        self.list_applications()?
            .into_iter()
            .find(|app| &app.id == id)
            .ok_or_else(|| TransportError::UnknownApplication(id.clone()))
    }

    /// Take ownership of `app` on behalf of `identity`. The transport consults
    /// the registered manifest approver before completing.
    fn claim(&self, app: &ApplicationInfo, identity: &Identity) -> Result<(), TransportError>;

    fn install_membership(&self, app: &ApplicationInfo, guild: &Guild)
        -> Result<(), TransportError>;

    fn install_policy(&self, app: &ApplicationInfo, policy: &Policy)
        -> Result<(), TransportError>;

    fn update_identity(&self, identity: &Identity) -> Result<(), TransportError>;

    /// Fails with `TransportError::NotFound` if no guild has this GUID.
    fn get_guild(&self, guid: Guid) -> Result<Guild, TransportError>;

    fn create_guild(&self, guild: &Guild) -> Result<(), TransportError>;

    /// Fails with `TransportError::NotFound` if no identity has this GUID.
    fn get_identity(&self, guid: Guid) -> Result<Identity, TransportError>;

    fn create_identity(&self, identity: &Identity) -> Result<(), TransportError>;

    fn set_manifest_approver(&self, approver: Arc<dyn ManifestApprover>);

    fn add_application_event_listener(&self, listener: Arc<dyn ApplicationEventListener>);

    /// Select the key store backing identities and guilds. Transports with a
    /// fixed store can ignore this.
    fn open_key_store(&self, location: &KeyStoreLocation) -> Result<(), TransportError> {
        let _ = location;
        Ok(())
    }
}
