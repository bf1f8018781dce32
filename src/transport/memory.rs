//! In-memory transport
//!
//! Simulates a fleet of applications together with the guild and identity
//! stores, so the coordinator and registry can run without devices. Used by
//! the binary and by tests; supports fault injection and records every
//! operation it receives.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{ApplicationEventListener, DeviceTransport, KeyStoreLocation};
use crate::error::TransportError;
use crate::manifest::{Manifest, ManifestApprover};
use crate::policy::Policy;
use crate::types::{ApplicationId, ApplicationInfo, ClaimState, Guid, Guild, Identity, RunningState};

/// Operations recorded in the call log and targeted by fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOp {
    OpenKeyStore,
    ListApplications,
    GetApplication,
    Claim,
    InstallMembership,
    InstallPolicy,
    UpdateIdentity,
    GetGuild,
    CreateGuild,
    GetIdentity,
    CreateIdentity,
}

/// Device-side state of one simulated application
#[derive(Debug, Clone)]
pub struct SimulatedApplication {
    pub info: ApplicationInfo,
    pub manifest: Manifest,
    /// Identity that claimed the application
    pub owner: Option<Guid>,
    pub memberships: Vec<Guid>,
    pub policy: Option<Policy>,
}

#[derive(Default)]
struct FleetState {
    applications: HashMap<ApplicationId, SimulatedApplication>,
    guilds: HashMap<Guid, Guild>,
    identities: HashMap<Guid, Identity>,
    key_store: Option<KeyStoreLocation>,
    faults: HashMap<TransportOp, TransportError>,
    calls: Vec<TransportOp>,
}

impl FleetState {
    /// Log the call and apply any injected fault.
    fn begin(&mut self, op: TransportOp) -> Result<(), TransportError> {
        self.calls.push(op);
        match self.faults.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn claimed_application(
        &mut self,
        id: &ApplicationId,
    ) -> Result<&mut SimulatedApplication, TransportError> {
        let app = self
            .applications
            .get_mut(id)
            .ok_or_else(|| TransportError::UnknownApplication(id.clone()))?;
        if app.owner.is_none() {
            return Err(TransportError::Failed(format!("application {id} is not claimed")));
        }
        Ok(app)
    }
}

/// Simulated device transport
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<FleetState>,
    listeners: RwLock<Vec<Arc<dyn ApplicationEventListener>>>,
    approver: RwLock<Option<Arc<dyn ManifestApprover>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce a new (or replaced) application to the fleet.
    pub fn add_application(&self, info: ApplicationInfo, manifest: Manifest) {
        let old = {
            let mut state = self.state.lock();
            state
                .applications
                .insert(
                    info.id.clone(),
                    SimulatedApplication {
                        info: info.clone(),
                        manifest,
                        owner: None,
                        memberships: Vec::new(),
                        policy: None,
                    },
                )
                .map(|previous| previous.info)
        };
        self.emit(&info, old.as_ref());
    }

    /// Change the running state of an application; returns false if unknown.
    pub fn set_running_state(&self, id: &ApplicationId, running: RunningState) -> bool {
        let change = {
            let mut state = self.state.lock();
            state.applications.get_mut(id).map(|app| {
                let old = app.info.clone();
                app.info.running_state = running;
                (app.info.clone(), old)
            })
        };
        match change {
            Some((new, old)) => {
                self.emit(&new, Some(&old));
                true
            }
            None => false,
        }
    }

    pub fn application(&self, id: &ApplicationId) -> Option<SimulatedApplication> {
        self.state.lock().applications.get(id).cloned()
    }

    pub fn guilds(&self) -> Vec<Guild> {
        self.state.lock().guilds.values().cloned().collect()
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.state.lock().identities.values().cloned().collect()
    }

    pub fn key_store(&self) -> Option<KeyStoreLocation> {
        self.state.lock().key_store.clone()
    }

    /// Make every subsequent `op` fail with `err` until cleared.
    pub fn fail_on(&self, op: TransportOp, err: TransportError) {
        self.state.lock().faults.insert(op, err);
    }

    pub fn clear_fault(&self, op: TransportOp) {
        self.state.lock().faults.remove(&op);
    }

    /// Operations received so far, in order.
    pub fn calls(&self) -> Vec<TransportOp> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn emit(&self, new: &ApplicationInfo, old: Option<&ApplicationInfo>) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_application_event(new, old);
        }
    }

    fn transition(&self, id: &ApplicationId, claim_state: ClaimState, owner: Option<Guid>) {
        let change = {
            let mut state = self.state.lock();
            state.applications.get_mut(id).map(|app| {
                let old = app.info.clone();
                app.info.claim_state = claim_state;
                app.owner = owner;
                (app.info.clone(), old)
            })
        };
        if let Some((new, old)) = change {
            self.emit(&new, Some(&old));
        }
    }
}

impl DeviceTransport for MemoryTransport {
    fn list_applications(&self) -> Result<Vec<ApplicationInfo>, TransportError> {
        let mut state = self.state.lock();
        state.begin(TransportOp::ListApplications)?;
        let mut apps: Vec<ApplicationInfo> =
            state.applications.values().map(|a| a.info.clone()).collect();
        apps.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(apps)
    }

    fn get_application(&self, id: &ApplicationId) -> Result<ApplicationInfo, TransportError> {
        let mut state = self.state.lock();
        state.begin(TransportOp::GetApplication)?;
        state
            .applications
            .get(id)
            .map(|a| a.info.clone())
            .ok_or_else(|| TransportError::UnknownApplication(id.clone()))
    }

    fn claim(&self, app: &ApplicationInfo, identity: &Identity) -> Result<(), TransportError> {
        let approver = self.approver.read().clone();
        let (old, claiming, manifest) = {
            let mut state = self.state.lock();
            state.begin(TransportOp::Claim)?;
            if !state.identities.contains_key(&identity.guid()) {
                return Err(TransportError::NotFound {
                    what: "identity",
                    guid: identity.guid(),
                });
            }
            let sim = state
                .applications
                .get_mut(&app.id)
                .ok_or_else(|| TransportError::UnknownApplication(app.id.clone()))?;
            if sim.info.claim_state != ClaimState::Claimable {
                return Err(TransportError::NotClaimable {
                    id: app.id.clone(),
                    state: sim.info.claim_state,
                });
            }
            if approver.is_none() {
                return Err(TransportError::NoManifestApprover);
            }
            let old = sim.info.clone();
            sim.info.claim_state = ClaimState::Claiming;
            (old, sim.info.clone(), sim.manifest.clone())
        };
        self.emit(&claiming, Some(&old));

        let approved = approver
            .map(|a| a.approve_manifest(&claiming, &manifest))
            .unwrap_or(false);
        if !approved {
            debug!(app_id = %app.id, "Manifest rejected, resetting application");
            self.transition(&app.id, ClaimState::Claimable, None);
            return Err(TransportError::ManifestRejected(app.id.clone()));
        }

        self.transition(&app.id, ClaimState::Claimed, Some(identity.guid()));
        debug!(app_id = %app.id, identity = %identity.guid(), "Application claimed");
        Ok(())
    }

    fn install_membership(
        &self,
        app: &ApplicationInfo,
        guild: &Guild,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.begin(TransportOp::InstallMembership)?;
        if !state.guilds.contains_key(&guild.guid()) {
            return Err(TransportError::NotFound {
                what: "guild",
                guid: guild.guid(),
            });
        }
        let sim = state.claimed_application(&app.id)?;
        if !sim.memberships.contains(&guild.guid()) {
            sim.memberships.push(guild.guid());
        }
        debug!(app_id = %app.id, guild = %guild.guid(), "Membership installed");
        Ok(())
    }

    fn install_policy(&self, app: &ApplicationInfo, policy: &Policy) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.begin(TransportOp::InstallPolicy)?;
        let sim = state.claimed_application(&app.id)?;
        sim.policy = Some(policy.clone());
        debug!(app_id = %app.id, terms = policy.terms.len(), "Policy installed");
        Ok(())
    }

    fn update_identity(&self, identity: &Identity) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.begin(TransportOp::UpdateIdentity)?;
        match state.identities.get_mut(&identity.guid()) {
            Some(stored) => {
                *stored = identity.clone();
                Ok(())
            }
            None => Err(TransportError::NotFound {
                what: "identity",
                guid: identity.guid(),
            }),
        }
    }

    fn get_guild(&self, guid: Guid) -> Result<Guild, TransportError> {
        let mut state = self.state.lock();
        state.begin(TransportOp::GetGuild)?;
        state
            .guilds
            .get(&guid)
            .cloned()
            .ok_or(TransportError::NotFound { what: "guild", guid })
    }

    fn create_guild(&self, guild: &Guild) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.begin(TransportOp::CreateGuild)?;
        if state.guilds.contains_key(&guild.guid()) {
            return Err(TransportError::AlreadyExists {
                what: "guild",
                guid: guild.guid(),
            });
        }
        state.guilds.insert(guild.guid(), guild.clone());
        Ok(())
    }

    fn get_identity(&self, guid: Guid) -> Result<Identity, TransportError> {
        let mut state = self.state.lock();
        state.begin(TransportOp::GetIdentity)?;
        state
            .identities
            .get(&guid)
            .cloned()
            .ok_or(TransportError::NotFound { what: "identity", guid })
    }

    fn create_identity(&self, identity: &Identity) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.begin(TransportOp::CreateIdentity)?;
        if state.identities.contains_key(&identity.guid()) {
            return Err(TransportError::AlreadyExists {
                what: "identity",
                guid: identity.guid(),
            });
        }
        state.identities.insert(identity.guid(), identity.clone());
        Ok(())
    }

    fn set_manifest_approver(&self, approver: Arc<dyn ManifestApprover>) {
        *self.approver.write() = Some(approver);
    }

    fn add_application_event_listener(&self, listener: Arc<dyn ApplicationEventListener>) {
        self.listeners.write().push(listener);
    }

    fn open_key_store(&self, location: &KeyStoreLocation) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.begin(TransportOp::OpenKeyStore)?;
        state.key_store = Some(location.clone());
        Ok(())
    }
}
