//! Trust coordinator
//!
//! Owns the single administrative identity and the single default guild, and
//! provisions applications under them. Construction bootstraps both (load if
//! present, otherwise create); a claim then runs three steps strictly in
//! order:
//!
//! 1. claim the application for the identity
//! 2. install default-guild membership
//! 3. install a fresh policy granting guild members everything
//!
//! The first failing step aborts the claim. Earlier steps are not rolled
//! back: they changed device state this crate cannot undo, so the
//! application stays visibly part-provisioned until the caller retries.
//!
//! The coordinator holds no lock. Callers issuing claims from several threads
//! on one coordinator must serialize them; `set_user_name` takes `&mut self`.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{BootstrapStage, ClaimStep, CoordinatorError, TransportError};
use crate::manifest::ManifestApprover;
use crate::policy::default_policy;
use crate::transport::{ApplicationEventListener, DeviceTransport, KeyStoreLocation};
use crate::types::{ApplicationId, ApplicationInfo, ClaimState, Guid, Guild, Identity};

/// Construction arguments for a `TrustCoordinator`
#[derive(Clone, Default)]
pub struct CoordinatorConfig {
    /// Display name of the identity created on first run
    pub user_name: String,
    pub listener: Option<Arc<dyn ApplicationEventListener>>,
    pub approver: Option<Arc<dyn ManifestApprover>>,
    pub key_store: Option<KeyStoreLocation>,
}

impl CoordinatorConfig {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            ..Default::default()
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ApplicationEventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_approver(mut self, approver: Arc<dyn ManifestApprover>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn with_key_store(mut self, key_store: KeyStoreLocation) -> Self {
        self.key_store = Some(key_store);
        self
    }
}

/// Claims and provisions applications under one identity and one guild
pub struct TrustCoordinator {
    transport: Arc<dyn DeviceTransport>,
    guild: Guild,
    identity: Identity,
    user_name: String,
    // Held for the coordinator's lifetime alongside the transport's copies.
    _listener: Arc<dyn ApplicationEventListener>,
    _approver: Arc<dyn ManifestApprover>,
}

impl TrustCoordinator {
    /// Validate `config`, register the callbacks with the transport and
    /// resolve the default guild and identity.
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        config: CoordinatorConfig,
    ) -> Result<Self, CoordinatorError> {
        let CoordinatorConfig {
            user_name,
            listener,
            approver,
            key_store,
        } = config;

        let listener = listener.ok_or_else(|| {
            CoordinatorError::InvalidConfiguration("application event listener is required".into())
        })?;
        let approver = approver.ok_or_else(|| {
            CoordinatorError::InvalidConfiguration("manifest approver is required".into())
        })?;
        if user_name.trim().is_empty() {
            return Err(CoordinatorError::InvalidConfiguration(
                "user name must not be empty".into(),
            ));
        }

        if let Some(location) = &key_store {
            info!(path = %location.path.display(), "Opening key store");
            transport
                .open_key_store(location)
                .map_err(|source| CoordinatorError::BootstrapFailed {
                    stage: BootstrapStage::OpenKeyStore,
                    source,
                })?;
        }

        transport.set_manifest_approver(approver.clone());
        transport.add_application_event_listener(listener.clone());

        let guild = resolve_guild(transport.as_ref())?;
        let identity = resolve_identity(transport.as_ref(), &user_name)?;

        if identity.name() != user_name {
            info!(
                configured = %user_name,
                stored = %identity.name(),
                "Using stored identity name"
            );
        }

        Ok(Self {
            transport,
            guild,
            user_name: identity.name().to_string(),
            identity,
            _listener: listener,
            _approver: approver,
        })
    }

    /// Applications currently known to the transport.
    ///
    /// Best effort: a transport failure yields an empty list, which callers
    /// cannot tell apart from an empty fleet.
    pub fn get_applications(&self) -> Vec<ApplicationInfo> {
        match self.transport.list_applications() {
            Ok(apps) => apps,
            Err(e) => {
                warn!(error = %e, "Listing applications failed, returning none");
                Vec::new()
            }
        }
    }

    /// Best-effort listing filtered by claim state.
    pub fn applications_in_state(&self, state: ClaimState) -> Vec<ApplicationInfo> {
        self.get_applications()
            .into_iter()
            .filter(|app| app.claim_state == state)
            .collect()
    }

    /// Current state of one application. Unlike the listings this does not
    /// fail soft: an unknown id and a transport failure are both errors, and
    /// `transport_error()` tells them apart.
    pub fn get_application(&self, id: &ApplicationId) -> Result<ApplicationInfo, CoordinatorError> {
        self.transport.get_application(id).map_err(|e| {
            debug!(app_id = %id, error = %e, "Application lookup failed");
            CoordinatorError::LookupFailed(e)
        })
    }

    /// Claim `app` and provision it with guild membership and the default
    /// policy. `app` should be claimable; the transport decides.
    pub fn claim_application(&self, app: &ApplicationInfo) -> Result<(), CoordinatorError> {
        info!(app_id = %app.id, name = %app.application_name, "Claiming application");

        self.step(app, ClaimStep::Claim, || {
            self.transport.claim(app, &self.identity)
        })?;

        self.step(app, ClaimStep::InstallMembership, || {
            self.transport.install_membership(app, &self.guild)
        })?;

        let policy = default_policy(std::slice::from_ref(&self.guild));
        self.step(app, ClaimStep::InstallPolicy, || {
            self.transport.install_policy(app, &policy)
        })?;

        info!(app_id = %app.id, guild = %self.guild.guid(), "Application claimed and provisioned");
        Ok(())
    }

    fn step<F>(&self, app: &ApplicationInfo, step: ClaimStep, op: F) -> Result<(), CoordinatorError>
    where
        F: FnOnce() -> Result<(), TransportError>,
    {
        debug!(app_id = %app.id, %step, "Running claim step");
        op().map_err(|source| {
            warn!(app_id = %app.id, %step, error = %source, "Claim step failed");
            CoordinatorError::ClaimFailed {
                app: app.id.clone(),
                step,
                source,
            }
        })
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Rename the identity. A no-op when unchanged; otherwise the new name is
    /// persisted first and only then becomes visible locally.
    ///
    /// An empty or blank name fails with `CoordinatorError::InvalidArgument`
    /// without contacting the transport.
    pub fn set_user_name(&mut self, name: &str) -> Result<(), CoordinatorError> {
        if name.trim().is_empty() {
            return Err(CoordinatorError::InvalidArgument(
                "user name must not be empty".into(),
            ));
        }
        if name == self.identity.name() {
            return Ok(());
        }

        let mut renamed = self.identity.clone();
        renamed.set_name(name);
        self.transport
            .update_identity(&renamed)
            .map_err(CoordinatorError::IdentityUpdateFailed)?;

        info!(old = %self.user_name, new = %name, "Identity renamed");
        self.identity = renamed;
        self.user_name = name.to_string();
        Ok(())
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn guild(&self) -> &Guild {
        &self.guild
    }
}

fn resolve_guild(transport: &dyn DeviceTransport) -> Result<Guild, CoordinatorError> {
    match transport.get_guild(Guid::DEFAULT) {
        Ok(guild) => {
            info!(guid = %guild.guid(), name = %guild.name(), "Loaded default guild");
            Ok(guild)
        }
        Err(e) if e.is_not_found() => {
            let guild = Guild::default_guild();
            transport
                .create_guild(&guild)
                .map_err(|source| CoordinatorError::BootstrapFailed {
                    stage: BootstrapStage::CreateGuild,
                    source,
                })?;
            info!(guid = %guild.guid(), "Created default guild");
            Ok(guild)
        }
        Err(source) => Err(CoordinatorError::BootstrapFailed {
            stage: BootstrapStage::LoadGuild,
            source,
        }),
    }
}

fn resolve_identity(
    transport: &dyn DeviceTransport,
    user_name: &str,
) -> Result<Identity, CoordinatorError> {
    match transport.get_identity(Guid::DEFAULT) {
        Ok(identity) => {
            info!(guid = %identity.guid(), name = %identity.name(), "Loaded identity");
            Ok(identity)
        }
        Err(e) if e.is_not_found() => {
            let identity = Identity::new(user_name, Guid::DEFAULT);
            transport
                .create_identity(&identity)
                .map_err(|source| CoordinatorError::BootstrapFailed {
                    stage: BootstrapStage::CreateIdentity,
                    source,
                })?;
            info!(guid = %identity.guid(), name = %user_name, "Created identity");
            Ok(identity)
        }
        Err(source) => Err(CoordinatorError::BootstrapFailed {
            stage: BootstrapStage::LoadIdentity,
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{DigestApprover, Manifest};
    use crate::registry::ApplicationRegistry;
    use crate::transport::{MemoryTransport, TransportOp};
    use crate::types::RunningState;
    use std::path::PathBuf;

    fn config() -> CoordinatorConfig {
        CoordinatorConfig::new("alice")
            .with_listener(Arc::new(ApplicationRegistry::new()))
            .with_approver(Arc::new(DigestApprover::approve_all()))
    }

    fn claimable(id: &str) -> ApplicationInfo {
        ApplicationInfo::new(id, "Lamp", "hallway")
            .with_claim_state(ClaimState::Claimable)
            .with_running_state(RunningState::Running)
    }

    fn coordinator(transport: &Arc<MemoryTransport>) -> TrustCoordinator {
        TrustCoordinator::new(transport.clone(), config()).unwrap()
    }

    #[test]
    fn test_missing_listener_is_invalid() {
        let transport = Arc::new(MemoryTransport::new());
        let config = CoordinatorConfig::new("alice")
            .with_approver(Arc::new(DigestApprover::approve_all()));
        let err = TrustCoordinator::new(transport.clone(), config).err().unwrap();
        assert!(matches!(err, CoordinatorError::InvalidConfiguration(_)));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_missing_approver_is_invalid() {
        let transport = Arc::new(MemoryTransport::new());
        let config = CoordinatorConfig::new("alice")
            .with_listener(Arc::new(ApplicationRegistry::new()));
        let err = TrustCoordinator::new(transport, config).err().unwrap();
        assert!(matches!(err, CoordinatorError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_empty_name_is_invalid() {
        let transport = Arc::new(MemoryTransport::new());
        let mut config = config();
        config.user_name = "  ".to_string();
        let err = TrustCoordinator::new(transport, config).err().unwrap();
        assert!(matches!(err, CoordinatorError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_first_bootstrap_creates_guild_and_identity() {
        let transport = Arc::new(MemoryTransport::new());
        let coordinator = coordinator(&transport);

        assert_eq!(coordinator.guild().name(), "defaultGuild");
        assert_eq!(coordinator.guild().guid(), Guid::DEFAULT);
        assert_eq!(coordinator.identity().name(), "alice");
        assert_eq!(coordinator.user_name(), "alice");
        assert_eq!(
            transport.calls(),
            vec![
                TransportOp::GetGuild,
                TransportOp::CreateGuild,
                TransportOp::GetIdentity,
                TransportOp::CreateIdentity,
            ]
        );
    }

    #[test]
    fn test_second_bootstrap_loads() {
        let transport = Arc::new(MemoryTransport::new());
        let _first = coordinator(&transport);
        transport.clear_calls();

        let second = TrustCoordinator::new(
            transport.clone(),
            CoordinatorConfig {
                user_name: "bob".into(),
                ..config()
            },
        )
        .unwrap();

        assert_eq!(
            transport.calls(),
            vec![TransportOp::GetGuild, TransportOp::GetIdentity]
        );
        assert_eq!(transport.guilds().len(), 1);
        assert_eq!(transport.identities().len(), 1);
        assert_eq!(second.user_name(), "alice");
    }

    #[test]
    fn test_bootstrap_surfaces_non_not_found_errors() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_on(TransportOp::GetIdentity, TransportError::Failed("store locked".into()));

        let err = TrustCoordinator::new(transport.clone(), config()).err().unwrap();
        match err {
            CoordinatorError::BootstrapFailed { stage, source } => {
                assert_eq!(stage, BootstrapStage::LoadIdentity);
                assert_eq!(source, TransportError::Failed("store locked".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!transport.calls().contains(&TransportOp::CreateIdentity));
    }

    #[test]
    fn test_bootstrap_create_failure() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_on(TransportOp::CreateGuild, TransportError::Failed("read-only".into()));

        let err = TrustCoordinator::new(transport, config()).err().unwrap();
        assert!(matches!(
            err,
            CoordinatorError::BootstrapFailed {
                stage: BootstrapStage::CreateGuild,
                ..
            }
        ));
    }

    #[test]
    fn test_guild_load_failure_is_not_treated_as_missing() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_on(TransportOp::GetGuild, TransportError::Failed("store locked".into()));

        let err = TrustCoordinator::new(transport.clone(), config()).err().unwrap();
        match err {
            CoordinatorError::BootstrapFailed { stage, source } => {
                assert_eq!(stage, BootstrapStage::LoadGuild);
                assert_eq!(source, TransportError::Failed("store locked".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.calls(), vec![TransportOp::GetGuild]);
        assert!(!transport.calls().contains(&TransportOp::CreateGuild));
        assert!(transport.guilds().is_empty());
    }

    #[test]
    fn test_identity_create_failure() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_on(TransportOp::CreateIdentity, TransportError::Failed("read-only".into()));

        let err = TrustCoordinator::new(transport.clone(), config()).err().unwrap();
        assert!(matches!(
            err,
            CoordinatorError::BootstrapFailed {
                stage: BootstrapStage::CreateIdentity,
                ..
            }
        ));
        // guild creation already happened and stays
        assert_eq!(transport.guilds().len(), 1);
        assert!(transport.identities().is_empty());
    }

    #[test]
    fn test_key_store_open_failure_stops_bootstrap() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_on(TransportOp::OpenKeyStore, TransportError::Failed("bad password".into()));
        let location = KeyStoreLocation {
            path: PathBuf::from("/tmp/keys"),
            user: "alice".into(),
            password: "wrong".into(),
        };

        let err = TrustCoordinator::new(transport.clone(), config().with_key_store(location))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            CoordinatorError::BootstrapFailed {
                stage: BootstrapStage::OpenKeyStore,
                ..
            }
        ));
        assert_eq!(transport.calls(), vec![TransportOp::OpenKeyStore]);
        assert!(!transport.calls().contains(&TransportOp::GetGuild));
    }

    #[test]
    fn test_key_store_opened_first() {
        let transport = Arc::new(MemoryTransport::new());
        let location = KeyStoreLocation {
            path: PathBuf::from("/tmp/keys"),
            user: "alice".into(),
            password: "secret".into(),
        };
        let _coordinator =
            TrustCoordinator::new(transport.clone(), config().with_key_store(location.clone()))
                .unwrap();

        assert_eq!(transport.calls()[0], TransportOp::OpenKeyStore);
        assert_eq!(transport.key_store(), Some(location));
    }

    #[test]
    fn test_claim_runs_three_steps_in_order() {
        let transport = Arc::new(MemoryTransport::new());
        let coordinator = coordinator(&transport);
        transport.add_application(claimable("A1"), Manifest::default());
        transport.clear_calls();

        coordinator.claim_application(&claimable("A1")).unwrap();

        assert_eq!(
            transport.calls(),
            vec![
                TransportOp::Claim,
                TransportOp::InstallMembership,
                TransportOp::InstallPolicy,
            ]
        );
        let sim = transport.application(&"A1".into()).unwrap();
        assert_eq!(sim.info.claim_state, ClaimState::Claimed);
        assert_eq!(sim.owner, Some(Guid::DEFAULT));
        assert_eq!(sim.memberships, vec![Guid::DEFAULT]);
        let policy = sim.policy.unwrap();
        assert_eq!(policy, default_policy(&[Guild::default_guild()]));
    }

    #[test]
    fn test_membership_failure_skips_policy() {
        let transport = Arc::new(MemoryTransport::new());
        let coordinator = coordinator(&transport);
        transport.add_application(claimable("A1"), Manifest::default());
        transport.fail_on(
            TransportOp::InstallMembership,
            TransportError::Failed("timeout".into()),
        );
        transport.clear_calls();

        let err = coordinator.claim_application(&claimable("A1")).unwrap_err();

        assert_eq!(err.claim_step(), Some(ClaimStep::InstallMembership));
        assert_eq!(
            err.transport_error(),
            Some(&TransportError::Failed("timeout".into()))
        );
        assert!(!transport.calls().contains(&TransportOp::InstallPolicy));
        // claim is not rolled back
        let sim = transport.application(&"A1".into()).unwrap();
        assert_eq!(sim.info.claim_state, ClaimState::Claimed);
        assert!(sim.policy.is_none());
    }

    #[test]
    fn test_policy_failure_is_distinguishable() {
        let transport = Arc::new(MemoryTransport::new());
        let coordinator = coordinator(&transport);
        transport.add_application(claimable("A1"), Manifest::default());
        transport.fail_on(TransportOp::InstallPolicy, TransportError::Failed("timeout".into()));

        let err = coordinator.claim_application(&claimable("A1")).unwrap_err();
        assert_eq!(err.claim_step(), Some(ClaimStep::InstallPolicy));
        assert_eq!(
            transport.application(&"A1".into()).unwrap().memberships,
            vec![Guid::DEFAULT]
        );
    }

    #[test]
    fn test_claim_of_unclaimable_application() {
        let transport = Arc::new(MemoryTransport::new());
        let coordinator = coordinator(&transport);
        let app = claimable("A1").with_claim_state(ClaimState::Unclaimable);
        transport.add_application(app.clone(), Manifest::default());
        transport.clear_calls();

        let err = coordinator.claim_application(&app).unwrap_err();
        assert_eq!(err.claim_step(), Some(ClaimStep::Claim));
        assert!(matches!(
            err.transport_error(),
            Some(TransportError::NotClaimable { .. })
        ));
        assert_eq!(transport.calls(), vec![TransportOp::Claim]);
    }

    #[test]
    fn test_get_applications_fails_soft() {
        let transport = Arc::new(MemoryTransport::new());
        let coordinator = coordinator(&transport);
        transport.add_application(claimable("A1"), Manifest::default());
        assert_eq!(coordinator.get_applications().len(), 1);

        transport.fail_on(TransportOp::ListApplications, TransportError::Failed("down".into()));
        assert!(coordinator.get_applications().is_empty());
    }

    #[test]
    fn test_get_application_reports_unknown_and_failure_apart() {
        let transport = Arc::new(MemoryTransport::new());
        let coordinator = coordinator(&transport);
        transport.add_application(claimable("A1"), Manifest::default());

        assert_eq!(coordinator.get_application(&"A1".into()).unwrap(), claimable("A1"));

        let err = coordinator.get_application(&"Z9".into()).unwrap_err();
        assert_eq!(
            err.transport_error(),
            Some(&TransportError::UnknownApplication("Z9".into()))
        );

        transport.fail_on(TransportOp::GetApplication, TransportError::Failed("down".into()));
        let err = coordinator.get_application(&"A1".into()).unwrap_err();
        assert!(matches!(err, CoordinatorError::LookupFailed(TransportError::Failed(_))));
    }

    #[test]
    fn test_applications_in_state() {
        let transport = Arc::new(MemoryTransport::new());
        let coordinator = coordinator(&transport);
        transport.add_application(claimable("A1"), Manifest::default());
        transport.add_application(
            claimable("B2").with_claim_state(ClaimState::Claimed),
            Manifest::default(),
        );

        let claimable_apps = coordinator.applications_in_state(ClaimState::Claimable);
        assert_eq!(claimable_apps.len(), 1);
        assert_eq!(claimable_apps[0].id.as_str(), "A1");
    }

    #[test]
    fn test_set_same_user_name_is_noop() {
        let transport = Arc::new(MemoryTransport::new());
        let mut coordinator = coordinator(&transport);
        transport.clear_calls();

        coordinator.set_user_name("alice").unwrap();
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_set_user_name_persists() {
        let transport = Arc::new(MemoryTransport::new());
        let mut coordinator = coordinator(&transport);

        coordinator.set_user_name("carol").unwrap();

        assert_eq!(coordinator.user_name(), "carol");
        assert_eq!(coordinator.identity().name(), "carol");
        assert_eq!(transport.identities()[0].name(), "carol");
    }

    #[test]
    fn test_failed_rename_changes_nothing() {
        let transport = Arc::new(MemoryTransport::new());
        let mut coordinator = coordinator(&transport);
        transport.fail_on(TransportOp::UpdateIdentity, TransportError::Failed("io".into()));

        let err = coordinator.set_user_name("carol").unwrap_err();

        assert!(matches!(err, CoordinatorError::IdentityUpdateFailed(_)));
        assert_eq!(coordinator.user_name(), "alice");
        assert_eq!(coordinator.identity().name(), "alice");
        assert_eq!(transport.identities()[0].name(), "alice");
    }

    #[test]
    fn test_empty_rename_rejected() {
        let transport = Arc::new(MemoryTransport::new());
        let mut coordinator = coordinator(&transport);
        transport.clear_calls();

        for name in ["", "   "] {
            let err = coordinator.set_user_name(name).unwrap_err();
            assert!(matches!(err, CoordinatorError::InvalidArgument(_)));
            assert!(err.transport_error().is_none());
        }
        assert!(transport.calls().is_empty());
        assert_eq!(coordinator.user_name(), "alice");
    }
}
