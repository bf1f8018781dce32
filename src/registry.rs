//! Live registry of known applications
//!
//! Keeps the latest snapshot per application id and mirrors every change to
//! at most one attached view. The entry map and the view reference are
//! guarded by a single lock: an upsert and its view notification, or a view
//! swap and its initial snapshot push, happen as one unit. A view therefore
//! never misses or double-sees an event around attachment, and two events for
//! the same id reach it in call order.
//!
//! Views are called with the lock held and must not call back into the
//! registry.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

use crate::transport::ApplicationEventListener;
use crate::types::{ApplicationId, ApplicationInfo};

/// One application as shown to a view
///
/// Identity is the application id only: an updated snapshot of a known
/// application compares equal to the entry it replaces.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    info: ApplicationInfo,
}

impl RegistryEntry {
    pub fn new(info: ApplicationInfo) -> Self {
        Self { info }
    }

    /// Key used for equality, hashing and the registry map.
    pub fn id_of(&self) -> &ApplicationId {
        &self.info.id
    }

    pub fn info(&self) -> &ApplicationInfo {
        &self.info
    }

    pub fn into_info(self) -> ApplicationInfo {
        self.info
    }
}

impl PartialEq for RegistryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id_of() == other.id_of()
    }
}

impl Eq for RegistryEntry {}

impl Hash for RegistryEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id_of().hash(state);
    }
}

impl fmt::Display for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}\nLast Claim Status : {}\nLast Status : {}",
            self.info.application_name,
            self.info.device_name,
            self.info.claim_state,
            self.info.running_state
        )
    }
}

/// Consumer of registry contents, typically a UI list adapter
pub trait ApplicationView: Send + Sync {
    /// A single application was added or updated.
    fn add_item(&self, entry: RegistryEntry);

    /// Replace everything shown with `entries`.
    fn set_items(&self, entries: Vec<RegistryEntry>);
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<ApplicationId, RegistryEntry>,
    view: Option<Arc<dyn ApplicationView>>,
}

/// Concurrency-safe index of applications keyed by id
#[derive(Default)]
pub struct ApplicationRegistry {
    state: Mutex<RegistryState>,
}

impl ApplicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert `new`, replacing any previous snapshot for its id. `old` is
    /// never consulted.
    pub fn on_application_event(&self, new: &ApplicationInfo, _old: Option<&ApplicationInfo>) {
        let entry = RegistryEntry::new(new.clone());
        let mut state = self.state.lock();
        debug!(
            app_id = %new.id,
            claim_state = %new.claim_state,
            running_state = %new.running_state,
            "Application event"
        );
        state.entries.insert(entry.id_of().clone(), entry.clone());
        if let Some(view) = &state.view {
            view.add_item(entry);
        }
    }

    /// Seed the registry, in input order, exactly as if each application had
    /// arrived as an event.
    pub fn add_applications<I>(&self, apps: I)
    where
        I: IntoIterator<Item = ApplicationInfo>,
    {
        for app in apps {
            self.on_application_event(&app, None);
        }
    }

    /// Attach `view` (or detach with `None`). A new view receives the full
    /// current snapshot once through `set_items`.
    pub fn set_adapter(&self, view: Option<Arc<dyn ApplicationView>>) {
        let mut state = self.state.lock();
        state.view = view;
        if let Some(view) = &state.view {
            debug!(items = state.entries.len(), "Attaching view");
            view.set_items(state.entries.values().cloned().collect());
        }
    }

    /// Current entries, in no particular order.
    pub fn snapshot(&self) -> Vec<RegistryEntry> {
        self.state.lock().entries.values().cloned().collect()
    }

    pub fn get(&self, id: &ApplicationId) -> Option<ApplicationInfo> {
        self.state.lock().entries.get(id).map(|e| e.info().clone())
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ApplicationEventListener for ApplicationRegistry {
    fn on_application_event(&self, new: &ApplicationInfo, old: Option<&ApplicationInfo>) {
        ApplicationRegistry::on_application_event(self, new, old);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClaimState, RunningState};
    use std::collections::HashSet;

    #[derive(Default)]
    struct RecordingView {
        added: Mutex<Vec<RegistryEntry>>,
        sets: Mutex<Vec<Vec<RegistryEntry>>>,
    }

    impl ApplicationView for RecordingView {
        fn add_item(&self, entry: RegistryEntry) {
            self.added.lock().push(entry);
        }

        fn set_items(&self, entries: Vec<RegistryEntry>) {
            self.sets.lock().push(entries);
        }
    }

    fn app(id: &str, name: &str) -> ApplicationInfo {
        ApplicationInfo::new(id, name, "device").with_claim_state(ClaimState::Claimable)
    }

    #[test]
    fn test_entry_equality_by_id_only() {
        let a = RegistryEntry::new(app("A1", "Lamp"));
        let b = RegistryEntry::new(
            app("A1", "Renamed lamp")
                .with_claim_state(ClaimState::Claimed)
                .with_running_state(RunningState::NotRunning),
        );
        let c = RegistryEntry::new(app("B2", "Lamp"));

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<RegistryEntry> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_last_write_wins() {
        let registry = ApplicationRegistry::new();
        registry.on_application_event(&app("A1", "Lamp"), None);
        registry.on_application_event(&app("B2", "Heater"), None);
        registry.on_application_event(&app("A1", "Reading lamp"), Some(&app("A1", "Lamp")));

        assert_eq!(registry.len(), 2);
        let a1 = registry.get(&"A1".into()).unwrap();
        assert_eq!(a1.application_name, "Reading lamp");
        assert_eq!(registry.get(&"B2".into()).unwrap().application_name, "Heater");
    }

    #[test]
    fn test_old_snapshot_is_ignored() {
        let registry = ApplicationRegistry::new();
        let stale = app("A1", "Stale");
        registry.on_application_event(&app("A1", "Fresh"), Some(&stale));
        assert_eq!(registry.get(&"A1".into()).unwrap().application_name, "Fresh");
    }

    #[test]
    fn test_attach_pushes_snapshot_once() {
        let registry = ApplicationRegistry::new();
        registry.on_application_event(&app("A1", "Lamp"), None);
        registry.on_application_event(&app("B2", "Heater"), None);
        registry.on_application_event(&app("A1", "Lamp v2"), None);

        let view = Arc::new(RecordingView::default());
        registry.set_adapter(Some(view.clone()));

        assert!(view.added.lock().is_empty());
        let sets = view.sets.lock();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 2);
        let a1 = sets[0].iter().find(|e| e.id_of().as_str() == "A1").unwrap();
        assert_eq!(a1.info().application_name, "Lamp v2");
    }

    #[test]
    fn test_attached_view_sees_each_event() {
        let registry = ApplicationRegistry::new();
        let view = Arc::new(RecordingView::default());
        registry.set_adapter(Some(view.clone()));
        assert_eq!(view.sets.lock()[0].len(), 0);

        registry.on_application_event(&app("A1", "Lamp"), None);
        registry.on_application_event(&app("A1", "Lamp v2"), None);

        let added = view.added.lock();
        let names: Vec<&str> = added.iter().map(|e| e.info().application_name.as_str()).collect();
        assert_eq!(names, vec!["Lamp", "Lamp v2"]);
    }

    #[test]
    fn test_detach_silences_view() {
        let registry = ApplicationRegistry::new();
        let view = Arc::new(RecordingView::default());
        registry.set_adapter(Some(view.clone()));
        registry.set_adapter(None);
        registry.on_application_event(&app("A1", "Lamp"), None);

        assert!(view.added.lock().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_entry_display() {
        let entry = RegistryEntry::new(
            ApplicationInfo::new("A1", "Lamp", "hallway")
                .with_claim_state(ClaimState::Claimed)
                .with_running_state(RunningState::Running),
        );
        assert_eq!(
            entry.to_string(),
            "Lamp@hallway\nLast Claim Status : claimed\nLast Status : running"
        );
    }
}
