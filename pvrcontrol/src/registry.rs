//! Registry of backend clients and the fan-out executor.
//!
//! The registry is the single source of truth for which backend workers
//! exist and are usable. Lifecycle notifications (enable / disable /
//! install / data change) arrive through [`ClientRegistry::register_or_update`];
//! everything else reads snapshots.
//!
//! Locking: the map lock is held only for lookups and map updates. The
//! potentially slow backend create/destroy calls run outside of it, so a
//! slow backend never blocks lookups or fan-out over the other clients.
//! Lifecycle operations themselves are serialized by a dedicated mutex.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use pvrclient::{
    ClientCapabilities, ClientError, ClientId, CreateStatus, LifecycleStatus, PvrClient,
};

use crate::events::{CoreEvent, CoreEventBus};
use crate::providers::{NotificationSink, Severity};

/// Builds a client handle for a backend addon. Injected at construction.
pub trait ClientFactory: Send + Sync {
    fn build(&self, addon_id: &str, client_id: ClientId) -> anyhow::Result<Arc<dyn PvrClient>>;
}

/// Lifecycle notification for one backend addon.
#[derive(Clone, Debug)]
pub struct AddonEvent {
    pub addon_id: String,
    pub enabled: bool,
    /// The addon reported a data/config change and must be recreated.
    pub data_changed: bool,
}

impl AddonEvent {
    pub fn enabled(addon_id: &str) -> Self {
        Self {
            addon_id: addon_id.to_string(),
            enabled: true,
            data_changed: false,
        }
    }

    pub fn disabled(addon_id: &str) -> Self {
        Self {
            addon_id: addon_id.to_string(),
            enabled: false,
            data_changed: false,
        }
    }

    pub fn data_changed(addon_id: &str) -> Self {
        Self {
            addon_id: addon_id.to_string(),
            enabled: true,
            data_changed: true,
        }
    }
}

/// Aggregate outcome of one fan-out call.
///
/// Every failed client is retained with its own error; a "not implemented"
/// answer counts as success. `visited == 0` means there was no created
/// client to talk to at all, which callers must distinguish from a partial
/// failure.
#[derive(Debug, Default)]
pub struct Fanout {
    pub visited: usize,
    pub failed: Vec<(ClientId, ClientError)>,
}

impl Fanout {
    pub fn ok(&self) -> bool {
        self.visited > 0 && self.failed.is_empty()
    }

    pub fn no_clients(&self) -> bool {
        self.visited == 0
    }

    pub fn failed_ids(&self) -> Vec<ClientId> {
        self.failed.iter().map(|(id, _)| *id).collect()
    }

    /// One line naming every failed client.
    pub fn summary(&self) -> String {
        if self.no_clients() {
            return "no created clients".to_string();
        }
        let parts: Vec<String> = self
            .failed
            .iter()
            .map(|(id, err)| format!("client {id}: {err}"))
            .collect();
        parts.join("; ")
    }
}

struct ClientEntry {
    addon_id: String,
    client: Arc<dyn PvrClient>,
    status: LifecycleStatus,
}

#[derive(Default)]
struct RegistryState {
    clients: HashMap<ClientId, ClientEntry>,
    /// Addon id -> stable client id. Kept for as long as the addon is
    /// known, across disable/enable, so an id is never reused for a
    /// different addon.
    addon_ids: HashMap<String, ClientId>,
    /// Addons disabled after a permanent create failure. Ignored until a
    /// data-changed lifecycle event retries them.
    disabled_addons: HashSet<String>,
}

enum LifecycleAction {
    Create {
        id: ClientId,
        client: Arc<dyn PvrClient>,
    },
    Recreate {
        id: ClientId,
        old: Arc<dyn PvrClient>,
        new: Arc<dyn PvrClient>,
    },
    Destroy {
        id: ClientId,
        client: Arc<dyn PvrClient>,
    },
    Nothing,
}

pub struct ClientRegistry {
    state: Mutex<RegistryState>,
    /// Serializes lifecycle transitions among themselves while the map
    /// lock stays available for lookups.
    lifecycle: Mutex<()>,
    factory: Arc<dyn ClientFactory>,
    notifications: Arc<dyn NotificationSink>,
    events: CoreEventBus,
}

impl ClientRegistry {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        notifications: Arc<dyn NotificationSink>,
        events: CoreEventBus,
    ) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            lifecycle: Mutex::new(()),
            factory,
            notifications,
            events,
        }
    }

    /// Apply one addon lifecycle notification. Idempotent.
    ///
    /// Unknown + enabled allocates the stable id and creates the handle;
    /// known + disabled destroys it; known + data-changed recreates it in
    /// place, preserving its id. There is no internal retry loop: a failed
    /// create stays failed until the next lifecycle event.
    pub fn register_or_update(&self, event: &AddonEvent) {
        let _lifecycle = self.lifecycle.lock().unwrap();

        let action = self.plan_action(event);
        match action {
            LifecycleAction::Create { id, client } => {
                self.create_client(id, &event.addon_id, client);
            }
            LifecycleAction::Recreate { id, old, new } => {
                // Leave created status before the teardown so fan-out
                // cannot pick the handle up mid-recreate.
                self.mark_status(id, LifecycleStatus::NotCreated);
                info!(client = %id, addon = %event.addon_id, "Recreating client after data change");
                old.destroy();
                self.create_client(id, &event.addon_id, new);
            }
            LifecycleAction::Destroy { id, client } => {
                self.mark_status(id, LifecycleStatus::Destroyed);
                client.destroy();
                let mut state = self.state.lock().unwrap();
                state.clients.remove(&id);
                drop(state);
                info!(client = %id, addon = %event.addon_id, "Destroyed client");
                self.events.broadcast(CoreEvent::ClientsChanged);
            }
            LifecycleAction::Nothing => {}
        }
    }

    /// Decide the transition under the map lock; the backend calls happen
    /// afterwards, outside of it.
    fn plan_action(&self, event: &AddonEvent) -> LifecycleAction {
        let mut state = self.state.lock().unwrap();

        if event.enabled && state.disabled_addons.contains(&event.addon_id) {
            if !event.data_changed {
                debug!(addon = %event.addon_id, "Ignoring enable for permanently failed addon");
                return LifecycleAction::Nothing;
            }
            state.disabled_addons.remove(&event.addon_id);
        }

        let known = state.addon_ids.get(&event.addon_id).copied();
        match known {
            Some(id) => {
                let entry = state.clients.get(&id);
                match entry {
                    Some(entry) if !event.enabled => LifecycleAction::Destroy {
                        id,
                        client: Arc::clone(&entry.client),
                    },
                    Some(entry) if event.data_changed => {
                        match self.factory.build(&event.addon_id, id) {
                            Ok(new) => LifecycleAction::Recreate {
                                id,
                                old: Arc::clone(&entry.client),
                                new,
                            },
                            Err(err) => {
                                warn!(addon = %event.addon_id, error = %err,
                                      "Failed to build replacement client handle");
                                LifecycleAction::Nothing
                            }
                        }
                    }
                    Some(entry) if entry.status == LifecycleStatus::NotCreated => {
                        // Retry driven by this lifecycle event.
                        LifecycleAction::Create {
                            id,
                            client: Arc::clone(&entry.client),
                        }
                    }
                    Some(_) => LifecycleAction::Nothing,
                    None if event.enabled => self.plan_fresh_create(&mut state, event, Some(id)),
                    None => LifecycleAction::Nothing,
                }
            }
            None if event.enabled => self.plan_fresh_create(&mut state, event, None),
            None => LifecycleAction::Nothing,
        }
    }

    fn plan_fresh_create(
        &self,
        state: &mut RegistryState,
        event: &AddonEvent,
        known_id: Option<ClientId>,
    ) -> LifecycleAction {
        let id = known_id.unwrap_or_else(|| Self::allocate_id(state, &event.addon_id));
        match self.factory.build(&event.addon_id, id) {
            Ok(client) => {
                state.addon_ids.insert(event.addon_id.clone(), id);
                LifecycleAction::Create { id, client }
            }
            Err(err) => {
                warn!(addon = %event.addon_id, error = %err, "Failed to build client handle");
                LifecycleAction::Nothing
            }
        }
    }

    fn mark_status(&self, id: ClientId, status: LifecycleStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.clients.get_mut(&id) {
            entry.status = status;
        }
    }

    /// Stable id for the addon: one-way hash of the addon id, probed past
    /// collisions so two known addons never share an id.
    fn allocate_id(state: &RegistryState, addon_id: &str) -> ClientId {
        let mut id = ClientId::from_addon_id(addon_id);
        while state.addon_ids.values().any(|&taken| taken == id) {
            id = id.probe_next();
        }
        id
    }

    /// Run the backend create routine (outside the map lock) and record
    /// the outcome.
    fn create_client(&self, id: ClientId, addon_id: &str, client: Arc<dyn PvrClient>) {
        let status = client.create();
        let mut state = self.state.lock().unwrap();
        match status {
            CreateStatus::Ok => {
                info!(client = %id, addon = %addon_id, name = %client.name(), "Created client");
                state.clients.insert(
                    id,
                    ClientEntry {
                        addon_id: addon_id.to_string(),
                        client,
                        status: LifecycleStatus::Created,
                    },
                );
                drop(state);
                self.events.broadcast(CoreEvent::ClientsChanged);
            }
            CreateStatus::TransientFailure => {
                warn!(client = %id, addon = %addon_id,
                      "Client create failed, will retry on the next lifecycle event");
                state.clients.insert(
                    id,
                    ClientEntry {
                        addon_id: addon_id.to_string(),
                        client,
                        status: LifecycleStatus::NotCreated,
                    },
                );
            }
            CreateStatus::PermanentFailure => {
                // Disable the backend; the failure is reported once, not
                // on every retry.
                error!(client = %id, addon = %addon_id, "Client create failed permanently, disabling addon");
                state.clients.remove(&id);
                state.disabled_addons.insert(addon_id.to_string());
                drop(state);
                self.notifications.notify(
                    Severity::Error,
                    &format!("PVR backend '{addon_id}' failed to start and has been disabled"),
                );
                self.events.broadcast(CoreEvent::ClientsChanged);
            }
        }
    }

    /// O(1) lookup of a created client. `None` for the invalid sentinel
    /// range, unknown ids, and handles that are not in created status.
    pub fn get_client(&self, id: ClientId) -> Option<Arc<dyn PvrClient>> {
        if !id.is_valid() {
            return None;
        }
        let state = self.state.lock().unwrap();
        state
            .clients
            .get(&id)
            .filter(|entry| entry.status == LifecycleStatus::Created)
            .map(|entry| Arc::clone(&entry.client))
    }

    /// Snapshot of the handles currently in created status. Basis for all
    /// fan-out.
    pub fn created_clients(&self) -> HashMap<ClientId, Arc<dyn PvrClient>> {
        let state = self.state.lock().unwrap();
        state
            .clients
            .iter()
            .filter(|(_, entry)| entry.status == LifecycleStatus::Created)
            .map(|(id, entry)| (*id, Arc::clone(&entry.client)))
            .collect()
    }

    pub fn created_client_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state
            .clients
            .values()
            .filter(|entry| entry.status == LifecycleStatus::Created)
            .count()
    }

    /// Addon id owning a client, while it is known.
    pub fn addon_id_of(&self, id: ClientId) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.clients.get(&id).map(|entry| entry.addon_id.clone())
    }

    /// Created clients whose capabilities satisfy the predicate.
    pub fn created_clients_supporting<P>(&self, pred: P) -> HashMap<ClientId, Arc<dyn PvrClient>>
    where
        P: Fn(&ClientCapabilities) -> bool,
    {
        self.created_clients()
            .into_iter()
            .filter(|(_, client)| pred(&client.capabilities()))
            .collect()
    }

    pub fn clients_supporting_timers(&self) -> HashMap<ClientId, Arc<dyn PvrClient>> {
        self.created_clients_supporting(|caps| caps.supports_timers)
    }

    pub fn clients_supporting_channel_scan(&self) -> HashMap<ClientId, Arc<dyn PvrClient>> {
        self.created_clients_supporting(|caps| caps.supports_channel_scan)
    }

    /// Invoke `op` once per created client.
    ///
    /// A per-client "not implemented" answer is capability absence and
    /// counts as success. Any other per-client error is recorded and
    /// iteration continues: no client's failure blocks another's
    /// invocation.
    pub fn for_each_created_client<F>(&self, mut op: F) -> Fanout
    where
        F: FnMut(ClientId, &Arc<dyn PvrClient>) -> Result<(), ClientError>,
    {
        let snapshot = self.created_clients();
        let mut fanout = Fanout::default();
        for (id, client) in snapshot {
            fanout.visited += 1;
            match op(id, &client) {
                Ok(()) => {}
                Err(ClientError::NotImplemented) => {
                    debug!(client = %id, "Operation not implemented by backend, skipping");
                }
                Err(err) => {
                    warn!(client = %id, error = %err, "Client operation failed");
                    fanout.failed.push((id, err));
                }
            }
        }
        fanout
    }
}
