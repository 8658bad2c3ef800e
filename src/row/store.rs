// Row state store: keyed machines, stale-response guards and persistence

use super::fsm::{RowEvent, RowMachine};
use super::RowState;
use crate::cache::sanitize_key;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Identifies one outgoing request for a row
///
/// A response is applied only if its ticket is still the latest one for the
/// row and no clear happened since it was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    pub repo: String,
    pub seq: u64,
    pub generation: u64,
}

#[derive(Default)]
struct StoreInner {
    machines: BTreeMap<String, RowMachine>,
    latest: HashMap<String, u64>,
    next_seq: u64,
    generation: u64,
}

/// Owns one state machine per repository row
///
/// Rows are addressed strictly by repository name, so a slow response for
/// one row can never touch another. The store optionally persists an
/// organization-scoped snapshot used to pre-render rows after a restart.
pub struct RowStateStore {
    inner: Mutex<StoreInner>,
    updates: broadcast::Sender<RowState>,
    persist_path: Option<PathBuf>,
}

impl Default for RowStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RowStateStore {
    /// In-memory store without persistence
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(StoreInner::default()),
            updates,
            persist_path: None,
        }
    }

    /// Location of an organization's persisted snapshot
    pub fn snapshot_path(state_dir: &Path, org: &str) -> PathBuf {
        state_dir.join(format!("row_states_{}.json", sanitize_key(&org.to_lowercase())))
    }

    /// Store persisted under `state_dir`, hydrated from the last snapshot
    ///
    /// In-flight states do not survive a restart and hydrate as `UNKNOWN`.
    pub fn open(state_dir: &Path, org: &str) -> Self {
        let mut store = Self::new();
        let path = Self::snapshot_path(state_dir, org);

        if let Ok(raw) = std::fs::read(&path) {
            match serde_json::from_slice::<Vec<RowState>>(&raw) {
                Ok(rows) => {
                    let machines = &mut store.inner.get_mut().machines;
                    for row in rows {
                        let mut machine = RowMachine::from_snapshot(&row);
                        if machine.state().is_busy() {
                            machine.handle(RowEvent::Init);
                        }
                        machines.insert(row.repo_name, machine);
                    }
                    tracing::debug!(path = %path.display(), rows = machines.len(), "Hydrated row states");
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable row snapshot"),
            }
        }

        store.persist_path = Some(path);
        store
    }

    /// Current state of a row, creating an all-unknown row on first reference
    pub fn get(&self, repo: &str) -> RowState {
        self.inner
            .lock()
            .machines
            .entry(repo.to_string())
            .or_default()
            .snapshot(repo)
    }

    /// Apply an event to a row unconditionally
    pub fn apply_event(&self, repo: &str, event: RowEvent) -> RowState {
        let mut inner = self.inner.lock();
        let state = Self::apply_locked(&mut inner, repo, event);
        self.publish(&inner, &state);
        state
    }

    /// Issue a ticket for a request about to be sent for `repo`
    pub fn begin_request(&self, repo: &str) -> RequestTicket {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.latest.insert(repo.to_string(), seq);
        RequestTicket {
            repo: repo.to_string(),
            seq,
            generation: inner.generation,
        }
    }

    /// Apply a response event unless it is stale; `None` when dropped
    pub fn apply_response(&self, ticket: &RequestTicket, event: RowEvent) -> Option<RowState> {
        let mut inner = self.inner.lock();

        if ticket.generation != inner.generation {
            tracing::debug!(repo = %ticket.repo, event = event.name(), "Dropping response from a cleared generation");
            return None;
        }
        if inner.latest.get(&ticket.repo) != Some(&ticket.seq) {
            tracing::debug!(repo = %ticket.repo, event = event.name(), "Dropping superseded response");
            return None;
        }

        let state = Self::apply_locked(&mut inner, &ticket.repo, event);
        self.publish(&inner, &state);
        Some(state)
    }

    /// Snapshot of every known row, ordered by repository name
    pub fn snapshot(&self) -> Vec<RowState> {
        let inner = self.inner.lock();
        inner
            .machines
            .iter()
            .map(|(repo, machine)| machine.snapshot(repo))
            .collect()
    }

    /// Receive every row update applied from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RowState> {
        self.updates.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Forget all rows and orphan every in-flight request
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.machines.clear();
        inner.latest.clear();

        if let Some(path) = &self.persist_path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove row snapshot"),
            }
        }
    }

    fn apply_locked(inner: &mut StoreInner, repo: &str, event: RowEvent) -> RowState {
        let machine = inner.machines.entry(repo.to_string()).or_default();
        let before = machine.state();
        let event_name = event.name();
        let after = machine.handle(event);
        tracing::debug!(repo, event = event_name, from = ?before, to = ?after, "Row transition");
        machine.snapshot(repo)
    }

    fn publish(&self, inner: &StoreInner, state: &RowState) {
        // No subscribers is fine
        let _ = self.updates.send(state.clone());
        self.persist(inner);
    }

    fn persist(&self, inner: &StoreInner) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let rows: Vec<RowState> = inner
            .machines
            .iter()
            .map(|(repo, machine)| machine.snapshot(repo))
            .collect();

        let result = path
            .parent()
            .map_or(Ok(()), |dir| std::fs::create_dir_all(dir))
            .and_then(|()| serde_json::to_vec(&rows).map_err(std::io::Error::other))
            .and_then(|raw| std::fs::write(path, raw));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Failed to persist row snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{FsmState, StatusPayload};
    use tempfile::TempDir;

    fn refresh(json: &str) -> RowEvent {
        RowEvent::StatusRefresh(serde_json::from_str::<StatusPayload>(json).unwrap())
    }

    #[test]
    fn rows_are_independent() {
        let store = RowStateStore::new();
        store.apply_event("a", RowEvent::CheckStart);
        store.apply_event("b", refresh(r#"{"isPlugin":false}"#));

        assert_eq!(store.get("a").fsm_state, FsmState::Checking);
        assert_eq!(store.get("b").fsm_state, FsmState::NotPlugin);
        assert_eq!(store.get("c").fsm_state, FsmState::Unknown);
        assert_eq!(store.snapshot().len(), 3);
    }

    #[test]
    fn stale_check_response_is_dropped_after_install_starts() {
        let store = RowStateStore::new();
        let check = store.begin_request("seo");
        store.apply_event("seo", RowEvent::CheckStart);

        let install = store.begin_request("seo");
        store.apply_event("seo", RowEvent::InstallStart);

        assert!(store
            .apply_response(&check, refresh(r#"{"isPlugin":true}"#))
            .is_none());
        assert_eq!(store.get("seo").fsm_state, FsmState::Installing);

        let state = store
            .apply_response(
                &install,
                RowEvent::InstallSuccess {
                    activated: true,
                    plugin_file: Some("seo/seo.php".into()),
                },
            )
            .unwrap();
        assert_eq!(state.fsm_state, FsmState::DownloadedActive);
    }

    #[test]
    fn clear_orphans_in_flight_requests() {
        let store = RowStateStore::new();
        let ticket = store.begin_request("seo");
        store.clear();

        assert_eq!(store.generation(), 1);
        assert!(store
            .apply_response(&ticket, refresh(r#"{"isPlugin":true}"#))
            .is_none());
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let store = RowStateStore::new();
        let mut rx = store.subscribe();
        store.apply_event("seo", RowEvent::CheckStart);

        let update = rx.recv().await.unwrap();
        assert_eq!(update.repo_name, "seo");
        assert!(update.checking);
    }

    #[test]
    fn persists_and_hydrates_per_organization() {
        let dir = TempDir::new().unwrap();
        {
            let store = RowStateStore::open(dir.path(), "Acme");
            store.apply_event("seo", refresh(r#"{"isInstalled":true,"pluginFile":"seo/seo.php"}"#));
            store.apply_event("busy", RowEvent::InstallStart);
        }
        assert!(RowStateStore::snapshot_path(dir.path(), "ACME").exists());

        let store = RowStateStore::open(dir.path(), "acme");
        let seo = store.get("seo");
        assert_eq!(seo.fsm_state, FsmState::DownloadedInactive);
        assert_eq!(seo.plugin_file.as_deref(), Some("seo/seo.php"));
        assert_eq!(store.get("busy").fsm_state, FsmState::Unknown);

        assert!(RowStateStore::open(dir.path(), "other").snapshot().is_empty());

        store.clear();
        assert!(!RowStateStore::snapshot_path(dir.path(), "acme").exists());
    }
}
