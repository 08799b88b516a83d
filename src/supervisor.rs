//! Connection lifecycle supervision.
//!
//! The `Supervisor` owns the ordered list of tunnel entries and is the only
//! component that mutates it. It applies structural operations (add, edit,
//! clone, delete), drives each entry's client process through the
//! `Disabled -> Starting -> Connected -> Stopping -> Disabled` state machine,
//! and reconciles asynchronous process death back into entry state, both via
//! the best-effort exit notification and via the periodic watchdog poll.
//!
//! The control loop in `main.rs` is the single caller, so no locking is
//! needed: every transition completes before the next event is processed.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::client::{StartError, TunnelClient};
use crate::events::Event;
use crate::record::ConnectionRecord;
use crate::store::TunnelStore;

/// Interval of the watchdog poll reconciling Connected entries against
/// process liveness. Armed only while at least one entry is Connected.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_millis(2000);

/// Stable identifier of a tunnel entry. List positions move on delete, so
/// ids, not indices, name entries across the UI boundary.
pub type EntryId = u64;

/// Lifecycle state of a tunnel entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No client process; the entry is editable.
    Disabled,
    /// Client launch in progress.
    Starting,
    /// Client process confirmed running.
    Connected,
    /// Stop sequence in progress.
    Stopping,
    /// Client launch failed. Transient: always followed by `Disabled`
    /// within the same operation, never observable at rest.
    Failed,
}

/// Rejected edit of a tunnel entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    /// The entry's client is live; stop the tunnel before editing.
    #[error("tunnel is active; disconnect it before editing")]
    Busy,
    /// Stale id, e.g. from a selection that outlived a delete.
    #[error("no such tunnel")]
    NotFound,
}

/// Rejected clone of a tunnel entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CloneError {
    #[error("no such tunnel")]
    NotFound,
}

/// Runtime pairing of a tunnel record with its state and client process.
#[derive(Debug)]
struct ConnectionEntry {
    id: EntryId,
    record: ConnectionRecord,
    state: ConnectionState,
    client: TunnelClient,
}

/// Read-only view of one entry, handed to the UI after each transition.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub id: EntryId,
    pub record: ConnectionRecord,
    pub state: ConnectionState,
    pub pid: Option<u32>,
}

/// Owns the tunnel list and the lifecycle of every client process.
pub struct Supervisor {
    entries: Vec<ConnectionEntry>,
    next_id: EntryId,
    store: TunnelStore,
    client_command: String,
    event_tx: mpsc::Sender<Event>,
}

impl Supervisor {
    /// Loads the persisted tunnel list; every entry starts Disabled with an
    /// unbound client handle.
    pub fn load(
        store: TunnelStore,
        client_command: String,
        event_tx: mpsc::Sender<Event>,
    ) -> anyhow::Result<Self> {
        let records = store.load()?;
        let mut supervisor = Self {
            entries: Vec::new(),
            next_id: 0,
            store,
            client_command,
            event_tx,
        };
        for record in records {
            supervisor.push_entry(record);
        }
        Ok(supervisor)
    }

    fn push_entry(&mut self, record: ConnectionRecord) -> EntryId {
        let id = self.next_id;
        self.next_id += 1;
        let client = TunnelClient::new(self.client_command.clone(), id, self.event_tx.clone());
        self.entries.push(ConnectionEntry {
            id,
            record,
            state: ConnectionState::Disabled,
            client,
        });
        id
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut ConnectionEntry> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    /// Persists the current record list. A failed save never rolls back the
    /// in-memory mutation; the error is logged and the list stays usable.
    fn persist(&self) {
        let records: Vec<ConnectionRecord> =
            self.entries.iter().map(|entry| entry.record.clone()).collect();
        if let Err(err) = self.store.save(&records) {
            log::error!("failed to save tunnel list: {err:#}");
        }
    }

    /// Appends a new Disabled entry and persists the list.
    pub fn add(&mut self, record: ConnectionRecord) -> EntryId {
        let id = self.push_entry(record);
        self.persist();
        id
    }

    /// Replaces an entry's record in place. Only Disabled entries may be
    /// edited; a live tunnel must be disconnected first.
    pub fn edit(&mut self, id: EntryId, record: ConnectionRecord) -> Result<(), EditError> {
        let entry = self.entry_mut(id).ok_or(EditError::NotFound)?;
        if entry.state != ConnectionState::Disabled {
            return Err(EditError::Busy);
        }
        entry.record = record;
        self.persist();
        Ok(())
    }

    /// Appends a Disabled copy of the source entry's record.
    pub fn clone_entry(&mut self, id: EntryId) -> Result<EntryId, CloneError> {
        let record = self
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.record.clone())
            .ok_or(CloneError::NotFound)?;
        let new_id = self.push_entry(record);
        self.persist();
        Ok(new_id)
    }

    /// Removes entries by id, stopping any live client first so a running
    /// process is never orphaned. Missing ids are tolerated (stale
    /// selections). Persists the resulting list once.
    pub async fn delete(&mut self, ids: &[EntryId]) {
        let mut removed = false;
        for &id in ids {
            let Some(index) = self.entries.iter().position(|entry| entry.id == id) else {
                continue;
            };
            if self.entries[index].client.is_running() {
                self.entries[index].state = ConnectionState::Stopping;
                self.entries[index].client.stop().await;
            }
            self.entries.remove(index);
            removed = true;
        }
        if removed {
            self.persist();
        }
    }

    /// Starts the entry's client. No-op unless the entry is Disabled.
    pub async fn toggle_on(&mut self, id: EntryId) -> Result<(), StartError> {
        let command = self.client_command.clone();
        let Some(entry) = self.entry_mut(id) else {
            return Ok(());
        };
        if entry.state != ConnectionState::Disabled {
            return Ok(());
        }
        entry.state = ConnectionState::Starting;
        let args = entry.record.ssh_args();
        log::info!("starting {} {}", command, args.join(" "));
        match entry.client.start(&args) {
            Ok(()) => {
                entry.state = ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                entry.state = ConnectionState::Failed;
                log::warn!("tunnel {:?} failed to start: {err}", entry.record.name);
                entry.state = ConnectionState::Disabled;
                Err(err)
            }
        }
    }

    /// Stops the entry's client: graceful request, 1 s bounded wait, forced
    /// kill if still running. Ends Disabled unconditionally. No-op unless
    /// the entry is Connected.
    pub async fn toggle_off(&mut self, id: EntryId) {
        let Some(entry) = self.entry_mut(id) else {
            return;
        };
        if entry.state != ConnectionState::Connected {
            return;
        }
        entry.state = ConnectionState::Stopping;
        entry.client.stop().await;
        entry.state = ConnectionState::Disabled;
    }

    /// Starts every Disabled entry in list order. A failing entry does not
    /// stop the rest; failures are collected for reporting.
    pub async fn connect_all(&mut self) -> Vec<(String, StartError)> {
        let ids: Vec<EntryId> = self.entries.iter().map(|entry| entry.id).collect();
        let mut failures = Vec::new();
        for id in ids {
            if let Err(err) = self.toggle_on(id).await {
                let name = self
                    .entries
                    .iter()
                    .find(|entry| entry.id == id)
                    .map(|entry| entry.record.name.clone())
                    .unwrap_or_default();
                failures.push((name, err));
            }
        }
        failures
    }

    /// Stops every Connected entry in list order.
    pub async fn disconnect_all(&mut self) {
        let ids: Vec<EntryId> = self.entries.iter().map(|entry| entry.id).collect();
        for id in ids {
            self.toggle_off(id).await;
        }
    }

    /// Reconciles a best-effort exit notification. Only a Connected entry of
    /// the matching process generation transitions; duplicate or stale
    /// notifications and notifications racing a completed stop are no-ops.
    pub fn on_client_exited(&mut self, id: EntryId, generation: u64) {
        let Some(entry) = self.entry_mut(id) else {
            return;
        };
        if entry.client.generation() != generation {
            return;
        }
        if entry.state == ConnectionState::Connected {
            log::info!("tunnel {:?} terminated", entry.record.name);
            entry.client.is_running(); // reap
            entry.state = ConnectionState::Disabled;
        }
    }

    /// Watchdog poll: any entry recorded Connected whose process is no longer
    /// running is marked Disabled. Safe to run redundantly alongside
    /// [`on_client_exited`](Self::on_client_exited).
    pub fn watchdog_tick(&mut self) {
        for entry in &mut self.entries {
            if entry.state == ConnectionState::Connected && !entry.client.is_running() {
                log::info!("tunnel {:?} terminated", entry.record.name);
                entry.state = ConnectionState::Disabled;
            }
        }
    }

    /// Whether the watchdog has anything to watch.
    pub fn any_connected(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.state == ConnectionState::Connected)
    }

    /// Consistent read-only view of all entries in list order.
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.entries
            .iter()
            .map(|entry| EntrySnapshot {
                id: entry.id,
                record: entry.record.clone(),
                state: entry.state,
                pid: entry.client.pid(),
            })
            .collect()
    }
}
