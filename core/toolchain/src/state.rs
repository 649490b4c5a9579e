//! Persisted state: install access records and manifest snapshots.
//!
//! Last-access times are kept here instead of relying on filesystem mtimes.
//! Each record also carries a monotonically increasing sequence number so
//! that two accesses within the same millisecond still have a defined order.
//!
//! Several processes may share one state file. Reads pick up what other
//! processes wrote since the last read. Writes hold an exclusive lock on
//! `<state file>.lock`, merge the file's current contents into memory,
//! apply the change and write through a temporary file and a rename. A
//! write failure is logged and the in-memory state stays authoritative for
//! the process.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::paths::write_atomic;

/// When an install was last resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessRecord {
    /// Milliseconds since the Unix epoch.
    pub at_millis: u64,
    /// Insertion order, used to break ties between equal timestamps.
    pub seq: u64,
}

/// A last-known-good remote document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSnapshot {
    pub fetched_at_millis: u64,
    pub body: serde_json::Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    next_seq: u64,
    #[serde(default)]
    last_access: BTreeMap<String, AccessRecord>,
    #[serde(default)]
    manifests: BTreeMap<String, ManifestSnapshot>,
}

impl PersistedState {
    /// Folds what is on disk into this state.
    ///
    /// Access records keep the newer of the two per key. A record missing
    /// from disk is dropped if its sequence number was already handed out
    /// there, since another process removed it after seeing it. Sequence
    /// numbers never move backwards.
    fn merge(&mut self, disk: PersistedState) {
        let persisted_seq = disk.next_seq;
        let mut last_access = disk.last_access;
        for (key, record) in std::mem::take(&mut self.last_access) {
            match last_access.entry(key) {
                Entry::Occupied(mut entry) => {
                    if record > *entry.get() {
                        entry.insert(record);
                    }
                }
                Entry::Vacant(entry) => {
                    if record.seq > persisted_seq {
                        entry.insert(record);
                    }
                }
            }
        }
        self.last_access = last_access;

        for (purpose, snapshot) in disk.manifests {
            match self.manifests.entry(purpose) {
                Entry::Occupied(mut entry) => {
                    if snapshot.fetched_at_millis > entry.get().fetched_at_millis {
                        entry.insert(snapshot);
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(snapshot);
                }
            }
        }
        self.next_seq = self.next_seq.max(persisted_seq);
    }
}

/// JSON-backed state shared by the catalog, resolver and install manager.
#[derive(Debug)]
pub struct StateStore {
    path: Option<PathBuf>,
    inner: Mutex<PersistedState>,
}

impl StateStore {
    /// Opens the state file at `path`, starting empty if it is missing or corrupt.
    #[must_use]
    pub fn open(path: PathBuf) -> Self {
        let state = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(file = %path.display(), error = %e, "discarding unreadable state file");
                PersistedState::default()
            }),
            Err(_) => PersistedState::default(),
        };
        Self {
            path: Some(path),
            inner: Mutex::new(state),
        }
    }

    /// A store that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(PersistedState::default()),
        }
    }

    /// Records an access to `key` now.
    pub fn record_access(&self, key: &str) -> AccessRecord {
        self.record_access_at(key, now_millis())
    }

    /// Records an access to `key` at the given time.
    pub fn record_access_at(&self, key: &str, at_millis: u64) -> AccessRecord {
        self.modify(|state| {
            state.next_seq += 1;
            let record = AccessRecord {
                at_millis,
                seq: state.next_seq,
            };
            state.last_access.insert(key.to_string(), record);
            record
        })
    }

    #[must_use]
    pub fn last_access(&self, key: &str) -> Option<AccessRecord> {
        self.read(|state| state.last_access.get(key).copied())
    }

    /// Drops the access record for `key`.
    pub fn forget_access(&self, key: &str) {
        self.modify(|state| {
            state.last_access.remove(key);
        });
    }

    /// The last stored snapshot for `purpose`.
    #[must_use]
    pub fn snapshot(&self, purpose: &str) -> Option<ManifestSnapshot> {
        self.read(|state| state.manifests.get(purpose).cloned())
    }

    /// Stores `body` as the last-known-good snapshot for `purpose`.
    pub fn store_snapshot(&self, purpose: &str, body: serde_json::Value) {
        self.modify(|state| {
            state.manifests.insert(
                purpose.to_string(),
                ManifestSnapshot {
                    fetched_at_millis: now_millis(),
                    body,
                },
            );
        });
    }

    fn read<T>(&self, f: impl FnOnce(&PersistedState) -> T) -> T {
        let mut guard = self.lock();
        if let Some(path) = &self.path {
            reload(&mut guard, path);
        }
        f(&guard)
    }

    fn modify<T>(&self, f: impl FnOnce(&mut PersistedState) -> T) -> T {
        let mut guard = self.lock();
        let Some(path) = &self.path else {
            return f(&mut guard);
        };

        let _file_lock = match lock_exclusive(path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to lock state file");
                None
            }
        };
        reload(&mut guard, path);
        let result = f(&mut guard);
        match serde_json::to_vec_pretty(&*guard) {
            Ok(bytes) => {
                if let Err(e) = write_atomic(path, &bytes) {
                    warn!(file = %path.display(), error = %e, "failed to persist state");
                } else {
                    debug!(file = %path.display(), "state persisted");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize state"),
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, PersistedState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Merges the state file into `state`. A missing or unreadable file leaves
/// `state` untouched.
fn reload(state: &mut PersistedState, path: &Path) {
    let Ok(bytes) = std::fs::read(path) else {
        return;
    };
    match serde_json::from_slice(&bytes) {
        Ok(disk) => state.merge(disk),
        Err(e) => debug!(file = %path.display(), error = %e, "ignoring unreadable state file"),
    }
}

/// Blocks until this process holds the lock file next to `path`. The lock
/// is released when the returned file is dropped.
fn lock_exclusive(path: &Path) -> std::io::Result<File> {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(PathBuf::from(name))?;
    file.lock_exclusive()?;
    Ok(file)
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn access_records_order_by_time_then_sequence() {
        let store = StateStore::in_memory();
        let a = store.record_access_at("zig-x86_64-linux-0.12.0", 1_000);
        let b = store.record_access_at("zig-x86_64-linux-0.13.0", 1_000);
        let c = store.record_access_at("zig-x86_64-linux-0.11.0", 999);

        assert!(b > a, "same timestamp breaks ties by insertion order");
        assert!(a > c);
        assert_eq!(store.last_access("zig-x86_64-linux-0.13.0"), Some(b));
    }

    #[test]
    fn forget_access_removes_record() {
        let store = StateStore::in_memory();
        store.record_access("zls-x86_64-linux-0.13.0");
        store.forget_access("zls-x86_64-linux-0.13.0");
        assert_eq!(store.last_access("zls-x86_64-linux-0.13.0"), None);
    }

    #[test]
    fn state_survives_reopen() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let path = temp.path().join("state.json");

        let store = StateStore::open(path.clone());
        let record = store.record_access_at("zig-x86_64-linux-0.13.0", 42);
        store.store_snapshot("zig-index", json!({"0.13.0": {}}));
        drop(store);

        let reopened = StateStore::open(path);
        assert_eq!(reopened.last_access("zig-x86_64-linux-0.13.0"), Some(record));
        assert_eq!(
            reopened.snapshot("zig-index").map(|s| s.body),
            Some(json!({"0.13.0": {}}))
        );
        let next = reopened.record_access_at("zig-x86_64-linux-0.12.0", 42);
        assert!(next.seq > record.seq);
    }

    #[test]
    fn stores_sharing_a_file_keep_each_others_records() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let path = temp.path().join("state.json");
        let first = StateStore::open(path.clone());
        let second = StateStore::open(path.clone());

        let a = first.record_access_at("zig-x86_64-linux-0.13.0", 100);
        let b = second.record_access_at("zig-x86_64-linux-0.12.0", 100);
        second.store_snapshot("zig-index", json!({"0.12.0": {}}));
        let c = first.record_access_at("zls-x86_64-linux-0.13.0", 100);

        assert!(b.seq > a.seq, "sequence numbers continue across stores");
        assert!(c.seq > b.seq);
        assert_eq!(second.last_access("zig-x86_64-linux-0.13.0"), Some(a));
        assert_eq!(first.last_access("zig-x86_64-linux-0.12.0"), Some(b));

        let reopened = StateStore::open(path);
        assert_eq!(reopened.last_access("zig-x86_64-linux-0.13.0"), Some(a));
        assert_eq!(reopened.last_access("zig-x86_64-linux-0.12.0"), Some(b));
        assert_eq!(reopened.last_access("zls-x86_64-linux-0.13.0"), Some(c));
        assert_eq!(
            reopened.snapshot("zig-index").map(|s| s.body),
            Some(json!({"0.12.0": {}}))
        );
    }

    #[test]
    fn forgotten_record_is_not_restored_by_another_store() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let path = temp.path().join("state.json");
        let first = StateStore::open(path.clone());
        first.record_access_at("zig-x86_64-linux-0.11.0", 100);
        let second = StateStore::open(path.clone());
        assert!(second.last_access("zig-x86_64-linux-0.11.0").is_some());

        first.forget_access("zig-x86_64-linux-0.11.0");
        second.record_access_at("zig-x86_64-linux-0.13.0", 200);

        let reopened = StateStore::open(path);
        assert_eq!(reopened.last_access("zig-x86_64-linux-0.11.0"), None);
        assert!(reopened.last_access("zig-x86_64-linux-0.13.0").is_some());
    }

    #[test]
    fn newer_access_wins_when_both_stores_touch_a_key() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let path = temp.path().join("state.json");
        let first = StateStore::open(path.clone());
        let second = StateStore::open(path.clone());

        first.record_access_at("zig-x86_64-linux-0.13.0", 500);
        let newer = second.record_access_at("zig-x86_64-linux-0.13.0", 900);
        first.record_access_at("zig-x86_64-linux-0.12.0", 100);

        assert_eq!(first.last_access("zig-x86_64-linux-0.13.0"), Some(newer));
        assert_eq!(
            StateStore::open(path).last_access("zig-x86_64-linux-0.13.0"),
            Some(newer)
        );
    }

    #[test]
    fn corrupt_state_file_starts_empty() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let path = temp.path().join("state.json");
        std::fs::write(&path, b"{ not json").expect("Should write");

        let store = StateStore::open(path);
        assert_eq!(store.snapshot("zig-index"), None);
    }
}
