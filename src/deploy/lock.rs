// ABOUTME: Deploy lock to prevent concurrent deployments to the same group.
// ABOUTME: Atomic create-if-absent on a lock store, with stale and forced lock breaking.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::types::{DeploymentId, GroupName};

use super::error::{DeployError, LockHolderInfo};

/// Locks older than the longest possible deployment plus this margin are
/// assumed to belong to a holder that died.
pub const STALE_LOCK_MARGIN: Duration = Duration::from_secs(3600);

/// How long an unreadable lock is given to finish being written before it is
/// treated as corrupted.
pub const CORRUPTED_LOCK_GRACE: Duration = Duration::from_secs(30);

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Group being deployed.
    pub group: String,
    /// Deployment holding the lock, when known.
    #[serde(default)]
    pub deployment: Option<String>,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(group: &GroupName, deployment: Option<&DeploymentId>) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            group: group.to_string(),
            deployment: deployment.map(ToString::to_string),
        }
    }

    /// True once the lock is at least `max_age` old.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        (Utc::now() - self.started_at)
            .to_std()
            .is_ok_and(|age| age >= max_age)
    }

    pub(crate) fn holder_info(&self) -> LockHolderInfo {
        LockHolderInfo {
            holder: self.holder.clone(),
            pid: self.pid,
            started_at: self.started_at,
            deployment: self.deployment.clone(),
        }
    }
}

/// What a lock store holds for a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Free,
    Held(LockInfo),
    /// Something is there but it cannot be parsed. `age` is how long ago it
    /// was last written.
    Corrupted { age: Duration },
}

/// Storage for deploy locks. `try_create` must be atomic.
pub trait LockStore: Send + Sync {
    /// Create the lock if absent. Returns false when one already exists.
    fn try_create(&self, group: &GroupName, info: &LockInfo) -> Result<bool, DeployError>;

    fn read(&self, group: &GroupName) -> Result<LockState, DeployError>;

    /// Remove the lock. Removing a missing lock is not an error.
    fn remove(&self, group: &GroupName) -> Result<(), DeployError>;
}

/// Process-local locks.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    locks: Mutex<HashMap<GroupName, LockInfo>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a lock in place directly, bypassing acquisition.
    pub fn insert(&self, group: &GroupName, info: LockInfo) {
        self.locks.lock().insert(group.clone(), info);
    }
}

impl LockStore for MemoryLockStore {
    fn try_create(&self, group: &GroupName, info: &LockInfo) -> Result<bool, DeployError> {
        let mut locks = self.locks.lock();
        if locks.contains_key(group) {
            return Ok(false);
        }
        locks.insert(group.clone(), info.clone());
        Ok(true)
    }

    fn read(&self, group: &GroupName) -> Result<LockState, DeployError> {
        Ok(match self.locks.lock().get(group) {
            Some(info) => LockState::Held(info.clone()),
            None => LockState::Free,
        })
    }

    fn remove(&self, group: &GroupName) -> Result<(), DeployError> {
        self.locks.lock().remove(group);
        Ok(())
    }
}

/// Lock files under a state directory, one `<group>.lock` per group.
/// Visible to every process sharing the directory.
#[derive(Debug, Clone)]
pub struct FileLockStore {
    dir: PathBuf,
}

impl FileLockStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path to the lock file for a group.
    pub fn lock_path(&self, group: &GroupName) -> PathBuf {
        self.dir.join(format!("{group}.lock"))
    }

    fn staging_path(&self, group: &GroupName) -> PathBuf {
        self.dir.join(format!(
            ".{group}.lock.{}.{}",
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ))
    }

    fn age(&self, group: &GroupName) -> Duration {
        std::fs::metadata(self.lock_path(group))
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .unwrap_or(Duration::ZERO)
    }
}

impl LockStore for FileLockStore {
    fn try_create(&self, group: &GroupName, info: &LockInfo) -> Result<bool, DeployError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            DeployError::lock_error(format!("failed to create state directory: {e}"))
        })?;
        let json = serde_json::to_string(info)
            .map_err(|e| DeployError::lock_error(format!("failed to serialize lock: {e}")))?;

        // Write the full contents aside, then link them into place. The link
        // fails if the lock exists, and readers never see a half-written lock.
        let staging = self.staging_path(group);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)
            .map_err(|e| DeployError::lock_error(format!("failed to stage lock: {e}")))?;
        let written = file.write_all(json.as_bytes()).and_then(|()| file.sync_all());
        drop(file);
        let linked = written.and_then(|()| std::fs::hard_link(&staging, self.lock_path(group)));
        let _ = std::fs::remove_file(&staging);

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(DeployError::lock_error(format!("failed to acquire lock: {e}"))),
        }
    }

    fn read(&self, group: &GroupName) -> Result<LockState, DeployError> {
        match std::fs::read_to_string(self.lock_path(group)) {
            Ok(contents) => Ok(match serde_json::from_str::<LockInfo>(&contents) {
                Ok(info) => LockState::Held(info),
                Err(_) => LockState::Corrupted {
                    age: self.age(group),
                },
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(LockState::Free),
            Err(e) => Err(DeployError::lock_error(format!("failed to read lock info: {e}"))),
        }
    }

    fn remove(&self, group: &GroupName) -> Result<(), DeployError> {
        match std::fs::remove_file(self.lock_path(group)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DeployError::lock_error(format!("failed to remove lock: {e}"))),
        }
    }
}

/// A held deploy lock. Released explicitly with `release`, or on drop.
pub struct DeployLock {
    store: Arc<dyn LockStore>,
    group: GroupName,
    released: bool,
}

impl std::fmt::Debug for DeployLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLock")
            .field("group", &self.group)
            .field("released", &self.released)
            .finish()
    }
}

impl DeployLock {
    /// Acquire the deploy lock for a group.
    ///
    /// Returns a conflict if the lock is held by someone else. Locks older
    /// than `stale_after` and corrupted locks past their grace period are
    /// broken with a warning; `force` breaks any lock.
    pub fn acquire(
        store: Arc<dyn LockStore>,
        group: &GroupName,
        deployment: Option<&DeploymentId>,
        force: bool,
        stale_after: Duration,
    ) -> Result<Self, DeployError> {
        let info = LockInfo::new(group, deployment);
        if store.try_create(group, &info)? {
            return Ok(Self::held(store, group));
        }

        match store.read(group)? {
            LockState::Held(existing) if force => {
                tracing::warn!(
                    "Breaking lock held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
            }
            LockState::Held(existing) if existing.is_stale(stale_after) => {
                tracing::warn!(
                    "Auto-breaking stale lock held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
            }
            LockState::Held(existing) => {
                return Err(DeployError::lock_held(group.as_str(), existing.holder_info()));
            }
            LockState::Corrupted { age } if force || age >= CORRUPTED_LOCK_GRACE => {
                tracing::warn!("Lock info corrupted, breaking lock");
            }
            // Possibly still being written by its holder
            LockState::Corrupted { .. } => {
                return Err(DeployError::Conflict {
                    group: group.to_string(),
                    holder: None,
                });
            }
            // Released between our attempt and the read
            LockState::Free => {}
        }

        tracing::debug!(group = %group, "removing stale/forced lock");
        store.remove(group)?;
        if !store.try_create(group, &info)? {
            return Err(DeployError::lock_error(
                "lock acquired by another process during break",
            ));
        }
        Ok(Self::held(store, group))
    }

    fn held(store: Arc<dyn LockStore>, group: &GroupName) -> Self {
        Self {
            store,
            group: group.clone(),
            released: false,
        }
    }

    pub fn group(&self) -> &GroupName {
        &self.group
    }

    /// Release the lock.
    pub fn release(mut self) -> Result<(), DeployError> {
        self.released = true;
        self.store.remove(&self.group)
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.store.remove(&self.group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    const HOUR: Duration = Duration::from_secs(3600);

    fn group() -> GroupName {
        GroupName::new("book-service").unwrap()
    }

    #[test]
    fn lock_info_creates_with_current_host_and_pid() {
        let info = LockInfo::new(&group(), None);

        assert_eq!(info.group, "book-service");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
        assert!(!info.is_stale(HOUR));
    }

    #[test]
    fn old_lock_is_stale() {
        let mut info = LockInfo::new(&group(), None);
        info.started_at = Utc::now() - chrono::Duration::hours(2);
        assert!(info.is_stale(HOUR));
        assert!(!info.is_stale(3 * HOUR));
    }

    #[test]
    fn second_acquire_conflicts() {
        let store: Arc<dyn LockStore> = Arc::new(MemoryLockStore::new());
        let id = DeploymentId::new("d-first");
        let _held = DeployLock::acquire(store.clone(), &group(), Some(&id), false, HOUR).unwrap();

        let err = DeployLock::acquire(store.clone(), &group(), None, false, HOUR).unwrap_err();
        let holder = err.lock_holder_info().expect("conflict names the holder");
        assert_eq!(holder.deployment.as_deref(), Some("d-first"));
    }

    #[test]
    fn release_and_drop_free_the_lock() {
        let store: Arc<dyn LockStore> = Arc::new(MemoryLockStore::new());
        let lock = DeployLock::acquire(store.clone(), &group(), None, false, HOUR).unwrap();
        lock.release().unwrap();
        assert_eq!(store.read(&group()).unwrap(), LockState::Free);

        {
            let _lock = DeployLock::acquire(store.clone(), &group(), None, false, HOUR).unwrap();
        }
        assert_eq!(store.read(&group()).unwrap(), LockState::Free);
    }

    #[test]
    fn stale_lock_is_broken() {
        let memory = Arc::new(MemoryLockStore::new());
        let mut stale = LockInfo::new(&group(), None);
        stale.started_at = Utc::now() - chrono::Duration::hours(3);
        memory.insert(&group(), stale);

        let store: Arc<dyn LockStore> = memory;
        assert!(DeployLock::acquire(store, &group(), None, false, HOUR).is_ok());
    }

    #[test]
    fn force_breaks_a_fresh_lock() {
        let memory = Arc::new(MemoryLockStore::new());
        memory.insert(&group(), LockInfo::new(&group(), None));

        let store: Arc<dyn LockStore> = memory;
        assert!(DeployLock::acquire(store.clone(), &group(), None, false, HOUR).is_err());
        assert!(DeployLock::acquire(store, &group(), None, true, HOUR).is_ok());
    }

    #[test]
    fn file_store_round_trips_and_breaks_corrupted_locks() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileLockStore::new(dir.path().join("locks"));
        let store: Arc<dyn LockStore> = Arc::new(files.clone());

        let lock = DeployLock::acquire(store.clone(), &group(), None, false, HOUR).unwrap();
        assert!(matches!(store.read(&group()).unwrap(), LockState::Held(_)));
        assert!(DeployLock::acquire(store.clone(), &group(), None, false, HOUR).is_err());
        lock.release().unwrap();
        assert!(!files.lock_path(&group()).exists());

        std::fs::write(files.lock_path(&group()), "not json").unwrap();
        backdate(&files.lock_path(&group()), Duration::from_secs(120));
        assert!(matches!(
            store.read(&group()).unwrap(),
            LockState::Corrupted { .. }
        ));
        assert!(DeployLock::acquire(store, &group(), None, false, HOUR).is_ok());
    }

    fn backdate(path: &std::path::Path, by: Duration) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - by)
            .unwrap();
    }

    #[test]
    fn lock_younger_than_the_cutoff_is_kept() {
        let memory = Arc::new(MemoryLockStore::new());
        let mut running = LockInfo::new(&group(), Some(&DeploymentId::new("d-long")));
        running.started_at = Utc::now() - chrono::Duration::seconds(3700);
        memory.insert(&group(), running);

        let store: Arc<dyn LockStore> = memory;
        let err = DeployLock::acquire(store.clone(), &group(), None, false, 3 * HOUR).unwrap_err();
        assert_eq!(
            err.lock_holder_info().and_then(|h| h.deployment.clone()).as_deref(),
            Some("d-long")
        );
        assert!(DeployLock::acquire(store, &group(), None, false, HOUR).is_ok());
    }

    #[test]
    fn freshly_created_empty_lock_file_counts_as_held() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileLockStore::new(dir.path());
        let store: Arc<dyn LockStore> = Arc::new(files.clone());
        std::fs::write(files.lock_path(&group()), "").unwrap();

        let err = DeployLock::acquire(store.clone(), &group(), None, false, HOUR).unwrap_err();
        assert!(matches!(err, DeployError::Conflict { holder: None, .. }));
        assert!(files.lock_path(&group()).exists());

        backdate(&files.lock_path(&group()), CORRUPTED_LOCK_GRACE * 4);
        let lock = DeployLock::acquire(store.clone(), &group(), None, false, HOUR).unwrap();
        assert!(matches!(store.read(&group()).unwrap(), LockState::Held(_)));
        lock.release().unwrap();
    }

    #[test]
    fn published_lock_is_complete_and_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileLockStore::new(dir.path());
        let info = LockInfo::new(&group(), Some(&DeploymentId::new("d-1")));

        assert!(files.try_create(&group(), &info).unwrap());
        assert!(!files.try_create(&group(), &info).unwrap());
        assert_eq!(files.read(&group()).unwrap(), LockState::Held(info));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("book-service.lock")]);
    }
}
