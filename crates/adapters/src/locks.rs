//! Cross-process coordination: advisory file locks and a counting semaphore.
//!
//! Both primitives live under `~/.context/locks`. A holder records
//! `{pid, startTimeMs, hostname}`; acquisition is an atomic create-new, and
//! stale files (owner pid dead on this host, or older than the timeout) are
//! reclaimed by the next acquirer.

use semindex_config::DataDir;
use semindex_shared::{ErrorCode, ErrorEnvelope, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use sysinfo::{ProcessesToUpdate, System};

/// Default staleness timeout for locks.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default staleness timeout for semaphore slots.
pub const SEMAPHORE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Owner payload written into lock and slot files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockOwner {
    /// Owning process id.
    pub pid: u32,
    /// Acquisition time, milliseconds since the epoch.
    pub start_time_ms: u64,
    /// Host that recorded the lock.
    pub hostname: Box<str>,
}

impl LockOwner {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            start_time_ms: now_epoch_ms(),
            hostname: System::host_name().unwrap_or_default().into_boxed_str(),
        }
    }
}

/// Tracks lock files held by this process so termination handlers can
/// release them all.
#[derive(Debug, Clone, Default)]
pub struct HeldLocks {
    paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl HeldLocks {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, path: &Path) {
        let mut guard = self.paths.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.push(path.to_path_buf());
    }

    fn untrack(&self, path: &Path) {
        let mut guard = self.paths.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.retain(|held| held != path);
    }

    /// Remove every held lock file. Called from shutdown handlers.
    pub fn release_all(&self) {
        let paths = {
            let mut guard =
                self.paths.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for path in paths {
            let _ = std::fs::remove_file(path);
        }
    }

    /// Number of locks currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// True when no locks are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Advisory lock over a named resource.
#[derive(Debug, Clone)]
pub struct ProcessLock {
    path: PathBuf,
    timeout: Duration,
    held: HeldLocks,
}

impl ProcessLock {
    /// Lock for `name` under the data dir, with the default timeout.
    #[must_use]
    pub fn new(data_dir: &DataDir, name: &str, held: HeldLocks) -> Self {
        Self {
            path: data_dir.lock_file(name),
            timeout: LOCK_TIMEOUT,
            held,
        }
    }

    /// Override the staleness timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The backing lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempt to acquire; returns false when another live holder exists.
    pub fn try_acquire(&self) -> Result<bool> {
        if create_owner_file(&self.path)? {
            self.held.track(&self.path);
            return Ok(true);
        }

        if !is_stale(&self.path, self.timeout) {
            return Ok(false);
        }

        // Reclaim: best-effort unlink then a single fresh attempt. Losing
        // the race to another reclaimer is a clean "not acquired".
        let _ = std::fs::remove_file(&self.path);
        if create_owner_file(&self.path)? {
            self.held.track(&self.path);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Release if and only if this process is the recorded owner.
    pub fn release(&self) -> Result<()> {
        match read_owner(&self.path) {
            Some(owner) if owner.pid == std::process::id() => {
                std::fs::remove_file(&self.path).map_err(ErrorEnvelope::from)?;
                self.held.untrack(&self.path);
                Ok(())
            }
            Some(_) => Err(ErrorEnvelope::expected(
                ErrorCode::permission_denied(),
                "lock is owned by another process",
            )),
            None => {
                self.held.untrack(&self.path);
                Ok(())
            }
        }
    }

    /// Run `work` under the lock, releasing on the way out.
    pub async fn with_lock<T, F, Fut>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if !self.try_acquire()? {
            return Err(ErrorEnvelope::expected(
                ErrorCode::already_indexing(),
                "resource is locked by another process",
            )
            .with_metadata("lockFile", self.path.to_string_lossy().to_string()));
        }
        let result = work().await;
        let released = self.release();
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_error)) => Err(release_error),
            (Err(error), _) => Err(error),
        }
    }
}

/// Counting semaphore over `slot-0 .. slot-{N-1}` files.
#[derive(Debug, Clone)]
pub struct ProcessSemaphore {
    data_dir: DataDir,
    name: Box<str>,
    slots: usize,
    timeout: Duration,
    held: HeldLocks,
}

impl ProcessSemaphore {
    /// Semaphore with `slots` permits and the default timeout.
    #[must_use]
    pub fn new(data_dir: DataDir, name: &str, slots: usize, held: HeldLocks) -> Self {
        Self {
            data_dir,
            name: name.into(),
            slots,
            timeout: SEMAPHORE_TIMEOUT,
            held,
        }
    }

    /// Override the staleness timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Acquire the first free or stale slot; `None` when all are held.
    pub fn try_acquire(&self) -> Result<Option<usize>> {
        for slot in 0..self.slots {
            let path = self.data_dir.semaphore_slot_file(&self.name, slot);
            if create_owner_file(&path)? {
                self.held.track(&path);
                return Ok(Some(slot));
            }
            if is_stale(&path, self.timeout) {
                let _ = std::fs::remove_file(&path);
                if create_owner_file(&path)? {
                    self.held.track(&path);
                    return Ok(Some(slot));
                }
            }
        }
        Ok(None)
    }

    /// Release a slot owned by this process.
    pub fn release(&self, slot: usize) -> Result<()> {
        let path = self.data_dir.semaphore_slot_file(&self.name, slot);
        match read_owner(&path) {
            Some(owner) if owner.pid == std::process::id() => {
                std::fs::remove_file(&path).map_err(ErrorEnvelope::from)?;
                self.held.untrack(&path);
                Ok(())
            }
            Some(_) => Err(ErrorEnvelope::expected(
                ErrorCode::permission_denied(),
                "semaphore slot is owned by another process",
            )),
            None => {
                self.held.untrack(&path);
                Ok(())
            }
        }
    }
}

fn create_owner_file(path: &Path) -> Result<bool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(ErrorEnvelope::from)?;
    }
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let owner = LockOwner::current();
            let payload = serde_json::to_vec(&owner).map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    format!("failed to serialize lock owner: {error}"),
                    semindex_shared::ErrorClass::NonRetriable,
                )
            })?;
            file.write_all(&payload).map_err(ErrorEnvelope::from)?;
            Ok(true)
        }
        Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(error) => Err(ErrorEnvelope::from(error)),
    }
}

fn read_owner(path: &Path) -> Option<LockOwner> {
    let payload = std::fs::read(path).ok()?;
    serde_json::from_slice(&payload).ok()
}

fn is_stale(path: &Path, timeout: Duration) -> bool {
    let Some(owner) = read_owner(path) else {
        // Unreadable or corrupt owner payload: reclaim only past timeout.
        return file_older_than(path, timeout);
    };

    let same_host = System::host_name()
        .map(String::into_boxed_str)
        .is_some_and(|hostname| hostname == owner.hostname);
    if same_host && !pid_alive(owner.pid) {
        return true;
    }

    let age_ms = now_epoch_ms().saturating_sub(owner.start_time_ms);
    u128::from(age_ms) > timeout.as_millis()
}

fn pid_alive(pid: u32) -> bool {
    let pid = sysinfo::Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

fn file_older_than(path: &Path, timeout: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > timeout)
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_data_dir(prefix: &str) -> DataDir {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        DataDir::at(std::env::temp_dir().join(format!("{prefix}-{nanos}")))
    }

    #[test]
    fn lock_is_exclusive_within_a_process() -> Result<()> {
        let data_dir = temp_data_dir("lock-exclusive");
        let held = HeldLocks::new();
        let lock = ProcessLock::new(&data_dir, "/repo", held.clone());

        assert!(lock.try_acquire()?);
        // The live owner (this process) blocks a second acquisition.
        assert!(!lock.try_acquire()?);
        lock.release()?;
        assert!(lock.try_acquire()?);
        lock.release()?;
        assert!(held.is_empty());
        Ok(())
    }

    #[test]
    fn stale_dead_owner_is_reclaimed() -> Result<()> {
        let data_dir = temp_data_dir("lock-stale");
        let lock = ProcessLock::new(&data_dir, "/repo", HeldLocks::new());

        // Forge a lock held by a pid that cannot be alive.
        let path = lock.path().to_path_buf();
        std::fs::create_dir_all(path.parent().ok_or_else(|| {
            ErrorEnvelope::expected(ErrorCode::invalid_input(), "no parent")
        })?)
        .map_err(ErrorEnvelope::from)?;
        let owner = LockOwner {
            pid: u32::MAX - 1,
            start_time_ms: now_epoch_ms(),
            hostname: System::host_name().unwrap_or_default().into_boxed_str(),
        };
        std::fs::write(&path, serde_json::to_vec(&owner).map_err(|_| {
            ErrorEnvelope::expected(ErrorCode::invalid_input(), "serialize")
        })?)
        .map_err(ErrorEnvelope::from)?;

        assert!(lock.try_acquire()?, "dead owner should be reclaimed");
        let recorded = read_owner(lock.path()).ok_or_else(|| {
            ErrorEnvelope::expected(ErrorCode::not_found(), "missing owner")
        })?;
        assert_eq!(recorded.pid, std::process::id());
        lock.release()?;
        Ok(())
    }

    #[test]
    fn fresh_foreign_lock_is_respected() -> Result<()> {
        let data_dir = temp_data_dir("lock-foreign");
        let lock = ProcessLock::new(&data_dir, "/repo", HeldLocks::new());

        let path = lock.path().to_path_buf();
        std::fs::create_dir_all(path.parent().ok_or_else(|| {
            ErrorEnvelope::expected(ErrorCode::invalid_input(), "no parent")
        })?)
        .map_err(ErrorEnvelope::from)?;
        // A live foreign holder on another host: only the timeout applies.
        let owner = LockOwner {
            pid: 1,
            start_time_ms: now_epoch_ms(),
            hostname: "another-host".into(),
        };
        std::fs::write(&path, serde_json::to_vec(&owner).map_err(|_| {
            ErrorEnvelope::expected(ErrorCode::invalid_input(), "serialize")
        })?)
        .map_err(ErrorEnvelope::from)?;

        assert!(!lock.try_acquire()?);
        assert!(lock.release().is_err(), "non-owner must not release");
        Ok(())
    }

    #[test]
    fn semaphore_hands_out_distinct_slots() -> Result<()> {
        let data_dir = temp_data_dir("semaphore");
        let held = HeldLocks::new();
        let semaphore = ProcessSemaphore::new(data_dir, "indexing", 2, held.clone());

        let first = semaphore.try_acquire()?;
        let second = semaphore.try_acquire()?;
        assert_eq!(first, Some(0));
        assert_eq!(second, Some(1));
        assert_eq!(semaphore.try_acquire()?, None);

        semaphore.release(0)?;
        assert_eq!(semaphore.try_acquire()?, Some(0));

        semaphore.release(0)?;
        semaphore.release(1)?;
        assert!(held.is_empty());
        Ok(())
    }

    #[test]
    fn release_all_clears_held_files() -> Result<()> {
        let data_dir = temp_data_dir("release-all");
        let held = HeldLocks::new();
        let lock = ProcessLock::new(&data_dir, "/repo", held.clone());
        assert!(lock.try_acquire()?);
        assert_eq!(held.len(), 1);

        held.release_all();
        assert!(held.is_empty());
        assert!(!lock.path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn with_lock_releases_after_work() -> Result<()> {
        let data_dir = temp_data_dir("with-lock");
        let lock = ProcessLock::new(&data_dir, "/repo", HeldLocks::new());

        let value = lock.with_lock(|| async { Ok(41 + 1) }).await?;
        assert_eq!(value, 42);
        assert!(!lock.path().exists());
        Ok(())
    }
}
