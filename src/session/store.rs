use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::errors::AppError;
use crate::session::snapshot::{PersistedSnapshot, SnapshotMetadata};

/// Quiet period after the last `schedule_save` call before the blob is
/// actually written. Position ticks arrive about once per second, so this
/// coalesces bursts without letting state grow stale.
pub const SAVE_DEBOUNCE_MS: u64 = 500;

const STORAGE_KEY: &str = "tagtune_session.json";

/// Durable key/value backend for the snapshot blob. Mirrors the contract of
/// browser local storage: synchronous, single fixed key, string payloads.
pub trait SnapshotStorage: Send + Sync {
    fn read(&self) -> Result<Option<String>, AppError>;
    fn write(&self, blob: &str) -> Result<(), AppError>;
    fn remove(&self) -> Result<(), AppError>;
}

/// File-backed storage under the platform data directory.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new() -> Result<Self, AppError> {
        let dir = dirs::data_dir()
            .ok_or_else(|| AppError::Storage("No data directory available".to_string()))?
            .join("tagtune");

        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }

        Ok(Self {
            path: dir.join(STORAGE_KEY),
        })
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SnapshotStorage for FileStorage {
    fn read(&self) -> Result<Option<String>, AppError> {
        match std::fs::read_to_string(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, blob: &str) -> Result<(), AppError> {
        std::fs::write(&self.path, blob)?;
        Ok(())
    }

    fn remove(&self) -> Result<(), AppError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory storage for tests and headless use.
#[derive(Default)]
pub struct MemoryStorage {
    blob: Mutex<Option<String>>,
    writes: std::sync::atomic::AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed writes, for debounce assertions.
    pub fn write_count(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl SnapshotStorage for MemoryStorage {
    fn read(&self) -> Result<Option<String>, AppError> {
        Ok(self.blob.lock().clone())
    }

    fn write(&self, blob: &str) -> Result<(), AppError> {
        *self.blob.lock() = Some(blob.to_string());
        self.writes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self) -> Result<(), AppError> {
        *self.blob.lock() = None;
        Ok(())
    }
}

/// Owns serialization of the session snapshot to durable storage: age
/// validation on load, default-state fallback, and trailing-debounce write
/// scheduling.
///
/// Storage failures never propagate; the session keeps running with
/// persistence silently disabled for that write.
pub struct SnapshotStore {
    storage: Arc<dyn SnapshotStorage>,
    latest: Arc<Mutex<Option<PersistedSnapshot>>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotStore {
    pub fn new(storage: Arc<dyn SnapshotStorage>) -> Self {
        Self {
            storage,
            latest: Arc::new(Mutex::new(None)),
            pending: Mutex::new(None),
        }
    }

    /// Reads the durable blob. Absent, malformed, or expired snapshots all
    /// fall back to the default snapshot; this never errors.
    pub fn load(&self) -> PersistedSnapshot {
        let blob = match self.storage.read() {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                log::info!("No persisted session found, starting fresh");
                return PersistedSnapshot::default();
            }
            Err(e) => {
                log::warn!("Failed to read persisted session: {}", e);
                return PersistedSnapshot::default();
            }
        };

        let snapshot: PersistedSnapshot = match serde_json::from_str(&blob) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Persisted session is malformed, discarding: {}", e);
                return PersistedSnapshot::default();
            }
        };

        let now = Utc::now().timestamp_millis();
        if !snapshot.is_valid(now) {
            log::info!(
                "Persisted session expired ({}ms old), starting fresh",
                snapshot.age_ms(now)
            );
            return PersistedSnapshot::default();
        }

        snapshot
    }

    /// Coalesces rapid repeated calls into a single write after a quiet
    /// period measured from the last call. The write carries the value from
    /// the most recent call, stamped at scheduling time.
    pub fn schedule_save(&self, mut snapshot: PersistedSnapshot) {
        snapshot.last_updated_epoch_ms = Utc::now().timestamp_millis();
        *self.latest.lock() = Some(snapshot);

        let mut pending = self.pending.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let storage = self.storage.clone();
        let latest = self.latest.clone();
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(SAVE_DEBOUNCE_MS)).await;

            let snapshot = latest.lock().take();
            if let Some(snapshot) = snapshot {
                match serde_json::to_string(&snapshot) {
                    Ok(blob) => {
                        if let Err(e) = storage.write(&blob) {
                            log::warn!("Failed to persist session, skipping write: {}", e);
                        }
                    }
                    Err(e) => {
                        log::warn!("Failed to serialize session, skipping write: {}", e);
                    }
                }
            }
        }));
    }

    /// Removes the durable blob and cancels any pending debounced write, so
    /// a save scheduled just before logout cannot resurrect the session.
    pub fn clear(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
        *self.latest.lock() = None;

        if let Err(e) = self.storage.remove() {
            log::warn!("Failed to clear persisted session: {}", e);
        } else {
            log::info!("Cleared persisted session");
        }
    }

    /// Freshness of whatever is currently stored; `None` when nothing is.
    pub fn metadata(&self) -> Option<SnapshotMetadata> {
        let blob = self.storage.read().ok().flatten()?;
        let snapshot: PersistedSnapshot = serde_json::from_str(&blob).ok()?;
        let now = Utc::now().timestamp_millis();
        Some(SnapshotMetadata {
            age_ms: snapshot.age_ms(now),
            is_valid: snapshot.is_valid(now),
        })
    }
}

impl Drop for SnapshotStore {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::track;

    /// Storage double whose every operation fails, as with a full disk or a
    /// revoked data directory.
    struct FailingStorage;

    impl SnapshotStorage for FailingStorage {
        fn read(&self) -> Result<Option<String>, AppError> {
            Err(AppError::Storage("disk gone".to_string()))
        }

        fn write(&self, _blob: &str) -> Result<(), AppError> {
            Err(AppError::Storage("disk gone".to_string()))
        }

        fn remove(&self) -> Result<(), AppError> {
            Err(AppError::Storage("disk gone".to_string()))
        }
    }

    fn store() -> (Arc<MemoryStorage>, SnapshotStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = SnapshotStore::new(storage.clone());
        (storage, store)
    }

    async fn settle() {
        // Let the spawned write task register its sleep before the clock
        // moves, then run it to completion under paused time.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(SAVE_DEBOUNCE_MS + 50)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn round_trips_a_snapshot() {
        let (_storage, store) = store();

        let mut snap = PersistedSnapshot::default();
        snap.search_query = "boards of canada".to_string();
        snap.queue = vec![track("a", true, true), track("b", true, false)];
        snap.queue_position = 1;
        snap.current_track = Some(track("b", true, false));
        snap.playback_position_seconds = 42.5;
        snap.volume = 0.3;

        store.schedule_save(snap.clone());
        settle().await;

        let restored = store.load();
        assert_eq!(restored.search_query, snap.search_query);
        assert_eq!(restored.queue.len(), 2);
        assert_eq!(restored.queue_position, 1);
        assert_eq!(restored.current_track.unwrap().id, "b");
        assert_eq!(restored.playback_position_seconds, 42.5);
        assert_eq!(restored.volume, 0.3);
        assert_eq!(restored.session_id, snap.session_id);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_snapshot_falls_back_to_default() {
        let (storage, store) = store();

        let mut snap = PersistedSnapshot::default();
        snap.search_query = "stale".to_string();
        snap.last_updated_epoch_ms = Utc::now().timestamp_millis() - (25 * 60 * 60 * 1000);
        storage
            .write(&serde_json::to_string(&snap).unwrap())
            .unwrap();

        let restored = store.load();
        assert_eq!(restored.search_query, "");
        assert_ne!(restored.session_id, snap.session_id);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_blob_falls_back_to_default() {
        let (storage, store) = store();
        storage.write("{not json").unwrap();

        let restored = store.load();
        assert!(restored.queue.is_empty());
        assert_eq!(restored.volume, 0.8);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_coalesces_rapid_saves() {
        let (storage, store) = store();

        for i in 0..10 {
            let mut snap = PersistedSnapshot::default();
            snap.search_query = format!("query {}", i);
            store.schedule_save(snap);
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        settle().await;

        assert_eq!(storage.write_count(), 1);
        assert_eq!(store.load().search_query, "query 9");
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_pending_save() {
        let (storage, store) = store();

        store.schedule_save(PersistedSnapshot::default());
        store.clear();
        settle().await;

        assert_eq!(storage.write_count(), 0);
        assert!(storage.read().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failure_keeps_session_running() {
        use crate::session::controller::PlaybackSession;

        let store = Arc::new(SnapshotStore::new(Arc::new(FailingStorage)));

        // An unreadable blob loads as the default snapshot.
        assert!(store.load().queue.is_empty());
        assert_eq!(store.load().volume, 0.8);

        // Failed writes are logged and swallowed; in-memory state is
        // untouched by them.
        let session = PlaybackSession::new(store.clone(), "user-1");
        session.set_volume(0.5);
        session.play(track("a", true, true), None);
        settle().await;
        let live = session.live_state();
        assert_eq!(live.volume, 0.5);
        assert_eq!(live.current_track.unwrap().id, "a");

        // A failed remove is swallowed too.
        store.clear();
        assert!(store.metadata().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_reflects_stored_age() {
        let (_storage, store) = store();
        assert!(store.metadata().is_none());

        store.schedule_save(PersistedSnapshot::default());
        settle().await;

        let meta = store.metadata().unwrap();
        assert!(meta.is_valid);
        assert!(meta.age_ms < SAVE_DEBOUNCE_MS as i64 + 1000);
    }
}
