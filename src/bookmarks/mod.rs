pub mod models;
pub mod repo;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use models::{Bookmark, TrackKey};
use repo::BookmarkRepository;

/// Reactive per-track lookup of bookmark markers for the currently playing
/// track.
///
/// The list is refreshed wholesale when the controller publishes a new track
/// identity and when any component that mutates bookmarks raises the typed
/// change signal. It is a UI-convenience index, not a source of truth, so a
/// stale read between those two events is acceptable.
pub struct BookmarkIndex {
    repo: Arc<dyn BookmarkRepository>,
    markers: RwLock<Vec<Bookmark>>,
    changed: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BookmarkIndex {
    /// Build the index and start the background task that follows the
    /// controller's current-track channel.
    pub fn spawn(
        repo: Arc<dyn BookmarkRepository>,
        mut track_rx: watch::Receiver<Option<TrackKey>>,
    ) -> Arc<Self> {
        let index = Arc::new(Self {
            repo,
            markers: RwLock::new(Vec::new()),
            changed: Notify::new(),
            task: Mutex::new(None),
        });

        let worker = index.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = track_rx.changed() => {
                        if changed.is_err() {
                            // Controller gone, nothing left to follow.
                            break;
                        }
                        let key = track_rx.borrow_and_update().clone();
                        worker.apply(key).await;
                    }
                    _ = worker.changed.notified() => {
                        let key = track_rx.borrow().clone();
                        worker.apply(key).await;
                    }
                }
            }
        });
        *index.task.lock() = Some(handle);

        index
    }

    async fn apply(&self, key: Option<TrackKey>) {
        match key {
            Some(key) => {
                self.refresh_for_track(&key.provider_track_id, &key.owner_id)
                    .await
            }
            None => self.markers.write().clear(),
        }
    }

    /// Fetch all bookmarks for the track and replace the in-memory list
    /// wholesale. The result is sorted ascending by offset with duplicate
    /// ids dropped; a fetch failure keeps the previous list.
    pub async fn refresh_for_track(&self, provider_track_id: &str, owner_id: &str) {
        let mut fetched = match self.repo.list_for_track(provider_track_id, owner_id).await {
            Ok(marks) => marks,
            Err(e) => {
                log::warn!(
                    "Failed to refresh bookmarks for {}: {}",
                    provider_track_id,
                    e
                );
                return;
            }
        };

        fetched.sort_by_key(|b| b.offset_seconds);
        let mut seen = HashSet::new();
        fetched.retain(|b| seen.insert(b.id.clone()));

        log::debug!(
            "Bookmark index now holds {} markers for {}",
            fetched.len(),
            provider_track_id
        );
        *self.markers.write() = fetched;
    }

    /// Typed replacement for a global "bookmarks changed" broadcast: any
    /// component that creates/edits/deletes a bookmark for the displayed
    /// track calls this to trigger a refresh.
    pub fn bookmarks_changed(&self) {
        self.changed.notify_one();
    }

    /// Current marker list, sorted ascending by offset.
    pub fn markers(&self) -> Vec<Bookmark> {
        self.markers.read().clone()
    }

    pub fn teardown(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for BookmarkIndex {
    fn drop(&mut self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use async_trait::async_trait;

    /// Repo stub returning a canned, deliberately unsorted list.
    struct FixedRepo {
        marks: Mutex<Vec<Bookmark>>,
    }

    fn mark(id: &str, track: &str, offset: i64) -> Bookmark {
        Bookmark {
            id: id.to_string(),
            provider_track_id: track.to_string(),
            owner_id: "user-1".to_string(),
            offset_seconds: offset,
            label: format!("mark {}", id),
            note: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[async_trait]
    impl BookmarkRepository for FixedRepo {
        async fn list_for_track(
            &self,
            provider_track_id: &str,
            _owner_id: &str,
        ) -> Result<Vec<Bookmark>, AppError> {
            Ok(self
                .marks
                .lock()
                .iter()
                .filter(|b| b.provider_track_id == provider_track_id)
                .cloned()
                .collect())
        }

        async fn create(
            &self,
            _provider_track_id: &str,
            _owner_id: &str,
            _offset_seconds: i64,
            _label: &str,
            _note: Option<String>,
        ) -> Result<Bookmark, AppError> {
            unimplemented!()
        }

        async fn update(&self, _id: &str, _label: &str, _note: Option<String>) -> Result<(), AppError> {
            unimplemented!()
        }

        async fn delete(&self, _id: &str) -> Result<(), AppError> {
            unimplemented!()
        }
    }

    fn key(track: &str) -> TrackKey {
        TrackKey {
            provider_track_id: track.to_string(),
            owner_id: "user-1".to_string(),
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn refresh_sorts_and_dedups() {
        let repo = Arc::new(FixedRepo {
            marks: Mutex::new(vec![
                mark("b", "sp-a", 90),
                mark("a", "sp-a", 10),
                mark("a", "sp-a", 10),
                mark("c", "sp-a", 45),
            ]),
        });
        let (_tx, rx) = watch::channel(None);
        let index = BookmarkIndex::spawn(repo, rx);

        index.refresh_for_track("sp-a", "user-1").await;

        let marks = index.markers();
        assert_eq!(
            marks.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "c", "b"]
        );
        index.teardown();
    }

    #[tokio::test]
    async fn follows_track_changes() {
        let repo = Arc::new(FixedRepo {
            marks: Mutex::new(vec![mark("a", "sp-a", 10), mark("b", "sp-b", 20)]),
        });
        let (tx, rx) = watch::channel(None);
        let index = BookmarkIndex::spawn(repo, rx);

        tx.send(Some(key("sp-a"))).unwrap();
        settle().await;
        assert_eq!(index.markers().len(), 1);
        assert_eq!(index.markers()[0].id, "a");

        tx.send(Some(key("sp-b"))).unwrap();
        settle().await;
        assert_eq!(index.markers()[0].id, "b");

        tx.send(None).unwrap();
        settle().await;
        assert!(index.markers().is_empty());
        index.teardown();
    }

    #[tokio::test]
    async fn change_signal_triggers_refresh() {
        let repo = Arc::new(FixedRepo {
            marks: Mutex::new(vec![mark("a", "sp-a", 10)]),
        });
        let (tx, rx) = watch::channel(Some(key("sp-a")));
        let index = BookmarkIndex::spawn(repo.clone(), rx);
        let _ = &tx;

        index.refresh_for_track("sp-a", "user-1").await;
        assert_eq!(index.markers().len(), 1);

        // Another component adds a marker and raises the signal.
        repo.marks.lock().push(mark("b", "sp-a", 30));
        index.bookmarks_changed();
        settle().await;
        assert_eq!(index.markers().len(), 2);
        index.teardown();
    }
}
