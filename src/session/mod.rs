pub mod controller;
pub mod snapshot;
pub mod store;

use std::sync::Arc;

use crate::bookmarks::repo::BookmarkRepository;
use crate::bookmarks::BookmarkIndex;
use crate::player::adapter::ExternalPlayerAdapter;
use crate::player::StreamingPlayer;

pub use controller::{Direction, PlaybackSession, PlaybackSessionState};
pub use snapshot::{PersistedSnapshot, SnapshotMetadata};
pub use store::{FileStorage, MemoryStorage, SnapshotStorage, SnapshotStore};

/// The session object constructed once at application start and handed to
/// every consumer. All shared state flows through here; there is no ambient
/// global context.
pub struct Session {
    pub store: Arc<SnapshotStore>,
    pub controller: Arc<PlaybackSession>,
    pub bookmarks: Arc<BookmarkIndex>,
    adapter: ExternalPlayerAdapter,
}

impl Session {
    /// Wire the core: restore the persisted snapshot, seed the controller
    /// with it, and start the adapter and bookmark-index tasks.
    pub fn start(
        storage: Arc<dyn SnapshotStorage>,
        streaming: Arc<dyn StreamingPlayer>,
        bookmark_repo: Arc<dyn BookmarkRepository>,
        owner_id: impl Into<String>,
    ) -> Self {
        let store = Arc::new(SnapshotStore::new(storage));
        let restored = store.load();

        let controller = PlaybackSession::new(store.clone(), owner_id);
        // Subscribe before hydrating so the restored track identity reaches
        // the index.
        let bookmarks =
            BookmarkIndex::spawn(bookmark_repo, controller.subscribe_current_track());

        let adapter = ExternalPlayerAdapter::spawn(controller.clone(), streaming);
        controller.attach_player(adapter.command_sender());

        controller.hydrate(restored);

        Self {
            store,
            controller,
            bookmarks,
            adapter,
        }
    }

    /// Stop background tasks. Pending debounced saves are left to fire; use
    /// [`logout`](Self::logout) to drop persisted state as well.
    pub fn teardown(&self) {
        self.adapter.teardown();
        self.bookmarks.teardown();
    }

    /// Teardown plus removal of the persisted snapshot. Cancels any pending
    /// debounced save so nothing is written back after the clear.
    pub fn logout(&self) {
        self.teardown();
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::models::Bookmark;
    use crate::errors::AppError;
    use crate::models::test_support::track;
    use crate::player::{
        PlayerError, PlayerReadiness, RemotePlayerState, RemoteTrack,
    };
    use crate::session::store::SAVE_DEBOUNCE_MS;
    use async_trait::async_trait;
    use tokio::time::Duration;

    struct NullStreaming;

    #[async_trait]
    impl StreamingPlayer for NullStreaming {
        async fn connect(&self) -> Result<(), PlayerError> {
            Ok(())
        }
        fn readiness(&self) -> PlayerReadiness {
            PlayerReadiness::Ready
        }
        async fn play(&self, _uri: &str, _position_ms: u64) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn pause(&self) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn resume(&self) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn seek(&self, _position_ms: u64) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn set_volume(&self, _volume: f32) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn transfer_to_device(&self) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn get_state(&self) -> Result<Option<RemotePlayerState>, PlayerError> {
            Ok(None)
        }
    }

    struct EmptyRepo;

    #[async_trait]
    impl BookmarkRepository for EmptyRepo {
        async fn list_for_track(
            &self,
            _provider_track_id: &str,
            _owner_id: &str,
        ) -> Result<Vec<Bookmark>, AppError> {
            Ok(Vec::new())
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

    fn session_over(storage: Arc<MemoryStorage>) -> Session {
        Session::start(
            storage,
            Arc::new(NullStreaming),
            Arc::new(EmptyRepo),
            "user-1",
        )
    }

    async fn settle() {
        // The write task must register its sleep before the clock moves.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(SAVE_DEBOUNCE_MS + 50)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn play_then_reload_restores_track_and_position() {
        let storage = Arc::new(MemoryStorage::new());

        let session = session_over(storage.clone());
        let track_x = track("x", true, true);
        let track_y = track("y", true, true);

        session.controller.play_collection(vec![track_x.clone(), track_y], 0);

        let snap = session.controller.snapshot();
        assert_eq!(snap.current_track.as_ref().unwrap().id, "x");
        assert_eq!(snap.queue.len(), 2);
        assert_eq!(snap.queue_position, 0);
        assert!(snap.is_player_visible);

        // Adapter reports the live session fifteen seconds in.
        session.controller.apply_remote_state(RemotePlayerState {
            is_playing: true,
            position_ms: 15_000,
            duration_ms: 180_000,
            track: Some(RemoteTrack {
                provider_id: track_x.provider_id.clone(),
                title: track_x.title.clone(),
                artist: track_x.artist.clone(),
                album: track_x.album.clone(),
                cover_url: None,
                duration_ms: 180_000,
                stream_uri: track_x.stream_uri.clone(),
            }),
        });
        assert_eq!(
            session.controller.live_state().playback_position_seconds,
            15.0
        );

        settle().await;
        session.teardown();

        // Reload: a fresh session over the same storage.
        let reloaded = session_over(storage);
        let restored = reloaded.controller.snapshot();
        assert_eq!(restored.current_track.unwrap().id, "x");
        assert_eq!(restored.playback_position_seconds, 15.0);
        assert_eq!(restored.queue_position, 0);
        reloaded.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn logout_drops_persisted_state() {
        let storage = Arc::new(MemoryStorage::new());

        let session = session_over(storage.clone());
        session.controller.play(track("x", true, true), None);
        session.logout();
        settle().await;

        // The pending save was cancelled; nothing survived.
        assert_eq!(storage.write_count(), 0);
        let fresh = session_over(storage);
        assert!(fresh.controller.snapshot().current_track.is_none());
        fresh.teardown();
    }
}
