use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use super::models::Bookmark;
use crate::errors::AppError;

/// CRUD over bookmark records keyed by (provider track id, owner id).
#[async_trait]
pub trait BookmarkRepository: Send + Sync {
    /// All bookmarks for a track, sorted ascending by offset.
    async fn list_for_track(
        &self,
        provider_track_id: &str,
        owner_id: &str,
    ) -> Result<Vec<Bookmark>, AppError>;

    async fn create(
        &self,
        provider_track_id: &str,
        owner_id: &str,
        offset_seconds: i64,
        label: &str,
        note: Option<String>,
    ) -> Result<Bookmark, AppError>;

    async fn update(
        &self,
        id: &str,
        label: &str,
        note: Option<String>,
    ) -> Result<(), AppError>;

    async fn delete(&self, id: &str) -> Result<(), AppError>;
}

pub struct SqliteBookmarkRepository {
    pool: Pool<Sqlite>,
}

impl SqliteBookmarkRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl BookmarkRepository for SqliteBookmarkRepository {
    async fn list_for_track(
        &self,
        provider_track_id: &str,
        owner_id: &str,
    ) -> Result<Vec<Bookmark>, AppError> {
        let bookmarks = sqlx::query_as::<_, Bookmark>(
            "SELECT id, provider_track_id, owner_id, offset_seconds, label, note, created_at, updated_at
             FROM bookmarks
             WHERE provider_track_id = ? AND owner_id = ?
             ORDER BY offset_seconds ASC",
        )
        .bind(provider_track_id)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookmarks)
    }

    async fn create(
        &self,
        provider_track_id: &str,
        owner_id: &str,
        offset_seconds: i64,
        label: &str,
        note: Option<String>,
    ) -> Result<Bookmark, AppError> {
        let bookmark = Bookmark {
            id: Uuid::new_v4().to_string(),
            provider_track_id: provider_track_id.to_string(),
            owner_id: owner_id.to_string(),
            offset_seconds,
            label: label.to_string(),
            note,
            created_at: now_secs(),
            updated_at: now_secs(),
        };

        sqlx::query(
            "INSERT INTO bookmarks (id, provider_track_id, owner_id, offset_seconds, label, note, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&bookmark.id)
        .bind(&bookmark.provider_track_id)
        .bind(&bookmark.owner_id)
        .bind(bookmark.offset_seconds)
        .bind(&bookmark.label)
        .bind(&bookmark.note)
        .bind(bookmark.created_at)
        .bind(bookmark.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(bookmark)
    }

    async fn update(
        &self,
        id: &str,
        label: &str,
        note: Option<String>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE bookmarks SET label = ?, note = ?, updated_at = ? WHERE id = ?")
            .bind(label)
            .bind(note)
            .bind(now_secs())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM bookmarks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;

    #[tokio::test]
    async fn create_and_list_sorted_by_offset() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteBookmarkRepository::new(db.pool.clone());

        repo.create("sp-a", "user-1", 90, "Bridge", None)
            .await
            .unwrap();
        repo.create("sp-a", "user-1", 15, "Intro riff", Some("listen for the synth".into()))
            .await
            .unwrap();
        repo.create("sp-b", "user-1", 5, "Other track", None)
            .await
            .unwrap();
        repo.create("sp-a", "user-2", 20, "Other user", None)
            .await
            .unwrap();

        let marks = repo.list_for_track("sp-a", "user-1").await.unwrap();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].offset_seconds, 15);
        assert_eq!(marks[1].offset_seconds, 90);
    }

    #[tokio::test]
    async fn update_and_delete() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteBookmarkRepository::new(db.pool.clone());

        let mark = repo
            .create("sp-a", "user-1", 30, "Chorus", None)
            .await
            .unwrap();

        repo.update(&mark.id, "Second chorus", Some("key change".into()))
            .await
            .unwrap();
        let marks = repo.list_for_track("sp-a", "user-1").await.unwrap();
        assert_eq!(marks[0].label, "Second chorus");
        assert_eq!(marks[0].note.as_deref(), Some("key change"));

        repo.delete(&mark.id).await.unwrap();
        assert!(repo.list_for_track("sp-a", "user-1").await.unwrap().is_empty());
    }
}
