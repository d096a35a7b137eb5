//! Persistence for collections, their files and conversation links.
//!
//! The repository performs no business validation; it only stores records and
//! enforces the constraints the schema expresses (unique names, unique
//! checksum per collection, cascading deletes).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use shared::{CollectionError, CollectionResult, FileCollection, FileCollectionItem};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait CollectionRepository: Send + Sync {
    /// Insert a new collection. Fails with `DuplicateName` if the name is taken.
    async fn create_collection(&self, collection: &FileCollection) -> CollectionResult<()>;

    async fn get_collection(&self, id: Uuid) -> CollectionResult<Option<FileCollection>>;

    async fn get_collection_by_name(&self, name: &str) -> CollectionResult<Option<FileCollection>>;

    /// All collections, optionally excluding templates, filtered to those
    /// carrying any of `tags` (no filter when empty).
    async fn list_collections(
        &self,
        include_templates: bool,
        tags: &[String],
    ) -> CollectionResult<Vec<FileCollection>>;

    /// Overwrite the stored metadata. Returns false if the record is gone.
    async fn update_collection(&self, collection: &FileCollection) -> CollectionResult<bool>;

    /// Delete a collection with its files and conversation links.
    async fn delete_collection(&self, id: Uuid) -> CollectionResult<bool>;

    async fn add_file_to_collection(
        &self,
        collection_id: Uuid,
        item: &FileCollectionItem,
    ) -> CollectionResult<()>;

    async fn remove_file_from_collection(
        &self,
        collection_id: Uuid,
        file_id: Uuid,
    ) -> CollectionResult<bool>;

    async fn get_collection_files(&self, collection_id: Uuid)
        -> CollectionResult<Vec<FileCollectionItem>>;

    /// Any item in any collection with this checksum.
    async fn get_file_by_checksum(&self, checksum: &str)
        -> CollectionResult<Option<FileCollectionItem>>;

    /// Link a collection to a conversation. Returns false if already linked.
    async fn attach_collection_to_conversation(
        &self,
        conversation_id: &str,
        collection_id: Uuid,
    ) -> CollectionResult<bool>;

    async fn detach_collection_from_conversation(
        &self,
        conversation_id: &str,
        collection_id: Uuid,
    ) -> CollectionResult<bool>;

    async fn get_conversation_collections(
        &self,
        conversation_id: &str,
    ) -> CollectionResult<Vec<FileCollection>>;

    /// Case-insensitive substring match on name or description.
    async fn search_collections(
        &self,
        query: &str,
        tags: &[String],
    ) -> CollectionResult<Vec<FileCollection>>;

    /// Items whose checksum occurs more than once, ordered by checksum.
    async fn find_shared_checksums(&self) -> CollectionResult<Vec<FileCollectionItem>>;
}

const COLLECTION_SELECT: &str = "SELECT c.id, c.name, c.description, c.tags, c.chunk_size,
        c.chunk_overlap, c.is_template, c.max_size_mb, c.created_at, c.updated_at,
        COALESCE(SUM(f.file_size), 0), COUNT(f.id)
     FROM collections c
     LEFT JOIN collection_files f ON f.collection_id = c.id";

const ITEM_COLUMNS: &str =
    "id, collection_id, file_name, file_path, file_size, file_type, checksum, added_at";

/// SQLite-backed repository.
pub struct SqliteCollectionRepository {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl SqliteCollectionRepository {
    /// Open (or create) `collections.db` inside `data_dir`.
    pub fn open(data_dir: &Path) -> CollectionResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("collections.db");
        let conn = Connection::open(&db_path).map_err(db_error)?;
        Self::init_schema(&conn)?;
        debug!(path = %db_path.display(), "opened collection database");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(db_path),
        })
    }

    pub fn in_memory() -> CollectionResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn init_schema(conn: &Connection) -> CollectionResult<()> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_error)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS collections (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                tags TEXT NOT NULL DEFAULT '[]',
                chunk_size INTEGER NOT NULL,
                chunk_overlap INTEGER NOT NULL,
                is_template INTEGER NOT NULL DEFAULT 0,
                max_size_mb INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(db_error)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS collection_files (
                id TEXT PRIMARY KEY,
                collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
                file_name TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                file_type TEXT NOT NULL,
                checksum TEXT NOT NULL,
                added_at TEXT NOT NULL,
                UNIQUE(collection_id, checksum)
            )",
            [],
        )
        .map_err(db_error)?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_collection_files_checksum ON collection_files(checksum)",
            [],
        )
        .map_err(db_error)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversation_collections (
                conversation_id TEXT NOT NULL,
                collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
                attached_at TEXT NOT NULL,
                PRIMARY KEY (conversation_id, collection_id)
            )",
            [],
        )
        .map_err(db_error)?;

        Ok(())
    }

    fn query_collections(
        conn: &Connection,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> CollectionResult<Vec<FileCollection>> {
        let sql = format!("{} {} GROUP BY c.id ORDER BY c.name", COLLECTION_SELECT, filter);
        let mut stmt = conn.prepare(&sql).map_err(db_error)?;
        let rows = stmt
            .query_map(params, row_to_collection)
            .map_err(db_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_error)
    }

    fn query_single_collection(
        conn: &Connection,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> CollectionResult<Option<FileCollection>> {
        let sql = format!("{} {} GROUP BY c.id", COLLECTION_SELECT, filter);
        conn.query_row(&sql, params, row_to_collection)
            .optional()
            .map_err(db_error)
    }
}

#[async_trait]
impl CollectionRepository for SqliteCollectionRepository {
    async fn create_collection(&self, collection: &FileCollection) -> CollectionResult<()> {
        let conn = self.conn.lock();
        let tags = encode_tags(&collection.tags)?;
        conn.execute(
            "INSERT INTO collections (id, name, description, tags, chunk_size, chunk_overlap,
                is_template, max_size_mb, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                collection.id.to_string(),
                collection.name,
                collection.description,
                tags,
                collection.chunk_size,
                collection.chunk_overlap,
                collection.is_template,
                collection.max_size_mb,
                collection.created_at.to_rfc3339(),
                collection.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| match constraint_kind(&e) {
            Some(Constraint::Unique) => CollectionError::DuplicateName {
                name: collection.name.clone(),
            },
            _ => db_error(e),
        })?;
        Ok(())
    }

    async fn get_collection(&self, id: Uuid) -> CollectionResult<Option<FileCollection>> {
        let conn = self.conn.lock();
        Self::query_single_collection(&conn, "WHERE c.id = ?1", params![id.to_string()])
    }

    async fn get_collection_by_name(&self, name: &str) -> CollectionResult<Option<FileCollection>> {
        let conn = self.conn.lock();
        Self::query_single_collection(&conn, "WHERE c.name = ?1", params![name])
    }

    async fn list_collections(
        &self,
        include_templates: bool,
        tags: &[String],
    ) -> CollectionResult<Vec<FileCollection>> {
        let conn = self.conn.lock();
        let collections = Self::query_collections(
            &conn,
            "WHERE (?1 OR c.is_template = 0)",
            params![include_templates],
        )?;
        Ok(collections
            .into_iter()
            .filter(|c| c.has_any_tag(tags))
            .collect())
    }

    async fn update_collection(&self, collection: &FileCollection) -> CollectionResult<bool> {
        let conn = self.conn.lock();
        let tags = encode_tags(&collection.tags)?;
        let updated = conn
            .execute(
                "UPDATE collections SET name = ?2, description = ?3, tags = ?4,
                    chunk_size = ?5, chunk_overlap = ?6, is_template = ?7,
                    max_size_mb = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    collection.id.to_string(),
                    collection.name,
                    collection.description,
                    tags,
                    collection.chunk_size,
                    collection.chunk_overlap,
                    collection.is_template,
                    collection.max_size_mb,
                    collection.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| match constraint_kind(&e) {
                Some(Constraint::Unique) => CollectionError::DuplicateName {
                    name: collection.name.clone(),
                },
                _ => db_error(e),
            })?;
        Ok(updated > 0)
    }

    async fn delete_collection(&self, id: Uuid) -> CollectionResult<bool> {
        let mut conn = self.conn.lock();
        let id = id.to_string();
        let tx = conn.transaction().map_err(db_error)?;
        tx.execute(
            "DELETE FROM conversation_collections WHERE collection_id = ?1",
            params![id],
        )
        .map_err(db_error)?;
        let files = tx
            .execute("DELETE FROM collection_files WHERE collection_id = ?1", params![id])
            .map_err(db_error)?;
        let deleted = tx
            .execute("DELETE FROM collections WHERE id = ?1", params![id])
            .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        debug!(collection = %id, files, "deleted collection rows");
        Ok(deleted > 0)
    }

    async fn add_file_to_collection(
        &self,
        collection_id: Uuid,
        item: &FileCollectionItem,
    ) -> CollectionResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO collection_files ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                ITEM_COLUMNS
            ),
            params![
                item.id.to_string(),
                collection_id.to_string(),
                item.file_name,
                item.file_path.to_string_lossy().to_string(),
                item.file_size as i64,
                item.file_type,
                item.checksum,
                item.added_at.to_rfc3339(),
            ],
        )
        .map_err(|e| match constraint_kind(&e) {
            Some(Constraint::Unique) => CollectionError::DuplicateInCollection {
                file_name: item.file_name.clone(),
            },
            Some(Constraint::ForeignKey) => {
                CollectionError::CollectionNotFound(collection_id.to_string())
            }
            None => db_error(e),
        })?;
        Ok(())
    }

    async fn remove_file_from_collection(
        &self,
        collection_id: Uuid,
        file_id: Uuid,
    ) -> CollectionResult<bool> {
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM collection_files WHERE collection_id = ?1 AND id = ?2",
                params![collection_id.to_string(), file_id.to_string()],
            )
            .map_err(db_error)?;
        Ok(removed > 0)
    }

    async fn get_collection_files(
        &self,
        collection_id: Uuid,
    ) -> CollectionResult<Vec<FileCollectionItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM collection_files WHERE collection_id = ?1
                 ORDER BY added_at, file_name",
                ITEM_COLUMNS
            ))
            .map_err(db_error)?;
        let rows = stmt
            .query_map(params![collection_id.to_string()], row_to_item)
            .map_err(db_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_error)
    }

    async fn get_file_by_checksum(
        &self,
        checksum: &str,
    ) -> CollectionResult<Option<FileCollectionItem>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM collection_files WHERE checksum = ?1 ORDER BY added_at LIMIT 1",
                ITEM_COLUMNS
            ),
            params![checksum],
            row_to_item,
        )
        .optional()
        .map_err(db_error)
    }

    async fn attach_collection_to_conversation(
        &self,
        conversation_id: &str,
        collection_id: Uuid,
    ) -> CollectionResult<bool> {
        let conn = self.conn.lock();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO conversation_collections
                    (conversation_id, collection_id, attached_at)
                 VALUES (?1, ?2, ?3)",
                params![conversation_id, collection_id.to_string(), Utc::now().to_rfc3339()],
            )
            .map_err(|e| match constraint_kind(&e) {
                Some(Constraint::ForeignKey) => {
                    CollectionError::CollectionNotFound(collection_id.to_string())
                }
                _ => db_error(e),
            })?;
        Ok(inserted > 0)
    }

    async fn detach_collection_from_conversation(
        &self,
        conversation_id: &str,
        collection_id: Uuid,
    ) -> CollectionResult<bool> {
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM conversation_collections
                 WHERE conversation_id = ?1 AND collection_id = ?2",
                params![conversation_id, collection_id.to_string()],
            )
            .map_err(db_error)?;
        Ok(removed > 0)
    }

    async fn get_conversation_collections(
        &self,
        conversation_id: &str,
    ) -> CollectionResult<Vec<FileCollection>> {
        let conn = self.conn.lock();
        Self::query_collections(
            &conn,
            "WHERE c.id IN (SELECT collection_id FROM conversation_collections
                            WHERE conversation_id = ?1)",
            params![conversation_id],
        )
    }

    async fn search_collections(
        &self,
        query: &str,
        tags: &[String],
    ) -> CollectionResult<Vec<FileCollection>> {
        let conn = self.conn.lock();
        let pattern = format!("%{}%", escape_like(&query.trim().to_lowercase()));
        let collections = Self::query_collections(
            &conn,
            "WHERE lower(c.name) LIKE ?1 ESCAPE '\\' OR lower(c.description) LIKE ?1 ESCAPE '\\'",
            params![pattern],
        )?;
        Ok(collections
            .into_iter()
            .filter(|c| c.has_any_tag(tags))
            .collect())
    }

    async fn find_shared_checksums(&self) -> CollectionResult<Vec<FileCollectionItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM collection_files
                 WHERE checksum IN (
                    SELECT checksum FROM collection_files GROUP BY checksum HAVING COUNT(*) > 1
                 )
                 ORDER BY checksum, added_at",
                ITEM_COLUMNS
            ))
            .map_err(db_error)?;
        let rows = stmt.query_map([], row_to_item).map_err(db_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_error)
    }
}

enum Constraint {
    Unique,
    ForeignKey,
}

fn constraint_kind(err: &rusqlite::Error) -> Option<Constraint> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => match e.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                Some(Constraint::Unique)
            }
            rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(Constraint::ForeignKey),
            _ => None,
        },
        _ => None,
    }
}

fn db_error(err: rusqlite::Error) -> CollectionError {
    CollectionError::Database(err.to_string())
}

fn encode_tags(tags: &[String]) -> CollectionResult<String> {
    serde_json::to_string(tags).map_err(|e| CollectionError::Database(e.to_string()))
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let value: String = row.get(idx)?;
    Uuid::parse_str(&value).map_err(|e| conversion_error(idx, e))
}

fn get_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_collection(row: &Row) -> rusqlite::Result<FileCollection> {
    let tags_json: String = row.get(3)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| conversion_error(3, e))?;
    let total_size: i64 = row.get(10)?;
    let file_count: i64 = row.get(11)?;

    Ok(FileCollection {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        tags,
        chunk_size: row.get(4)?,
        chunk_overlap: row.get(5)?,
        is_template: row.get(6)?,
        max_size_mb: row.get(7)?,
        created_at: get_timestamp(row, 8)?,
        updated_at: get_timestamp(row, 9)?,
        total_size: total_size.max(0) as u64,
        file_count: file_count.max(0) as u64,
    })
}

fn row_to_item(row: &Row) -> rusqlite::Result<FileCollectionItem> {
    let file_path: String = row.get(3)?;
    let file_size: i64 = row.get(4)?;

    Ok(FileCollectionItem {
        id: get_uuid(row, 0)?,
        collection_id: get_uuid(row, 1)?,
        file_name: row.get(2)?,
        file_path: PathBuf::from(file_path),
        file_size: file_size.max(0) as u64,
        file_type: row.get(5)?,
        checksum: row.get(6)?,
        added_at: get_timestamp(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::NewCollection;
    use tempfile::TempDir;

    fn item(collection_id: Uuid, name: &str, checksum: &str, size: u64) -> FileCollectionItem {
        FileCollectionItem {
            id: Uuid::new_v4(),
            collection_id,
            file_name: name.to_string(),
            file_path: PathBuf::from(format!("/data/{}", name)),
            file_size: size,
            file_type: "txt".to_string(),
            checksum: checksum.to_string(),
            added_at: Utc::now(),
        }
    }

    async fn stored(repo: &SqliteCollectionRepository, new: NewCollection) -> FileCollection {
        let collection = FileCollection::from_new(new);
        repo.create_collection(&collection).await.unwrap();
        collection
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = SqliteCollectionRepository::in_memory().unwrap();
        let collection = stored(&repo, NewCollection::new("Docs").with_tags(["a", "b"])).await;

        let by_id = repo.get_collection(collection.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "Docs");
        assert_eq!(by_id.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(by_id.total_size, 0);
        assert_eq!(by_id.file_count, 0);

        let by_name = repo.get_collection_by_name("Docs").await.unwrap().unwrap();
        assert_eq!(by_name.id, collection.id);
        assert!(repo.get_collection_by_name("docs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_name_constraint() {
        let repo = SqliteCollectionRepository::in_memory().unwrap();
        stored(&repo, NewCollection::new("Docs")).await;

        let dup = FileCollection::from_new(NewCollection::new("Docs"));
        let result = repo.create_collection(&dup).await;
        assert!(matches!(result, Err(CollectionError::DuplicateName { .. })));
    }

    #[tokio::test]
    async fn test_totals_are_derived_from_files() {
        let repo = SqliteCollectionRepository::in_memory().unwrap();
        let collection = stored(&repo, NewCollection::new("Docs")).await;

        repo.add_file_to_collection(collection.id, &item(collection.id, "a.txt", "aa", 100))
            .await
            .unwrap();
        repo.add_file_to_collection(collection.id, &item(collection.id, "b.txt", "bb", 250))
            .await
            .unwrap();

        let loaded = repo.get_collection(collection.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_size, 350);
        assert_eq!(loaded.file_count, 2);
    }

    #[tokio::test]
    async fn test_checksum_unique_per_collection_only() {
        let repo = SqliteCollectionRepository::in_memory().unwrap();
        let first = stored(&repo, NewCollection::new("First")).await;
        let second = stored(&repo, NewCollection::new("Second")).await;

        repo.add_file_to_collection(first.id, &item(first.id, "a.txt", "same", 10))
            .await
            .unwrap();
        let dup = repo
            .add_file_to_collection(first.id, &item(first.id, "copy.txt", "same", 10))
            .await;
        assert!(matches!(dup, Err(CollectionError::DuplicateInCollection { .. })));

        repo.add_file_to_collection(second.id, &item(second.id, "a.txt", "same", 10))
            .await
            .unwrap();

        let shared = repo.find_shared_checksums().await.unwrap();
        assert_eq!(shared.len(), 2);
        assert!(repo.get_file_by_checksum("same").await.unwrap().is_some());
        assert!(repo.get_file_by_checksum("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_file_to_missing_collection() {
        let repo = SqliteCollectionRepository::in_memory().unwrap();
        let missing = Uuid::new_v4();
        let result = repo
            .add_file_to_collection(missing, &item(missing, "a.txt", "aa", 1))
            .await;
        assert!(matches!(result, Err(CollectionError::CollectionNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let repo = SqliteCollectionRepository::in_memory().unwrap();
        let collection = stored(&repo, NewCollection::new("Docs")).await;
        repo.add_file_to_collection(collection.id, &item(collection.id, "a.txt", "aa", 1))
            .await
            .unwrap();
        repo.attach_collection_to_conversation("conv-1", collection.id)
            .await
            .unwrap();

        assert!(repo.delete_collection(collection.id).await.unwrap());
        assert!(repo.get_collection(collection.id).await.unwrap().is_none());
        assert!(repo.get_collection_files(collection.id).await.unwrap().is_empty());
        assert!(repo
            .get_conversation_collections("conv-1")
            .await
            .unwrap()
            .is_empty());
        assert!(!repo.delete_collection(collection.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_conversation_links() {
        let repo = SqliteCollectionRepository::in_memory().unwrap();
        let a = stored(&repo, NewCollection::new("A")).await;
        let b = stored(&repo, NewCollection::new("B")).await;

        assert!(repo.attach_collection_to_conversation("conv", a.id).await.unwrap());
        assert!(!repo.attach_collection_to_conversation("conv", a.id).await.unwrap());
        assert!(repo.attach_collection_to_conversation("conv", b.id).await.unwrap());
        assert!(repo.attach_collection_to_conversation("other", a.id).await.unwrap());

        let linked = repo.get_conversation_collections("conv").await.unwrap();
        assert_eq!(linked.len(), 2);

        assert!(repo.detach_collection_from_conversation("conv", a.id).await.unwrap());
        let linked = repo.get_conversation_collections("conv").await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].name, "B");
    }

    #[tokio::test]
    async fn test_list_and_search_filters() {
        let repo = SqliteCollectionRepository::in_memory().unwrap();
        stored(&repo, NewCollection::new("Rust notes").with_tags(["rust"])).await;
        stored(
            &repo,
            NewCollection::new("Papers")
                .with_description("ML research 100%")
                .with_tags(["research"]),
        )
        .await;
        stored(&repo, NewCollection::new("Starter").as_template(true)).await;

        assert_eq!(repo.list_collections(true, &[]).await.unwrap().len(), 3);
        assert_eq!(repo.list_collections(false, &[]).await.unwrap().len(), 2);

        let tagged = repo
            .list_collections(true, &["research".to_string()])
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].name, "Papers");

        let found = repo.search_collections("RESEARCH", &[]).await.unwrap();
        assert_eq!(found.len(), 1);
        let found = repo.search_collections("notes", &["research".to_string()]).await.unwrap();
        assert!(found.is_empty());
        let found = repo.search_collections("100%", &[]).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_open_persists_to_disk() {
        let temp_dir = TempDir::new().unwrap();
        {
            let repo = SqliteCollectionRepository::open(temp_dir.path()).unwrap();
            stored(&repo, NewCollection::new("Persistent")).await;
            assert!(repo.db_path().unwrap().exists());
        }
        let repo = SqliteCollectionRepository::open(temp_dir.path()).unwrap();
        assert!(repo.get_collection_by_name("Persistent").await.unwrap().is_some());
    }
}
