//! Business rules for file collections.
//!
//! `CollectionService` owns validation, size-budget enforcement, advisory
//! duplicate detection, the template catalog and archive import/export. The
//! repository and storage helper it drives have no rules of their own.
//!
//! Every public operation returns a [`CollectionResult`]; bulk operations
//! return a report that carries per-item failures instead of aborting.

use parking_lot::Mutex;
use shared::collection::{
    bytes_to_mb, validate_chunk_overlap, validate_chunk_size, validate_max_size_mb,
    validate_name, BYTES_PER_MB,
};
use shared::manifest::{ExportManifest, ManifestFile};
use shared::template::{builtin_templates, find_template, CollectionTemplate};
use shared::{
    CollectionError, CollectionResult, CollectionUpdate, FileCollection, FileCollectionItem,
    NewCollection,
};
use std::collections::HashMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::{assign_relative_paths, sanitize_entry_name, ArchiveReader, ArchiveWriter};
use crate::repository::CollectionRepository;
use crate::storage::StorageHelper;

/// A file that was added, plus any item elsewhere in the store with the same
/// content. The match is informational; the new item is always independent.
#[derive(Debug, Clone)]
pub struct AddedFile {
    pub item: FileCollectionItem,
    pub duplicate_of: Option<FileCollectionItem>,
}

#[derive(Debug)]
pub struct BulkAddError {
    pub path: PathBuf,
    pub error: CollectionError,
}

impl fmt::Display for BulkAddError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

/// Outcome of a sequential multi-file add. Successes are never rolled back.
#[derive(Debug, Default)]
pub struct BulkAddReport {
    pub added: Vec<AddedFile>,
    pub errors: Vec<BulkAddError>,
}

impl BulkAddReport {
    pub fn success_count(&self) -> usize {
        self.added.len()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Result of re-hashing one stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileIntegrity {
    Valid,
    Missing { path: PathBuf },
    Unreadable { reason: String },
    Modified { expected: String, actual: String },
}

impl FileIntegrity {
    pub fn is_valid(&self) -> bool {
        matches!(self, FileIntegrity::Valid)
    }
}

impl fmt::Display for FileIntegrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileIntegrity::Valid => write!(f, "File is valid"),
            FileIntegrity::Missing { path } => write!(f, "File not found: {}", path.display()),
            FileIntegrity::Unreadable { reason } => write!(f, "File could not be read: {}", reason),
            FileIntegrity::Modified { expected, actual } => write!(
                f,
                "File has been modified (checksum {} does not match {})",
                actual, expected
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct CollectionIntegrity {
    pub checked: usize,
    pub failures: Vec<(FileCollectionItem, FileIntegrity)>,
}

impl CollectionIntegrity {
    pub fn all_valid(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|(item, status)| format!("{}: {}", item.file_name, status))
            .collect()
    }
}

#[derive(Debug)]
pub struct TemplateInstance {
    pub collection: FileCollection,
    pub files: BulkAddReport,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub archive_path: PathBuf,
    pub files_included: usize,
    /// File names whose source was missing at export time
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Name for the imported collection instead of the manifest's
    pub name: Option<String>,
    pub restore_files: bool,
    /// Where restored files are written; required when `restore_files` is set
    pub target_directory: Option<PathBuf>,
}

impl ImportOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn restore_to(mut self, target_directory: impl Into<PathBuf>) -> Self {
        self.restore_files = true;
        self.target_directory = Some(target_directory.into());
        self
    }
}

#[derive(Debug)]
pub struct ImportReport {
    pub collection: FileCollection,
    pub files_restored: usize,
    pub warnings: Vec<String>,
}

/// Items anywhere in the store sharing one checksum.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub checksum: String,
    pub items: Vec<FileCollectionItem>,
}

pub struct CollectionService {
    repository: Arc<dyn CollectionRepository>,
    storage: StorageHelper,
    /// Serializes the read-decide-write budget window per collection
    budget_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl CollectionService {
    pub fn new(repository: Arc<dyn CollectionRepository>) -> Self {
        Self::with_storage(repository, StorageHelper::new())
    }

    pub fn with_storage(repository: Arc<dyn CollectionRepository>, storage: StorageHelper) -> Self {
        Self {
            repository,
            storage,
            budget_locks: Mutex::new(HashMap::new()),
        }
    }

    fn budget_lock(&self, collection_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.budget_locks
            .lock()
            .entry(collection_id)
            .or_default()
            .clone()
    }

    /// Take the collection's budget lock and load it. Ids that are not stored
    /// leave no lock entry behind.
    async fn lock_collection(
        &self,
        id: Uuid,
    ) -> CollectionResult<(OwnedMutexGuard<()>, FileCollection)> {
        self.require_collection(id).await?;
        let guard = self.budget_lock(id).lock_owned().await;
        match self.require_collection(id).await {
            Ok(collection) => Ok((guard, collection)),
            Err(e) => {
                drop(guard);
                self.budget_locks.lock().remove(&id);
                Err(e)
            }
        }
    }

    async fn require_collection(&self, id: Uuid) -> CollectionResult<FileCollection> {
        self.repository
            .get_collection(id)
            .await?
            .ok_or_else(|| CollectionError::CollectionNotFound(id.to_string()))
    }

    // ── Collections ────────────────────────────────────────────────────

    /// Validate and persist a new collection.
    pub async fn create_collection(&self, new: NewCollection) -> CollectionResult<FileCollection> {
        if let Err(e) = new.validate() {
            warn!(name = %new.name, error = %e, "rejected new collection");
            return Err(e);
        }

        let name = new.name.trim().to_string();
        if self.repository.get_collection_by_name(&name).await?.is_some() {
            warn!(name = %name, "collection name already in use");
            return Err(CollectionError::DuplicateName { name });
        }

        let collection = FileCollection::from_new(new);
        self.repository.create_collection(&collection).await?;
        info!(id = %collection.id, name = %collection.name, "created collection");
        Ok(collection)
    }

    pub async fn get_collection(&self, id: Uuid) -> CollectionResult<FileCollection> {
        self.require_collection(id).await
    }

    pub async fn get_collection_by_name(&self, name: &str) -> CollectionResult<FileCollection> {
        self.repository
            .get_collection_by_name(name)
            .await?
            .ok_or_else(|| CollectionError::CollectionNotFound(name.to_string()))
    }

    pub async fn list_collections(
        &self,
        include_templates: bool,
        tags: &[String],
    ) -> CollectionResult<Vec<FileCollection>> {
        self.repository.list_collections(include_templates, tags).await
    }

    pub async fn search_collections(
        &self,
        query: &str,
        tags: &[String],
    ) -> CollectionResult<Vec<FileCollection>> {
        self.repository.search_collections(query, tags).await
    }

    /// Apply a partial update. Only supplied fields are validated, except that
    /// the overlap is always checked against the resulting chunk size.
    pub async fn update_collection(
        &self,
        id: Uuid,
        update: CollectionUpdate,
    ) -> CollectionResult<FileCollection> {
        let (_guard, mut collection) = self.lock_collection(id).await?;

        if let Some(name) = &update.name {
            validate_name(name)?;
            let name = name.trim();
            if let Some(existing) = self.repository.get_collection_by_name(name).await? {
                if existing.id != id {
                    return Err(CollectionError::DuplicateName {
                        name: name.to_string(),
                    });
                }
            }
        }

        if let Some(chunk_size) = update.chunk_size {
            validate_chunk_size(chunk_size)?;
        }
        if update.chunk_size.is_some() || update.chunk_overlap.is_some() {
            validate_chunk_overlap(
                update.chunk_overlap.unwrap_or(collection.chunk_overlap),
                update.chunk_size.unwrap_or(collection.chunk_size),
            )?;
        }

        if let Some(max_size_mb) = update.max_size_mb {
            validate_max_size_mb(max_size_mb)?;
            if collection.total_size > max_size_mb as u64 * BYTES_PER_MB {
                return Err(CollectionError::LimitBelowUsage {
                    current_mb: bytes_to_mb(collection.total_size),
                    max_size_mb,
                });
            }
        }

        update.apply_to(&mut collection);
        if !self.repository.update_collection(&collection).await? {
            return Err(CollectionError::CollectionNotFound(id.to_string()));
        }
        info!(id = %id, name = %collection.name, "updated collection");
        Ok(collection)
    }

    /// Delete a collection with its files and conversation links.
    pub async fn delete_collection(&self, id: Uuid) -> CollectionResult<()> {
        if !self.repository.delete_collection(id).await? {
            return Err(CollectionError::CollectionNotFound(id.to_string()));
        }
        self.budget_locks.lock().remove(&id);
        info!(id = %id, "deleted collection");
        Ok(())
    }

    // ── Files ──────────────────────────────────────────────────────────

    /// Add one file, enforcing the collection's size budget.
    pub async fn add_file_to_collection(
        &self,
        collection_id: Uuid,
        file_path: &Path,
        check_duplicates: bool,
    ) -> CollectionResult<AddedFile> {
        let result = self
            .add_file_locked(collection_id, file_path, check_duplicates)
            .await;
        match &result {
            Ok(added) => info!(
                collection = %collection_id,
                file = %added.item.file_name,
                size = added.item.file_size,
                "added file to collection"
            ),
            Err(e) => warn!(
                collection = %collection_id,
                file = %file_path.display(),
                error = %e,
                "failed to add file to collection"
            ),
        }
        result
    }

    async fn add_file_locked(
        &self,
        collection_id: Uuid,
        file_path: &Path,
        check_duplicates: bool,
    ) -> CollectionResult<AddedFile> {
        let (_guard, collection) = self.lock_collection(collection_id).await?;

        if !self.storage.validate_file_exists(file_path) {
            return Err(CollectionError::FileNotFound(file_path.to_path_buf()));
        }

        let checksum = self.storage.calculate_file_checksum(file_path)?;

        let duplicate_of = if check_duplicates {
            let existing = self.repository.get_file_by_checksum(&checksum).await?;
            if let Some(existing) = &existing {
                info!(
                    file = %file_path.display(),
                    existing_collection = %existing.collection_id,
                    existing_file = %existing.file_name,
                    "identical content already stored; processing can be reused"
                );
            }
            existing
        } else {
            None
        };

        let item = self
            .storage
            .describe_file(collection_id, file_path, checksum)?;

        let new_total = collection.total_size + item.file_size;
        if new_total > collection.max_size_bytes() {
            return Err(CollectionError::SizeLimitExceeded {
                new_total_mb: bytes_to_mb(new_total),
                max_size_mb: collection.max_size_mb,
            });
        }

        self.repository
            .add_file_to_collection(collection_id, &item)
            .await?;

        Ok(AddedFile { item, duplicate_of })
    }

    /// Add files one after another. Failures are collected, not fatal.
    pub async fn add_files_to_collection(
        &self,
        collection_id: Uuid,
        file_paths: &[PathBuf],
        check_duplicates: bool,
    ) -> BulkAddReport {
        let mut report = BulkAddReport::default();
        for path in file_paths {
            match self
                .add_file_to_collection(collection_id, path, check_duplicates)
                .await
            {
                Ok(added) => report.added.push(added),
                Err(error) => report.errors.push(BulkAddError {
                    path: path.clone(),
                    error,
                }),
            }
        }
        debug!(
            collection = %collection_id,
            added = report.success_count(),
            failed = report.errors.len(),
            "bulk add finished"
        );
        report
    }

    pub async fn remove_file_from_collection(
        &self,
        collection_id: Uuid,
        file_id: Uuid,
    ) -> CollectionResult<()> {
        self.require_collection(collection_id).await?;
        if !self
            .repository
            .remove_file_from_collection(collection_id, file_id)
            .await?
        {
            return Err(CollectionError::ItemNotFound(file_id.to_string()));
        }
        info!(collection = %collection_id, file = %file_id, "removed file from collection");
        Ok(())
    }

    pub async fn get_collection_files(
        &self,
        collection_id: Uuid,
    ) -> CollectionResult<Vec<FileCollectionItem>> {
        self.require_collection(collection_id).await?;
        self.repository.get_collection_files(collection_id).await
    }

    // ── Integrity ──────────────────────────────────────────────────────

    fn check_item(&self, item: &FileCollectionItem) -> FileIntegrity {
        if self
            .storage
            .verify_file_integrity(&item.file_path, &item.checksum)
        {
            return FileIntegrity::Valid;
        }
        if !self.storage.validate_file_exists(&item.file_path) {
            return FileIntegrity::Missing {
                path: item.file_path.clone(),
            };
        }
        match self.storage.calculate_file_checksum(&item.file_path) {
            Ok(actual) => FileIntegrity::Modified {
                expected: item.checksum.clone(),
                actual,
            },
            Err(e) => FileIntegrity::Unreadable {
                reason: e.to_string(),
            },
        }
    }

    pub async fn verify_file_integrity(
        &self,
        collection_id: Uuid,
        file_id: Uuid,
    ) -> CollectionResult<FileIntegrity> {
        let item = self
            .get_collection_files(collection_id)
            .await?
            .into_iter()
            .find(|item| item.id == file_id)
            .ok_or_else(|| CollectionError::ItemNotFound(file_id.to_string()))?;
        Ok(self.check_item(&item))
    }

    /// Re-hash every file in the collection. Checking continues past failures.
    pub async fn verify_collection_integrity(
        &self,
        collection_id: Uuid,
    ) -> CollectionResult<CollectionIntegrity> {
        let files = self.get_collection_files(collection_id).await?;
        let mut integrity = CollectionIntegrity::default();
        for item in files {
            integrity.checked += 1;
            let status = self.check_item(&item);
            if !status.is_valid() {
                warn!(collection = %collection_id, file = %item.file_name, status = %status, "integrity check failed");
                integrity.failures.push((item, status));
            }
        }
        Ok(integrity)
    }

    // ── Templates ──────────────────────────────────────────────────────

    pub fn get_builtin_templates(&self) -> &'static [CollectionTemplate] {
        builtin_templates()
    }

    /// Create a working collection from a built-in template and add the
    /// given, already-resolved files.
    pub async fn instantiate_template(
        &self,
        template_name: &str,
        collection_name: &str,
        file_paths: &[PathBuf],
    ) -> CollectionResult<TemplateInstance> {
        let template = find_template(template_name)
            .ok_or_else(|| CollectionError::TemplateNotFound(template_name.to_string()))?;

        let collection = self
            .create_collection(template.to_new_collection(collection_name))
            .await?;
        let files = self
            .add_files_to_collection(collection.id, file_paths, true)
            .await;
        let collection = self.require_collection(collection.id).await?;

        info!(template = template.name, collection = %collection.name, "instantiated template");
        Ok(TemplateInstance { collection, files })
    }

    // ── Export / import ────────────────────────────────────────────────

    /// Write the collection to a ZIP archive at `destination`.
    pub async fn export_collection(
        &self,
        collection_id: Uuid,
        destination: &Path,
        include_files: bool,
    ) -> CollectionResult<ExportSummary> {
        let collection = self.require_collection(collection_id).await?;
        let files = self.repository.get_collection_files(collection_id).await?;
        let relative_paths = assign_relative_paths(&files);
        let manifest = ExportManifest::new(&collection, &files, &relative_paths);

        let mut writer = ArchiveWriter::create(destination)?;
        writer.write_manifest(&manifest)?;

        let mut files_included = 0;
        let mut skipped = Vec::new();
        if include_files {
            for (item, relative_path) in files.iter().zip(&relative_paths) {
                if !self.storage.validate_file_exists(&item.file_path) {
                    warn!(file = %item.file_path.display(), "source file missing, not exported");
                    skipped.push(item.file_name.clone());
                    continue;
                }
                writer.add_file(relative_path, &item.file_path)?;
                files_included += 1;
            }
        }

        let archive_path = writer.finish()?;
        info!(
            collection = %collection.name,
            archive = %archive_path.display(),
            files_included,
            skipped = skipped.len(),
            "exported collection"
        );
        Ok(ExportSummary {
            archive_path,
            files_included,
            skipped,
        })
    }

    /// Recreate a collection from an exported archive.
    ///
    /// Fails only when the archive is unreadable or the collection cannot be
    /// created; per-file problems are returned as warnings.
    pub async fn import_collection(
        &self,
        archive_path: &Path,
        options: ImportOptions,
    ) -> CollectionResult<ImportReport> {
        let mut reader = ArchiveReader::open(archive_path)?;
        let manifest = reader.read_manifest()?;
        let mut warnings = Vec::new();

        if manifest.format_version.is_empty() {
            warnings.push("Manifest has no format version, import attempted anyway".to_string());
        } else if !manifest.is_current_version() {
            warnings.push(format!(
                "Unknown format version {}, import attempted anyway",
                manifest.format_version
            ));
        }

        let requested = options
            .name
            .clone()
            .unwrap_or_else(|| manifest.collection.name.clone());
        let requested = requested.trim();
        let name = self.available_name(requested).await?;
        if name != requested {
            warnings.push(format!(
                "Collection renamed to '{}' because '{}' already exists",
                name, requested
            ));
        }

        let collection = self
            .create_collection(manifest.collection.to_new_collection(name))
            .await?;

        let mut files_restored = 0;
        if options.restore_files {
            match &options.target_directory {
                None => warnings.push(CollectionError::MissingTargetDirectory.to_string()),
                Some(target) => match std::fs::create_dir_all(target) {
                    Err(e) => warnings.push(format!(
                        "Cannot create target directory {}: {}",
                        target.display(),
                        e
                    )),
                    Ok(()) => {
                        for entry in &manifest.files {
                            match self
                                .restore_file(&mut reader, entry, target, collection.id)
                                .await
                            {
                                Ok(destination) => {
                                    files_restored += 1;
                                    let written = destination
                                        .file_name()
                                        .map(|n| n.to_string_lossy().to_string())
                                        .unwrap_or_default();
                                    if sanitize_entry_name(entry.entry_name()).ok().as_deref()
                                        != Some(written.as_str())
                                    {
                                        warnings.push(format!(
                                            "{}: restored as {} because the target already exists",
                                            entry.file_name, written
                                        ));
                                    }
                                }
                                Err(e) => {
                                    warn!(file = %entry.file_name, error = %e, "file not restored");
                                    warnings.push(format!("{}: {}", entry.file_name, e));
                                }
                            }
                        }
                    }
                },
            }
        }

        let collection = self.require_collection(collection.id).await?;
        info!(
            collection = %collection.name,
            files_restored,
            warnings = warnings.len(),
            "imported collection"
        );
        Ok(ImportReport {
            collection,
            files_restored,
            warnings,
        })
    }

    /// Extract one file, verify it against the manifest and add it. Existing
    /// files in `target` are never overwritten. A file failing verification
    /// stays on disk but is not added.
    async fn restore_file(
        &self,
        reader: &mut ArchiveReader,
        entry: &ManifestFile,
        target: &Path,
        collection_id: Uuid,
    ) -> CollectionResult<PathBuf> {
        let entry_name = entry.entry_name();
        let bytes = reader.read_file(entry_name)?.ok_or_else(|| {
            CollectionError::Archive(format!("{} is missing from the archive", entry_name))
        })?;

        let destination = write_new_file(target, &sanitize_entry_name(entry_name)?, &bytes)?;

        if !self
            .storage
            .checksum_bytes(&bytes)
            .eq_ignore_ascii_case(&entry.checksum)
        {
            return Err(CollectionError::ChecksumMismatch {
                file_name: entry.file_name.clone(),
            });
        }

        self.add_file_to_collection(collection_id, &destination, true)
            .await?;
        Ok(destination)
    }

    /// `base`, or the first free `base (n)`.
    async fn available_name(&self, base: &str) -> CollectionResult<String> {
        if self.repository.get_collection_by_name(base).await?.is_none() {
            return Ok(base.to_string());
        }
        let mut counter = 1u32;
        loop {
            let candidate = format!("{} ({})", base, counter);
            if self
                .repository
                .get_collection_by_name(&candidate)
                .await?
                .is_none()
            {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    // ── Conversations ──────────────────────────────────────────────────

    /// Returns false if the collection was already attached.
    pub async fn attach_to_conversation(
        &self,
        conversation_id: &str,
        collection_id: Uuid,
    ) -> CollectionResult<bool> {
        self.require_collection(collection_id).await?;
        self.repository
            .attach_collection_to_conversation(conversation_id, collection_id)
            .await
    }

    pub async fn detach_from_conversation(
        &self,
        conversation_id: &str,
        collection_id: Uuid,
    ) -> CollectionResult<bool> {
        self.repository
            .detach_collection_from_conversation(conversation_id, collection_id)
            .await
    }

    pub async fn get_conversation_collections(
        &self,
        conversation_id: &str,
    ) -> CollectionResult<Vec<FileCollection>> {
        self.repository
            .get_conversation_collections(conversation_id)
            .await
    }

    // ── Duplicates ─────────────────────────────────────────────────────

    /// Content shared by more than one item anywhere in the store.
    pub async fn find_duplicate_files(&self) -> CollectionResult<Vec<DuplicateGroup>> {
        let items = self.repository.find_shared_checksums().await?;
        let mut groups: Vec<DuplicateGroup> = Vec::new();
        for item in items {
            match groups.last_mut() {
                Some(group) if group.checksum == item.checksum => group.items.push(item),
                _ => groups.push(DuplicateGroup {
                    checksum: item.checksum.clone(),
                    items: vec![item],
                }),
            }
        }
        Ok(groups)
    }
}

/// Write `bytes` to `target/file_name`, or to the first free
/// `stem (n).ext` when that name is taken.
fn write_new_file(target: &Path, file_name: &str, bytes: &[u8]) -> CollectionResult<PathBuf> {
    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    let extension = name.extension().map(|e| e.to_string_lossy().to_string());

    let mut counter = 0u32;
    loop {
        let candidate = match (counter, &extension) {
            (0, _) => file_name.to_string(),
            (n, Some(ext)) => format!("{} ({}).{}", stem, n, ext),
            (n, None) => format!("{} ({})", stem, n),
        };
        let destination = target.join(candidate);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&destination)
        {
            Ok(mut file) => {
                file.write_all(bytes)?;
                return Ok(destination);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e.into()),
        }
    }
}
