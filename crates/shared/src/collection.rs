//! File collection domain types.
//!
//! A collection is a named, size-bounded set of files sharing one chunking
//! configuration. Collections are attached to conversations so the assistant
//! can draw on their contents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{CollectionError, CollectionResult};

/// Maximum length of a collection name, in characters.
pub const MAX_NAME_LENGTH: usize = 200;

pub const MIN_CHUNK_SIZE: u32 = 100;
pub const MAX_CHUNK_SIZE: u32 = 10_000;

pub const MIN_MAX_SIZE_MB: u32 = 1;
pub const MAX_MAX_SIZE_MB: u32 = 10_000;

pub const DEFAULT_CHUNK_SIZE: u32 = 1000;
pub const DEFAULT_CHUNK_OVERLAP: u32 = 200;
pub const DEFAULT_MAX_SIZE_MB: u32 = 500;

pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// A persisted file collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCollection {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    /// Reusable pattern rather than a populated working set
    pub is_template: bool,
    pub max_size_mb: u32,
    /// Sum of all item sizes in bytes (derived by the store)
    pub total_size: u64,
    /// Number of items (derived by the store)
    pub file_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileCollection {
    /// Build an empty collection from validated creation parameters.
    pub fn from_new(new: NewCollection) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            description: new.description,
            tags: normalize_tags(new.tags),
            chunk_size: new.chunk_size,
            chunk_overlap: new.chunk_overlap,
            is_template: new.is_template,
            max_size_mb: new.max_size_mb,
            total_size: 0,
            file_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Size budget in bytes.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb as u64 * BYTES_PER_MB
    }

    /// Bytes that can still be added before the budget is reached.
    pub fn remaining_bytes(&self) -> u64 {
        self.max_size_bytes().saturating_sub(self.total_size)
    }

    pub fn formatted_size(&self) -> String {
        format!(
            "{} / {} MB",
            format_size(self.total_size),
            self.max_size_mb
        )
    }

    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.is_empty() || tags.iter().any(|t| self.tags.contains(t))
    }
}

/// A file that belongs to a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCollectionItem {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub file_name: String,
    /// Source path at the time the file was added
    pub file_path: PathBuf,
    pub file_size: u64,
    /// Lower-case extension, or "unknown"
    pub file_type: String,
    /// SHA-256 hex digest of the file bytes when added
    pub checksum: String,
    pub added_at: DateTime<Utc>,
}

impl FileCollectionItem {
    pub fn formatted_size(&self) -> String {
        format_size(self.file_size)
    }
}

/// Parameters for creating a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCollection {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub is_template: bool,
    pub max_size_mb: u32,
}

impl NewCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            is_template: false,
            max_size_mb: DEFAULT_MAX_SIZE_MB,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_chunking(mut self, chunk_size: u32, chunk_overlap: u32) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn with_max_size_mb(mut self, max_size_mb: u32) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    pub fn as_template(mut self, is_template: bool) -> Self {
        self.is_template = is_template;
        self
    }

    /// Check every field-level bound. Name uniqueness needs the store and is
    /// checked by the service.
    pub fn validate(&self) -> CollectionResult<()> {
        validate_name(&self.name)?;
        validate_chunk_size(self.chunk_size)?;
        validate_chunk_overlap(self.chunk_overlap, self.chunk_size)?;
        validate_max_size_mb(self.max_size_mb)
    }
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub chunk_size: Option<u32>,
    pub chunk_overlap: Option<u32>,
    pub max_size_mb: Option<u32>,
}

impl CollectionUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the supplied fields to `collection`.
    pub fn apply_to(self, collection: &mut FileCollection) {
        if let Some(name) = self.name {
            collection.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            collection.description = description;
        }
        if let Some(tags) = self.tags {
            collection.tags = normalize_tags(tags);
        }
        if let Some(chunk_size) = self.chunk_size {
            collection.chunk_size = chunk_size;
        }
        if let Some(chunk_overlap) = self.chunk_overlap {
            collection.chunk_overlap = chunk_overlap;
        }
        if let Some(max_size_mb) = self.max_size_mb {
            collection.max_size_mb = max_size_mb;
        }
        collection.updated_at = Utc::now();
    }
}

pub fn validate_name(name: &str) -> CollectionResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CollectionError::EmptyName);
    }
    let length = trimmed.chars().count();
    if length > MAX_NAME_LENGTH {
        return Err(CollectionError::NameTooLong {
            length,
            max: MAX_NAME_LENGTH,
        });
    }
    Ok(())
}

pub fn validate_chunk_size(chunk_size: u32) -> CollectionResult<()> {
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(CollectionError::InvalidChunkSize {
            chunk_size,
            min: MIN_CHUNK_SIZE,
            max: MAX_CHUNK_SIZE,
        });
    }
    Ok(())
}

pub fn validate_chunk_overlap(chunk_overlap: u32, chunk_size: u32) -> CollectionResult<()> {
    if chunk_overlap >= chunk_size {
        return Err(CollectionError::InvalidChunkOverlap {
            chunk_overlap,
            chunk_size,
        });
    }
    Ok(())
}

pub fn validate_max_size_mb(max_size_mb: u32) -> CollectionResult<()> {
    if !(MIN_MAX_SIZE_MB..=MAX_MAX_SIZE_MB).contains(&max_size_mb) {
        return Err(CollectionError::InvalidMaxSize {
            max_size_mb,
            min: MIN_MAX_SIZE_MB,
            max: MAX_MAX_SIZE_MB,
        });
    }
    Ok(())
}

/// Trim tags, drop empty ones and remove duplicates keeping first occurrence.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !seen.iter().any(|t: &String| t == tag) {
            seen.push(tag.to_string());
        }
    }
    seen
}

/// Bytes expressed in megabytes, for budget messages.
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB as f64
}

/// Format file size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_collection_defaults() {
        let new = NewCollection::new("Docs");
        assert_eq!(new.chunk_size, 1000);
        assert_eq!(new.chunk_overlap, 200);
        assert_eq!(new.max_size_mb, 500);
        assert!(!new.is_template);
        assert!(new.validate().is_ok());
    }

    #[test]
    fn test_name_validation() {
        assert!(matches!(
            NewCollection::new("   ").validate(),
            Err(CollectionError::EmptyName)
        ));
        let long = "x".repeat(201);
        assert!(matches!(
            NewCollection::new(long).validate(),
            Err(CollectionError::NameTooLong { length: 201, .. })
        ));
        assert!(NewCollection::new("x".repeat(200)).validate().is_ok());
    }

    #[test]
    fn test_chunk_bounds() {
        assert!(NewCollection::new("a").with_chunking(99, 0).validate().is_err());
        assert!(NewCollection::new("a").with_chunking(10_001, 0).validate().is_err());
        assert!(NewCollection::new("a").with_chunking(100, 0).validate().is_ok());
        assert!(NewCollection::new("a").with_chunking(10_000, 9_999).validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_below_chunk_size() {
        assert!(matches!(
            NewCollection::new("a").with_chunking(500, 500).validate(),
            Err(CollectionError::InvalidChunkOverlap { .. })
        ));
        assert!(NewCollection::new("a").with_chunking(500, 600).validate().is_err());
        assert!(NewCollection::new("a").with_chunking(500, 499).validate().is_ok());
    }

    #[test]
    fn test_max_size_bounds() {
        assert!(NewCollection::new("a").with_max_size_mb(0).validate().is_err());
        assert!(NewCollection::new("a").with_max_size_mb(10_001).validate().is_err());
        assert!(NewCollection::new("a").with_max_size_mb(1).validate().is_ok());
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(vec![
            " rust ".into(),
            "".into(),
            "docs".into(),
            "rust".into(),
        ]);
        assert_eq!(tags, vec!["rust".to_string(), "docs".to_string()]);
    }

    #[test]
    fn test_update_applies_only_supplied_fields() {
        let mut collection = FileCollection::from_new(
            NewCollection::new("Original").with_description("keep me"),
        );
        CollectionUpdate {
            name: Some("Renamed".into()),
            chunk_size: Some(2000),
            ..Default::default()
        }
        .apply_to(&mut collection);

        assert_eq!(collection.name, "Renamed");
        assert_eq!(collection.description, "keep me");
        assert_eq!(collection.chunk_size, 2000);
        assert_eq!(collection.chunk_overlap, 200);
    }

    #[test]
    fn test_budget_helpers() {
        let mut collection = FileCollection::from_new(NewCollection::new("a").with_max_size_mb(1));
        collection.total_size = 600 * 1024;
        assert_eq!(collection.max_size_bytes(), 1_048_576);
        assert_eq!(collection.remaining_bytes(), 1_048_576 - 614_400);
        assert_eq!(format!("{:.2}", bytes_to_mb(1_126_400)), "1.07");
    }
}
