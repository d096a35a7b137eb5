//! Error type for every collection operation.
//!
//! Messages are plain sentences meant to be shown to the user as-is.

use std::path::PathBuf;

pub type CollectionResult<T> = std::result::Result<T, CollectionError>;

#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("Collection name cannot be empty")]
    EmptyName,

    #[error("Collection name is too long ({length} characters, maximum is {max})")]
    NameTooLong { length: usize, max: usize },

    #[error("A collection named '{name}' already exists")]
    DuplicateName { name: String },

    #[error("Chunk size must be between {min} and {max} (got {chunk_size})")]
    InvalidChunkSize { chunk_size: u32, min: u32, max: u32 },

    #[error("Chunk overlap must be smaller than chunk size ({chunk_overlap} >= {chunk_size})")]
    InvalidChunkOverlap { chunk_overlap: u32, chunk_size: u32 },

    #[error("Maximum size must be between {min}MB and {max}MB (got {max_size_mb}MB)")]
    InvalidMaxSize { max_size_mb: u32, min: u32, max: u32 },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("File not found in collection: {0}")]
    ItemNotFound(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Cannot use {}: {reason}", .path.display())]
    InvalidFile { path: PathBuf, reason: String },

    #[error("Failed to calculate checksum for {}: {reason}", .path.display())]
    Checksum { path: PathBuf, reason: String },

    #[error("File would exceed collection size limit ({new_total_mb:.2}MB > {max_size_mb}MB)")]
    SizeLimitExceeded { new_total_mb: f64, max_size_mb: u32 },

    #[error("Cannot lower the size limit to {max_size_mb}MB: collection already holds {current_mb:.2}MB")]
    LimitBelowUsage { current_mb: f64, max_size_mb: u32 },

    #[error("Failed to add {file_name}: file may already exist in this collection")]
    DuplicateInCollection { file_name: String },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Archive not found: {}", .0.display())]
    ArchiveNotFound(PathBuf),

    #[error("Invalid archive: collection.json not found")]
    MissingManifest,

    #[error("Invalid collection manifest: {0}")]
    InvalidManifest(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("A target directory is required to restore files")]
    MissingTargetDirectory,

    #[error("Checksum mismatch for {file_name}: archive copy does not match the manifest")]
    ChecksumMismatch { file_name: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Collection worker unavailable: {0}")]
    WorkerUnavailable(String),
}

impl CollectionError {
    /// True for errors caused by invalid caller input rather than the
    /// environment.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CollectionError::EmptyName
                | CollectionError::NameTooLong { .. }
                | CollectionError::DuplicateName { .. }
                | CollectionError::InvalidChunkSize { .. }
                | CollectionError::InvalidChunkOverlap { .. }
                | CollectionError::InvalidMaxSize { .. }
                | CollectionError::LimitBelowUsage { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CollectionError::CollectionNotFound(_)
                | CollectionError::ItemNotFound(_)
                | CollectionError::FileNotFound(_)
                | CollectionError::TemplateNotFound(_)
                | CollectionError::ArchiveNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_limit_message() {
        let err = CollectionError::SizeLimitExceeded {
            new_total_mb: 1_126_400.0 / 1_048_576.0,
            max_size_mb: 1,
        };
        assert!(err.to_string().contains("1.07MB > 1MB"));
    }

    #[test]
    fn test_limit_below_usage_message() {
        let err = CollectionError::LimitBelowUsage {
            current_mb: 2.0,
            max_size_mb: 1,
        };
        let message = err.to_string();
        assert!(message.contains("lower the size limit to 1MB"));
        assert!(message.contains("2.00MB"));
        assert!(!message.contains("File would exceed"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_duplicate_in_collection_message() {
        let err = CollectionError::DuplicateInCollection {
            file_name: "notes.md".into(),
        };
        assert!(err.to_string().contains("may already exist in this collection"));
    }

    #[test]
    fn test_error_families() {
        assert!(CollectionError::EmptyName.is_validation());
        assert!(!CollectionError::EmptyName.is_not_found());
        assert!(CollectionError::FileNotFound(PathBuf::from("/tmp/x")).is_not_found());
        assert!(!CollectionError::MissingManifest.is_validation());
    }
}
