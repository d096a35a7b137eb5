//! File checksums, existence checks and integrity verification.

use chrono::Utc;
use sha2::{Digest, Sha256};
use shared::{CollectionError, CollectionResult, FileCollectionItem};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use uuid::Uuid;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Stateless helper over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageHelper;

impl StorageHelper {
    pub fn new() -> Self {
        Self
    }

    /// SHA-256 of the file's current bytes as lower-case hex.
    pub fn calculate_file_checksum(&self, path: &Path) -> CollectionResult<String> {
        let file = File::open(path).map_err(|e| checksum_error(path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let read = reader.read(&mut buffer).map_err(|e| checksum_error(path, e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn checksum_bytes(&self, data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    pub fn validate_file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// False when the file is missing, unreadable or its checksum differs.
    pub fn verify_file_integrity(&self, path: &Path, checksum: &str) -> bool {
        if !self.validate_file_exists(path) {
            return false;
        }
        match self.calculate_file_checksum(path) {
            Ok(actual) => actual.eq_ignore_ascii_case(checksum),
            Err(_) => false,
        }
    }

    /// Build a collection item from the file's current metadata.
    pub fn describe_file(
        &self,
        collection_id: Uuid,
        path: &Path,
        checksum: String,
    ) -> CollectionResult<FileCollectionItem> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CollectionError::FileNotFound(path.to_path_buf()),
            _ => CollectionError::InvalidFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;

        if !metadata.is_file() {
            return Err(CollectionError::InvalidFile {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CollectionError::InvalidFile {
                path: path.to_path_buf(),
                reason: "path has no file name".to_string(),
            })?;

        Ok(FileCollectionItem {
            id: Uuid::new_v4(),
            collection_id,
            file_name,
            file_path: path.to_path_buf(),
            file_size: metadata.len(),
            file_type: file_type_for(path),
            checksum,
            added_at: Utc::now(),
        })
    }
}

/// Lower-case extension, or "unknown" when the path has none.
pub fn file_type_for(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn checksum_error(path: &Path, err: std::io::Error) -> CollectionError {
    if err.kind() == ErrorKind::NotFound {
        CollectionError::FileNotFound(path.to_path_buf())
    } else {
        CollectionError::Checksum {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // sha256("hello world")
    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_checksum_of_file_and_bytes_agree() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hello.txt");
        std::fs::write(&path, "hello world").unwrap();

        let storage = StorageHelper::new();
        assert_eq!(storage.calculate_file_checksum(&path).unwrap(), HELLO_SHA256);
        assert_eq!(storage.checksum_bytes(b"hello world"), HELLO_SHA256);
    }

    #[test]
    fn test_checksum_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageHelper::new();
        let result = storage.calculate_file_checksum(&temp_dir.path().join("nope"));
        assert!(matches!(result, Err(CollectionError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_file_exists_rejects_directories() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageHelper::new();
        assert!(!storage.validate_file_exists(temp_dir.path()));
    }

    #[test]
    fn test_verify_file_integrity() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hello.txt");
        std::fs::write(&path, "hello world").unwrap();

        let storage = StorageHelper::new();
        assert!(storage.verify_file_integrity(&path, HELLO_SHA256));

        std::fs::write(&path, "goodbye").unwrap();
        assert!(!storage.verify_file_integrity(&path, HELLO_SHA256));

        std::fs::remove_file(&path).unwrap();
        assert!(!storage.verify_file_integrity(&path, HELLO_SHA256));
    }

    #[test]
    fn test_describe_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Report.PDF");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        let collection_id = Uuid::new_v4();
        let item = StorageHelper::new()
            .describe_file(collection_id, &path, "abc".into())
            .unwrap();
        assert_eq!(item.collection_id, collection_id);
        assert_eq!(item.file_name, "Report.PDF");
        assert_eq!(item.file_size, 2048);
        assert_eq!(item.file_type, "pdf");
        assert_eq!(item.checksum, "abc");
    }

    #[test]
    fn test_file_type_without_extension() {
        assert_eq!(file_type_for(Path::new("/tmp/Makefile")), "unknown");
        assert_eq!(file_type_for(Path::new("notes.Md")), "md");
    }
}
