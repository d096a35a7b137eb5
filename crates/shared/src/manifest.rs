//! Export manifest stored as `collection.json` inside collection archives.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::{FileCollection, FileCollectionItem, NewCollection};

/// Manifest version written by this build. Other versions are imported with
/// a warning.
pub const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    /// Empty when the manifest carries none; treated as an unknown version
    #[serde(default)]
    pub format_version: String,
    /// Informational only, so any timestamp spelling is accepted
    #[serde(default)]
    pub exported_at: Option<String>,
    pub collection: ManifestCollection,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
}

/// Collection settings carried by the manifest. Identity and derived totals
/// are not exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestCollection {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub max_size_mb: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub id: Uuid,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub checksum: String,
    /// Entry name under `files/` in the archive
    #[serde(default)]
    pub relative_path: String,
}

impl ExportManifest {
    /// Snapshot a collection and its files. `relative_paths` must be parallel
    /// to `files`.
    pub fn new(
        collection: &FileCollection,
        files: &[FileCollectionItem],
        relative_paths: &[String],
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            exported_at: Some(Utc::now().to_rfc3339()),
            collection: ManifestCollection::from(collection),
            files: files
                .iter()
                .zip(relative_paths)
                .map(|(item, relative_path)| ManifestFile {
                    id: item.id,
                    file_name: item.file_name.clone(),
                    file_size: item.file_size,
                    file_type: item.file_type.clone(),
                    checksum: item.checksum.clone(),
                    relative_path: relative_path.clone(),
                })
                .collect(),
        }
    }

    pub fn is_current_version(&self) -> bool {
        self.format_version == FORMAT_VERSION
    }
}

impl From<&FileCollection> for ManifestCollection {
    fn from(collection: &FileCollection) -> Self {
        Self {
            name: collection.name.clone(),
            description: collection.description.clone(),
            tags: collection.tags.clone(),
            chunk_size: collection.chunk_size,
            chunk_overlap: collection.chunk_overlap,
            max_size_mb: collection.max_size_mb,
        }
    }
}

impl ManifestCollection {
    /// Creation parameters for an imported copy under `name`.
    pub fn to_new_collection(&self, name: impl Into<String>) -> NewCollection {
        NewCollection::new(name)
            .with_description(self.description.clone())
            .with_tags(self.tags.clone())
            .with_chunking(self.chunk_size, self.chunk_overlap)
            .with_max_size_mb(self.max_size_mb)
    }
}

impl ManifestFile {
    /// Archive entry name, falling back to the file name for manifests that
    /// omit `relative_path`.
    pub fn entry_name(&self) -> &str {
        if self.relative_path.is_empty() {
            &self.file_name
        } else {
            &self.relative_path
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_json_shape() {
        let collection = FileCollection::from_new(
            NewCollection::new("Research")
                .with_tags(["papers"])
                .with_chunking(1500, 300),
        );
        let manifest = ExportManifest::new(&collection, &[], &[]);
        let json = serde_json::to_value(&manifest).unwrap();

        assert_eq!(json["format_version"], "1.0");
        assert_eq!(json["collection"]["name"], "Research");
        assert_eq!(json["collection"]["chunk_size"], 1500);
        assert_eq!(json["collection"]["chunk_overlap"], 300);
        assert_eq!(json["collection"]["tags"][0], "papers");
        assert!(json["collection"].get("id").is_none());
        assert!(json["files"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_manifest_tolerates_missing_optional_fields() {
        let json = r#"{
            "format_version": "2.0",
            "exported_at": "2024-05-01T10:00:00Z",
            "collection": {"name": "Old", "chunk_size": 800, "chunk_overlap": 100, "max_size_mb": 50}
        }"#;
        let manifest: ExportManifest = serde_json::from_str(json).unwrap();
        assert!(!manifest.is_current_version());
        assert!(manifest.files.is_empty());
        assert_eq!(manifest.collection.description, "");
    }

    #[test]
    fn test_manifest_accepts_loose_metadata() {
        // Offset-less timestamp, no format version, file entry without relative_path
        let json = r#"{
            "exported_at": "2024-05-01T10:00:00.123456",
            "collection": {"name": "Legacy", "chunk_size": 1000, "chunk_overlap": 200, "max_size_mb": 10},
            "files": [{
                "id": "6f1c1c3e-8a43-4c55-9a59-1d1f0e3b9a11",
                "file_name": "notes.txt",
                "file_size": 5,
                "file_type": "txt",
                "checksum": "abc"
            }]
        }"#;
        let manifest: ExportManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.format_version, "");
        assert!(!manifest.is_current_version());
        assert_eq!(manifest.exported_at.as_deref(), Some("2024-05-01T10:00:00.123456"));
        assert_eq!(manifest.files[0].entry_name(), "notes.txt");
    }

    #[test]
    fn test_entry_name_fallback() {
        let file = ManifestFile {
            id: Uuid::new_v4(),
            file_name: "a.txt".into(),
            file_size: 1,
            file_type: "txt".into(),
            checksum: "00".into(),
            relative_path: String::new(),
        };
        assert_eq!(file.entry_name(), "a.txt");
    }
}
