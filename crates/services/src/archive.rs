//! ZIP archive layout for collection export and import.
//!
//! ```text
//! <name>.zip
//! ├── collection.json
//! └── files/<relative_path>...
//! ```

use shared::manifest::ExportManifest;
use shared::{CollectionError, CollectionResult, FileCollectionItem};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const MANIFEST_ENTRY: &str = "collection.json";
pub const FILES_DIR: &str = "files";

/// Upper bound on buffer space reserved from an entry's declared size.
const MAX_PREALLOCATION: usize = 1024 * 1024;

/// Writes an archive to a temporary sibling file and moves it into place on
/// `finish`. Dropping an unfinished writer removes the temporary file.
pub struct ArchiveWriter {
    zip: ZipWriter<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    finished: bool,
}

impl ArchiveWriter {
    pub fn create(path: &Path) -> CollectionResult<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| CollectionError::Archive(format!("Invalid archive path: {}", path.display())))?;
        let temp_path = path.with_file_name(format!(".{}.partial", file_name));
        let file = File::create(&temp_path)?;

        Ok(Self {
            zip: ZipWriter::new(file),
            temp_path,
            final_path: path.to_path_buf(),
            finished: false,
        })
    }

    pub fn write_manifest(&mut self, manifest: &ExportManifest) -> CollectionResult<()> {
        let bytes = serde_json::to_vec_pretty(manifest)
            .map_err(|e| CollectionError::Archive(format!("Failed to encode manifest: {}", e)))?;
        self.zip
            .start_file(MANIFEST_ENTRY, entry_options())
            .map_err(|e| archive_error(MANIFEST_ENTRY, e))?;
        self.zip.write_all(&bytes)?;
        Ok(())
    }

    /// Copy `source` into `files/<entry_name>`. Returns the bytes written.
    pub fn add_file(&mut self, entry_name: &str, source: &Path) -> CollectionResult<u64> {
        let entry = format!("{}/{}", FILES_DIR, sanitize_entry_name(entry_name)?);
        let mut input = File::open(source)?;
        self.zip
            .start_file(entry.as_str(), entry_options())
            .map_err(|e| archive_error(&entry, e))?;
        Ok(io::copy(&mut input, &mut self.zip)?)
    }

    pub fn finish(mut self) -> CollectionResult<PathBuf> {
        let file = self
            .zip
            .finish()
            .map_err(|e| archive_error("archive", e))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.final_path)?;
        self.finished = true;
        Ok(self.final_path.clone())
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

pub struct ArchiveReader {
    archive: ZipArchive<BufReader<File>>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> CollectionResult<Self> {
        if !path.is_file() {
            return Err(CollectionError::ArchiveNotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| CollectionError::Archive(format!("Failed to read archive: {}", e)))?;
        Ok(Self { archive })
    }

    /// Parse `collection.json`.
    pub fn read_manifest(&mut self) -> CollectionResult<ExportManifest> {
        let bytes = match self.read_entry(MANIFEST_ENTRY)? {
            Some(bytes) => bytes,
            None => return Err(CollectionError::MissingManifest),
        };
        serde_json::from_slice(&bytes).map_err(|e| CollectionError::InvalidManifest(e.to_string()))
    }

    /// Bytes of `files/<entry_name>`, or `None` if the archive lacks it.
    pub fn read_file(&mut self, entry_name: &str) -> CollectionResult<Option<Vec<u8>>> {
        let entry = format!("{}/{}", FILES_DIR, sanitize_entry_name(entry_name)?);
        self.read_entry(&entry)
    }

    fn read_entry(&mut self, name: &str) -> CollectionResult<Option<Vec<u8>>> {
        match self.archive.by_name(name) {
            Ok(mut file) => {
                let mut buffer = Vec::with_capacity(initial_capacity(file.size()));
                file.read_to_end(&mut buffer)?;
                Ok(Some(buffer))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(archive_error(name, e)),
        }
    }
}

/// Reduce an entry name to a single safe path component.
pub fn sanitize_entry_name(name: &str) -> CollectionResult<String> {
    let candidate = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();
    if candidate.is_empty() || candidate == "." || candidate == ".." {
        return Err(CollectionError::Archive(format!(
            "Invalid archive entry name: {}",
            name
        )));
    }
    Ok(candidate.to_string())
}

/// Entry names for `files`, parallel to it. A name is the file name unless an
/// earlier item already used it, in which case the item id is prefixed.
pub fn assign_relative_paths(files: &[FileCollectionItem]) -> Vec<String> {
    let mut used = HashSet::new();
    files
        .iter()
        .map(|item| {
            let base = sanitize_entry_name(&item.file_name).unwrap_or_else(|_| item.id.to_string());
            let name = if used.contains(&base) {
                format!("{}_{}", item.id, base)
            } else {
                base
            };
            used.insert(name.clone());
            name
        })
        .collect()
}

/// The declared size comes from the archive header and is not trusted.
fn initial_capacity(declared_size: u64) -> usize {
    usize::try_from(declared_size)
        .unwrap_or(usize::MAX)
        .min(MAX_PREALLOCATION)
}

fn entry_options() -> FileOptions {
    FileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn archive_error(entry: &str, err: ZipError) -> CollectionError {
    match err {
        ZipError::Io(e) => CollectionError::Io(e),
        other => CollectionError::Archive(format!("{}: {}", entry, other)),
    }
}
