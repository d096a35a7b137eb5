use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use shared::settings::CollectionSettings;
use std::fs;
use std::path::{Path, PathBuf};

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com.local", "Ghostman", "Ghostman")
}

pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|proj| proj.config_dir().join("settings.json"))
}

/// Settings from `settings.json`, or defaults. Problems are returned rather
/// than logged because logging is configured from these settings.
pub fn load_settings_or_default() -> (CollectionSettings, Option<String>) {
    match config_path() {
        Some(path) if path.exists() => load_settings_from(&path),
        _ => (CollectionSettings::default(), None),
    }
}

fn load_settings_from(path: &Path) -> (CollectionSettings, Option<String>) {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return (
                CollectionSettings::default(),
                Some(format!("Cannot read {}: {}; using defaults", path.display(), e)),
            )
        }
    };
    match serde_json::from_slice::<CollectionSettings>(&bytes) {
        Ok(settings) => (settings, None),
        Err(e) => (
            CollectionSettings::default(),
            Some(format!("Ignoring invalid {}: {}", path.display(), e)),
        ),
    }
}

/// Command line override, then configured directory, then the platform data
/// directory.
pub fn resolve_data_dir(settings: &CollectionSettings, override_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = &settings.data_dir {
        return Ok(dir.clone());
    }
    project_dirs()
        .map(|proj| proj.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("No home directory found; pass --data-dir"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_invalid_settings_fall_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let (settings, problem) = load_settings_from(&path);
        assert_eq!(settings, CollectionSettings::default());
        assert!(problem.unwrap().contains("settings.json"));
    }

    #[test]
    fn test_partial_settings_keep_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, r#"{"worker_threads": 4}"#).unwrap();

        let (settings, problem) = load_settings_from(&path);
        assert!(problem.is_none());
        assert_eq!(settings.worker_threads, 4);
        assert!(settings.check_duplicates);
    }

    #[test]
    fn test_data_dir_precedence() {
        let mut settings = CollectionSettings::default();
        settings.data_dir = Some(PathBuf::from("/configured"));

        let chosen = resolve_data_dir(&settings, Some(Path::new("/flag"))).unwrap();
        assert_eq!(chosen, PathBuf::from("/flag"));

        let chosen = resolve_data_dir(&settings, None).unwrap();
        assert_eq!(chosen, PathBuf::from("/configured"));
    }
}
