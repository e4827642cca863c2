//! Settings file handling for the terminal client.

use std::fs;
use std::path::{Path, PathBuf};

use shared::settings::ClientSettings;

pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com.local", "DopamineExp", "DopamineExp")
        .map(|proj| proj.config_dir().join("settings.json"))
}

/// Load settings from the config dir, falling back to defaults. The bool is
/// true when a settings file was actually read. Env overrides apply either way.
pub fn load_settings_or_default() -> (ClientSettings, bool) {
    let (settings, loaded) = match config_path() {
        Some(path) => load_from(&path),
        None => (ClientSettings::default(), false),
    };
    (settings.with_env_overrides(), loaded)
}

fn load_from(path: &Path) -> (ClientSettings, bool) {
    let Ok(bytes) = fs::read(path) else {
        return (ClientSettings::default(), false);
    };
    match serde_json::from_slice::<ClientSettings>(&bytes) {
        Ok(settings) => (settings, true),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
            (ClientSettings::default(), false)
        }
    }
}

/// Write a default settings file on first run so there is something to edit.
/// Returns the path when a file was created.
pub fn write_default_if_missing() -> anyhow::Result<Option<PathBuf>> {
    let path = config_path().ok_or_else(|| anyhow::anyhow!("no config directory available"))?;
    if path.exists() {
        return Ok(None);
    }
    save_to(&path, &ClientSettings::default())?;
    Ok(Some(path))
}

fn save_to(path: &Path, settings: &ClientSettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = ClientSettings {
            backend_url: "http://10.0.0.7:5000".into(),
            request_timeout_secs: 30,
            ..ClientSettings::default()
        };
        save_to(&path, &settings).unwrap();

        let (loaded, found) = load_from(&path);
        assert!(found);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_or_broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(load_from(&path), (ClientSettings::default(), false));

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_from(&path), (ClientSettings::default(), false));
    }
}
