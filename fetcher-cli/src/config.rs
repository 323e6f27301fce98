use anyhow::{Context, Result};
use fetcher_sources::Settings;
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::ensure_fetcher_home;

pub fn default_config_path() -> Result<PathBuf> {
    Ok(ensure_fetcher_home()?.join("config.toml"))
}

/// A missing file means defaults.
pub fn load_config(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: Settings = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    settings.validate().with_context(|| format!("invalid {}", path.display()))?;
    Ok(settings)
}

pub fn save_config(path: &Path, settings: &Settings) -> Result<()> {
    let s = toml::to_string_pretty(settings).context("serialize config")?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Write the defaults unless a config already exists. Returns whether it wrote.
pub fn init_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save_config(path, &Settings::default())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_config(&dir.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_init_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert!(init_config(&path).unwrap());
        assert!(!init_config(&path).unwrap());

        let mut settings = load_config(&path).unwrap();
        settings.viseca.card_id = Some("0123ABC".to_string());
        save_config(&path, &settings).unwrap();
        assert_eq!(load_config(&path).unwrap().viseca.card_id.as_deref(), Some("0123ABC"));
    }

    #[test]
    fn test_acquire_shorter_than_login_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pipeline]\nacquire_timeout_secs = 60\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("acquire_timeout_secs"), "{err:#}");
    }

    #[test]
    fn test_bad_toml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pipeline\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err}").contains("config.toml"));
    }
}
