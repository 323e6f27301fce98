use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `$FETCHER_HOME`, else `~/.fetcher`.
pub fn fetcher_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("FETCHER_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".fetcher"))
}

pub fn ensure_fetcher_home() -> Result<PathBuf> {
    let dir = fetcher_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}
