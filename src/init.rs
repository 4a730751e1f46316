/*
 * Chirp - Scheduled Mention Responder
 * File Path: src/init.rs
 * Responsibility: Home directory resolution and first-run scaffolding
 */

use anyhow::{Context, Result};
use dirs::home_dir;
use include_dir::{Dir, include_dir};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::CONFIG_FILE;

static ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets");

/// Resolve the bot's home directory
/// Priority: CLI > Environment Variable > Default (~/.chirp)
pub fn resolve_home(cli_home: Option<PathBuf>) -> Result<PathBuf> {
    resolve_home_with(cli_home, std::env::var("CHIRP_HOME").ok())
}

fn resolve_home_with(cli_home: Option<PathBuf>, env_home: Option<String>) -> Result<PathBuf> {
    if let Some(path) = cli_home {
        return Ok(path);
    }
    if let Some(env_path) = env_home.filter(|p| !p.trim().is_empty()) {
        return Ok(PathBuf::from(env_path));
    }
    let home = home_dir().context("Could not locate home directory")?;
    Ok(home.join(".chirp"))
}

/// Creates the home directory and drops the template config if none exists.
/// Returns true when a fresh config was written.
pub fn initialize_home(path: &Path) -> Result<bool> {
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create home directory {:?}", path))?;

    let config_path = path.join(CONFIG_FILE);
    if config_path.exists() {
        return Ok(false);
    }

    let template = ASSETS
        .get_file(CONFIG_FILE)
        .context("Config template missing from embedded assets")?;
    fs::write(&config_path, template.contents())
        .with_context(|| format!("Failed to write {:?}", config_path))?;
    Ok(true)
}
