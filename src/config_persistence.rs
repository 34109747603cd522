use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{sanitize_config, Config};
use crate::error::{EnrichError, Result};

const CONFIG_DIR_NAME: &str = "history-enricher";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Returns `<config dir>/history-enricher/config.toml`, or a file in the working
/// directory when the platform has no config directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Writes a default config when none exists yet, then loads and sanitizes it.
///
/// An unparsable file is reported and replaced by defaults in memory only; the
/// file on disk is left for the operator to fix.
pub fn load_or_create_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        persist_config_file(&Config::default(), path)?;
    }

    let config_content =
        std::fs::read_to_string(path).map_err(|err| EnrichError::io(path, err))?;
    Ok(sanitize_config(parse_config_text(&config_content, path)))
}

fn parse_config_text(config_content: &str, path: &Path) -> Config {
    match toml::from_str::<Config>(config_content) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}

pub fn persist_config_file(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| EnrichError::io(parent, err))?;
    }
    let config_text = toml::to_string(config)
        .map_err(|err| EnrichError::Config(format!("failed to serialize config: {err}")))?;
    std::fs::write(path, config_text).map_err(|err| EnrichError::io(path, err))
}
