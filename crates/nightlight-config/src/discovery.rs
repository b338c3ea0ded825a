//! Locating and layering `nightlight` config files.
//!
//! Two files are consulted, the user file first and the working
//! directory's `nightlight.toml` second, so a per-directory file can pin a
//! different site or display mode. Command-line flags are applied on top by
//! the binary.

use std::path::{Path, PathBuf};

use crate::{ConfigError, NightlightConfig, Result};

const PROJECT_CONFIG_FILE: &str = "nightlight.toml";
const USER_CONFIG_FILE: &str = "config.toml";
const APP_NAME: &str = "nightlight";

/// Overrides the user config directory when set and non-empty.
const CONFIG_DIR_ENV: &str = "NIGHTLIGHT_CONFIG_DIR";

/// One candidate config file.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// False when the file is absent or could not be parsed.
    pub loaded: bool,
}

/// The merged settings plus a record of how they were assembled.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: NightlightConfig,
    /// Every candidate file, user file first.
    pub sources: Vec<ConfigSource>,
    /// Problems worth surfacing that did not stop loading.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Files that actually contributed settings.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter_map(|s| s.loaded.then_some(s.path.as_path()))
            .collect()
    }
}

/// Load the user file and `nightlight.toml` from `project_dir` (or the
/// working directory).
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], reading the user file from `config_dir` when given
/// instead of the `NIGHTLIGHT_CONFIG_DIR` or platform location.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user_file = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    let project_file = match project_dir {
        Some(dir) => dir.join(PROJECT_CONFIG_FILE),
        None => PathBuf::from(PROJECT_CONFIG_FILE),
    };

    let mut loaded = LoadedConfig {
        config: NightlightConfig::new(),
        sources: Vec::with_capacity(2),
        warnings: Vec::new(),
    };
    for path in user_file.into_iter().chain([project_file]) {
        let layer = match read_layer(&path) {
            Ok(layer) => layer,
            Err(e) => {
                loaded
                    .warnings
                    .push(format!("Skipping {}: {e}", path.display()));
                None
            }
        };
        let found = layer.is_some();
        if let Some(layer) = layer {
            loaded.config.merge(layer);
        }
        loaded.sources.push(ConfigSource { path, loaded: found });
    }

    if let Some(warning) = plaintext_password_warning(&loaded.config) {
        loaded.warnings.push(warning);
    }
    Ok(loaded)
}

/// Parse one file, without layering.
pub fn load_config_file(path: &Path) -> Result<NightlightConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    NightlightConfig::from_toml(&contents)
}

/// Write `config` as TOML to `path`, creating missing directories.
pub fn save_config(config: &NightlightConfig, path: &Path) -> Result<()> {
    let write_error = |at: &Path| {
        let path = at.display().to_string();
        move |source: std::io::Error| ConfigError::WriteFile { path, source }
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_error(parent))?;
    }
    std::fs::write(path, config.to_toml()?).map_err(write_error(path))
}

/// `config.toml` inside [`xdg_config_dir`].
pub fn xdg_config_path() -> Option<PathBuf> {
    Some(xdg_config_dir()?.join(USER_CONFIG_FILE))
}

/// `NIGHTLIGHT_CONFIG_DIR` if set, else `nightlight` under the platform
/// config directory.
pub fn xdg_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|base| base.join(APP_NAME)),
    }
}

/// `Ok(None)` for a file that does not exist.
fn read_layer(path: &Path) -> Result<Option<NightlightConfig>> {
    if path.is_file() {
        load_config_file(path).map(Some)
    } else {
        Ok(None)
    }
}

fn plaintext_password_warning(config: &NightlightConfig) -> Option<String> {
    let dexcom = config.dexcom.as_ref()?;
    dexcom.has_plaintext_password().then(|| {
        format!(
            "Dexcom password is stored in plain text; set {} instead",
            crate::secrets::DEXCOM_PASSWORD_ENV
        )
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
