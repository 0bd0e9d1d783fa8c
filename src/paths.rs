use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Application folder name under platform config/data dirs.
const APP_DIR: &str = "curvekeys";

/// Environment override for the config directory.
pub const CONFIG_DIR_ENV: &str = "CURVEKEYS_CONFIG_DIR";

/// Files whose presence in the working directory makes it the config dir.
const LOCAL_MARKERS: [&str; 2] = ["curvekeys.json", "curvekeys.log"];

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Create PathConfig from CLI arguments and environment variables
    ///
    /// Priority: CLI args → ENV var (CURVEKEYS_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));

        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. CURVEKEYS_CONFIG_DIR environment variable
/// 3. Local folder IF any config files exist (curvekeys.json, curvekeys.log)
/// 4. Platform-specific config directory from dirs-next (default)
///
/// Platform paths:
/// - Linux: ~/.config/curvekeys/{name}
/// - macOS: ~/Library/Application Support/curvekeys/{name}
/// - Windows: %APPDATA%\curvekeys\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Get path to a data file (logs)
///
/// Same priority as [`config_file`], platform fallback is the data dir:
/// - Linux: ~/.local/share/curvekeys/{name}
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Ensure that configuration and data directories exist
///
/// Creates directories if they don't exist. Returns error if creation fails.
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    // Only create data_dir if it's different from config_dir
    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

/// Check if any config files exist in the given directory
fn has_local_config_files(dir: &Path) -> bool {
    LOCAL_MARKERS.iter().any(|f| dir.join(f).exists())
}

/// Shared resolution for config and data dirs; `platform` is the dirs-next fallback.
fn resolve_dir(config: &PathConfig, cwd: Option<&Path>, platform: Option<PathBuf>) -> PathBuf {
    // Priority 1: Custom directory from CLI or ENV
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    // Priority 2: Local folder IF config files exist there
    if let Some(cwd) = cwd {
        if has_local_config_files(cwd) {
            return cwd.to_path_buf();
        }
    }

    // Priority 3: Platform-specific directory
    if let Some(dir) = platform {
        return dir.join(APP_DIR);
    }

    // Fallback: "." if everything else fails
    PathBuf::from(".")
}

/// Get the configuration directory
fn get_config_dir(config: &PathConfig) -> PathBuf {
    let cwd = std::env::current_dir().ok();
    resolve_dir(config, cwd.as_deref(), dirs_next::config_dir())
}

/// Get the data directory
fn get_data_dir(config: &PathConfig) -> PathBuf {
    let cwd = std::env::current_dir().ok();
    resolve_dir(config, cwd.as_deref(), dirs_next::data_dir())
}
