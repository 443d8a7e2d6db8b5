use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Status of config file loading
#[derive(Debug, Clone)]
pub enum ConfigLoadStatus {
    /// Config loaded successfully from existing file
    Loaded,
    /// Created default config file (first run)
    Created,
    /// Error occurred during loading, using defaults.
    /// String is used in Debug output for logging.
    #[allow(dead_code)]
    Error(String),
}

/// Completion endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    /// Per-request timeout for the blocking completion call.
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key. The key
    /// itself never lives in the config file.
    pub key_env: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.7,
            timeout_secs: 60,
            key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Session database path. Empty means the platform data directory.
    pub sessions_db: String,
    /// Directory where finished plans are exported.
    pub exports: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sessions_db: String::new(),
            exports: "./pbl-plans".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Expand `~` to home directory in a path string
    pub fn expand_tilde(path: &str) -> PathBuf {
        if let Some(stripped) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(stripped);
        }
        PathBuf::from(path)
    }

    /// Get the expanded session database path, if one is configured.
    /// `None` means use the platform default.
    pub fn sessions_db_path(&self) -> Option<PathBuf> {
        if self.paths.sessions_db.is_empty() {
            None
        } else {
            Some(Self::expand_tilde(&self.paths.sessions_db))
        }
    }

    /// Get the expanded exports directory path
    pub fn exports_path(&self) -> PathBuf {
        Self::expand_tilde(&self.paths.exports)
    }
}

/// Partial completion endpoint configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialApiConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub timeout_secs: Option<u64>,
    pub key_env: Option<String>,
}

/// Partial path configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialPathsConfig {
    pub sessions_db: Option<String>,
    pub exports: Option<String>,
}

/// Project-specific configuration where every field is optional.
/// Parsed from `.pblcoach` files. Fields that are `None` inherit from the
/// global config.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialConfig {
    pub api: PartialApiConfig,
    pub paths: PartialPathsConfig,
}

/// Merge a global config with a project-level partial config.
/// Project values override global values where present.
pub fn merge_config(global: &Config, project: &PartialConfig) -> Config {
    Config {
        api: ApiConfig {
            base_url: project
                .api
                .base_url
                .clone()
                .unwrap_or_else(|| global.api.base_url.clone()),
            model: project
                .api
                .model
                .clone()
                .unwrap_or_else(|| global.api.model.clone()),
            temperature: project.api.temperature.unwrap_or(global.api.temperature),
            timeout_secs: project.api.timeout_secs.unwrap_or(global.api.timeout_secs),
            key_env: project
                .api
                .key_env
                .clone()
                .unwrap_or_else(|| global.api.key_env.clone()),
        },
        paths: PathsConfig {
            sessions_db: project
                .paths
                .sessions_db
                .clone()
                .unwrap_or_else(|| global.paths.sessions_db.clone()),
            exports: project
                .paths
                .exports
                .clone()
                .unwrap_or_else(|| global.paths.exports.clone()),
        },
    }
}

/// Loaded configuration with metadata
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_path: PathBuf,
    pub project_config_path: Option<PathBuf>,
    pub status: ConfigLoadStatus,
}

/// Get the platform-appropriate config directory
fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "cmoel", "pbl-coach").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the full path to the config file
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.pblcoach in current working directory).
pub fn get_project_config_path() -> Option<PathBuf> {
    let path = std::env::current_dir().ok()?.join(".pblcoach");
    if path.exists() { Some(path) } else { None }
}

/// Load a project config (.pblcoach) from the given path.
/// Returns Ok(PartialConfig) on success, Err(String) on parse/read failure.
fn load_project_config(path: &PathBuf) -> Result<PartialConfig, String> {
    let contents = fs::read_to_string(path).map_err(|e| {
        warn!(path = ?path, error = %e, "project_config_read_failed");
        format!("Failed to read .pblcoach: {}", e)
    })?;

    toml::from_str::<PartialConfig>(&contents).map_err(|e| {
        warn!(path = ?path, error = %e, "project_config_parse_failed");
        format!("Invalid .pblcoach: {}", e)
    })
}

/// Load configuration from file, environment, and defaults
pub fn load_config() -> LoadedConfig {
    let config_path = match get_config_path() {
        Some(path) => path,
        None => {
            warn!("Could not determine config directory, using defaults");
            return LoadedConfig {
                config: apply_env_overrides(Config::default()),
                config_path: PathBuf::from("config.toml"),
                project_config_path: None,
                status: ConfigLoadStatus::Error("Could not determine config directory".to_string()),
            };
        }
    };

    debug!("Config path: {:?}", config_path);

    let (mut config, status) = load_or_create_config(&config_path);

    // Check for project-level .pblcoach file
    let project_config_path = get_project_config_path();
    if let Some(ref project_path) = project_config_path {
        match load_project_config(project_path) {
            Ok(partial) => {
                config = merge_config(&config, &partial);
                info!(path = ?project_path, "project_config_loaded");
            }
            Err(e) => {
                warn!(path = ?project_path, error = %e, "project_config_error");
                // Keep using global config only
            }
        }
    }

    let config = apply_env_overrides(config);

    LoadedConfig {
        config,
        config_path,
        project_config_path,
        status,
    }
}

/// Load configuration from an explicit file path (the `--config` flag),
/// bypassing the platform config file and the project overlay.
pub fn load_config_from(path: &Path) -> LoadedConfig {
    let (config, status) = match fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(config) => (config, ConfigLoadStatus::Loaded),
            Err(e) => {
                warn!(path = ?path, error = %e, "config_parse_failed");
                (
                    Config::default(),
                    ConfigLoadStatus::Error(format!("Malformed TOML: {}", e)),
                )
            }
        },
        Err(e) => {
            warn!(path = ?path, error = %e, "config_read_failed");
            (
                Config::default(),
                ConfigLoadStatus::Error(format!("Read error: {}", e)),
            )
        }
    };

    LoadedConfig {
        config: apply_env_overrides(config),
        config_path: path.to_path_buf(),
        project_config_path: None,
        status,
    }
}

/// Load config from file, or create default if not exists
fn load_or_create_config(config_path: &PathBuf) -> (Config, ConfigLoadStatus) {
    match fs::read_to_string(config_path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(config) => {
                info!("Loaded config from {:?}", config_path);
                (config, ConfigLoadStatus::Loaded)
            }
            Err(e) => {
                warn!(
                    "Config file malformed at {:?}: {}. Using defaults.",
                    config_path, e
                );
                (
                    Config::default(),
                    ConfigLoadStatus::Error(format!("Malformed TOML: {}", e)),
                )
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            // Config doesn't exist, create default
            create_default_config(config_path)
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!(
                "Permission denied reading config at {:?}. Using defaults.",
                config_path
            );
            (
                Config::default(),
                ConfigLoadStatus::Error("Permission denied reading config".to_string()),
            )
        }
        Err(e) => {
            warn!(
                "Error reading config at {:?}: {}. Using defaults.",
                config_path, e
            );
            (
                Config::default(),
                ConfigLoadStatus::Error(format!("Read error: {}", e)),
            )
        }
    }
}

/// Create the default config file
fn create_default_config(config_path: &PathBuf) -> (Config, ConfigLoadStatus) {
    let config = Config::default();

    // Ensure parent directory exists
    if let Some(parent) = config_path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!(
            "Could not create config directory {:?}: {}. Continuing without file.",
            parent, e
        );
        return (
            config,
            ConfigLoadStatus::Error(format!("Could not create config directory: {}", e)),
        );
    }

    // Serialize to TOML
    let toml_content = match toml::to_string_pretty(&config) {
        Ok(s) => s,
        Err(e) => {
            warn!("Could not serialize default config: {}", e);
            return (
                config,
                ConfigLoadStatus::Error(format!("Serialization error: {}", e)),
            );
        }
    };

    // Write file
    match fs::write(config_path, &toml_content) {
        Ok(()) => {
            info!("Created default config at {:?}", config_path);
            (config, ConfigLoadStatus::Created)
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!(
                "Permission denied creating config at {:?}. Continuing without file.",
                config_path
            );
            (
                config,
                ConfigLoadStatus::Error("Permission denied creating config".to_string()),
            )
        }
        Err(e) => {
            warn!(
                "Could not write default config to {:?}: {}. Continuing without file.",
                config_path, e
            );
            (
                config,
                ConfigLoadStatus::Error(format!("Write error: {}", e)),
            )
        }
    }
}

/// Apply environment variable overrides to config
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(base_url) = env::var("PBL_COACH_BASE_URL") {
        debug!("Overriding api.base_url from PBL_COACH_BASE_URL");
        config.api.base_url = base_url;
    }

    if let Ok(model) = env::var("PBL_COACH_MODEL") {
        debug!("Overriding api.model from PBL_COACH_MODEL");
        config.api.model = model;
    }

    if let Ok(path) = env::var("PBL_COACH_SESSIONS_DB") {
        debug!("Overriding paths.sessions_db from PBL_COACH_SESSIONS_DB");
        config.paths.sessions_db = path;
    }

    if let Ok(path) = env::var("PBL_COACH_EXPORTS") {
        debug!("Overriding paths.exports from PBL_COACH_EXPORTS");
        config.paths.exports = path;
    }

    config
}
