// Required external crates for configuration management and serialization
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use config::{Config, ConfigError, Environment, File};

mod nsfw;

pub use nsfw::{NsfwLadder, NsfwLevel};

/// Where each model category lives on disk
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelsConfig {
    /// Base directory that relative folders are resolved against
    pub root: PathBuf,
    /// Checkpoint folder
    pub checkpoint: PathBuf,
    /// Textual-inversion embeddings folder
    pub embeddings: PathBuf,
    /// Hypernetwork folder
    pub hypernetworks: PathBuf,
    /// LoRA folder
    pub lora: PathBuf,
    /// LyCORIS folder
    pub lycoris: PathBuf,
    /// VAE folder, only used as a download target
    pub vae: PathBuf,
    /// Store LyCORIS models in the LoRA folder
    pub lyco_to_lora: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            checkpoint: PathBuf::from("models/Stable-diffusion"),
            embeddings: PathBuf::from("embeddings"),
            hypernetworks: PathBuf::from("models/hypernetworks"),
            lora: PathBuf::from("models/Lora"),
            lycoris: PathBuf::from("models/LyCORIS"),
            vae: PathBuf::from("models/VAE"),
            lyco_to_lora: false,
        }
    }
}

impl ModelsConfig {
    /// Resolves a configured folder against `root` unless it is already absolute
    pub fn resolve(&self, folder: &Path) -> PathBuf {
        if folder.is_absolute() {
            folder.to_path_buf()
        } else {
            self.root.join(folder)
        }
    }
}

/// HTTP behaviour shared by every remote call
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    /// User-Agent sent unless the caller supplies one
    pub user_agent: String,
    /// Optional proxy for plain http requests
    pub proxy_http: Option<String>,
    /// Optional proxy for https requests
    pub proxy_https: Option<String>,
    /// Connect and read timeout in seconds
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// Length of one step-back "second" in milliseconds
    pub retry_unit_ms: u64,
    /// Pause between consecutive requests to the remote service
    pub request_delay_ms: u64,
    /// API key sent as a bearer token on downloads
    pub api_key: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: crate::http::DEFAULT_USER_AGENT.to_string(),
            proxy_http: None,
            proxy_https: None,
            timeout_secs: 300,
            max_retries: 30,
            retry_unit_ms: 1000,
            request_delay_ms: 200,
            api_key: None,
        }
    }
}

impl NetworkConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Remote model-sharing service endpoints
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CivitaiConfig {
    /// Base of the REST API, ending in a slash
    pub api_base: String,
    /// Base of the human-facing model page
    pub model_page: String,
}

impl Default for CivitaiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://civitai.com/api/v1/".to_string(),
            model_page: "https://civitai.com/models/".to_string(),
        }
    }
}

/// Sidecar metadata behaviour
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetadataConfig {
    /// Write the host-app `<model>.json` sidecar
    pub write_host_metadata: bool,
    /// Reduce HTML descriptions to plain text
    pub clean_html: bool,
    /// Download example images listed in the remote metadata
    pub download_examples: bool,
    /// Request previews at their full width
    pub max_size_preview: bool,
    /// Highest NSFW ladder level that may be fetched
    pub nsfw_ceiling: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            write_host_metadata: true,
            clean_html: true,
            download_examples: false,
            max_size_preview: true,
            nsfw_ceiling: "PG13".to_string(),
        }
    }
}

/// Hash engine settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HashingConfig {
    /// When false every hash request fails with a capability error
    pub enabled: bool,
    /// Persisted hash cache location
    pub cache_file: PathBuf,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_file: PathBuf::from("cache/hashes.json"),
        }
    }
}

/// Configuration for application logging
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Optional log directory
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Main settings struct that contains all configuration
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    /// Model folder mapping
    pub models: ModelsConfig,
    /// HTTP settings
    pub network: NetworkConfig,
    /// Remote service endpoints
    pub civitai: CivitaiConfig,
    /// Sidecar behaviour
    pub metadata: MetadataConfig,
    /// Maturity rating ladder
    pub nsfw: NsfwLadder,
    /// Hash engine settings
    pub hashing: HashingConfig,
    /// Logging-related settings
    pub logging: LoggingConfig,
}

/// Implementation for loading and parsing configuration
impl Settings {
    /// Creates a new Settings instance from the `config` directory of the
    /// current working directory.
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = std::env::current_dir()
            .map_err(|e| ConfigError::Message(
                format!("Failed to get current directory: {}", e)
            ))?
            .join("config");

        Self::from_dir(&config_dir)
    }

    /// Loads config from multiple sources in the following order of
    /// precedence (highest to lowest):
    /// 1. Environment variables prefixed with CIVHELP_ (nested keys joined by `__`)
    /// 2. Local config file (local.toml) if present
    /// 3. Default config file (default.toml)
    pub fn from_dir(config_dir: &Path) -> Result<Self, ConfigError> {
        if !config_dir.exists() {
            return Err(ConfigError::Message(
                format!("Config directory not found at: {}", config_dir.display())
            ));
        }

        let default_config = config_dir.join("default.toml");
        if !default_config.exists() {
            return Err(ConfigError::Message(
                format!("Default configuration file not found at: {}", default_config.display())
            ));
        }

        let local_config = config_dir.join("local.toml");

        // Convert paths to strings and keep them alive
        let default_config_path = default_config.to_string_lossy();
        let local_config_path = local_config.to_string_lossy();

        let settings = Config::builder()
            .add_source(File::with_name(&default_config_path))
            .add_source(File::with_name(&local_config_path).required(false))
            .add_source(Environment::with_prefix("CIVHELP").separator("__"))
            .build()?
            .try_deserialize::<Settings>()?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "timeout_secs must be greater than 0".to_string()
            ));
        }

        if !self.civitai.api_base.ends_with('/') {
            return Err(ConfigError::Message(
                format!("api_base must end with '/', got: {}", self.civitai.api_base)
            ));
        }

        self.nsfw.validate().map_err(ConfigError::Message)?;

        if self.nsfw.value_of(&self.metadata.nsfw_ceiling).is_none() {
            return Err(ConfigError::Message(format!(
                "nsfw_ceiling '{}' is not a level of the configured ladder",
                self.metadata.nsfw_ceiling
            )));
        }

        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            _ => Err(ConfigError::Message(
                format!("Invalid logging level: {}. Must be one of: error, warn, info, debug, trace",
                    self.logging.level)
            )),
        }?;

        // Create log directory if configured and doesn't exist
        if let Some(log_dir) = &self.logging.file {
            if !log_dir.exists() {
                std::fs::create_dir_all(log_dir).map_err(|e| {
                    ConfigError::Message(format!(
                        "Failed to create log directory at {}: {}",
                        log_dir.display(), e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Settings rooted at `root`, everything else at defaults. Mostly useful
    /// for embedding the library without config files.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        let mut settings = Settings::default();
        settings.models.root = root.as_ref().to_path_buf();
        settings.hashing.cache_file = root.as_ref().join("cache").join("hashes.json");
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn unknown_ceiling_is_rejected() {
        let mut settings = Settings::default();
        settings.metadata.nsfw_ceiling = "G".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn loads_default_toml_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[network]\nmax_retries = 3\n[metadata]\nnsfw_ceiling = \"R\"\n",
        )
        .unwrap();

        let settings = Settings::from_dir(dir.path()).unwrap();
        assert_eq!(settings.network.max_retries, 3);
        assert_eq!(settings.metadata.nsfw_ceiling, "R");
        // untouched sections keep their defaults
        assert_eq!(settings.network.timeout_secs, 300);
        assert_eq!(settings.nsfw.levels.len(), 5);
    }

    #[test]
    fn relative_folders_resolve_against_root() {
        let models = ModelsConfig {
            root: PathBuf::from("/srv/webui"),
            ..ModelsConfig::default()
        };
        assert_eq!(
            models.resolve(&models.lora),
            PathBuf::from("/srv/webui/models/Lora")
        );
        assert_eq!(models.resolve(Path::new("/abs/ti")), PathBuf::from("/abs/ti"));
    }
}
