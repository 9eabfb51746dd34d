use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub database_path: String,
    pub upload_path: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub use_secure_cookies: bool,
    pub allowed_extensions: String,
    pub max_upload_bytes: u64,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path).map_err(|e| {
            config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}",
                env_path.display(),
                e
            ))
        })?;

        let database_path = env::var("DATABASE_PATH").map_err(|_| {
            config::ConfigError::Message(
                "FATAL: Environment variable 'DATABASE_PATH' is not set in your .env file."
                    .to_string(),
            )
        })?;

        let upload_path = env::var("UPLOAD_PATH").map_err(|_| {
            config::ConfigError::Message(
                "FATAL: Environment variable 'UPLOAD_PATH' is not set in your .env file."
                    .to_string(),
            )
        })?;

        let session_secret_key = env::var("SESSION_SECRET_KEY").map_err(|_| {
            config::ConfigError::Message(
                "FATAL: Environment variable 'SESSION_SECRET_KEY' is not set in your .env file."
                    .to_string(),
            )
        })?;

        // The cookie session key is 64 bytes, supplied hex encoded.
        if session_secret_key.len() != 128
            || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes)."
                    .to_string(),
            ));
        }

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "".to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let allowed_extensions = env::var("ALLOWED_EXTENSIONS")
            .unwrap_or_else(|_| "png,jpg,jpeg,gif,pdf,doc,docx".to_string());

        let max_upload_mb = env::var("MAX_UPLOAD_MB")
            .unwrap_or_else(|_| "16".to_string())
            .parse::<u64>()
            .map_err(|_| {
                config::ConfigError::Message(
                    "FATAL: 'MAX_UPLOAD_MB' must be a whole number of megabytes.".to_string(),
                )
            })?;

        let bcrypt_cost = env::var("BCRYPT_COST")
            .unwrap_or_else(|_| "12".to_string())
            .parse::<u32>()
            .map_err(|_| {
                config::ConfigError::Message(
                    "FATAL: 'BCRYPT_COST' must be a whole number.".to_string(),
                )
            })?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(config::ConfigError::Message(
                "FATAL: 'BCRYPT_COST' must be between 4 and 31.".to_string(),
            ));
        }

        if Path::new(&database_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                database_path
            )));
        }

        if Path::new(&upload_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'UPLOAD_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                upload_path
            )));
        }

        let builder = config::Config::builder()
            .add_source(config::File::new(
                "config/default.toml",
                config::FileFormat::Toml,
            ))
            .set_override("database_path", database_path)?
            .set_override("upload_path", upload_path)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("allowed_extensions", allowed_extensions)?
            .set_override("max_upload_bytes", max_upload_mb * 1024 * 1024)?
            .set_override("bcrypt_cost", bcrypt_cost as u64)?
            .build()?;

        builder.try_deserialize()
    }

    /// Full path to the SQLite database file inside the database folder.
    pub fn db_file_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("labcms.db")
    }

    /// Upload bucket for general images.
    pub fn images_dir(&self) -> PathBuf {
        PathBuf::from(&self.upload_path).join("images")
    }

    /// Upload bucket for non-image files.
    pub fn documents_dir(&self) -> PathBuf {
        PathBuf::from(&self.upload_path).join("documents")
    }

    /// Upload bucket for generated thumbnails.
    pub fn thumbnails_dir(&self) -> PathBuf {
        PathBuf::from(&self.upload_path).join("thumbnails")
    }

    /// The configured extension allow-list, lowercased.
    pub fn allowed_extension_set(&self) -> HashSet<String> {
        self.allowed_extensions
            .split(',')
            .map(|ext| ext.trim().to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }
}
