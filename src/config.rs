use crate::error::ConfigurationError;
use crate::util;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Signing secret used when none is configured. Only fit for local runs.
pub const INSECURE_JWT_SECRET: &str = "your-256-bit-secret";

fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|it| it.parse().ok())
        .unwrap_or(fallback)
}

fn default_mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or("mongodb://localhost:27017".to_string())
}

fn default_mongodb_db() -> String {
    env::var("MONGODB_DB_NAME").unwrap_or("classscheduling".to_string())
}

fn default_store() -> StoreBackend {
    env_or("STORE_BACKEND", StoreBackend::MongoDb)
}

fn default_store_timeout_ms() -> u64 {
    env_or("STORE_TIMEOUT_MS", 5000)
}

fn default_jwt_secret() -> String {
    env::var("JWT_SECRET").unwrap_or(INSECURE_JWT_SECRET.to_string())
}

fn default_token_lifetime_hours() -> i64 {
    env_or("TOKEN_LIFETIME_HOURS", 24)
}

fn default_password_cost() -> u32 {
    env_or("PASSWORD_COST", crate::credential::DEFAULT_COST)
}

fn default_admin_usernames() -> Vec<String> {
    vec![String::from("admin")]
}

fn default_allowed_origins() -> Vec<String> {
    Vec::new()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    MongoDb,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mongodb" => Ok(StoreBackend::MongoDb),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub(crate) file_path: PathBuf,

    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,
    #[serde(default = "default_store")]
    pub store: StoreBackend,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Never written back to disk; comes from the file or `JWT_SECRET`.
    #[serde(default = "default_jwt_secret", skip_serializing)]
    pub jwt_secret: String,
    #[serde(default = "default_token_lifetime_hours")]
    pub token_lifetime_hours: i64,
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,

    #[serde(default = "default_admin_usernames")]
    pub admin_usernames: Vec<String>,
    /// Empty allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("mongodb_uri", &self.mongodb_uri)
            .field("mongodb_db", &self.mongodb_db)
            .field("store", &self.store)
            .field("store_timeout_ms", &self.store_timeout_ms)
            .field("token_lifetime_hours", &self.token_lifetime_hours)
            .field("password_cost", &self.password_cost)
            .field("admin_usernames", &self.admin_usernames)
            .field("allowed_origins", &self.allowed_origins)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            store: default_store(),
            store_timeout_ms: default_store_timeout_ms(),
            jwt_secret: default_jwt_secret(),
            token_lifetime_hours: default_token_lifetime_hours(),
            password_cost: default_password_cost(),
            admin_usernames: default_admin_usernames(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or("./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        let config_file = util::find_first_subpath(
            config_dir(),
            &["settings.yml", "settings.yaml"],
            Path::exists,
        )
        .ok_or_else(|| ConfigurationError::NotFound(config_dir()))?;

        let file = File::open(&config_file)?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = config_file;

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(dir) = self.file_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_lifetime_hours)
    }

    pub fn is_admin_username(&self, username: &str) -> bool {
        self.admin_usernames.iter().any(|it| it == username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_yaml::from_str("mongodb_db: elsewhere\nstore: memory\n").unwrap();

        assert_eq!(config.mongodb_db, "elsewhere");
        assert_eq!(config.store, StoreBackend::Memory);
        assert!(config.store_timeout_ms > 0);
        assert!(!config.admin_usernames.is_empty());
    }

    #[test]
    fn secret_is_never_written_out() {
        let config = Config {
            jwt_secret: "do-not-print".to_string(),
            ..Config::default()
        };

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("do-not-print"));
        assert!(!format!("{:?}", config).contains("do-not-print"));
    }
}
