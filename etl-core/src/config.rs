//! Job configuration: TOML file, `.env`, then environment variables.
//!
//! Reddit credentials are not resolved at load time; the extract stage reads
//! them through [`RedditConfig::credentials`] when it starts.

use crate::error::ConfigError;
use crate::types::Sector;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "sector-etl.toml";
pub const CONFIG_PATH_ENV: &str = "SECTOR_ETL_CONFIG";

pub const REDDIT_CLIENT_ID_ENV: &str = "REDDIT_CLIENT_ID";
pub const REDDIT_CLIENT_SECRET_ENV: &str = "REDDIT_CLIENT_SECRET";
pub const REDDIT_USER_AGENT_ENV: &str = "REDDIT_USER_AGENT";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub sectors: Vec<Sector>,
    pub reddit: RedditConfig,
    pub database: DatabaseConfig,
    pub artifacts: ArtifactConfig,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            sectors: vec![
                Sector::new("inwi").expect("valid default sector"),
                Sector::new("InternetMaroc").expect("valid default sector"),
            ],
            reddit: RedditConfig::default(),
            database: DatabaseConfig::default(),
            artifacts: ArtifactConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: Option<String>,
    pub api_base_url: String,
    pub token_url: String,
    pub search_limit: u32,
    pub extraction_attempts: u32,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: None,
            api_base_url: "https://oauth.reddit.com".to_string(),
            token_url: "https://www.reddit.com/api/v1/access_token".to_string(),
            search_limit: 50,
            extraction_attempts: 4,
        }
    }
}

impl RedditConfig {
    /// Resolve credentials from the process environment, falling back to the file.
    pub fn credentials(&self) -> Result<RedditCredentials, ConfigError> {
        self.credentials_from(|key| std::env::var(key).ok())
    }

    pub fn credentials_from<F>(&self, lookup: F) -> Result<RedditCredentials, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |var_name: &str, fallback: &Option<String>| {
            lookup(var_name)
                .or_else(|| fallback.clone())
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                    var_name: var_name.to_string(),
                })
        };

        Ok(RedditCredentials {
            client_id: resolve(REDDIT_CLIENT_ID_ENV, &self.client_id)?,
            client_secret: resolve(REDDIT_CLIENT_SECRET_ENV, &self.client_secret)?,
            user_agent: resolve(REDDIT_USER_AGENT_ENV, &self.user_agent)?,
        })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "postgres".to_string(),
            port: 5432,
            database: "airflow".to_string(),
            user: "airflow".to_string(),
            password: "airflow".to_string(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/opt/airflow/dags"),
        }
    }
}

impl EtlConfig {
    /// Load the configuration. An explicit path must exist; otherwise
    /// `SECTOR_ETL_CONFIG` or `sector-etl.toml` is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", env_file.display());
        }

        let config_path = match path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigError::FileNotFound {
                        path: explicit.display().to_string(),
                    });
                }
                Some(explicit.to_path_buf())
            }
            None => std::env::var(CONFIG_PATH_ENV)
                .ok()
                .map(PathBuf::from)
                .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG_PATH)))
                .filter(|candidate| candidate.exists()),
        };

        let mut config = match config_path {
            Some(config_path) => {
                info!("Loading configuration from {}", config_path.display());
                let contents = std::fs::read_to_string(&config_path).map_err(|_| {
                    ConfigError::FileNotFound {
                        path: config_path.display().to_string(),
                    }
                })?;
                Self::from_toml_str(&contents)?
            }
            None => {
                info!("No configuration file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Environment values win over the file. `SECTORS` is comma separated.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SECTORS") {
            self.sectors = raw
                .split(',')
                .map(str::trim)
                .filter(|label| !label.is_empty())
                .map(Sector::new)
                .collect::<Result<_, _>>()?;
        }

        if let Some(host) = lookup("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            self.database.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "DB_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(database) = lookup("DB_NAME") {
            self.database.database = database;
        }
        if let Some(user) = lookup("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.database.password = password;
        }
        if let Some(dir) = lookup("ARTIFACT_DIR") {
            self.artifacts.dir = PathBuf::from(dir);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sectors.is_empty() {
            return Err(ConfigError::MissingField {
                field: "sectors".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for sector in &self.sectors {
            if !seen.insert(sector.as_str()) {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("sector '{}' is listed more than once", sector),
                });
            }
        }

        // Reddit caps a listing page at 100 items
        if !(1..=100).contains(&self.reddit.search_limit) {
            return Err(ConfigError::InvalidValue {
                field: "reddit.search_limit".to_string(),
                value: self.reddit.search_limit.to_string(),
            });
        }

        if self.reddit.extraction_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reddit.extraction_attempts".to_string(),
                value: "0".to_string(),
            });
        }

        if self.database.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "database.port".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = EtlConfig::default();
        let labels: Vec<&str> = config.sectors.iter().map(Sector::as_str).collect();
        assert_eq!(labels, vec!["inwi", "InternetMaroc"]);
        assert_eq!(config.reddit.search_limit, 50);
        assert_eq!(config.reddit.extraction_attempts, 4);
        assert_eq!(config.database.host, "postgres");
        assert_eq!(config.database.port, 5432);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = EtlConfig::from_toml_str(
            r#"
            sectors = ["rust", "golang"]

            [reddit]
            user_agent = "sector-etl/0.1 by tester"
            search_limit = 25

            [database]
            host = "localhost"
            port = 5433

            [artifacts]
            dir = "/tmp/artifacts"
            "#,
        )
        .unwrap();

        assert_eq!(config.sectors.len(), 2);
        assert_eq!(config.reddit.search_limit, 25);
        assert_eq!(config.reddit.extraction_attempts, 4);
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 5433);
        assert_eq!(config.database.user, "airflow");
        assert_eq!(config.artifacts.dir, PathBuf::from("/tmp/artifacts"));
    }

    #[test]
    fn test_invalid_sector_in_toml_is_rejected() {
        let result = EtlConfig::from_toml_str(r#"sectors = ["bad sector"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EtlConfig::default();
        config
            .apply_env_overrides(lookup_from(&[
                ("SECTORS", "alpha, beta"),
                ("DB_HOST", "db.internal"),
                ("DB_PORT", "6543"),
                ("ARTIFACT_DIR", "/data"),
            ]))
            .unwrap();

        let labels: Vec<&str> = config.sectors.iter().map(Sector::as_str).collect();
        assert_eq!(labels, vec!["alpha", "beta"]);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.artifacts.dir, PathBuf::from("/data"));
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = EtlConfig::default();
        let result = config.apply_env_overrides(lookup_from(&[("DB_PORT", "not-a-port")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = EtlConfig::default();
        config.sectors.push(Sector::new("inwi").unwrap());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed { .. })
        ));

        let mut config = EtlConfig::default();
        config.sectors.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { .. })
        ));

        let mut config = EtlConfig::default();
        config.reddit.search_limit = 500;
        assert!(config.validate().is_err());

        let mut config = EtlConfig::default();
        config.reddit.extraction_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_prefer_environment() {
        let reddit = RedditConfig {
            client_id: Some("file-id".to_string()),
            client_secret: Some("file-secret".to_string()),
            user_agent: Some("file-agent".to_string()),
            ..Default::default()
        };

        let credentials = reddit
            .credentials_from(lookup_from(&[(REDDIT_CLIENT_ID_ENV, "env-id")]))
            .unwrap();
        assert_eq!(credentials.client_id, "env-id");
        assert_eq!(credentials.client_secret, "file-secret");
        assert_eq!(credentials.user_agent, "file-agent");
    }

    #[test]
    fn test_missing_credentials() {
        let reddit = RedditConfig::default();
        let result = reddit.credentials_from(lookup_from(&[
            (REDDIT_CLIENT_ID_ENV, "id"),
            (REDDIT_USER_AGENT_ENV, "agent"),
        ]));

        match result {
            Err(ConfigError::MissingEnvironmentVariable { var_name }) => {
                assert_eq!(var_name, REDDIT_CLIENT_SECRET_ENV);
            }
            other => panic!("Expected missing secret, got {:?}", other),
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = RedditCredentials {
            client_id: "id".to_string(),
            client_secret: "super-secret".to_string(),
            user_agent: "agent".to_string(),
        };
        assert!(!format!("{:?}", credentials).contains("super-secret"));
        assert!(format!("{:?}", DatabaseConfig::default()).contains("password: \"<redacted>\""));
    }

    #[test]
    fn test_explicit_missing_file() {
        let result = EtlConfig::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etl.toml");
        std::fs::write(&path, "sectors = [\"rust\"]\n").unwrap();

        let config = EtlConfig::load(Some(&path)).unwrap();
        assert!(!config.sectors.is_empty());
    }
}
