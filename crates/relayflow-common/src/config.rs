//! Configuration for RelayFlow

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// PostgreSQL configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Admin credentials
    #[serde(default)]
    pub admin: AdminConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
        }
    }
}

fn default_server_port() -> u16 {
    8080
}

/// PostgreSQL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host
    #[serde(default)]
    pub host: String,

    /// Database port
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database user
    #[serde(default)]
    pub user: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Database name
    #[serde(default)]
    pub dbname: String,

    /// SSL mode (`disable`, `require`, ...)
    #[serde(default = "default_sslmode")]
    pub sslmode: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_db_port(),
            user: String::new(),
            password: String::new(),
            dbname: String::new(),
            sslmode: default_sslmode(),
        }
    }
}

fn default_db_port() -> u16 {
    5432
}

fn default_sslmode() -> String {
    "disable".to_string()
}

impl DatabaseConfig {
    /// Build a connection URL for sqlx
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.dbname, self.sslmode
        )
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RedisConfig {
    /// Address as `host:port`
    #[serde(default)]
    pub addr: String,

    /// Optional password
    #[serde(default)]
    pub password: String,

    /// Database index
    #[serde(default)]
    pub db: i64,
}

impl RedisConfig {
    /// Build a connection URL for the redis client
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.addr, self.db)
        } else {
            format!("redis://:{}@{}/{}", self.password, self.addr, self.db)
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent send workers
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

fn default_worker_count() -> usize {
    5
}

/// Admin credentials for the dashboard login
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from file and environment
    ///
    /// The file path defaults to `./config.yaml` and can be overridden with
    /// `RELAYFLOW_CONFIG`. Environment variables override file values.
    pub fn load() -> crate::Result<Self> {
        let path = std::env::var("RELAYFLOW_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
        let path = std::path::PathBuf::from(path);

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Config::default()
        };

        config.override_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn override_from_env(&mut self) {
        if let Some(port) = env_parse::<u16>("SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(host) = std::env::var("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = env_parse::<u16>("DB_PORT") {
            self.database.port = port;
        }
        if let Ok(user) = std::env::var("DB_USER") {
            self.database.user = user;
        }
        if let Ok(password) = std::env::var("DB_PASSWORD") {
            self.database.password = password;
        }
        if let Ok(dbname) = std::env::var("DB_NAME") {
            self.database.dbname = dbname;
        }
        if let Ok(addr) = std::env::var("REDIS_ADDR") {
            self.redis.addr = addr;
        }
        if let Ok(password) = std::env::var("REDIS_PASSWORD") {
            self.redis.password = password;
        }
        if let Some(db) = env_parse::<i64>("REDIS_DB") {
            self.redis.db = db;
        }
        if let Some(count) = env_parse::<usize>("WORKER_COUNT") {
            self.worker.count = count;
        }
        if let Ok(username) = std::env::var("ADMIN_USERNAME") {
            self.admin.username = username;
        }
        if let Ok(password) = std::env::var("ADMIN_PASSWORD") {
            self.admin.password = password;
        }
    }

    /// Validate required fields, filling remaining defaults
    pub fn validate(&mut self) -> crate::Result<()> {
        if self.server.port == 0 {
            self.server.port = default_server_port();
        }
        if self.database.host.is_empty() {
            return Err(crate::Error::Config(
                "database host must not be empty".to_string(),
            ));
        }
        if self.database.port == 0 {
            self.database.port = default_db_port();
        }
        if self.database.sslmode.is_empty() {
            self.database.sslmode = default_sslmode();
        }
        if self.redis.addr.is_empty() {
            return Err(crate::Error::Config(
                "redis address must not be empty".to_string(),
            ));
        }
        if self.worker.count == 0 {
            self.worker.count = default_worker_count();
        }
        if self.admin.username.is_empty() || self.admin.password.is_empty() {
            return Err(crate::Error::Config(
                "admin username and password must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.port, 8080);

        let db = DatabaseConfig::default();
        assert_eq!(db.port, 5432);
        assert_eq!(db.sslmode, "disable");

        let worker = WorkerConfig::default();
        assert_eq!(worker.count, 5);
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
server:
  port: 9090

database:
  host: localhost
  user: relayflow
  password: secret
  dbname: relayflow

redis:
  addr: "localhost:6379"

admin:
  username: admin
  password: changeme
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.redis.addr, "localhost:6379");
        assert_eq!(config.worker.count, 5);
    }

    #[test]
    fn test_validate_requires_admin() {
        let yaml = r#"
database:
  host: localhost
redis:
  addr: "localhost:6379"
"#;
        let mut config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());

        config.admin.username = "admin".to_string();
        config.admin.password = "changeme".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_redis() {
        let yaml = r#"
database:
  host: localhost
admin:
  username: admin
  password: changeme
"#;
        let mut config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_url() {
        let db = DatabaseConfig {
            host: "db.internal".to_string(),
            port: 5432,
            user: "relayflow".to_string(),
            password: "pw".to_string(),
            dbname: "relayflow".to_string(),
            sslmode: "disable".to_string(),
        };
        assert_eq!(
            db.url(),
            "postgres://relayflow:pw@db.internal:5432/relayflow?sslmode=disable"
        );
    }
}
