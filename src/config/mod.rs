use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

/// Upper bound for `security.jwt_expiry_hours` (one year)
pub const MAX_JWT_EXPIRY_HOURS: u64 = 24 * 365;

/// JWT secret used when nothing is configured. Refused in production.
pub const DEVELOPMENT_JWT_SECRET: &str = "development-secret-change-me";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
    pub dev_user: Option<DevUserConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL. When absent the server runs on in-memory repositories.
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory on disk that stored paths are relative to.
    pub root: String,
    /// Sub-directory of `root` receiving product images.
    pub image_dir: String,
    pub allowed_extensions: Vec<String>,
}

/// Account created on startup when it does not exist yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevUserConfig {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SECURITY_JWT_SECRET must be set in {0:?}")]
    InsecureJwtSecret(Environment),

    #[error("storage.allowed_extensions must not be empty")]
    NoAllowedExtensions,

    #[error("SECURITY_JWT_EXPIRY_HOURS must be between 1 and {max}, got {0}", max = MAX_JWT_EXPIRY_HOURS)]
    JwtExpiryOutOfRange(u64),
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            if !v.trim().is_empty() {
                self.database.url = Some(v);
            }
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // API overrides
        if let Some(v) = env::var("API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }

        // Storage overrides
        if let Ok(v) = env::var("STORAGE_ROOT") {
            self.storage.root = v;
        }
        if let Ok(v) = env::var("STORAGE_IMAGE_DIR") {
            self.storage.image_dir = v;
        }
        if let Ok(v) = env::var("STORAGE_ALLOWED_EXTENSIONS") {
            self.storage.allowed_extensions = split_list(&v);
        }

        // Development account, only when both halves are present
        if let (Ok(email), Ok(password)) = (env::var("DEV_USER_EMAIL"), env::var("DEV_USER_PASSWORD")) {
            self.dev_user = Some(DevUserConfig {
                name: env::var("DEV_USER_NAME").unwrap_or_else(|_| "Developer".to_string()),
                email,
                password,
            });
        }

        self
    }

    /// Reject combinations the server must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment != Environment::Development
            && (self.security.jwt_secret.is_empty() || self.security.jwt_secret == DEVELOPMENT_JWT_SECRET)
        {
            return Err(ConfigError::InsecureJwtSecret(self.environment.clone()));
        }
        if self.storage.allowed_extensions.is_empty() {
            return Err(ConfigError::NoAllowedExtensions);
        }
        if !(1..=MAX_JWT_EXPIRY_HOURS).contains(&self.security.jwt_expiry_hours) {
            return Err(ConfigError::JwtExpiryOutOfRange(self.security.jwt_expiry_hours));
        }
        Ok(())
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            api: ApiConfig {
                port: 3000,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                jwt_secret: DEVELOPMENT_JWT_SECRET.to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            storage: StorageConfig {
                root: "storage".to_string(),
                image_dir: "public/images".to_string(),
                allowed_extensions: default_extensions(),
            },
            dev_user: None,
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            api: ApiConfig {
                port: 3000,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            storage: StorageConfig {
                root: "storage".to_string(),
                image_dir: "public/images".to_string(),
                allowed_extensions: default_extensions(),
            },
            dev_user: None,
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            api: ApiConfig {
                port: 8080,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 1,
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            storage: StorageConfig {
                root: "/var/lib/product-api".to_string(),
                image_dir: "public/images".to_string(),
                allowed_extensions: default_extensions(),
            },
            dev_user: None,
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["jpg".to_string(), "png".to_string()]
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - read once by the binary, then handed out by value
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.database.url.is_none());
        assert_eq!(config.storage.allowed_extensions, vec!["jpg", "png"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_requires_secret() {
        let mut config = AppConfig::production();
        assert!(matches!(config.validate(), Err(ConfigError::InsecureJwtSecret(_))));

        config.security.jwt_secret = DEVELOPMENT_JWT_SECRET.to_string();
        assert!(config.validate().is_err());

        config.security.jwt_secret = "a-real-secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_allow_list_rejected() {
        let mut config = AppConfig::development();
        config.storage.allowed_extensions.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoAllowedExtensions)));
    }

    #[test]
    fn test_jwt_expiry_is_bounded() {
        let mut config = AppConfig::development();
        for hours in [0, MAX_JWT_EXPIRY_HOURS + 1, u64::MAX] {
            config.security.jwt_expiry_hours = hours;
            assert!(matches!(config.validate(), Err(ConfigError::JwtExpiryOutOfRange(h)) if h == hours));
        }

        config.security.jwt_expiry_hours = MAX_JWT_EXPIRY_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_split_list_trims_and_drops_blanks() {
        assert_eq!(split_list(" jpg, png ,,gif"), vec!["jpg", "png", "gif"]);
    }
}
