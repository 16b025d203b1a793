//! Configuration module
//!
//! Settings are read from the environment (a `.env` file is honored through `dotenvy`).

use std::env;

const SERVER_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const EXPORT_STREAM_BUFFER: usize = 8;

/// Server settings independent of the export pipeline
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
}

#[derive(Clone, Debug)]
pub struct ExportServiceConfig {
    pub base: BaseConfig,
    /// Postgres connection string; the in-memory backend is used when absent
    pub database_url: Option<String>,
    pub local_storage_path: String,
    /// Base URL of the notebook, used in QR codes and entity links
    pub public_url: String,
    /// Chunks buffered between a streaming maker and the response body
    pub export_stream_buffer: usize,
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config(pub Box<ExportServiceConfig>);

impl Config {
    fn inner(&self) -> &ExportServiceConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = ExportServiceConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.inner().base.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn database_url(&self) -> Option<&str> {
        self.inner().database_url.as_deref()
    }

    pub fn local_storage_path(&self) -> &str {
        &self.inner().local_storage_path
    }

    pub fn public_url(&self) -> &str {
        &self.inner().public_url
    }

    pub fn export_stream_buffer(&self) -> usize {
        self.inner().export_stream_buffer
    }
}

impl ExportServiceConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            environment,
        };

        let config = ExportServiceConfig {
            base,
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|_| "./data/uploads".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", SERVER_PORT)),
            export_stream_buffer: env::var("EXPORT_STREAM_BUFFER")
                .unwrap_or_else(|_| EXPORT_STREAM_BUFFER.to_string())
                .parse()
                .unwrap_or(EXPORT_STREAM_BUFFER),
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let Some(url) = &self.database_url {
            if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if !self.public_url.starts_with("http://") && !self.public_url.starts_with("https://") {
            return Err(anyhow::anyhow!("PUBLIC_URL must be an http(s) URL"));
        }

        if self.export_stream_buffer == 0 {
            return Err(anyhow::anyhow!("EXPORT_STREAM_BUFFER must be at least 1"));
        }

        let environment = self.base.environment.to_lowercase();
        let is_production = environment == "production" || environment == "prod";
        if is_production && self.base.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExportServiceConfig {
        ExportServiceConfig {
            base: BaseConfig {
                server_port: 4000,
                cors_origins: vec!["*".to_string()],
                db_max_connections: 5,
                db_timeout_seconds: 5,
                environment: "development".to_string(),
            },
            database_url: None,
            local_storage_path: "/tmp/labnote".to_string(),
            public_url: "https://eln.example.org".to_string(),
            export_stream_buffer: 8,
        }
    }

    #[test]
    fn test_validate_accepts_memory_backend() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_database_url() {
        let mut config = sample();
        config.database_url = Some("mysql://localhost/eln".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_wildcard_cors_in_production() {
        let mut config = sample();
        config.base.environment = "production".to_string();
        assert!(config.validate().is_err());
        config.base.cors_origins = vec!["https://eln.example.org".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_stream_buffer() {
        let mut config = sample();
        config.export_stream_buffer = 0;
        assert!(config.validate().is_err());
    }
}
