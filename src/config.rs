use anyhow::{Context, Result};
use std::{env, net::SocketAddr, path::PathBuf};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_CSV_PATH: &str = "food-safety-permits.csv";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Deployment environment, read from NODE_ENV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    fn from_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "production" => Environment::Production,
            _ => Environment::Development,
        }
    }

    /// Production connects over TLS without verifying the server certificate;
    /// everything else connects in plain text.
    pub fn requires_tls(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub environment: Environment,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub csv_path: PathBuf,
}

impl Settings {
    /// Load from the process environment (after `.env`, if present)
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Like `from_env`, with an explicit database URL taking precedence
    pub fn load(database_url: Option<&str>) -> Result<Self> {
        let _ = dotenv::dotenv();
        Self::from_vars(database_url, |key| env::var(key).ok())
    }

    fn from_vars(
        database_url: Option<&str>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let database_url = match database_url {
            Some(url) => url.to_string(),
            None => var("DATABASE_URL").context("DATABASE_URL must be set")?,
        };
        let mut settings = Self::for_database(&database_url);

        settings.environment = Environment::from_value(var("NODE_ENV").as_deref());

        if let Some(max) = var("DATABASE_MAX_CONNECTIONS")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|v| *v > 0)
        {
            settings.max_connections = max;
        }

        if let Some(raw) = var("BIND_ADDR") {
            settings.bind_addr = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid BIND_ADDR: {}", raw))?;
        }

        if let Some(path) = var("FOOD_PERMITS_CSV") {
            settings.csv_path = PathBuf::from(path);
        }

        Ok(settings)
    }

    /// Defaults for everything except the database
    pub fn for_database(database_url: &str) -> Self {
        Settings {
            database_url: database_url.to_string(),
            environment: Environment::Development,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            csv_path: PathBuf::from(DEFAULT_CSV_PATH),
        }
    }
}
