use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::{debug, warn};

use crate::db::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

/// Caller role attached to an API token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employee,
    Client,
}

impl Role {
    /// Roles allowed to create, update and delete records
    pub fn can_write(&self) -> bool {
        matches!(self, Role::Admin | Role::Employee)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiToken {
    pub token: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<ApiToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        PaginationConfig {
            default_limit: default_page_limit(),
            max_limit: default_max_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig::default(),
            database_path: default_database_path(),
            auth: AuthConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_database_path() -> String {
    "revenue.db".to_string()
}

fn default_page_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

fn default_max_limit() -> u32 {
    MAX_PAGE_LIMIT
}

impl AppConfig {
    /// Load from an optional YAML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => {
                debug!("No config file given, using defaults");
                AppConfig::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate();
        Ok(config)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// `REVENUE_DB_PATH`, `REVENUE_HOST`, `REVENUE_PORT` and
    /// `REVENUE_API_TOKEN` (an extra admin token) override the file.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("REVENUE_DB_PATH") {
            self.database_path = path;
        }
        if let Some(host) = lookup("REVENUE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("REVENUE_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("REVENUE_PORT is not a valid port: {}", port))?;
        }
        if let Some(token) = lookup("REVENUE_API_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.auth.tokens.push(ApiToken {
                token: token.trim().to_string(),
                name: "env-admin".to_string(),
                role: Role::Admin,
            });
        }
        Ok(())
    }

    fn validate(&mut self) {
        if self.pagination.max_limit == 0 {
            warn!("pagination.max_limit is 0, using {}", MAX_PAGE_LIMIT);
            self.pagination.max_limit = MAX_PAGE_LIMIT;
        }
        let max_limit = self.pagination.max_limit;
        if self.pagination.default_limit == 0 || self.pagination.default_limit > max_limit {
            warn!(
                default_limit = self.pagination.default_limit,
                max_limit = self.pagination.max_limit,
                "pagination.default_limit out of range, clamping"
            );
            self.pagination.default_limit = self.pagination.default_limit.clamp(1, max_limit);
        }
        if self.auth.tokens.is_empty() {
            warn!("No API tokens configured; every revenue request will be rejected");
        }
    }

    pub fn find_token(&self, token: &str) -> Option<&ApiToken> {
        self.auth.tokens.iter().find(|t| t.token == token)
    }
}
