//! Layered configuration: built-in defaults, then `text2sql.toml`, then
//! `TEXT2SQL_*` environment variables (`__` separates nested keys, e.g.
//! `TEXT2SQL_PIPELINE__TOP_K=5`). A `.env` file is loaded first when present.

use crate::application::use_cases::query_executor::{ExecutionLimits, RowMode};
use crate::application::use_cases::text2sql_pipeline::PipelineSettings;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{EmbeddingConfig, LLMConfig};
use crate::domain::ports::TableScope;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use validator::Validate;

pub const CONFIG_FILE: &str = "text2sql.toml";
pub const ENV_PREFIX: &str = "TEXT2SQL_";
const KEYCHAIN_USER: &str = "text2sql";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the discrete fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    /// `env:VAR`, `keychain:name` or `plain:secret`.
    pub password_ref: Option<String>,
    #[validate(length(min = 1))]
    pub database: String,
    pub ssl_mode: String,
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,
    #[validate(range(min = 1, max = 300))]
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            username: "text2sql".to_string(),
            password_ref: None,
            database: "text2sql_db".to_string(),
            ssl_mode: "prefer".to_string(),
            max_connections: 5,
            connect_timeout_secs: 10,
            idle_timeout_secs: 300,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return PgConnectOptions::from_str(url)
                .map_err(|e| AppError::ConfigError(format!("Invalid database URL: {}", e)));
        }

        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.username)
            .ssl_mode(parse_ssl_mode(&self.ssl_mode));
        if let Some(reference) = self.password_ref.as_deref().filter(|r| !r.is_empty()) {
            options = options.password(&resolve_secret(reference)?);
        }
        Ok(options)
    }
}

fn parse_ssl_mode(ssl_mode: &str) -> PgSslMode {
    match ssl_mode.to_lowercase().as_str() {
        "disable" => PgSslMode::Disable,
        "allow" => PgSslMode::Allow,
        "prefer" => PgSslMode::Prefer,
        "require" => PgSslMode::Require,
        "verify-ca" => PgSslMode::VerifyCa,
        "verify-full" => PgSslMode::VerifyFull,
        _ => PgSslMode::Prefer,
    }
}

/// Resolves a secret reference.
/// `env:DB_PASSWORD` reads an environment variable, `keychain:name` reads
/// the OS keychain, `plain:value` is taken as is. Anything else is treated
/// as the literal secret.
pub fn resolve_secret(reference: &str) -> Result<String> {
    if let Some(env_key) = reference.strip_prefix("env:") {
        std::env::var(env_key).map_err(|_| {
            AppError::ConfigError(format!(
                "Environment variable '{}' not found for secret",
                env_key
            ))
        })
    } else if let Some(key_name) = reference.strip_prefix("keychain:") {
        let entry = keyring::Entry::new(key_name, KEYCHAIN_USER)
            .map_err(|e| AppError::ConfigError(format!("Failed to access keychain: {}", e)))?;
        entry.get_password().map_err(|e| {
            AppError::ConfigError(format!("Failed to retrieve secret from keychain: {}", e))
        })
    } else if let Some(plain) = reference.strip_prefix("plain:") {
        Ok(plain.to_string())
    } else {
        Ok(reference.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    #[validate(range(min = 1, max = 20))]
    pub top_k: usize,
    #[validate(range(min = -1.0, max = 1.0))]
    pub min_similarity: Option<f32>,
    #[validate(range(min = 256, max = 200000))]
    pub max_prompt_tokens: usize,
    #[validate(range(min = 1, max = 600))]
    pub generation_timeout_secs: u64,
    #[validate(range(min = 1, max = 3600))]
    pub statement_timeout_secs: u64,
    pub max_result_rows: Option<usize>,
    pub count_only: bool,
    #[validate(range(min = 1, max = 64))]
    pub max_concurrent_generations: usize,
    /// Empty derives the allowlist from the described tables.
    pub allowed_tables: Vec<String>,
    /// Restricts schema context to these tables; empty means all.
    pub schema_tables: Vec<String>,
    pub seed_defaults: bool,
    pub log_filter: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_similarity: None,
            max_prompt_tokens: 3000,
            generation_timeout_secs: 60,
            statement_timeout_secs: 30,
            max_result_rows: Some(1000),
            count_only: false,
            max_concurrent_generations: 4,
            allowed_tables: Vec::new(),
            schema_tables: Vec::new(),
            seed_defaults: true,
            log_filter: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            top_k: self.top_k,
            min_similarity: self.min_similarity,
            max_prompt_tokens: self.max_prompt_tokens,
            generation_timeout: Duration::from_secs(self.generation_timeout_secs),
            limits: ExecutionLimits {
                statement_timeout: Duration::from_secs(self.statement_timeout_secs),
                max_rows: self.max_result_rows,
                mode: if self.count_only {
                    RowMode::CountOnly
                } else {
                    RowMode::Rows
                },
            },
            max_concurrent_generations: self.max_concurrent_generations,
            allowed_tables: self.allowed_tables.clone(),
            table_scope: if self.schema_tables.is_empty() {
                TableScope::All
            } else {
                TableScope::Tables(self.schema_tables.clone())
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub llm: LLMConfig,
    #[validate(nested)]
    pub embedding: EmbeddingConfig,
    #[validate(nested)]
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Loads `.env`, then the layered sources from the working directory.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_figment(Self::figment(CONFIG_FILE))
    }

    pub fn figment(config_file: &str) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut config: AppConfig = figment
            .extract()
            .map_err(|e| AppError::ConfigError(format!("Failed to load configuration: {}", e)))?;
        config
            .validate()
            .map_err(|e| AppError::ConfigError(format!("Invalid configuration: {}", e)))?;

        config.llm.api_key = config.llm.api_key.as_deref().map(resolve_secret).transpose()?;
        config.embedding.api_key = config
            .embedding
            .api_key
            .as_deref()
            .map(resolve_secret)
            .transpose()?;
        Ok(config)
    }
}
