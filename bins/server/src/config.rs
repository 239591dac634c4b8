use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use cache_redis::RedisConfig;
use ingest::IngestConfig;
use link_service::{IdentityConfig, ShortenerConfig};
use log_engine::{LogConfig, WriteBufferConfig};
use shortener_api::TopicNames;
use storage_memory::MemoryCacheConfig;
use storage_postgres::PostgresConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "shortener-server", about = "Сокращатель ссылок")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить сервер
    Serve(ServeArgs),
    /// Проверить конфиг и выйти
    CheckConfig(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "config.toml", env = "CONFIG_PATH")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".into()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Durable store, выбирается по `backend`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    Memory,
    Postgres(PostgresConfig),
}

/// Кэш code → URL, выбирается по `backend`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum CacheConfig {
    Memory(MemoryCacheConfig),
    Redis(RedisConfig),
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::Memory(MemoryCacheConfig::default())
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub topics: TopicNames,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub write_buffer: WriteBufferConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub shortener: ShortenerConfig,
    /// Сколько ждать фоновые задачи после Ctrl+C, прежде чем abort.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

fn invalid(detail: String) -> ServerError {
    ServerError::Config { context: "validate", detail }
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.topics.links == self.topics.accounts {
            return Err(invalid("topics.links and topics.accounts must differ".into()));
        }
        self.log.validate().map_err(invalid)?;
        self.write_buffer.validate().map_err(invalid)?;
        self.ingest.validate().map_err(invalid)?;
        self.identity.validate().map_err(invalid)?;
        self.shortener.validate().map_err(invalid)?;
        match &self.store {
            StoreConfig::Memory => {}
            StoreConfig::Postgres(pg) => pg.validate().map_err(invalid)?,
        }
        match &self.cache {
            CacheConfig::Memory(_) => {}
            CacheConfig::Redis(redis) => redis.validate().map_err(invalid)?,
        }
        Ok(())
    }
}
