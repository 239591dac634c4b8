use crate::config::{CacheConfig, ServeArgs, ServerConfig, StoreConfig};
use crate::error::ServerError;

/// Разобрать и провалидировать конфиг без подключения к backend'ам.
pub fn run(args: ServeArgs) -> Result<(), ServerError> {
    let config = ServerConfig::load(&args.config)?;
    config.validate()?;

    let store = match &config.store {
        StoreConfig::Memory => "memory",
        StoreConfig::Postgres(_) => "postgres",
    };
    let cache = match &config.cache {
        CacheConfig::Memory(_) => "memory",
        CacheConfig::Redis(_) => "redis",
    };
    tracing::info!(
        config = %args.config,
        bind = %config.http.bind,
        store,
        cache,
        topics = ?config.topics.all(),
        "config ok"
    );
    Ok(())
}
