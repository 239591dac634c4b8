use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ingest::{BatchIngestor, IngestStats};
use link_api_server::AppState;
use link_service::{AccountService, JwtIdentity, LinkService};
use log_engine::{MemoryLog, WriteBuffer, WriteBufferStats};
use shortener_api::{AccountStore, Cache, ConsumerGroup, IdentityOracle, LinkStore, LogPublisher};
use storage_memory::{MemoryCache, MemoryStore};
use storage_postgres::PostgresStore;
use cache_redis::RedisCache;

use crate::config::{CacheConfig, ServeArgs, ServerConfig, StoreConfig};
use crate::error::ServerError;

type Task = (&'static str, JoinHandle<Result<(), ServerError>>);

/// Фоновая задача: при ошибке отменяет `token`, чтобы остановить процесс.
fn supervise<F>(name: &'static str, token: CancellationToken, fut: F) -> Task
where
    F: Future<Output = Result<(), ServerError>> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let result = fut.await;
        if let Err(e) = &result {
            tracing::error!(task = name, error = %e, "task failed, shutting down");
            token.cancel();
        }
        result
    });
    (name, handle)
}

struct Stores {
    links: Arc<dyn LinkStore>,
    accounts: Arc<dyn AccountStore>,
    postgres: Option<Arc<PostgresStore>>,
}

async fn open_store(config: &StoreConfig) -> Result<Stores, ServerError> {
    match config {
        StoreConfig::Memory => {
            tracing::warn!("memory store: data is lost on restart");
            let store = Arc::new(MemoryStore::default());
            Ok(Stores { links: store.clone(), accounts: store, postgres: None })
        }
        StoreConfig::Postgres(pg) => {
            let store = Arc::new(PostgresStore::connect(pg).await?);
            Ok(Stores { links: store.clone(), accounts: store.clone(), postgres: Some(store) })
        }
    }
}

async fn open_cache(config: &CacheConfig) -> Result<Arc<dyn Cache>, ServerError> {
    Ok(match config {
        CacheConfig::Memory(mem) => Arc::new(MemoryCache::new(mem.clone())),
        CacheConfig::Redis(redis) => Arc::new(RedisCache::connect(redis).await?),
    })
}

/// Запущенный сервер. У каждой стадии свой token: остановка идёт
/// по порядку HTTP, write buffer, ingestor.
struct Running {
    config: ServerConfig,
    log: MemoryLog,
    stores: Stores,
    links: Arc<LinkService>,
    /// Отменяется по Ctrl+C или при падении задачи.
    token: CancellationToken,
    http_token: CancellationToken,
    buffer_token: CancellationToken,
    ingest_token: CancellationToken,
    http: Task,
    write_buffer: Task,
    ingest: Task,
    buffer_stats: Arc<WriteBufferStats>,
    ingest_stats: Arc<IngestStats>,
}

async fn start(config: ServerConfig) -> Result<Running, ServerError> {
    let token = CancellationToken::new();
    let http_token = CancellationToken::new();
    let buffer_token = CancellationToken::new();
    let ingest_token = CancellationToken::new();

    // --- Backends ---
    let stores = open_store(&config.store).await?;
    let cache = open_cache(&config.cache).await?;
    let identity: Arc<dyn IdentityOracle> = Arc::new(JwtIdentity::new(&config.identity));

    // --- Log + write buffer ---
    let log = MemoryLog::new(config.log.clone(), &config.topics.all());
    tracing::info!(topics = ?log.topics(), partitions = config.log.partitions, "log ready");

    let publisher: Arc<dyn LogPublisher> = Arc::new(log.clone());
    let (buffer, buffer_handle) = WriteBuffer::spawn(publisher, &config.write_buffer, buffer_token.clone());
    let buffer_stats = buffer.stats();
    let write_buffer: Task = ("write_buffer", tokio::spawn(async move {
        buffer_handle.await.map_err(|e| ServerError::Task("write_buffer", e.to_string()))
    }));

    // --- Ingestor ---
    let member = log.group_member(&config.ingest.group, ingest_token.clone()).await;
    tracing::info!(group = %config.ingest.group, member = %member.member_id(), "ingestor joined group");
    let group: Arc<dyn ConsumerGroup> = Arc::new(member);
    let ingestor = Arc::new(BatchIngestor::new(
        config.topics.clone(),
        config.ingest.clone(),
        stores.links.clone(),
        stores.accounts.clone(),
        cache.clone(),
        ingest_token.clone(),
    ));
    let ingest_stats = ingestor.stats();
    let ingest = {
        let stop = ingest_token.clone();
        supervise("ingest", token.clone(), async move {
            ingest::run(group, ingestor, stop).await.map_err(ServerError::from)
        })
    };

    // --- HTTP ---
    let links = Arc::new(LinkService::new(
        config.shortener.clone(),
        &config.topics,
        stores.links.clone(),
        cache.clone(),
        identity.clone(),
        buffer.clone(),
    ));
    let accounts = Arc::new(AccountService::new(
        &config.topics,
        stores.accounts.clone(),
        identity,
        buffer,
        config.identity.password_cost,
    ));
    let state = AppState {
        links: links.clone(),
        accounts,
        cookie_max_age_secs: config.identity.token_ttl_secs,
    };
    let http = {
        let stop = http_token.clone();
        let bind = config.http.bind.clone();
        supervise("http", token.clone(), async move {
            link_api_server::run(&bind, state, stop).await.map_err(ServerError::Http)
        })
    };

    tracing::info!(bind = %config.http.bind, "server ready");

    Ok(Running {
        config,
        log,
        stores,
        links,
        token,
        http_token,
        buffer_token,
        ingest_token,
        http,
        write_buffer,
        ingest,
        buffer_stats,
        ingest_stats,
    })
}

/// Дождаться задачи до `deadline`, иначе abort. Первая ошибка
/// запоминается в `first_error`.
async fn join_task(task: Task, deadline: Instant, first_error: &mut Option<ServerError>) {
    let (name, mut handle) = task;
    match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(Ok(()))) => tracing::debug!(task = name, "task stopped"),
        Ok(Ok(Err(e))) => {
            first_error.get_or_insert(e);
        }
        Ok(Err(e)) => tracing::error!(task = name, error = %e, "task panicked"),
        Err(_) => {
            tracing::warn!(task = name, "task did not stop in time, aborting");
            handle.abort();
        }
    }
}

impl Running {
    /// Остановка по стадиям, всё в пределах grace deadline:
    /// HTTP перестаёт принимать запросы, write buffer публикует остаток,
    /// ingestor дочитывает лог до конца и только потом выходит.
    async fn shutdown(self) -> Result<(), ServerError> {
        self.token.cancel();
        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_grace_secs);
        let mut first_error: Option<ServerError> = None;

        self.http_token.cancel();
        join_task(self.http, deadline, &mut first_error).await;

        self.buffer_token.cancel();
        join_task(self.write_buffer, deadline, &mut first_error).await;

        let group = &self.config.ingest.group;
        if !self.ingest.1.is_finished() {
            if self.log.wait_drained(group, deadline).await {
                tracing::info!(group = %group, "log drained");
            } else {
                tracing::warn!(group = %group, lag = self.log.lag(group).await, "log not drained before deadline");
            }
        }
        self.ingest_token.cancel();
        join_task(self.ingest, deadline, &mut first_error).await;

        if let Some(pg) = &self.stores.postgres {
            pg.close().await;
        }

        tracing::info!(
            submitted = WriteBufferStats::get(&self.buffer_stats.submitted),
            published = WriteBufferStats::get(&self.buffer_stats.published),
            publish_errors = WriteBufferStats::get(&self.buffer_stats.publish_errors),
            dropped = WriteBufferStats::get(&self.buffer_stats.dropped),
            ingest = ?self.ingest_stats.snapshot(),
            "shutdown complete"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("shortener-server starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    config.validate()?;
    tracing::info!(config = %args.config, "loaded config");

    let running = start(config).await?;

    // --- Ожидание Ctrl+C или падения задачи ---
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("shutting down...");
        }
        _ = running.token.cancelled() => {
            tracing::warn!("a task stopped the server, shutting down...");
        }
    }

    running.shutdown().await
}
