use std::time::Duration;

use serde::Deserialize;

use shortener_api::{Acks, OverflowPolicy};

// ═══════════════════════════════════════════════════════════════
//  LogConfig
// ═══════════════════════════════════════════════════════════════

/// Параметры in-process лога.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Число партиций в каждом topic'е.
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    /// Размер буфера между fetcher'ом партиции и claim'ом.
    #[serde(default = "default_claim_buffer")]
    pub claim_buffer: usize,
    /// Сколько сообщений fetcher читает из партиции за раз.
    #[serde(default = "default_fetch_batch")]
    pub fetch_batch: usize,
}

fn default_partitions() -> u32 {
    4
}
fn default_claim_buffer() -> usize {
    1024
}
fn default_fetch_batch() -> usize {
    256
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
            claim_buffer: default_claim_buffer(),
            fetch_batch: default_fetch_batch(),
        }
    }
}

impl LogConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.partitions == 0 {
            return Err("log.partitions must be > 0".into());
        }
        if self.claim_buffer == 0 || self.fetch_batch == 0 {
            return Err("log.claim_buffer and log.fetch_batch must be > 0".into());
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  WriteBufferConfig
// ═══════════════════════════════════════════════════════════════

/// Параметры producer'а: окно склейки, bounded канал, acks.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteBufferConfig {
    #[serde(default = "default_flush_window_ms")]
    pub flush_window_ms: u64,
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    #[serde(default = "default_overflow")]
    pub overflow: OverflowPolicy,
    #[serde(default)]
    pub acks: Acks,
    /// Максимум сообщений в одном publish_batch.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_flush_window_ms() -> u64 {
    500
}
fn default_buffer() -> usize {
    4096
}
fn default_overflow() -> OverflowPolicy {
    OverflowPolicy::BackPressure
}
fn default_max_batch() -> usize {
    1000
}

impl Default for WriteBufferConfig {
    fn default() -> Self {
        Self {
            flush_window_ms: default_flush_window_ms(),
            buffer: default_buffer(),
            overflow: default_overflow(),
            acks: Acks::All,
            max_batch: default_max_batch(),
        }
    }
}

impl WriteBufferConfig {
    pub fn flush_window(&self) -> Duration {
        Duration::from_millis(self.flush_window_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.buffer == 0 || self.max_batch == 0 {
            return Err("write buffer size and max_batch must be > 0".into());
        }
        Ok(())
    }
}
