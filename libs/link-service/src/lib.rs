//! Пишущая и читающая сторона сокращателя ссылок.
//!
//! Запись: код выбирается через [`ExistenceOracle`], запись уходит в
//! лог через [`WriteBuffer`](log_engine::WriteBuffer) и попадает в store
//! позже, после flush'а ingestor'а. Чтение: [`CacheAsideReader`].

pub mod accounts;
pub mod config;
pub mod error;
pub mod generator;
pub mod identity;
pub mod oracle;
pub mod password;
pub mod resolver;
pub mod shortener;

#[cfg(test)]
mod testing;

pub use accounts::{AccountService, LoginRequest, RegisterRequest, Session};
pub use config::{IdentityConfig, ShortenerConfig};
pub use error::ServiceError;
pub use identity::JwtIdentity;
pub use oracle::ExistenceOracle;
pub use resolver::CacheAsideReader;
pub use shortener::{HistoryEntry, LinkService, ShortenRequest, Shortened};
