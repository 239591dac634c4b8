pub mod error;
pub mod types;
pub mod store;
pub mod cache;
pub mod log;
pub mod identity;
pub mod util;

pub use error::{
    CacheError, ErrorKind, HandlerError, IdentityError, LogError, StoreError,
};
pub use types::{
    Acks, AccountRecord, Credentials, InsertOutcome, InsertReport, LinkRecord,
    LinkTarget, LogMessage, OutgoingMessage, OverflowPolicy, TopicNames,
    ALPHABET, ANONYMOUS_OWNER, bounded_ttl, is_valid_code,
};
pub use store::{AccountStore, LinkStore};
pub use cache::Cache;
pub use log::{Claim, ConsumerGroup, GroupHandler, GroupSession, LogPublisher, SessionEnd};
pub use identity::IdentityOracle;
pub use util::now_ms;
