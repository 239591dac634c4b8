mod store;
mod cache;

pub use store::MemoryStore;
pub use cache::{MemoryCache, MemoryCacheConfig};
