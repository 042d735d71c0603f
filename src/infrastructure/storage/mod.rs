//! Persistent key-value storage backing the reservation cache.
//!
//! Operations are synchronous so that callers can wrap a read-then-write
//! sequence in a single critical section without yielding.

mod error;
mod file;
mod memory;

pub use error::StoreError;
pub use file::JsonFileStore;
pub use memory::InMemoryStore;

/// String key-value store with get/set/remove semantics
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys starting with `prefix`, in ascending order
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
