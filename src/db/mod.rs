pub mod memory;
pub mod pgstore;
pub mod store;

pub use memory::MemoryStore;
pub use pgstore::PgStore;
pub use store::{Store, StoreError};
