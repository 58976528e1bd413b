//! Key-value storage backends
//!
//! The tree talks to storage only through [`KvStore`]. Two backends ship
//! with the crate: an in-memory map and a single-file append log.

mod file_store;
mod memory;
mod traits;

pub use file_store::FileStore;
pub use memory::MemoryStore;
pub use traits::KvStore;
