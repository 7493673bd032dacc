//! Storage layer for datachat - object store used for artifacts and uploads.
//!
//! Backends implement [`ObjectStore`]. The filesystem store is the default;
//! the in-memory store serves tests and dry runs.

mod fs;
mod memory;
mod traits;

pub use fs::FsStore;
pub use memory::MemoryStore;
pub use traits::{ObjectStore, StorageError, check_key};
