//! Local Storage Adapters
//!
//! Implementations of [`LocalStore`](crate::application::ports::LocalStore)
//! for guest preferences:
//!
//! - [`JsonFileStore`]: one JSON document on disk, keyed by entry
//! - [`MemoryStore`]: in-process map for tests and ephemeral runs

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
