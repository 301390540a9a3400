//! In-memory storage backend and validation helpers

pub mod memory_storage;
pub mod validation;

pub use memory_storage::{MemoryStorage, StorageOperation};
pub use validation::*;
