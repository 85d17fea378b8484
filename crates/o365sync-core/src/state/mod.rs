// # Config Store Implementations
//
// This module provides implementations of the ConfigStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::{DEFAULT_DOCUMENT_PATH, FileConfigStore};
pub use memory::MemoryConfigStore;
