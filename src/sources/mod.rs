//! Sources module
//!
//! Where batch files come from.
//!
//! # Components
//!
//! - `directory` - Polls a local drop directory, deleting files once processed
//! - `memory` - In-memory file source

pub mod directory;
pub mod memory;

pub use directory::DirectoryFileSource;
pub use memory::MemoryFileSource;
