pub mod constants;
pub mod error;
pub mod io;
pub mod memory;
pub mod page;
pub mod process;
pub mod stress;
pub mod translation;
pub mod vm_manager;

// Re-export commonly used items for convenience
pub use error::{ConfigError, FrameError, MemoryError};
pub use memory::{EvictionPolicy, FrameStore};
pub use translation::VirtualAddress;
pub use vm_manager::{Command, MemoryManager, Outcome};
