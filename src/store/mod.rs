//! Implementations of the event and security collaborators

pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;
