pub mod services;
pub mod storage;

pub use storage::{MemoryObjectStorage, ObjectStorage, S3Storage};
