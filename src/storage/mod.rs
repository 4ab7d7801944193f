//! Storage module for source and result images

pub mod traits;
pub mod local;
pub mod s3;

pub use traits::{ObjectStore, StorageError};
pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;
