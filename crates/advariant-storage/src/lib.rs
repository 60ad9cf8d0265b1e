//! S3-compatible object storage client.
//!
//! This crate provides:
//! - Prefix/suffix listing of batch folders
//! - Downloads where a missing key is `None`, not an error
//! - Uploads with an explicit overwrite flag
//! - Recursive directory upload for render output folders

pub mod client;
pub mod error;

pub use client::{content_type_for, ObjectInfo, StorageClient, StorageConfig};
pub use error::{StorageError, StorageResult};
