//! Labnote Storage Library
//!
//! Attachment storage abstraction and its local filesystem implementation.
//!
//! # Storage key format
//!
//! Keys are relative paths such as `uploads/1/ab/abcdef.pdf`. They must not contain `..`
//! or start with `/`; every backend rejects such keys with [`StorageError::InvalidKey`].

pub mod local;
pub mod traits;

pub use local::LocalStorage;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
