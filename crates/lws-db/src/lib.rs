//! # lws-db
//! Persistent account store for the light-wallet server.
//!
//! [`Storage`] is the single writer used by the scanner. [`StorageReader`]
//! binds a RocksDB snapshot and hands out typed cursor streams that borrow it,
//! so nothing read through a reader can outlive the snapshot.

pub mod config;
pub mod reader;
pub mod schema;
pub mod storage;
pub mod stream;

pub use config::LwsConfig;
pub use reader::StorageReader;
pub use storage::Storage;
pub use stream::{FieldIterator, KeyIterator, KeyStream, ValueIterator, ValueStream};
