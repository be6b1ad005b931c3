//! Storage module
//!
//! Key-value persistence adapters and the typed local store built on top
//! of them.

pub mod kv;
pub mod local;

pub use kv::SqliteKeyValueStore;
pub use local::LocalStore;
