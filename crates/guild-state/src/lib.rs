//! guild-state: embedded state store for the Guild hello service.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for the greeting parameter, per-period metrics snapshots, the
//! provisioned-concurrency pool status, and alarm records.
//!
//! # Architecture
//!
//! All record types are JSON-serialized into redb's `&[u8]` value columns.
//! Metrics snapshots are keyed by a zero-padded period epoch so a reverse
//! scan yields the newest period first.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. It also implements
//! [`ParameterStore`], the read-only key-value interface the greeting
//! resolver consumes.

pub mod error;
pub mod params;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use params::{ParameterError, ParameterStore, ReadGrant};
pub use store::StateStore;
pub use types::*;
