//! Tasa Rate Store
//!
//! Append-only history of rates per ordered currency pair. Exactly one row per
//! pair is active; superseding a row flips the old one inactive and the new
//! one active in a single step, so readers never observe a pair without an
//! active rate mid-transition.
//!
//! Backends:
//! - [`InMemoryRateStore`]: dashmap-backed, per-pair entry locking
//! - `PgRateStore` (feature `postgres`): sqlx, one transaction per pair

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod store;

pub use memory::InMemoryRateStore;
#[cfg(feature = "postgres")]
pub use postgres::PgRateStore;
pub use store::{cleared_successor, manual_successor, RateStore, MANUAL_SOURCE};
