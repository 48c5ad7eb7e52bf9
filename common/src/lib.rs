//! Tasa Common Types
//!
//! This crate contains the shared data model of the Tasa rate engine:
//! currencies and their registry, configured currency pairs, margin math,
//! persisted rates with their manual-override state, and the error taxonomy
//! every other crate reports through.

pub mod identifiers;
pub mod currency;
pub mod pair;
pub mod rate;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use currency::*;
pub use pair::*;
pub use rate::*;
pub use error::*;
pub use time::*;
