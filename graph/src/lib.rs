//! Tasa Pair Configuration Graph
//!
//! Directed graph of configured currency pairs. Each pair is BASE (quoted by
//! the marketplace or priced manually), DERIVED (a base plus a margin) or
//! CROSS (fiat to fiat through a bridge asset).
//!
//! Pairs live in a flat map keyed by [`PairId`](tasa_common::PairId); base
//! references are IDs resolved by lookup, which keeps cycle detection a plain
//! traversal with a visited set.
//!
//! # Example
//!
//! ```rust,ignore
//! use tasa_graph::{PairGraph, PairsFile};
//!
//! let seed: PairsFile = serde_json::from_str(&std::fs::read_to_string("config/pairs.json")?)?;
//! let graph = PairGraph::from_seed(seed)?;
//!
//! for pair in graph.list_derived_pairs() {
//!     let base = graph.resolve_base(pair)?;
//!     println!("{} <- {}", pair, base);
//! }
//! ```

pub mod graph;
pub mod seed;

pub use graph::{PairGraph, PairSummary};
pub use seed::{parse_pair_symbol, CurrencySeed, PairSeed, PairsFile};
