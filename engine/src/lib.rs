//! Tasa Derivation Engine
//!
//! Turns one run's marketplace quotes and operator overrides into the full
//! rate set, then writes it back without disturbing manual overrides.
//!
//! # Steps
//!
//! 1. Effective rates: the manual override of a pair if present, else its
//!    fresh quote.
//! 2. Base pairs pass their fresh quote through.
//! 3. Derived pairs apply their margin to the effective rate of their base.
//! 4. Cross pairs divide `from -> bridge` by `bridge -> to` and apply their
//!    margin.
//! 5. Candidates are keyed by ordered pair; non-positive or overflowing
//!    results are discarded.
//!
//! [`DerivationEngine::derive`] is a pure function of its inputs. A failure
//! local to one pair is reported next to the output and never stops the
//! others.

pub mod derivation;
pub mod reconcile;

pub use derivation::{DerivationEngine, DerivationOutput, PairIssue};
pub use reconcile::{Reconciler, WriteOutcome, WriteStatus};
