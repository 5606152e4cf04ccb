//! The transactional stochastic reactor.
//!
//! This module provides:
//! - `Reaction`/`ReactionKind`: the records broadcast per committed reaction
//! - `PoolObserver`: the synchronous listener protocol
//! - `BasePool`: live species, withdrawal staging and all-or-nothing commits
//! - `Pool`: action sampling, reduce regimes, combination protocols,
//!   replenishment and snapshots

pub mod base;
pub mod observer;
pub mod reaction;
pub mod reactor;

pub use base::BasePool;
pub use observer::PoolObserver;
pub use reaction::{Reaction, ReactionKind};
pub use reactor::{
    BreakPosition, CombinationMethod, Pool, PoolConfig, PoolError, ReduceRegime,
};
