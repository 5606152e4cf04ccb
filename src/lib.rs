//! Artificial chemistry over combinatory logic.
//!
//! A pool of combinator expressions evolves under three stochastic
//! elementary reactions: reduction rewrites a molecule by one combinator
//! rule, combination applies one molecule to another, and breaking splits a
//! molecule at an application boundary. Reduction is mass-aware (the S-rule
//! duplicates only what the pool can physically supply) and every reaction
//! commits transactionally, so no molecule is double-counted or lost.
//!
//! This crate provides:
//! - `Combinator`: the six rewrite generators S, K, I, B, C, W
//! - `Expression`: immutable application trees with deterministic and
//!   stochastic reduction
//! - `WeightedSampler`: bucket-by-magnitude weighted sampling
//! - `Multiset`: the counted species inventory
//! - `Pool`/`BasePool`: the transactional stochastic reactor

pub mod combinator;
pub mod expression;
pub mod multiset;
pub mod parser;
pub mod pool;
pub mod sampler;

pub use combinator::{Combinator, Reservoir, Rewrite};
pub use expression::{Expression, Redex, Reduction};
pub use multiset::Multiset;
pub use parser::{parse_expression, ParseError};
pub use pool::{
    BasePool, BreakPosition, CombinationMethod, Pool, PoolConfig, PoolError, PoolObserver,
    Reaction, ReactionKind, ReduceRegime,
};
pub use sampler::{SamplerError, WeightedSampler};
