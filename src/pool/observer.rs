//! Observer protocol consumed by the reporting layers.

use super::base::BasePool;
use super::reaction::Reaction;

/// Synchronous listener invoked by the pool as it evolves.
///
/// Every method defaults to a no-op, so implementors override only what they
/// need. Callbacks run before the next step, on the reactor's thread.
pub trait PoolObserver {
    /// Fired once per committed reaction.
    fn on_reaction_computed(&mut self, pool: &BasePool, reaction: &Reaction) {
        let _ = (pool, reaction);
    }

    /// Fired after every step.
    fn on_step_computed(&mut self, pool: &BasePool, tick: u64) {
        let _ = (pool, tick);
    }

    /// Fired after a full pass over the population.
    fn on_generation_computed(&mut self, generation: u64) {
        let _ = generation;
    }
}
