//! The stochastic reactor: action sampling, regimes and replenishment.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::combinator::{Combinator, Reservoir};
use crate::expression::Expression;
use crate::multiset::Multiset;
use crate::parser::ParseError;

use super::base::BasePool;
use super::observer::PoolObserver;
use super::reaction::{Reaction, ReactionKind};

const PROBABILITY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("action probabilities sum to {0}, expected 1")]
    InvalidProbabilities(f64),
    #[error("primitive proportions are invalid (sum {0}, expected 1 over nonnegative entries)")]
    InvalidProportions(f64),
    #[error("{primitives} primitives but {proportions} proportions")]
    MismatchedProportions { primitives: usize, proportions: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Snapshot(#[from] serde_json::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Where a break splits a molecule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakPosition {
    /// Last child against the rest.
    Top,
    /// A uniformly random internal boundary.
    Random,
}

/// How the reduce action is scheduled against break and combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceRegime {
    /// Sample one of the three actions per step.
    Random,
    /// Always attempt reduction first; coin-flip break against combine only
    /// when the popped species is irreducible.
    Priority,
}

/// How two molecules agree to combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombinationMethod {
    /// Two independent popped candidates must both choose combination.
    Consense,
    /// One popped candidate immediately grabs a second.
    Unilateral,
}

/// Reactor configuration.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Molecule capacity; also the number of atoms seeded at construction.
    pub capacity: usize,
    pub p_reduce: f64,
    pub p_combine: f64,
    pub p_break: f64,
    /// Cap on enumerated redexes per stochastic reduction. The cap is
    /// positional, so it narrows the support of the sampled step.
    pub max_sample_reductions: Option<usize>,
    pub break_position: BreakPosition,
    pub reduce_regime: ReduceRegime,
    /// Largest synthesizable compound; `None` disables auto-synthesis.
    pub food_size: Option<usize>,
    pub combination_method: CombinationMethod,
    /// Primitive alphabet used for replenishment.
    pub primitives: Vec<Combinator>,
    /// Replenishment proportions, aligned with `primitives`.
    pub proportions: Vec<f64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            p_reduce: 1.0 / 3.0,
            p_combine: 1.0 / 3.0,
            p_break: 1.0 / 3.0,
            max_sample_reductions: Some(250),
            break_position: BreakPosition::Top,
            reduce_regime: ReduceRegime::Random,
            food_size: None,
            combination_method: CombinationMethod::Consense,
            primitives: vec![Combinator::I, Combinator::K, Combinator::S],
            proportions: vec![1.0 / 3.0; 3],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Reduce,
    Combine,
    Break,
}

/// The stochastic reactor over a transactional [`BasePool`].
pub struct Pool {
    base: BasePool,
    p_reduce: f64,
    p_combine: f64,
    p_break: f64,
    frozen_p: Option<(f64, f64, f64)>,
    max_sample_reductions: Option<usize>,
    break_position: BreakPosition,
    reduce_regime: ReduceRegime,
    combination_method: CombinationMethod,
    combination_partner: Option<Expression>,
    primitives: Vec<Combinator>,
    primitive_dist: WeightedIndex<f64>,
    rng: StdRng,
}

impl Pool {
    /// Build a reactor, validate its probability simplices and seed
    /// `capacity` primitive atoms.
    pub fn new(config: PoolConfig, rng: StdRng) -> Result<Self, PoolError> {
        let p_sum = config.p_reduce + config.p_combine + config.p_break;
        if (p_sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(PoolError::InvalidProbabilities(p_sum));
        }
        if config.primitives.len() != config.proportions.len() {
            return Err(PoolError::MismatchedProportions {
                primitives: config.primitives.len(),
                proportions: config.proportions.len(),
            });
        }
        let proportion_sum: f64 = config.proportions.iter().sum();
        if (proportion_sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(PoolError::InvalidProportions(proportion_sum));
        }
        let primitive_dist = WeightedIndex::new(&config.proportions)
            .map_err(|_| PoolError::InvalidProportions(proportion_sum))?;
        let mut pool = Self {
            base: BasePool::new(config.capacity, config.food_size),
            p_reduce: config.p_reduce,
            p_combine: config.p_combine,
            p_break: config.p_break,
            frozen_p: None,
            max_sample_reductions: config.max_sample_reductions,
            break_position: config.break_position,
            reduce_regime: config.reduce_regime,
            combination_method: config.combination_method,
            combination_partner: None,
            primitives: config.primitives,
            primitive_dist,
            rng,
        };
        if pool.reduce_regime == ReduceRegime::Priority {
            pool.set_p_reduce(0.0);
        }
        pool.add_random_atoms(config.capacity);
        debug!(
            capacity = config.capacity,
            food_size = ?config.food_size,
            "pool seeded"
        );
        Ok(pool)
    }

    pub fn base(&self) -> &BasePool {
        &self.base
    }

    pub fn register_observer(&mut self, observer: Box<dyn PoolObserver>) {
        self.base.register_observer(observer);
    }

    pub fn deregister_observers(&mut self) {
        self.base.deregister_observers();
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn total_size(&self) -> usize {
        self.base.total_size()
    }

    pub fn multiplicity(&self, species: &Expression) -> usize {
        self.base.multiplicity(species)
    }

    pub fn pop_reactive(&mut self) -> Expression {
        self.base.pop_reactive(&mut self.rng)
    }

    pub fn rollback(&mut self, species: &Expression) {
        self.base.rollback(species);
    }

    pub fn remove(&mut self, species: &Expression) -> bool {
        self.base.remove(species)
    }

    pub fn append(&mut self, species: Expression) {
        self.base.append(species);
    }

    pub fn p_reduce(&self) -> f64 {
        self.p_reduce
    }

    pub fn p_combine(&self) -> f64 {
        self.p_combine
    }

    pub fn p_break(&self) -> f64 {
        self.p_break
    }

    pub fn combination_partner(&self) -> Option<&Expression> {
        self.combination_partner.as_ref()
    }

    /// One elementary step under the configured regime.
    pub fn step(&mut self) {
        match self.reduce_regime {
            ReduceRegime::Random => self.step_random_reduce(),
            ReduceRegime::Priority => self.step_priority_reduce(),
        }
    }

    fn step_random_reduce(&mut self) {
        let species = self.pop_reactive();
        match self.pick_action() {
            Action::Reduce => self.tape_reduce_or_rollback(species),
            Action::Combine => self.tape_combine_or_rollback(species),
            Action::Break => self.tape_break_or_rollback(species),
        }
    }

    fn step_priority_reduce(&mut self) {
        let species = self.pop_reactive();
        if self.tape_reduce(&species) {
            return;
        }
        match self.pick_action() {
            Action::Combine => self.tape_combine_or_rollback(species),
            Action::Break => self.tape_break_or_rollback(species),
            Action::Reduce => unreachable!("reduce action sampled with p_reduce = 0"),
        }
    }

    fn pick_action(&mut self) -> Action {
        let mut coin = self.rng.gen::<f64>();
        if coin < self.p_reduce {
            return Action::Reduce;
        }
        coin -= self.p_reduce;
        if coin < self.p_combine {
            return Action::Combine;
        }
        coin -= self.p_combine;
        if coin < self.p_break {
            return Action::Break;
        }
        panic!("action probabilities left an unassigned remainder {coin:e}");
    }

    fn tape_reduce_or_rollback(&mut self, species: Expression) {
        if !self.tape_reduce(&species) {
            self.rollback(&species);
        }
    }

    fn tape_break_or_rollback(&mut self, species: Expression) {
        if !self.tape_break(&species) {
            self.rollback(&species);
        }
    }

    fn tape_combine_or_rollback(&mut self, species: Expression) {
        if self.base.len() < 2 {
            self.rollback(&species);
            return;
        }
        match self.combination_method {
            CombinationMethod::Consense => match self.combination_partner.take() {
                // The stashed partner stays staged until this second,
                // independent candidate arrives.
                Some(partner) => {
                    self.tape_combine(&species, &partner);
                }
                None => self.combination_partner = Some(species),
            },
            CombinationMethod::Unilateral => {
                let partner = self.pop_reactive();
                self.tape_combine(&species, &partner);
            }
        }
    }

    /// Stochastically reduce one candidate redex of `species` and commit it
    /// as a reduce reaction. False when the species is irreducible.
    pub fn tape_reduce(&mut self, species: &Expression) -> bool {
        if !species.is_reducible(Some(&self.base as &dyn Reservoir)) {
            return false;
        }
        let reduction = {
            let Self {
                base,
                rng,
                max_sample_reductions,
                ..
            } = self;
            species.sreduce(Some(&*base as &dyn Reservoir), *max_sample_reductions, rng)
        };
        let mut reactives = vec![species.clone()];
        reactives.extend(reduction.reactives);
        let mut products = vec![reduction.expression];
        products.extend(reduction.biproducts);
        let reaction = Reaction::new(ReactionKind::Reduce, reactives, products);
        self.base.apply_reaction(&reaction)
    }

    /// Commit `left(right)` as a combine reaction.
    pub fn tape_combine(&mut self, left: &Expression, right: &Expression) -> bool {
        let combined = left.apply(right);
        let reaction = Reaction::new(
            ReactionKind::Combine,
            vec![left.clone(), right.clone()],
            vec![combined],
        );
        self.base.apply_reaction(&reaction)
    }

    /// Split a compound species in two and commit it as a break reaction.
    /// False on a leaf, which has no boundary to break at.
    pub fn tape_break(&mut self, species: &Expression) -> bool {
        if species.is_leaf() {
            return false;
        }
        let (left, right) = match self.break_position {
            BreakPosition::Top => species.top_break(),
            BreakPosition::Random => species.random_break(&mut self.rng),
        };
        let reaction = Reaction::new(ReactionKind::Break, vec![species.clone()], vec![left, right]);
        self.base.apply_reaction(&reaction)
    }

    /// Retarget the action simplex, preserving the break:combine ratio.
    /// Returns the previous `(p_reduce, p_break, p_combine)` triple.
    pub fn set_p_reduce(&mut self, p_reduce: f64) -> (f64, f64, f64) {
        let previous = (self.p_reduce, self.p_break, self.p_combine);
        self.p_reduce = p_reduce.min(1.0);
        let remainder = 1.0 - self.p_reduce;
        let ratio = self.p_combine / (self.p_break + self.p_combine);
        self.p_combine = ratio * remainder;
        self.p_break = 1.0 - self.p_reduce - self.p_combine;
        let sum = self.p_reduce + self.p_break + self.p_combine;
        assert!(
            (sum - 1.0).abs() <= PROBABILITY_TOLERANCE,
            "action probabilities sum to {sum}"
        );
        assert!(
            self.p_reduce >= 0.0 && self.p_break >= 0.0 && self.p_combine >= 0.0,
            "negative action probability"
        );
        previous
    }

    /// Force pure reduction until `unfreeze` restores the previous simplex.
    pub fn freeze(&mut self) {
        self.frozen_p = Some(self.set_p_reduce(1.0));
    }

    /// # Panics
    ///
    /// Panics without a prior `freeze`.
    pub fn unfreeze(&mut self) {
        let (p_reduce, p_break, p_combine) =
            self.frozen_p.take().expect("unfreeze without a prior freeze");
        self.p_reduce = p_reduce;
        self.p_break = p_break;
        self.p_combine = p_combine;
    }

    /// Replenish `n` atoms i.i.d. from the primitive alphabet.
    pub fn add_random_atoms(&mut self, n: usize) {
        let mut counts = vec![0usize; self.primitives.len()];
        for _ in 0..n {
            counts[self.primitive_dist.sample(&mut self.rng)] += 1;
        }
        for (primitive, count) in self.primitives.clone().into_iter().zip(counts) {
            if count > 0 {
                self.base.append_copies(Expression::Leaf(primitive), count);
            }
        }
    }

    /// Raise capacity by `n` and replenish as many atoms.
    pub fn grow(&mut self, n: usize) {
        self.base.grow_capacity(n);
        self.add_random_atoms(n);
    }

    /// Run `num_reactions` steps, notifying observers per step.
    pub fn evolve(&mut self, num_reactions: u64) {
        for tick in 0..num_reactions {
            self.step();
            self.base.notify_step(tick);
        }
    }

    /// Run full passes over the population, notifying observers per step and
    /// per generation.
    pub fn evolve_generations(&mut self, num_generations: u64) {
        let mut tick = 0;
        for generation in 0..num_generations {
            for _ in 0..self.base.len() {
                self.step();
                self.base.notify_step(tick);
                tick += 1;
            }
            self.base.notify_generation(generation);
            debug!(generation, tick, "generation complete");
        }
    }

    /// Snapshot the live species map as JSON, surface syntax to count.
    /// Staging and probability configuration are deliberately not persisted.
    pub fn save(&self, path: &Path) -> Result<(), PoolError> {
        let species: BTreeMap<String, usize> = self
            .base
            .expressions()
            .items()
            .map(|(expr, count)| (expr.to_string(), count))
            .collect();
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, &species)?;
        Ok(())
    }

    /// Replace the live species from a snapshot; staging state is reset.
    pub fn load(&mut self, path: &Path) -> Result<(), PoolError> {
        let file = BufReader::new(File::open(path)?);
        let species: BTreeMap<String, usize> = serde_json::from_reader(file)?;
        let mut expressions = Multiset::new(self.base.expressions().capacity());
        for (text, count) in species {
            expressions.add_copies(Expression::parse(&text)?, count);
        }
        self.base.replace_species(expressions);
        self.combination_partner = None;
        Ok(())
    }
}
