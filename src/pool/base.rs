//! Transactional core of the reactor: live species plus withdrawal staging.
//!
//! A step withdraws a species into `tmp_removed` before deciding its fate;
//! committing a reaction consumes staged copies first, and a failed attempt
//! rolls the species back. The pool therefore never double-counts or loses a
//! molecule: `len() == live + staged` holds across any interleaving.

use std::collections::HashSet;
use std::fmt;

use rand::rngs::StdRng;
use tracing::trace;

use crate::combinator::Reservoir;
use crate::expression::Expression;
use crate::multiset::Multiset;

use super::observer::PoolObserver;
use super::reaction::Reaction;

/// The species inventory with transactional withdrawal and food synthesis.
pub struct BasePool {
    expressions: Multiset,
    tmp_removed: Vec<Expression>,
    food_size: Option<usize>,
    observers: Vec<Box<dyn PoolObserver>>,
}

impl BasePool {
    pub fn new(capacity: usize, food_size: Option<usize>) -> Self {
        Self {
            expressions: Multiset::new(capacity),
            tmp_removed: Vec::new(),
            food_size,
            observers: Vec::new(),
        }
    }

    pub fn register_observer(&mut self, observer: Box<dyn PoolObserver>) {
        self.observers.push(observer);
    }

    pub fn deregister_observers(&mut self) {
        self.observers.clear();
    }

    /// Transactionally withdraw one species sampled by live count.
    ///
    /// # Panics
    ///
    /// Panics when no live species remain.
    pub fn pop_reactive(&mut self, rng: &mut StdRng) -> Expression {
        assert!(!self.expressions.is_empty(), "popping from an empty pool");
        let species = self.expressions.sample(rng).clone();
        self.tmp_remove(species.clone());
        species
    }

    fn tmp_remove(&mut self, species: Expression) {
        self.expressions.remove(&species);
        self.tmp_removed.push(species);
    }

    /// Return a withdrawn species to circulation.
    ///
    /// # Panics
    ///
    /// Panics when the species was never withdrawn; that is a caller bug.
    pub fn rollback(&mut self, species: &Expression) {
        let position = self
            .tmp_removed
            .iter()
            .position(|staged| staged == species)
            .expect("rolling back a species that was never withdrawn");
        self.tmp_removed.remove(position);
        self.append(species.clone());
    }

    pub fn append(&mut self, species: Expression) {
        self.expressions.add(species);
    }

    pub(crate) fn append_copies(&mut self, species: Expression, copies: usize) {
        self.expressions.add_copies(species, copies);
    }

    /// Commit a removal: staged copies are consumed first, then live ones.
    /// Returns false, not an error, when the species is in neither place.
    pub fn remove(&mut self, species: &Expression) -> bool {
        if let Some(position) = self.tmp_removed.iter().position(|staged| staged == species) {
            self.tmp_removed.remove(position);
            true
        } else if self.expressions.contains(species) {
            self.expressions.remove(species);
            true
        } else {
            false
        }
    }

    /// Remove a whole sequence, stopping at the first miss. The consumed
    /// prefix is not restored on failure; current reaction shapes keep that
    /// path unreachable.
    pub fn remove_all(&mut self, species: impl IntoIterator<Item = Expression>) -> bool {
        for item in species {
            if !self.remove(&item) {
                return false;
            }
        }
        true
    }

    /// Apply a reaction with all-or-nothing semantics: unless every reactive
    /// is present or makeable, nothing is mutated and false is returned.
    pub fn apply_reaction(&mut self, reaction: &Reaction) -> bool {
        if !self.has_or_make_reactives(reaction) {
            return false;
        }
        for reactive in &reaction.reactives {
            self.remove(reactive);
        }
        for product in &reaction.products {
            self.append(product.clone());
        }
        trace!(%reaction, "reaction committed");
        self.notify_reaction(reaction);
        true
    }

    fn has_or_make_reactives(&mut self, reaction: &Reaction) -> bool {
        for (compound, deficit) in self.count_missing(&reaction.reactives) {
            if deficit > 0 && !self.make(&compound, deficit as usize) {
                return false;
            }
        }
        true
    }

    /// Shortfall per reactive species, in reactive order so synthesis is
    /// deterministic under a fixed seed. Copies already staged are not
    /// missing, but they must not be counted as available twice either,
    /// hence the subtraction rather than a lookup.
    fn count_missing(&self, reactives: &[Expression]) -> Vec<(Expression, isize)> {
        let missing = self.expressions.count_missing(reactives);
        let mut seen: HashSet<&Expression> = HashSet::new();
        let mut ordered = Vec::new();
        for species in reactives {
            if !seen.insert(species) {
                continue;
            }
            if let Some(&deficit) = missing.get(species) {
                let staged = self
                    .tmp_removed
                    .iter()
                    .filter(|staged| *staged == species)
                    .count();
                ordered.push((species.clone(), deficit as isize - staged as isize));
            }
        }
        ordered
    }

    /// Synthesize `copies` units of `compound` from atomic food, aborting as
    /// soon as one unit cannot be made.
    pub fn make(&mut self, compound: &Expression, copies: usize) -> bool {
        for _ in 0..copies {
            if !self.can_make(compound) {
                return false;
            }
            let atoms = compound.atoms().into_iter().map(Expression::Leaf);
            if self.remove_all(atoms) {
                self.append(compound.clone());
            }
        }
        true
    }

    /// Whether `compound` fits the food set and its atoms are all live.
    pub fn can_make(&self, compound: &Expression) -> bool {
        match self.food_size {
            None => false,
            Some(limit) => {
                if compound.size() > limit {
                    return false;
                }
                let atoms: Vec<Expression> = compound
                    .atoms()
                    .into_iter()
                    .map(Expression::Leaf)
                    .collect();
                self.expressions.has_all(&atoms)
            }
        }
    }

    /// Membership in the reactor's sense: live, or synthesizable from food.
    pub fn contains(&self, species: &Expression) -> bool {
        self.expressions.contains(species) || self.can_make(species)
    }

    /// Live count of one species minus its staged copies.
    pub fn multiplicity(&self, species: &Expression) -> usize {
        let staged = self
            .tmp_removed
            .iter()
            .filter(|staged| *staged == species)
            .count();
        self.expressions.get(species).saturating_sub(staged)
    }

    /// Molecules under the pool's responsibility, staged ones included.
    pub fn len(&self) -> usize {
        self.expressions.len() + self.tmp_removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn live_count(&self) -> usize {
        self.expressions.len()
    }

    pub fn staged_count(&self) -> usize {
        self.tmp_removed.len()
    }

    /// Total number of atoms across live and staged molecules.
    pub fn total_size(&self) -> usize {
        self.expressions.total_size()
            + self
                .tmp_removed
                .iter()
                .map(Expression::size)
                .sum::<usize>()
    }

    pub fn unique(&self) -> impl Iterator<Item = &Expression> {
        self.expressions.unique()
    }

    pub fn expressions(&self) -> &Multiset {
        &self.expressions
    }

    pub fn food_size(&self) -> Option<usize> {
        self.food_size
    }

    pub fn grow_capacity(&mut self, n: usize) {
        self.expressions.grow_capacity(n);
    }

    /// Swap in a freshly loaded inventory; staging is reset, not restored.
    pub(crate) fn replace_species(&mut self, expressions: Multiset) {
        self.expressions = expressions;
        self.tmp_removed.clear();
    }

    fn notify_reaction(&mut self, reaction: &Reaction) {
        let mut observers = std::mem::take(&mut self.observers);
        for observer in observers.iter_mut() {
            observer.on_reaction_computed(self, reaction);
        }
        self.observers = observers;
    }

    pub(crate) fn notify_step(&mut self, tick: u64) {
        let mut observers = std::mem::take(&mut self.observers);
        for observer in observers.iter_mut() {
            observer.on_step_computed(self, tick);
        }
        self.observers = observers;
    }

    pub(crate) fn notify_generation(&mut self, generation: u64) {
        let mut observers = std::mem::take(&mut self.observers);
        for observer in observers.iter_mut() {
            observer.on_generation_computed(generation);
        }
        self.observers = observers;
    }
}

impl Reservoir for BasePool {
    fn contains(&self, expr: &Expression) -> bool {
        BasePool::contains(self, expr)
    }
}

impl fmt::Display for BasePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut species: Vec<(&Expression, usize)> = self.expressions.items().collect();
        species.sort_by_key(|(_, count)| *count);
        let lines: Vec<String> = species
            .iter()
            .map(|(expr, count)| format!("{expr} {count}"))
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}
