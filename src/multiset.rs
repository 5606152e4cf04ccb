//! Counted inventory of live species.
//!
//! Keys are kept in insertion order so that sampling under a fixed seed is
//! reproducible run to run.

use std::collections::HashMap;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::Rng;

use crate::expression::Expression;

/// Species-to-count map with a fixed, growable capacity.
#[derive(Debug, Clone)]
pub struct Multiset {
    item_count: IndexMap<Expression, usize>,
    max_size: usize,
    count: usize,
}

impl Multiset {
    pub fn new(max_size: usize) -> Self {
        Self {
            item_count: IndexMap::new(),
            max_size,
            count: 0,
        }
    }

    pub fn contains(&self, item: &Expression) -> bool {
        self.item_count.contains_key(item)
    }

    /// Live count of one species.
    pub fn get(&self, item: &Expression) -> usize {
        self.item_count.get(item).copied().unwrap_or(0)
    }

    /// Whether every demanded copy is present; duplicates in `items` count
    /// as cumulative demand.
    pub fn has_all(&self, items: &[Expression]) -> bool {
        let mut demand: HashMap<&Expression, usize> = HashMap::new();
        for item in items {
            *demand.entry(item).or_insert(0) += 1;
        }
        demand.into_iter().all(|(item, needed)| self.get(item) >= needed)
    }

    /// Per-species shortfall against the demanded copies; only positive
    /// deficits are reported.
    pub fn count_missing(&self, items: &[Expression]) -> HashMap<Expression, usize> {
        let mut demand: HashMap<&Expression, usize> = HashMap::new();
        for item in items {
            *demand.entry(item).or_insert(0) += 1;
        }
        demand
            .into_iter()
            .filter_map(|(item, needed)| {
                let present = self.get(item);
                (needed > present).then(|| (item.clone(), needed - present))
            })
            .collect()
    }

    pub fn unique(&self) -> impl Iterator<Item = &Expression> {
        self.item_count.keys()
    }

    pub fn items(&self) -> impl Iterator<Item = (&Expression, usize)> {
        self.item_count.iter().map(|(item, &count)| (item, count))
    }

    /// Total number of molecules, multiplicity included.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Sum of the sizes of every molecule.
    pub fn total_size(&self) -> usize {
        self.items().map(|(item, count)| item.size() * count).sum()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn grow_capacity(&mut self, n: usize) {
        self.max_size += n;
    }

    pub fn add(&mut self, item: Expression) {
        self.add_copies(item, 1);
    }

    /// # Panics
    ///
    /// Panics when the inventory is already at capacity.
    pub fn add_copies(&mut self, item: Expression, copies: usize) {
        assert!(self.count < self.max_size, "multiset over capacity");
        *self.item_count.entry(item).or_insert(0) += copies;
        self.count += copies;
    }

    /// Remove one copy, dropping the key at zero.
    ///
    /// # Panics
    ///
    /// Panics when the item is absent; callers check membership first.
    pub fn remove(&mut self, item: &Expression) {
        let slot = self
            .item_count
            .get_mut(item)
            .expect("removing an absent species");
        if *slot == 1 {
            self.item_count.swap_remove(item);
        } else {
            *slot -= 1;
        }
        self.count -= 1;
    }

    /// One species drawn with probability proportional to its live count.
    ///
    /// # Panics
    ///
    /// Panics when the inventory is empty.
    pub fn sample(&self, rng: &mut StdRng) -> &Expression {
        assert!(self.count > 0, "sampling from an empty multiset");
        let mut target = rng.gen_range(0..self.count);
        for (item, &count) in &self.item_count {
            if target < count {
                return item;
            }
            target -= count;
        }
        unreachable!("species counts out of sync with the total")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn p(s: &str) -> Expression {
        Expression::parse(s).unwrap()
    }

    #[test]
    fn test_add_remove() {
        let mut ms = Multiset::new(10);
        ms.add(p("K"));
        assert!(ms.contains(&p("K")));
        ms.remove(&p("K"));
        assert!(!ms.contains(&p("K")));
    }

    #[test]
    fn test_counts() {
        let mut ms = Multiset::new(10);
        assert_eq!(ms.get(&p("S")), 0);
        ms.add(p("S"));
        ms.add(p("S"));
        assert_eq!(ms.get(&p("S")), 2);
        assert_eq!(ms.len(), 2);
        ms.remove(&p("S"));
        assert_eq!(ms.get(&p("S")), 1);
        ms.remove(&p("S"));
        assert_eq!(ms.get(&p("S")), 0);
        assert!(ms.is_empty());
    }

    #[test]
    fn test_has_all_counts_demand() {
        let mut ms = Multiset::new(10);
        ms.add(p("K"));
        ms.add(p("S"));
        assert!(ms.has_all(&[p("K"), p("S")]));
        assert!(!ms.has_all(&[p("K"), p("K")]));
    }

    #[test]
    fn test_count_missing() {
        let mut ms = Multiset::new(10);
        ms.add(p("K"));
        let missing = ms.count_missing(&[p("K"), p("K"), p("I")]);
        assert_eq!(missing.get(&p("K")), Some(&1));
        assert_eq!(missing.get(&p("I")), Some(&1));
        assert_eq!(missing.len(), 2);
        assert!(ms.count_missing(&[p("K")]).is_empty());
    }

    #[test]
    fn test_total_size() {
        let mut ms = Multiset::new(10);
        ms.add(p("K"));
        ms.add_copies(p("KS"), 3);
        assert_eq!(ms.total_size(), 7);
        assert_eq!(ms.len(), 4);
    }

    #[test]
    #[should_panic]
    fn test_capacity_overflow_panics() {
        let mut ms = Multiset::new(1);
        ms.add(p("K"));
        ms.add(p("S"));
    }

    #[test]
    #[should_panic]
    fn test_remove_absent_panics() {
        let mut ms = Multiset::new(1);
        ms.remove(&p("K"));
    }

    #[test]
    fn test_sample_follows_counts() {
        let mut ms = Multiset::new(1000);
        ms.add_copies(p("K"), 500);
        ms.add_copies(p("S"), 300);
        ms.add_copies(p("I"), 200);
        let mut rng = StdRng::seed_from_u64(3);
        let mut counts: HashMap<Expression, usize> = HashMap::new();
        let draws = 50_000;
        for _ in 0..draws {
            *counts.entry(ms.sample(&mut rng).clone()).or_insert(0) += 1;
        }
        for (expr, share) in [(p("K"), 0.5), (p("S"), 0.3), (p("I"), 0.2)] {
            let observed = counts[&expr] as f64 / draws as f64;
            assert!(
                (observed - share).abs() < 0.01,
                "{expr}: observed {observed:.3}, expected {share:.3}"
            );
        }
    }

    #[test]
    fn test_sample_heavily_unbalanced() {
        let mut ms = Multiset::new(10_000);
        ms.add_copies(p("K"), 99);
        ms.add(p("S"));
        let mut rng = StdRng::seed_from_u64(4);
        let mut rare = 0usize;
        let draws = 100_000;
        for _ in 0..draws {
            if ms.sample(&mut rng) == &p("S") {
                rare += 1;
            }
        }
        let observed = rare as f64 / draws as f64;
        assert!(
            (observed - 0.01).abs() < 0.003,
            "observed {observed:.4}, expected 0.01"
        );
    }
}
