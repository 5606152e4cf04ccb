//! Bucket-by-magnitude weighted sampling.
//!
//! Items are grouped into levels by the power of two bounding their weight; a
//! draw picks a level against the cumulative level weights, then rejection
//! samples inside it. Every weight in level `i` lies within a factor of two
//! of `level_max[i]`, which keeps the expected number of rejection rounds
//! constant, so add, remove and sample are all O(1) amortized.

use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplerError {
    /// Weight outside `[min_value, max_value]`; a symptom of a misconfigured
    /// range, never silently clamped.
    #[error("weight out of range: {0:.2e}")]
    WeightOutOfRange(f64),
    #[error("bad index: {0}")]
    BadIndex(usize),
    #[error("index not found: {0}")]
    IndexNotFound(usize),
}

/// Weighted sampler over up to `max_entries` integer-indexed items.
#[derive(Debug, Clone)]
pub struct WeightedSampler {
    n_entries: usize,
    max_entries: usize,
    min_value: f64,
    max_value: f64,
    top_level: i32,
    total_weight: f64,
    weights: Vec<f64>,
    level_weights: Vec<f64>,
    level_buckets: Vec<Vec<usize>>,
    level_max: Vec<f64>,
}

impl WeightedSampler {
    /// Sampler for weights in `[min_value, max_value]`, bucketed into
    /// `1 + ceil(log2 max) - ceil(log2 min)` magnitude levels.
    pub fn new(max_entries: usize, min_value: f64, max_value: f64) -> Self {
        let top_level = max_value.log2().ceil() as i32;
        let bottom_level = min_value.log2().ceil() as i32;
        let nlevels = (1 + top_level - bottom_level) as usize;
        Self {
            n_entries: 0,
            max_entries,
            min_value,
            max_value,
            top_level,
            total_weight: 0.0,
            weights: vec![0.0; max_entries],
            level_weights: vec![0.0; nlevels],
            level_buckets: vec![Vec::new(); nlevels],
            level_max: (0..nlevels)
                .map(|level| 2f64.powi(top_level - level as i32))
                .collect(),
        }
    }

    fn validate(&self, idx: usize, weight: f64) -> Result<(), SamplerError> {
        if weight > self.max_value || weight < self.min_value {
            return Err(SamplerError::WeightOutOfRange(weight));
        }
        if idx >= self.max_entries {
            return Err(SamplerError::BadIndex(idx));
        }
        Ok(())
    }

    fn level_of(&self, weight: f64) -> usize {
        let raw_level = weight.log2().ceil() as i32;
        (self.top_level - raw_level) as usize
    }

    pub fn add(&mut self, idx: usize, weight: f64) -> Result<(), SamplerError> {
        self.validate(idx, weight)?;
        self.n_entries += 1;
        self.total_weight += weight;
        self.weights[idx] = weight;
        let level = self.level_of(weight);
        self.level_weights[level] += weight;
        self.level_buckets[level].push(idx);
        Ok(())
    }

    pub fn remove(&mut self, idx: usize, weight: f64) -> Result<(), SamplerError> {
        self.validate(idx, weight)?;
        let level = self.level_of(weight);
        let position = self.level_buckets[level]
            .iter()
            .position(|&entry| entry == idx)
            .ok_or(SamplerError::IndexNotFound(idx))?;
        self.weights[idx] = 0.0;
        self.total_weight -= weight;
        self.level_weights[level] -= weight;
        self.level_buckets[level].swap_remove(position);
        self.n_entries -= 1;
        Ok(())
    }

    /// Locate one item: level by CDF, item by rejection within the level.
    fn draw(&self, rng: &mut StdRng) -> (usize, usize, usize, f64) {
        assert!(self.n_entries > 0, "sampling from an empty sampler");
        let u = rng.gen::<f64>() * self.total_weight;
        let mut cumulative = 0.0;
        let mut level = 0;
        for (i, &level_weight) in self.level_weights.iter().enumerate() {
            cumulative += level_weight;
            level = i;
            if u < cumulative {
                break;
            }
        }
        let bucket = &self.level_buckets[level];
        let bound = self.level_max[level];
        loop {
            let position = rng.gen_range(0..bucket.len());
            let idx = bucket[position];
            let weight = self.weights[idx];
            if rng.gen::<f64>() * bound <= weight {
                return (idx, level, position, weight);
            }
        }
    }

    /// One index drawn with probability `weight / total_weight`.
    pub fn sample(&self, rng: &mut StdRng) -> usize {
        self.draw(rng).0
    }

    /// Draw and delete in one pass; returns the index and its weight.
    pub fn sample_and_remove(&mut self, rng: &mut StdRng) -> (usize, f64) {
        let (idx, level, position, weight) = self.draw(rng);
        self.weights[idx] = 0.0;
        self.total_weight -= weight;
        self.level_weights[level] -= weight;
        self.level_buckets[level].swap_remove(position);
        self.n_entries -= 1;
        (idx, weight)
    }

    pub fn len(&self) -> usize {
        self.n_entries
    }

    pub fn is_empty(&self) -> bool {
        self.n_entries == 0
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_add_accumulates_total_weight() {
        let mut sampler = WeightedSampler::new(10, 1.0, 100.0);
        sampler.add(0, 1.0).unwrap();
        sampler.add(1, 2.0).unwrap();
        sampler.add(2, 64.0).unwrap();
        assert_eq!(sampler.len(), 3);
        assert!((sampler.total_weight() - 67.0).abs() < 1e-12);
    }

    #[test]
    fn test_range_violations_are_errors() {
        let mut sampler = WeightedSampler::new(10, 1.0, 100.0);
        assert_eq!(
            sampler.add(0, 101.0),
            Err(SamplerError::WeightOutOfRange(101.0))
        );
        assert_eq!(
            sampler.add(0, 0.5),
            Err(SamplerError::WeightOutOfRange(0.5))
        );
        assert_eq!(sampler.add(10, 2.0), Err(SamplerError::BadIndex(10)));
        assert_eq!(sampler.len(), 0);
    }

    #[test]
    fn test_remove_requires_matching_weight_bucket() {
        let mut sampler = WeightedSampler::new(10, 1.0, 100.0);
        sampler.add(3, 3.0).unwrap();
        // Weight 8 lives in a different magnitude level, so the item is not
        // found there.
        assert_eq!(sampler.remove(3, 8.0), Err(SamplerError::IndexNotFound(3)));
        sampler.remove(3, 3.0).unwrap();
        assert_eq!(sampler.len(), 0);
        assert!(sampler.total_weight().abs() < 1e-12);
    }

    #[test]
    fn test_add_remove_round_trip() {
        let mut sampler = WeightedSampler::new(16, 1.0, 100.0);
        for idx in 0..16 {
            sampler.add(idx, 1.0 + idx as f64).unwrap();
        }
        for idx in (0..16).rev() {
            sampler.remove(idx, 1.0 + idx as f64).unwrap();
        }
        assert!(sampler.is_empty());
        assert!(sampler.total_weight().abs() < 1e-9);
    }

    #[test]
    fn test_sample_follows_weights() {
        let mut sampler = WeightedSampler::new(4, 1.0, 100.0);
        let weights = [1.0, 2.0, 4.0, 8.0];
        for (idx, &weight) in weights.iter().enumerate() {
            sampler.add(idx, weight).unwrap();
        }
        let total: f64 = weights.iter().sum();
        let mut rng = rng();
        let mut counts = [0usize; 4];
        let draws = 30_000;
        for _ in 0..draws {
            counts[sampler.sample(&mut rng)] += 1;
        }
        for (idx, &weight) in weights.iter().enumerate() {
            let observed = counts[idx] as f64 / draws as f64;
            let expected = weight / total;
            assert!(
                (observed - expected).abs() < 0.02,
                "index {idx}: observed {observed:.3}, expected {expected:.3}"
            );
        }
    }

    #[test]
    fn test_sample_and_remove_drains_consistently() {
        let mut rng = rng();
        let weights = [1.0, 2.0, 4.0, 8.0, 16.0];
        let mut first_draw_counts = [0usize; 5];
        let rounds = 20_000;
        for _ in 0..rounds {
            let mut sampler = WeightedSampler::new(5, 1.0, 100.0);
            for (idx, &weight) in weights.iter().enumerate() {
                sampler.add(idx, weight).unwrap();
            }
            let (first, weight) = sampler.sample_and_remove(&mut rng);
            first_draw_counts[first] += 1;
            assert_eq!(weight, weights[first]);
            assert_eq!(sampler.len(), 4);
            let remaining: f64 = weights.iter().sum::<f64>() - weight;
            assert!((sampler.total_weight() - remaining).abs() < 1e-9);
        }
        let total: f64 = weights.iter().sum();
        for (idx, &weight) in weights.iter().enumerate() {
            let observed = first_draw_counts[idx] as f64 / rounds as f64;
            let expected = weight / total;
            assert!(
                (observed - expected).abs() < 0.02,
                "index {idx}: observed {observed:.3}, expected {expected:.3}"
            );
        }
    }

    #[test]
    fn test_drain_everything() {
        let mut rng = rng();
        let mut sampler = WeightedSampler::new(8, 1.0, 100.0);
        for idx in 0..8 {
            sampler.add(idx, (idx + 1) as f64).unwrap();
        }
        let mut seen = Vec::new();
        while !sampler.is_empty() {
            seen.push(sampler.sample_and_remove(&mut rng).0);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
        assert!(sampler.total_weight().abs() < 1e-9);
    }
}
