//! Deterministic random number generation.
//!
//! RULE: Nothing in the generator may call any platform RNG.
//! All randomness flows through StreamRng instances derived
//! from the single master seed in the GeneratorConfig.
//!
//! Each stage gets its own RNG stream, seeded deterministically
//! from (master_seed XOR stream_index). This means:
//!   - Adding a new stage never changes existing stages' streams.
//!   - Each stage's stream is fully reproducible in isolation.
//!
//! StreamRng implements `RngCore`, so the `rand` / `rand_distr`
//! distributions and `SliceRandom` sample from it directly.

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single generator stage.
pub struct StreamRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StreamRng {
    /// Create a stream RNG from the master seed and a stable
    /// stream index. The index must never change once assigned.
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Bernoulli trial: returns true with probability p.
    /// `p` must lie in [0, 1]; config validation guarantees this.
    pub fn chance(&mut self, p: f64) -> bool {
        self.gen_bool(p)
    }

    /// Draw a label index from a prepared weighted table.
    pub fn pick(&mut self, table: &WeightedIndex<f64>) -> usize {
        table.sample(self)
    }
}

impl RngCore for StreamRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}

/// All stage RNGs for a single run, indexed by stable slot.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn for_stream(&self, slot: StreamSlot) -> StreamRng {
        StreamRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries. Only append.
/// Reordering changes every stage's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Cohort = 0,
    Demographics = 1,
    Engagement = 2,
    Reconciliation = 3,
    AccessSite = 4,
    // Add new streams here. Append only.
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cohort => "cohort",
            Self::Demographics => "demographics",
            Self::Engagement => "engagement",
            Self::Reconciliation => "reconciliation",
            Self::AccessSite => "access_site",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::{index, SliceRandom};
    use rand_distr::LogNormal;

    #[test]
    fn same_seed_same_stream() {
        let mut a = RngBank::new(7).for_stream(StreamSlot::Engagement);
        let mut b = RngBank::new(7).for_stream(StreamSlot::Engagement);
        for _ in 0..100 {
            assert_eq!(a.gen::<f64>().to_bits(), b.gen::<f64>().to_bits());
        }
    }

    #[test]
    fn streams_are_independent() {
        let bank = RngBank::new(7);
        let mut a = bank.for_stream(StreamSlot::Cohort);
        let mut b = bank.for_stream(StreamSlot::Demographics);
        let draws_a: Vec<u64> = (0..8).map(|_| a.gen_range(0..1_000_000)).collect();
        let draws_b: Vec<u64> = (0..8).map(|_| b.gen_range(0..1_000_000)).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn stream_drives_slice_shuffle() {
        let mut a = StreamRng::new(3, 1);
        let mut b = StreamRng::new(3, 1);
        let mut xs: Vec<u32> = (0..40).collect();
        let mut ys = xs.clone();
        xs.shuffle(&mut a);
        ys.shuffle(&mut b);
        assert_eq!(xs, ys);
        assert_ne!(xs, (0..40).collect::<Vec<_>>());
        xs.sort_unstable();
        assert_eq!(xs, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn index_sample_is_distinct() {
        let mut rng = StreamRng::new(11, 0);
        let mut picked = index::sample(&mut rng, 50, 20).into_vec();
        picked.sort_unstable();
        picked.dedup();
        assert_eq!(picked.len(), 20, "duplicates drawn");
        assert!(picked.iter().all(|i| *i < 50));
    }

    #[test]
    fn pick_respects_weights() {
        let mut rng = StreamRng::new(5, 2);
        let table = WeightedIndex::new([2.0, 3.0, 5.0]).unwrap();
        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            counts[rng.pick(&table)] += 1;
        }
        // Expected 2000 / 3000 / 5000.
        assert!((1_700..2_300).contains(&counts[0]), "{counts:?}");
        assert!((2_650..3_350).contains(&counts[1]), "{counts:?}");
        assert!((4_600..5_400).contains(&counts[2]), "{counts:?}");
    }

    #[test]
    fn lognormal_median_near_exp_mu() {
        let mut rng = StreamRng::new(99, 3);
        let dist = LogNormal::new(5.0, 0.6).unwrap();
        let mut draws: Vec<f64> = (0..5_001).map(|_| dist.sample(&mut rng)).collect();
        draws.sort_by(|a, b| a.total_cmp(b));
        let median = draws[2_500];
        let expected = 5.0f64.exp();
        assert!(
            (median - expected).abs() / expected < 0.08,
            "median {median:.1} vs e^5 {expected:.1}"
        );
    }
}
