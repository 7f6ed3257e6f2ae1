use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, trace};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub trait MemberSampler {
    /// Picks at most `max_members` of `members`, returned in ascending order.
    fn select(&mut self, class_index: usize, members: &[usize], max_members: usize) -> Vec<usize>;
}

/// Deterministic per-class sampler: the rng for class `c` is seeded with `seed + c`,
/// so a class's selection does not depend on which other classes were sampled.
pub struct SeededSampler {
    seed: u64,

    // Sampling statistics
    sampled_count: AtomicUsize,
    discarded_count: AtomicUsize,
}

impl SeededSampler {
    pub fn new(seed: u64) -> Self {
        debug!("Seeded member sampler, seed={}", seed);
        Self {
            seed,
            sampled_count: AtomicUsize::new(0),
            discarded_count: AtomicUsize::new(0),
        }
    }

    /// `(sampled, discarded)` members over every `select` call so far.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.sampled_count.load(Ordering::Relaxed),
            self.discarded_count.load(Ordering::Relaxed),
        )
    }
}

impl MemberSampler for SeededSampler {
    fn select(&mut self, class_index: usize, members: &[usize], max_members: usize) -> Vec<usize> {
        if members.len() <= max_members {
            self.sampled_count.fetch_add(members.len(), Ordering::Relaxed);
            let mut all = members.to_vec();
            all.sort_unstable();
            return all;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(class_index as u64));
        let mut picked: Vec<usize> = index::sample(&mut rng, members.len(), max_members)
            .into_iter()
            .map(|i| members[i])
            .collect();
        picked.sort_unstable();

        self.sampled_count.fetch_add(picked.len(), Ordering::Relaxed);
        self.discarded_count
            .fetch_add(members.len() - picked.len(), Ordering::Relaxed);
        trace!(
            "class {}: sampled {} of {} members",
            class_index,
            picked.len(),
            members.len()
        );
        picked
    }
}
