//! Small utility functions shared across the engine.
//!
//! Random-number-dependent helpers here operate on the engine's own
//! [`RandomSource`](crate::connections::RandomSource) rather than a generic
//! `rand::Rng`, so that every deterministic choice the engine makes --
//! tie-breaking, growth sampling -- is reproducible across a snapshot
//! round-trip.

use crate::connections::RandomSource;

/// Return the minimum of two values.
#[inline]
pub fn min<T: Ord>(a: T, b: T) -> T {
    if a < b {
        a
    } else {
        b
    }
}

/// Draw `count` distinct elements from `pool` without replacement, preserving
/// none of `pool`'s original order (the result order is the shuffle order).
///
/// Used by segment-growth (Phase D) to pick a subset of winner cells to wire
/// new synapses to. If `count >= pool.len()`, the full pool is returned
/// (shuffled).
pub fn sample_without_replacement<T: Copy>(pool: &[T], count: usize, rng: &mut RandomSource) -> Vec<T> {
    let mut candidates: Vec<T> = pool.to_vec();
    let n = min(count, candidates.len());
    // Partial Fisher-Yates: after `n` swaps the first `n` slots hold a
    // uniformly random sample of the pool, in random order.
    let len = candidates.len();
    for i in 0..n {
        let j = i + (rng.next_u64() % (len - i) as u64) as usize;
        candidates.swap(i, j);
    }
    candidates.truncate(n);
    candidates
}
