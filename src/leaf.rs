// leaf.rs -- Lock-free positive/negative hit counters for one fern leaf.
//
// Both 32-bit counters are packed into a single AtomicU64 (positive in the
// high half, negative in the low half) and updated with a compare-and-swap
// loop. A reader therefore always sees a matching pair, and the posterior
// positive / (positive + negative) is derived from that one snapshot.
//
// When either counter reaches COUNTER_CEILING both are divided by
// RESCALE_DIVISOR (rounded), which keeps the ratio and leaves plenty of
// headroom below u32::MAX.

use std::sync::atomic::{AtomicU64, Ordering};

pub const COUNTER_CEILING: u32 = 1_000_000_000;
pub const RESCALE_DIVISOR: f64 = 1_000_000.0;

#[inline]
fn pack(positive: u32, negative: u32) -> u64 {
    ((positive as u64) << 32) | negative as u64
}

#[inline]
fn unpack(bits: u64) -> (u32, u32) {
    ((bits >> 32) as u32, bits as u32)
}

#[derive(Debug, Default)]
pub struct Leaf {
    bits: AtomicU64,
}

impl Leaf {
    pub fn new() -> Self {
        Leaf::default()
    }

    /// Record one positive (`true`) or negative (`false`) hit.
    pub fn increment(&self, positive: bool) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let (mut p, mut n) = unpack(current);
            if positive {
                p += 1;
            } else {
                n += 1;
            }
            if p >= COUNTER_CEILING || n >= COUNTER_CEILING {
                p = (p as f64 / RESCALE_DIVISOR).round() as u32;
                n = (n as f64 / RESCALE_DIVISOR).round() as u32;
            }
            match self
                .bits
                .compare_exchange_weak(current, pack(p, n), Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Current `(positive, negative)` counters.
    pub fn counts(&self) -> (u32, u32) {
        unpack(self.bits.load(Ordering::Acquire))
    }

    /// Fraction of positive hits; 0 until the first positive.
    pub fn posterior(&self) -> f64 {
        let (p, n) = self.counts();
        if p == 0 {
            0.0
        } else {
            p as f64 / (p as f64 + n as f64)
        }
    }

    pub fn reset(&self) {
        self.bits.store(0, Ordering::Release);
    }

    #[cfg(test)]
    fn from_counts(positive: u32, negative: u32) -> Self {
        Leaf { bits: AtomicU64::new(pack(positive, negative)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    #[test]
    fn test_fresh_leaf_is_zero() {
        let leaf = Leaf::new();
        assert_eq!(leaf.counts(), (0, 0));
        assert_eq!(leaf.posterior(), 0.0);
    }

    #[test]
    fn test_posterior() {
        let leaf = Leaf::new();
        leaf.increment(false);
        assert_eq!(leaf.posterior(), 0.0);
        leaf.increment(true);
        leaf.increment(true);
        leaf.increment(true);
        assert_eq!(leaf.counts(), (3, 1));
        assert_abs_diff_eq!(leaf.posterior(), 0.75);
    }

    #[test]
    fn test_rescale_preserves_ratio() {
        let leaf = Leaf::from_counts(COUNTER_CEILING - 1, 250_000_000);
        let before = leaf.posterior();
        leaf.increment(true);
        assert_eq!(leaf.counts(), (1000, 250));
        assert_abs_diff_eq!(leaf.posterior(), before, epsilon = 1e-6);
    }

    #[test]
    fn test_rescale_on_negative_ceiling() {
        let leaf = Leaf::from_counts(3_000_000, COUNTER_CEILING - 1);
        leaf.increment(false);
        assert_eq!(leaf.counts(), (3, 1000));
    }

    #[test]
    fn test_reset() {
        let leaf = Leaf::from_counts(5, 5);
        leaf.reset();
        assert_eq!(leaf.counts(), (0, 0));
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let leaf = Arc::new(Leaf::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let leaf = Arc::clone(&leaf);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        leaf.increment(t % 2 == 0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(leaf.counts(), (40_000, 40_000));
    }
}
