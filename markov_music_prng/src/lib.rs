// Deterministic, portable pseudo-random number generator for markov_music.
//
// xoshiro256++ (Blackman & Vigna, 2019) seeded through SplitMix64. The
// generator is hand-rolled with no dependencies so that a seeded run of the
// music generator draws exactly the same numbers on every platform and
// compiler version.
//
// Only integer draws are provided. Both random steps of the Markov walk
// (uniform seed selection and weighted successor picks) are integer draws,
// so no floating-point arithmetic is involved anywhere in the random path.

/// Xoshiro256++ PRNG, the only source of randomness in markov_music.
///
/// A generation run owns its `MarkovRng`. Two instances created from the
/// same seed produce identical streams.
#[derive(Clone, Debug)]
pub struct MarkovRng {
    s: [u64; 4],
}

impl MarkovRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// SplitMix64 expands the seed into the 256-bit state, so nearby seeds
    /// (0, 1, 2, ...) still give unrelated streams.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range; // = (2^64 - range) % range
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random integer in `[low, high]`.
    ///
    /// Unlike `range_u64`, the full `u64` span is allowed (`high == u64::MAX`).
    /// Panics if `low > high`.
    pub fn range_u64_inclusive(&mut self, low: u64, high: u64) -> u64 {
        assert!(low <= high, "range_u64_inclusive: low must be <= high");
        let span = high - low;
        if span == u64::MAX {
            return self.next_u64();
        }
        low + self.range_u64(0, span + 1)
    }

    /// Generate a uniform random index in `[0, len)`.
    ///
    /// Panics if `len == 0`.
    pub fn index(&mut self, len: usize) -> usize {
        self.range_u64(0, len as u64) as usize
    }
}

/// SplitMix64 step, used only to expand a `u64` seed into xoshiro state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_seed_same_output() {
        let mut a = MarkovRng::new(42);
        let mut b = MarkovRng::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_different_output() {
        let mut a = MarkovRng::new(42);
        let mut b = MarkovRng::new(43);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn cloned_rng_continues_identically() {
        let mut rng = MarkovRng::new(7);
        for _ in 0..50 {
            rng.next_u64();
        }
        let mut copy = rng.clone();
        for _ in 0..50 {
            assert_eq!(rng.next_u64(), copy.next_u64());
        }
    }

    #[test]
    fn range_u64_within_bounds() {
        let mut rng = MarkovRng::new(999);
        for _ in 0..10_000 {
            let v = rng.range_u64(10, 20);
            assert!((10..20).contains(&v), "range_u64 out of range: {v}");
        }
    }

    #[test]
    fn range_u64_inclusive_reaches_both_ends() {
        let mut rng = MarkovRng::new(666);
        let mut saw_low = false;
        let mut saw_high = false;
        for _ in 0..10_000 {
            let v = rng.range_u64_inclusive(1, 3);
            assert!((1..=3).contains(&v), "range_u64_inclusive out of range: {v}");
            saw_low |= v == 1;
            saw_high |= v == 3;
        }
        assert!(saw_low && saw_high);
    }

    #[test]
    fn range_u64_inclusive_single_value() {
        let mut rng = MarkovRng::new(1);
        for _ in 0..100 {
            assert_eq!(rng.range_u64_inclusive(5, 5), 5);
        }
    }

    #[test]
    fn range_u64_inclusive_full_span() {
        let mut a = MarkovRng::new(3);
        let mut b = MarkovRng::new(3);
        assert_eq!(a.range_u64_inclusive(0, u64::MAX), b.next_u64());
    }

    #[test]
    fn index_is_roughly_uniform() {
        let mut rng = MarkovRng::new(555);
        let mut counts = [0usize; 4];
        let n = 40_000;
        for _ in 0..n {
            counts[rng.index(4)] += 1;
        }
        for (i, &c) in counts.iter().enumerate() {
            let pct = c as f64 / n as f64;
            assert!(
                (0.22..0.28).contains(&pct),
                "index {i} drawn {:.1}% of the time",
                pct * 100.0
            );
        }
    }

    #[test]
    #[should_panic(expected = "low must be less than high")]
    fn index_of_empty_range_panics() {
        MarkovRng::new(0).index(0);
    }
}
