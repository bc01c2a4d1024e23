//! Small numeric helpers: a seeded PRNG for file shuffling and exact rounding.

/// `SplitMix64` generator. Tiny, seedable and identical on every platform, which
/// is all file-order shuffling needs.
#[derive(Clone, Copy, Debug)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    #[inline]
    pub const fn next_u64(&mut self) -> u64 {
        let mut z = {
            self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
            self.state
        };
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform value in `0..bound` (multiply-shift reduction). `bound` must be non-zero.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn next_below(&mut self, bound: u64) -> u64 {
        ((self.next_u64() as u128 * bound as u128) >> 64) as u64
    }
}

/// Fisher-Yates shuffle driven by [`SplitMix64`].
pub fn shuffle_in_place<T>(items: &mut [T], rng: &mut SplitMix64) {
    for i in (1..items.len()).rev() {
        #[allow(clippy::cast_possible_truncation)]
        let j = rng.next_below(i as u64 + 1) as usize;
        items.swap(i, j);
    }
}

/// Derive the seed for a given iteration of a reshuffling stream.
#[must_use]
pub const fn epoch_seed(seed: u64, epoch: u64) -> u64 {
    seed ^ epoch.wrapping_mul(0xA24B_AED4_0B9C_497C)
}

/// `num / den` rounded to the nearest integer, ties to even. `den` must be positive.
#[must_use]
pub fn div_round_half_even(num: i128, den: i128) -> i128 {
    let q = num.div_euclid(den);
    let r = num.rem_euclid(den);
    match (2 * r).cmp(&den) {
        std::cmp::Ordering::Less => q,
        std::cmp::Ordering::Greater => q + 1,
        std::cmp::Ordering::Equal => {
            if q % 2 == 0 {
                q
            } else {
                q + 1
            }
        }
    }
}

/// `num / den` truncated toward zero. `den` must be positive.
#[must_use]
pub const fn div_trunc(num: i128, den: i128) -> i128 {
    num / den
}
