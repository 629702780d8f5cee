// Randomness is never ambient here: every stochastic computation receives a `PrngKey` and derives
// whatever it needs from it. Keys are consumed through an `RngSequence`, which yields a fresh
// subkey per draw so that two unrelated uses within one call never share a stream.

use rand::{Rng, SeedableRng, rngs::StdRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrngKey(u64);

impl PrngKey {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn seed(self) -> u64 {
        self.0
    }

    /// Splits the key into two independent keys. The input key should not be used afterwards.
    pub fn split(self) -> (Self, Self) {
        let mut rngs = RngSequence::new(self);
        (rngs.next_key(), rngs.next_key())
    }

    /// A generator seeded from this key, for the leaf that actually samples.
    pub fn to_rng(self) -> StdRng {
        StdRng::seed_from_u64(self.0)
    }
}

impl From<u64> for PrngKey {
    fn from(seed: u64) -> Self {
        Self::new(seed)
    }
}

#[derive(Debug, Clone)]
pub struct RngSequence {
    rng: StdRng,
}

impl RngSequence {
    pub fn new(key: PrngKey) -> Self {
        Self {
            rng: StdRng::seed_from_u64(key.0),
        }
    }

    pub fn next_key(&mut self) -> PrngKey {
        PrngKey(self.rng.random())
    }
}

impl Iterator for RngSequence {
    type Item = PrngKey;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_key())
    }
}
