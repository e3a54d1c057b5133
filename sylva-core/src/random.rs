//! Seedable pseudo-random source used for hyperplane sampling.
//!
//! `Kiss64Random` is George Marsaglia's 64-bit KISS generator: a multiply-with-carry,
//! a xorshift and a linear congruential generator combined. It is fast, has a period
//! around 2^250 and, unlike `thread_rng`, produces the same stream for the same seed
//! on every platform, which keeps forests reproducible.

use rand::{RngCore, SeedableRng};

/// Seed used when the caller never sets one.
pub const DEFAULT_SEED: u64 = 1_234_567_890_987_654_321;

/// 64-bit KISS pseudo-random generator.
#[derive(Debug, Clone)]
pub struct Kiss64Random {
    x: u64,
    y: u64,
    z: u64,
    c: u64,
}

impl Default for Kiss64Random {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl Kiss64Random {
    /// Creates a generator from a seed. A zero seed keeps the default `x` state.
    pub fn new(seed: u64) -> Self {
        Self {
            x: if seed == 0 { DEFAULT_SEED } else { seed },
            y: 362_436_362_436_362_436,
            z: 1_066_149_217_761_810,
            c: 123_456_123_456_123_456,
        }
    }

    /// Derives the independent stream used for tree number `tree`.
    pub fn for_tree(seed: u64, tree: usize) -> Self {
        Self::new(seed.wrapping_add(tree as u64))
    }

    /// Advances the generator and returns 64 random bits.
    #[inline]
    pub fn kiss(&mut self) -> u64 {
        // Linear congruence generator
        self.z = self.z.wrapping_mul(6_906_969_069).wrapping_add(1_234_567);

        // Xor shift
        self.y ^= self.y << 13;
        self.y ^= self.y >> 17;
        self.y ^= self.y << 43;

        // Multiply-with-carry
        let t = (self.x << 58).wrapping_add(self.c);
        self.c = self.x >> 6;
        self.x = self.x.wrapping_add(t);
        self.c = self.c.wrapping_add((self.x < t) as u64);

        self.x.wrapping_add(self.y).wrapping_add(self.z)
    }

    /// Fair coin.
    #[inline]
    pub fn flip(&mut self) -> bool {
        self.kiss() & 1 == 1
    }

    /// Uniform index in `0..n`. `n` must be non-zero.
    #[inline]
    pub fn index(&mut self, n: usize) -> usize {
        debug_assert!(n > 0);
        (self.kiss() % n as u64) as usize
    }
}

impl RngCore for Kiss64Random {
    fn next_u32(&mut self) -> u32 {
        (self.kiss() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.kiss()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.kiss().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Kiss64Random {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }

    fn seed_from_u64(state: u64) -> Self {
        Self::new(state)
    }
}
