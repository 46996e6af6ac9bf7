//! Deterministic random number generator for game setup.
//!
//! A multiplicative Lehmer generator over the prime modulus 4294967291.
//! Every draw returns the *current* state and only then advances it, so a
//! generator seeded with `s` yields `s` as its first value. Given the same
//! seed the whole game (game id, spawn positions, headings) replays
//! identically, which clients and tests rely on.

/// Deterministic PRNG; the seed is the first value drawn.
#[derive(Debug, Clone)]
pub struct RandomGenerator {
    next_val: u32,
}

impl RandomGenerator {
    const MULTIPLIER: u64 = 279_410_273;
    const MODULUS: u64 = 4_294_967_291;

    pub fn new(seed: u32) -> Self {
        RandomGenerator { next_val: seed }
    }

    /// Draws the next value. The state update runs in 64-bit arithmetic;
    /// the product would overflow 32 bits for almost every state.
    pub fn next(&mut self) -> u32 {
        let ret = self.next_val;
        self.next_val = ((u64::from(self.next_val) * Self::MULTIPLIER) % Self::MODULUS) as u32;
        ret
    }
}
