//! Random number generators.
//!
//! A Mersenne Twister (MT19937-64, via `rand_mt`) exposed both through its
//! own uniform interface and as a [`rand::RngCore`], so that `rand_distr`
//! samplers can draw from it.  Seeds are explicit: two generators built from
//! the same seed produce the same stream on every platform.

use ql_core::Real;
use rand::RngCore;
use rand_mt::Mt19937GenRand64;

/// A uniform pseudo-random number generator based on the Mersenne Twister
/// MT19937-64 algorithm.
#[derive(Clone)]
pub struct MersenneTwisterUniformRng {
    rng: Mt19937GenRand64,
}

impl std::fmt::Debug for MersenneTwisterUniformRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MersenneTwisterUniformRng")
    }
}

impl MersenneTwisterUniformRng {
    /// Create a new generator with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mt19937GenRand64::new(seed),
        }
    }

    /// Generator for sub-stream `stream` of a master `seed`.
    ///
    /// Used to give each block of Monte Carlo paths its own reproducible
    /// stream, independent of how blocks are scheduled across threads.
    pub fn for_stream(seed: u64, stream: u64) -> Self {
        // splitmix64 finaliser decorrelates neighbouring stream indices
        let mut z = seed ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        Self::new(z ^ (z >> 31))
    }

    /// Generate the next uniform deviate in the open interval `(0, 1)`.
    pub fn next_real(&mut self) -> Real {
        // 53 random bits, offset by half an ulp to exclude both ends
        ((self.rng.next_u64() >> 11) as Real + 0.5) * (1.0 / (1u64 << 53) as Real)
    }
}

impl RngCore for MersenneTwisterUniformRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.rng.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
