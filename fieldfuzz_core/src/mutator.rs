use rand::Rng;
use rand::SeedableRng;
use rand::seq::IndexedRandom;
use rand_chacha::ChaChaRng;

/// RNG every fuzzing job runs on. Seeded per job so two jobs never share a stream.
pub type FuzzRng = ChaChaRng;

#[derive(Debug)]
/// The mutator is created by the fuzzing engine with a per-job RNG and handed to the protocol
/// session whenever a new message is generated. Every random decision a layout makes (field
/// values, list lengths, the next message type) goes through it, so a job seeded with a fixed
/// value replays the exact same frames.
pub struct Mutator<R: Rng> {
    rng: R,
}

impl Mutator<FuzzRng> {
    /// Mutator seeded from the thread RNG
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(FuzzRng::from_rng(&mut rand::rng()))
    }

    /// Mutator with a fixed seed, frames become reproducible
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::new(FuzzRng::from_seed(seed))
    }
}

impl<R: Rng> Mutator<R> {
    /// creates a new Mutator
    pub fn new(rng: R) -> Mutator<R> {
        Mutator { rng }
    }

    /// Uniformly random value that fits into `bits` bits
    pub fn gen_bits(&mut self, bits: u8) -> u64 {
        match bits {
            0 => 0,
            64.. => self.rng.random(),
            _ => self.rng.random_range(0..(1u64 << bits)),
        }
    }

    /// Uniformly random value of `bits` bits which is not contained in `excluded`.
    /// Falls back to any value if `excluded` covers the whole range.
    pub fn gen_excluding(&mut self, bits: u8, excluded: &[u64]) -> u64 {
        if bits <= 16 {
            let allowed: Vec<u64> = (0..(1u64 << bits))
                .filter(|v| !excluded.contains(v))
                .collect();
            if let Some(value) = allowed.choose(&mut self.rng) {
                return *value;
            }
            return self.gen_bits(bits);
        }
        loop {
            let value = self.gen_bits(bits);
            if !excluded.contains(&value) {
                return value;
            }
        }
    }

    /// Returns a value between min and max (both inclusive)
    pub fn gen_range(&mut self, min: usize, max: usize) -> usize {
        if max <= min {
            return min;
        }
        self.rng.random_range(min..=max)
    }

    /// Selects a random element from the given slice
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// Returns `len` random bytes
    pub fn gen_bytes(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| self.rng.random()).collect()
    }
}
