//! Deterministic random streams for reproducible benchmark runs.
//!
//! Every randomized decision in the engine (document shapes, target selection, shuffles) draws
//! from a [SeededRng] so that a fixed seed replays the exact same run, in the same process or a
//! different one. The stream is backed by `ChaCha8Rng`, whose output is documented to be stable
//! across platforms and releases.

use crate::errors::{BenchError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// The 62-character alphabet used by [SeededRng::next_alphanumeric].
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// A deterministic pseudorandom stream initialized from a 64-bit seed.
///
/// Two instances with the same seed produce identical outputs for any identical sequence of
/// calls. Independent sub-streams for parallel sections come from [SeededRng::fork], never from
/// copying internal state.
pub struct SeededRng {
    seed: u64,
    stream: ChaCha8Rng,
}

impl SeededRng {
    /// Constructs a stream from the specified seed.
    pub fn from_seed(seed: u64) -> SeededRng {
        SeededRng {
            seed,
            stream: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Constructs a stream from a fresh, OS-provided seed. The seed remains observable via
    /// [SeededRng::seed] so the run can still be reported and replayed.
    pub fn from_entropy() -> SeededRng {
        SeededRng::from_seed(rand::random())
    }

    /// Returns the seed this stream was initialized from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns a new independent stream whose seed is drawn from this one.
    pub fn fork(&mut self) -> SeededRng {
        let seed = self.next_long() as u64;
        SeededRng::from_seed(seed)
    }

    /// Returns the next 32-bit integer, over the full range.
    pub fn next_int(&mut self) -> i32 {
        self.stream.gen()
    }

    /// Returns the next integer in `[0, bound)`.
    pub fn next_int_bounded(&mut self, bound: i32) -> Result<i32> {
        if bound <= 0 {
            return Err(BenchError::configuration(format!(
                "random bound must be positive, got {}",
                bound
            )));
        }
        Ok(self.stream.gen_range(0..bound))
    }

    /// Returns the next integer in `[min, max]`.
    pub fn next_int_in_range(&mut self, min: i32, max: i32) -> Result<i32> {
        if min > max {
            return Err(BenchError::configuration(format!(
                "inverted random range [{}, {}]",
                min, max
            )));
        }
        Ok(self.stream.gen_range(min..=max))
    }

    /// Returns the next 64-bit integer, over the full range.
    pub fn next_long(&mut self) -> i64 {
        self.stream.gen()
    }

    /// Returns the next 64-bit integer in `[0, bound)`.
    pub fn next_long_bounded(&mut self, bound: i64) -> Result<i64> {
        if bound <= 0 {
            return Err(BenchError::configuration(format!(
                "random bound must be positive, got {}",
                bound
            )));
        }
        Ok(self.stream.gen_range(0..bound))
    }

    /// Returns the next double in `[0, 1)`.
    pub fn next_double(&mut self) -> f64 {
        self.stream.gen()
    }

    /// Returns the next boolean.
    pub fn next_boolean(&mut self) -> bool {
        self.stream.gen()
    }

    /// Returns an alphanumeric string of the specified length, drawn uniformly from
    /// `[A-Za-z0-9]`. A zero length returns the empty string.
    pub fn next_alphanumeric(&mut self, length: usize) -> String {
        let mut value = String::with_capacity(length);
        for _ in 0..length {
            let index = self.stream.gen_range(0..ALPHANUMERIC.len());
            value.push(ALPHANUMERIC[index] as char);
        }
        value
    }

    /// Shuffles the slice in place with a Fisher-Yates walk over this stream.
    pub fn shuffle<T>(&mut self, values: &mut [T]) {
        for i in (1..values.len()).rev() {
            let j = self.stream.gen_range(0..=i);
            values.swap(i, j);
        }
    }
}
