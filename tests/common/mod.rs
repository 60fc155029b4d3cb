//! Seeded toy keys shared by the integration tests.

#![allow(dead_code)]

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use uov_recover::toy::ToyInstance;
use uov_recover::{Parameters, Vector};

pub fn plant(v: usize, m: usize, seed: u64) -> ToyInstance {
    let params = Parameters::new(v, m).unwrap();
    ToyInstance::generate(params, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap()
}

/// A random nonzero element of the planted oil space.
pub fn leak(planted: &ToyInstance, seed: u64) -> Vector {
    planted.random_oil_vector(&mut ChaCha8Rng::seed_from_u64(seed))
}
