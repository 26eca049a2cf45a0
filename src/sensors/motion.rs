//! Accelerometer sample generation for normal riding and impacts
use rand::Rng;

use crate::models::AccelSample;

/// Draw one accelerometer sample
///
/// Normal riding is small lateral vibration around the gravity vector on +z.
/// An impact is a large shock on every axis with a non-negative vertical
/// component.
pub fn generate<R: Rng + ?Sized>(simulate_crash: bool, rng: &mut R) -> AccelSample {
    if simulate_crash {
        AccelSample {
            x: rng.gen_range(-10.0..=10.0),
            y: rng.gen_range(-10.0..=10.0),
            z: rng.gen_range(0.0..=10.0),
        }
    } else {
        AccelSample {
            x: rng.gen_range(-1.0..=1.0),
            y: rng.gen_range(-1.0..=1.0),
            z: rng.gen_range(9.3..=10.3),
        }
    }
}
