//! Photoplethysmogram waveform synthesis
use rand::Rng;
use std::f64::consts::PI;

// Waveform shape constants (phase in [0, 1) within one beat)
const SYSTOLIC_PHASE: f64 = 0.2;
const SYSTOLIC_WIDTH: f64 = 10.0;
const SYSTOLIC_AMPLITUDE: f64 = 0.8;
const DICROTIC_PHASE: f64 = 0.4;
const DICROTIC_WIDTH: f64 = 15.0;
const DICROTIC_AMPLITUDE: f64 = 0.3;
const RESPIRATORY_HZ: f64 = 0.1;
const RESPIRATORY_AMPLITUDE: f64 = 0.1;
const HRV_HZ: f64 = 0.15;
const HRV_AMPLITUDE: f64 = 0.02;
const NOISE_AMPLITUDE: f64 = 0.05;

// 12-bit ADC mapping
const ADC_OFFSET: f64 = 2048.0;
const ADC_GAIN: f64 = 1500.0;
pub const ADC_MAX: u16 = 4095;

/// Synthesize one PPG window
///
/// The waveform is periodic with period `60 / heart_rate_bpm` seconds. Each
/// beat is a Gaussian systolic peak plus a smaller dicrotic bump, riding on a
/// slow respiratory sinusoid and a small heart-rate-variability sinusoid.
///
/// # Arguments
/// * `sample_count` - Number of samples to produce
/// * `sample_rate` - Sampling rate in Hz
/// * `heart_rate_bpm` - Target heart rate
/// * `inject_noise` - Add uniform sensor noise in [-0.05, 0.05]
/// * `rng` - Noise source; never drawn from when `inject_noise` is false
///
/// # Returns
/// `sample_count` ADC values in [0, 4095]
pub fn synthesize<R: Rng + ?Sized>(
    sample_count: usize,
    sample_rate: u32,
    heart_rate_bpm: f64,
    inject_noise: bool,
    rng: &mut R,
) -> Vec<u16> {
    let rate = sample_rate as f64;
    let samples_per_beat = (60.0 / heart_rate_bpm) * rate;

    (0..sample_count)
        .map(|i| {
            let t = i as f64 / rate;
            let phase = (i as f64 % samples_per_beat) / samples_per_beat;

            let mut signal = pulse_shape(phase) + modulation(t);
            if inject_noise {
                signal += rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
            }

            to_adc(signal)
        })
        .collect()
}

fn pulse_shape(phase: f64) -> f64 {
    gaussian(phase, SYSTOLIC_PHASE, SYSTOLIC_WIDTH) * SYSTOLIC_AMPLITUDE
        + gaussian(phase, DICROTIC_PHASE, DICROTIC_WIDTH) * DICROTIC_AMPLITUDE
}

fn gaussian(phase: f64, center: f64, width: f64) -> f64 {
    (-((phase - center) * width).powi(2)).exp()
}

fn modulation(t: f64) -> f64 {
    let respiratory = RESPIRATORY_AMPLITUDE * (2.0 * PI * RESPIRATORY_HZ * t).sin();
    let hrv = HRV_AMPLITUDE * (2.0 * PI * HRV_HZ * t).sin();
    respiratory + hrv
}

fn to_adc(signal: f64) -> u16 {
    (ADC_OFFSET + signal * ADC_GAIN)
        .round()
        .clamp(0.0, ADC_MAX as f64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const RATE: u32 = 50;
    const WINDOW: usize = 250;

    proptest! {
        #[test]
        fn samples_stay_in_adc_range(
            hr in 40.0f64..=200.0,
            seed in any::<u64>(),
            noise in any::<bool>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let samples = synthesize(WINDOW, RATE, hr, noise, &mut rng);

            prop_assert_eq!(samples.len(), WINDOW);
            prop_assert!(samples.iter().all(|&s| s <= ADC_MAX));
        }

        #[test]
        fn noiseless_output_ignores_rng(
            hr in 40.0f64..=200.0,
            a in any::<u64>(),
            b in any::<u64>(),
        ) {
            let first = synthesize(WINDOW, RATE, hr, false, &mut StdRng::seed_from_u64(a));
            let second = synthesize(WINDOW, RATE, hr, false, &mut StdRng::seed_from_u64(b));

            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn same_seed_reproduces_noisy_window() {
        let first = synthesize(WINDOW, RATE, 72.0, true, &mut StdRng::seed_from_u64(11));
        let second = synthesize(WINDOW, RATE, 72.0, true, &mut StdRng::seed_from_u64(11));

        assert_eq!(first, second);
    }

    #[test]
    fn one_systolic_peak_per_beat() {
        let mut rng = StdRng::seed_from_u64(0);

        for hr in [40.0, 60.0, 75.0, 120.0, 200.0] {
            let samples = synthesize(WINDOW, RATE, hr, false, &mut rng);
            let per_beat = 60.0 / hr * RATE as f64;
            assert!(per_beat >= 4.0);

            let mut beat = 0.0;
            while ((beat + 1.0) * per_beat).ceil() as usize <= WINDOW {
                let start = (beat * per_beat).ceil() as usize;
                let end = ((beat + 1.0) * per_beat).ceil() as usize;

                let peak = (start..end).max_by_key(|&i| samples[i]).unwrap();
                let phase = (peak as f64 % per_beat) / per_beat;
                assert!(
                    (phase - SYSTOLIC_PHASE).abs() <= 1.0 / per_beat + 0.02,
                    "hr={} beat={} peak phase {}",
                    hr,
                    beat,
                    phase
                );

                // Strict maximum: nothing else in the beat comes close to the peak
                let runner_up = (start..end)
                    .filter(|&i| (i as isize - peak as isize).abs() > 1)
                    .map(|i| samples[i])
                    .max()
                    .unwrap_or(0);
                assert!(samples[peak] > runner_up);

                beat += 1.0;
            }
        }
    }

    #[test]
    fn flat_phase_sits_near_adc_midpoint() {
        // Phase 0.7 is far from both bumps, so only the slow sinusoids remain
        let signal = pulse_shape(0.7) + modulation(0.0);
        let value = to_adc(signal);

        assert!((2040..=2060).contains(&value), "got {}", value);
    }

    #[test]
    fn adc_mapping_clamps() {
        assert_eq!(to_adc(10.0), ADC_MAX);
        assert_eq!(to_adc(-10.0), 0);
        assert_eq!(to_adc(0.0), 2048);
    }
}
