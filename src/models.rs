use rand::Rng;
use serde::Serialize;

/// Heart-rate-variability baseline for the simulated device.
///
/// Unset fields stay at zero. Serialized field names match the baseline
/// channel payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BaselineMetrics {
    pub mean_hr: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
    pub lf_hf_ratio: f64,
    pub sd1_sd2_ratio: f64,
}

/// Onboarding result reported by the status service
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub onboarded: bool,
    /// Present only when the device is onboarded and the response carried
    /// at least one baseline field.
    pub baseline: Option<BaselineMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Onboarding,
    Operating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Bootstrapping,
    Onboarding,
    Operating,
    Terminated,
}

impl SessionState {
    pub fn mode(self) -> Option<DeviceMode> {
        match self {
            SessionState::Onboarding => Some(DeviceMode::Onboarding),
            SessionState::Operating => Some(DeviceMode::Operating),
            SessionState::Bootstrapping | SessionState::Terminated => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlertState {
    #[default]
    Normal,
    Drowsy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Offset both coordinates by k/10000 degrees, k uniform in 0..100
    pub fn jittered<R: Rng + ?Sized>(&self, rng: &mut R) -> GeoPoint {
        GeoPoint {
            lat: self.lat + rng.gen_range(0..100) as f64 / 10_000.0,
            lon: self.lon + rng.gen_range(0..100) as f64 / 10_000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PpgFrame {
    pub samples: Vec<u16>,
    pub sample_rate: u32,
    pub location: GeoPoint,
}

/// Three-axis acceleration, +z is device-up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Wire format of the telemetry channel
#[derive(Debug, Serialize)]
pub struct TelemetryPayload<'a> {
    pub device_id: &'a str,
    pub ppg: &'a [u16],
    pub sample_rate: u32,
    pub lat: f64,
    pub lon: f64,
}

impl<'a> TelemetryPayload<'a> {
    pub fn new(device_id: &'a str, frame: &'a PpgFrame) -> Self {
        TelemetryPayload {
            device_id,
            ppg: &frame.samples,
            sample_rate: frame.sample_rate,
            lat: frame.location.lat,
            lon: frame.location.lon,
        }
    }
}

/// Wire format of the accel channel
#[derive(Debug, Serialize)]
pub struct AccelPayload<'a> {
    pub device_id: &'a str,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    pub lat: f64,
    pub lon: f64,
}

impl<'a> AccelPayload<'a> {
    pub fn new(device_id: &'a str, sample: &AccelSample, location: GeoPoint) -> Self {
        AccelPayload {
            device_id,
            accel_x: sample.x,
            accel_y: sample.y,
            accel_z: sample.z,
            lat: location.lat,
            lon: location.lon,
        }
    }
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub ppg_frames: u32,
    pub accel_samples: u32,
    pub baseline_publishes: u32,
    pub onboarding_cycles: u32,
    pub operating_cycles: u32,
    pub drowsy_cycles: u32,
    pub crash_cycles: u32,
    pub commands_received: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn jitter_stays_within_hundredth_degree() {
        let anchor = GeoPoint {
            lat: -6.2,
            lon: 106.8167,
        };
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..1000 {
            let p = anchor.jittered(&mut rng);
            assert!(p.lat >= anchor.lat && p.lat < anchor.lat + 0.01);
            assert!(p.lon >= anchor.lon && p.lon < anchor.lon + 0.01);
        }
    }

    #[test]
    fn telemetry_payload_field_names() {
        let frame = PpgFrame {
            samples: vec![2048, 3000],
            sample_rate: 50,
            location: GeoPoint { lat: 1.5, lon: 2.5 },
        };
        let json = serde_json::to_value(TelemetryPayload::new("HELMET001", &frame)).unwrap();

        assert_eq!(json["device_id"], "HELMET001");
        assert_eq!(json["ppg"], serde_json::json!([2048, 3000]));
        assert_eq!(json["sample_rate"], 50);
        assert_eq!(json["lat"], 1.5);
        assert_eq!(json["lon"], 2.5);
    }

    #[test]
    fn only_active_states_carry_a_mode() {
        assert_eq!(SessionState::Bootstrapping.mode(), None);
        assert_eq!(SessionState::Onboarding.mode(), Some(DeviceMode::Onboarding));
        assert_eq!(SessionState::Operating.mode(), Some(DeviceMode::Operating));
        assert_eq!(SessionState::Terminated.mode(), None);
    }
}
