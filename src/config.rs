use log::info;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::GeoPoint;

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker_url: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub ack_timeout: Duration,
}

/// Onboarding-status service settings
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub base_url: String,
    pub timeout: Duration,
}

/// Cycle counts, cadence and scenario probabilities for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device_id: String,
    pub onboarding_cycles: u32,
    pub operating_cycles: u32,
    pub sample_rate: u32,
    pub window_secs: u32,
    pub ticks_per_frame: u32,
    pub tick_interval: Duration,
    pub command_poll: Duration,
    pub onboarding_pause: Duration,
    pub drowsy_probability: f64,
    pub crash_probability: f64,
    pub anchor: GeoPoint,
}

impl SessionConfig {
    /// PPG samples per frame, constant for the whole session
    pub fn frame_len(&self) -> usize {
        (self.sample_rate * self.window_secs) as usize
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            device_id: "HELMET001".to_string(),
            onboarding_cycles: 12,
            operating_cycles: 100,
            sample_rate: 50,
            window_secs: 5,
            ticks_per_frame: 50,
            tick_interval: Duration::from_millis(100),
            command_poll: Duration::from_millis(10),
            onboarding_pause: Duration::from_secs(2),
            drowsy_probability: 0.10,
            crash_probability: 0.02,
            anchor: GeoPoint {
                lat: -6.2000,
                lon: 106.8167,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub mqtt: MqttSettings,
    pub service: ServiceSettings,
    pub session: SessionConfig,
    pub seed: Option<u64>,
}

impl SimulatorConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SessionConfig::default();
        let vars = Vars(&lookup);

        let device_id = vars.string("DEVICE_ID", &defaults.device_id);
        let client_id = vars.string("MQTT_CLIENT_ID", "SmartHelmetSim");
        for (key, value) in [("DEVICE_ID", &device_id), ("MQTT_CLIENT_ID", &client_id)] {
            // Topic separators and wildcards would escape the device namespace
            if value.contains(&['/', '+', '#'][..]) {
                return Err(invalid(key, value));
            }
        }

        let keep_alive_secs: u64 = vars.parse("MQTT_KEEP_ALIVE_SECS", 60)?;
        if keep_alive_secs < 5 {
            return Err(invalid("MQTT_KEEP_ALIVE_SECS", &keep_alive_secs.to_string()));
        }

        let mqtt = MqttSettings {
            broker_url: vars.string("MQTT_BROKER_URL", "mqtt://localhost:1883"),
            client_id,
            username: lookup("MQTT_USERNAME").filter(|s| !s.is_empty()),
            password: lookup("MQTT_PASSWORD"),
            keep_alive: Duration::from_secs(keep_alive_secs),
            connect_timeout: Duration::from_millis(
                vars.parse("MQTT_CONNECT_TIMEOUT_MS", 10_000)?,
            ),
            ack_timeout: Duration::from_millis(vars.parse("ACK_TIMEOUT_MS", 10_000)?),
        };

        let service = ServiceSettings {
            base_url: vars.string("STATUS_SERVICE_URL", "http://localhost/api/fast"),
            timeout: Duration::from_millis(vars.parse("HTTP_TIMEOUT_MS", 10_000)?),
        };

        let session = SessionConfig {
            device_id,
            onboarding_cycles: vars.parse("ONBOARDING_CYCLES", defaults.onboarding_cycles)?,
            operating_cycles: vars.parse("OPERATING_CYCLES", defaults.operating_cycles)?,
            sample_rate: vars.positive("PPG_SAMPLE_RATE", defaults.sample_rate)?,
            window_secs: vars.positive("PPG_WINDOW_SECS", defaults.window_secs)?,
            ticks_per_frame: vars.positive("ACCEL_TICKS_PER_FRAME", defaults.ticks_per_frame)?,
            tick_interval: Duration::from_millis(vars.parse("ACCEL_INTERVAL_MS", 100)?),
            command_poll: Duration::from_millis(vars.parse("COMMAND_POLL_MS", 10)?),
            onboarding_pause: Duration::from_millis(vars.parse("ONBOARDING_PAUSE_MS", 2000)?),
            drowsy_probability: vars
                .probability("DROWSY_PROBABILITY", defaults.drowsy_probability)?,
            crash_probability: vars
                .probability("CRASH_PROBABILITY", defaults.crash_probability)?,
            anchor: GeoPoint {
                lat: vars.parse("ANCHOR_LAT", defaults.anchor.lat)?,
                lon: vars.parse("ANCHOR_LON", defaults.anchor.lon)?,
            },
        };

        let seed = match lookup("SIM_SEED") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| invalid("SIM_SEED", &raw))?),
            None => None,
        };

        Ok(SimulatorConfig {
            mqtt,
            service,
            session,
            seed,
        })
    }

    pub fn log_summary(&self) {
        let s = &self.session;
        info!("Device ID: {}", s.device_id);
        info!(
            "PPG: {} Hz, {} samples per transmission",
            s.sample_rate,
            s.frame_len()
        );
        info!(
            "Accel: {} samples per frame, every {} ms",
            s.ticks_per_frame,
            s.tick_interval.as_millis()
        );
        info!(
            "Cycles: {} onboarding, {} operating",
            s.onboarding_cycles, s.operating_cycles
        );
        info!("Broker: {}", self.mqtt.broker_url);
        info!("Status service: {}", self.service.base_url);
        if let Some(seed) = self.seed {
            info!("Random seed: {}", seed);
        }
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str, default: &str) -> String {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match (self.0)(key) {
            Some(raw) if !raw.trim().is_empty() => {
                raw.trim().parse().map_err(|_| invalid(key, &raw))
            }
            _ => Ok(default),
        }
    }

    fn positive(&self, key: &str, default: u32) -> Result<u32, ConfigError> {
        let value = self.parse(key, default)?;
        if value == 0 {
            return Err(invalid(key, "0"));
        }
        Ok(value)
    }

    fn probability(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        let value: f64 = self.parse(key, default)?;
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid(key, &value.to_string()));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<SimulatorConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SimulatorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_reference_device() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.session.device_id, "HELMET001");
        assert_eq!(config.session.onboarding_cycles, 12);
        assert_eq!(config.session.operating_cycles, 100);
        assert_eq!(config.session.frame_len(), 250);
        assert_eq!(config.session.ticks_per_frame, 50);
        assert_eq!(config.session.command_poll, Duration::from_millis(10));
        assert_eq!(config.mqtt.broker_url, "mqtt://localhost:1883");
        assert_eq!(config.mqtt.client_id, "SmartHelmetSim");
        assert_eq!(config.mqtt.username, None);
        assert_eq!(config.service.base_url, "http://localhost/api/fast");
        assert_eq!(config.seed, None);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("DEVICE_ID", "HELMET042"),
            ("ONBOARDING_CYCLES", "3"),
            ("MQTT_USERNAME", "helmet"),
            ("MQTT_PASSWORD", "secret"),
            ("SIM_SEED", "1234"),
            ("CRASH_PROBABILITY", "0.5"),
        ])
        .unwrap();

        assert_eq!(config.session.device_id, "HELMET042");
        assert_eq!(config.session.onboarding_cycles, 3);
        assert_eq!(config.mqtt.username.as_deref(), Some("helmet"));
        assert_eq!(config.mqtt.password.as_deref(), Some("secret"));
        assert_eq!(config.seed, Some(1234));
        assert_eq!(config.session.crash_probability, 0.5);
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = config_from(&[("OPERATING_CYCLES", "lots")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "OPERATING_CYCLES".to_string(),
                value: "lots".to_string(),
            }
        );
    }

    #[test]
    fn rejects_out_of_range_probability_and_zero_rate() {
        assert!(config_from(&[("DROWSY_PROBABILITY", "1.5")]).is_err());
        assert!(config_from(&[("PPG_SAMPLE_RATE", "0")]).is_err());
    }

    #[test]
    fn rejects_device_id_that_escapes_namespace() {
        assert!(config_from(&[("DEVICE_ID", "a/b")]).is_err());
        assert!(config_from(&[("DEVICE_ID", "helmet+")]).is_err());
        assert_eq!(
            config_from(&[("DEVICE_ID", "   ")]).unwrap().session.device_id,
            "HELMET001"
        );
    }
}
