//! Device session state machine: bootstrap, onboarding stream, operating stream
use log::{debug, info, warn};
use rand::Rng;
use std::future::Future;
use std::ops::RangeInclusive;
use time::OffsetDateTime;
use tokio::time::{sleep, Duration};

use crate::command;
use crate::config::SessionConfig;
use crate::error::SimulatorError;
use crate::error::TransportError;
use crate::models::{
    AccelPayload, AccelSample, AlertState, BaselineMetrics, DeviceMode, DeviceStatus, GeoPoint,
    PpgFrame, SessionState, SessionStats, TelemetryPayload,
};
use crate::sensors::{motion, ppg};
use crate::service::StatusService;
use crate::transport::{Channel, QualityLevel, Transport};
use crate::utils::{format_datetime, progress_percent};

// Target heart-rate bands in bpm
const RESTING_HR: RangeInclusive<u32> = 65..=79;
const DROWSY_HR: RangeInclusive<u32> = 55..=64;
const NORMAL_HR: RangeInclusive<u32> = 65..=84;

/// Check a state change against the session lifecycle
///
/// Bootstrapping leads to Onboarding or straight to Operating, Onboarding
/// leads to Operating, and any live state may terminate.
pub fn transition(from: SessionState, to: SessionState) -> Result<SessionState, SimulatorError> {
    use SessionState::*;

    let legal = matches!(
        (from, to),
        (Bootstrapping, Onboarding) | (Bootstrapping, Operating) | (Onboarding, Operating)
    ) || (to == Terminated && from != Terminated);

    if legal {
        Ok(to)
    } else {
        Err(SimulatorError::InvalidTransition { from, to })
    }
}

/// Random choices for one operating cycle
#[derive(Debug, Clone, Copy)]
pub struct CyclePlan {
    pub drowsy: bool,
    pub heart_rate: f64,
    pub location: GeoPoint,
    /// Accelerometer tick carrying the impact, if this cycle crashes
    pub crash_tick: Option<u32>,
}

pub fn plan_cycle<R: Rng + ?Sized>(config: &SessionConfig, rng: &mut R) -> CyclePlan {
    let drowsy = rng.gen_bool(config.drowsy_probability);
    let crash = rng.gen_bool(config.crash_probability);
    let band = if drowsy { DROWSY_HR } else { NORMAL_HR };
    let heart_rate = rng.gen_range(band) as f64;
    let location = config.anchor.jittered(rng);
    let crash_tick = if crash {
        Some(rng.gen_range(0..config.ticks_per_frame))
    } else {
        None
    };

    CyclePlan {
        drowsy,
        heart_rate,
        location,
        crash_tick,
    }
}

/// Query the device status, then connect the transport and run a session
///
/// The status service is asked first so that an unreachable service ends the
/// run before any broker session is opened.
///
/// # Arguments
/// * `config` - Session settings
/// * `service` - Onboarding-status service
/// * `connect` - Opens the transport once the status is known
/// * `rng` - Randomness for the whole session
///
/// # Returns
/// Counters of the finished session
pub async fn launch<S, F, Fut, T, R>(
    config: SessionConfig,
    service: &S,
    connect: F,
    rng: R,
) -> Result<SessionStats, SimulatorError>
where
    S: StatusService + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
    T: Transport,
    R: Rng + Send,
{
    info!("Checking device status...");
    let status = service.check_device(&config.device_id).await?;

    let transport = connect().await?;
    let mut session = Session::new(config, transport, rng);
    session.run(status).await
}

/// One simulated helmet.
///
/// Owns all mutable session state (baseline, alert flag, counters) and is
/// driven from a single task, so nothing here needs locking.
pub struct Session<T, R> {
    config: SessionConfig,
    transport: T,
    rng: R,
    state: SessionState,
    history: Vec<SessionState>,
    baseline: BaselineMetrics,
    alert: AlertState,
    stats: SessionStats,
}

impl<T, R> Session<T, R>
where
    T: Transport,
    R: Rng + Send,
{
    pub fn new(config: SessionConfig, transport: T, rng: R) -> Self {
        Session {
            config,
            transport,
            rng,
            state: SessionState::Bootstrapping,
            history: vec![SessionState::Bootstrapping],
            baseline: BaselineMetrics::default(),
            alert: AlertState::Normal,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> Option<DeviceMode> {
        self.state.mode()
    }

    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn baseline(&self) -> BaselineMetrics {
        self.baseline
    }

    pub fn alert(&self) -> AlertState {
        self.alert
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the whole session and release the transport.
    ///
    /// The transport is released even when the run fails; the run's own
    /// error takes precedence over a failed disconnect.
    pub async fn run(&mut self, status: DeviceStatus) -> Result<SessionStats, SimulatorError> {
        info!(
            "Session for {} started at {}",
            self.config.device_id,
            format_datetime(&OffsetDateTime::now_utc())
        );

        let outcome = self.drive(status).await;
        let released = self.terminate().await;
        outcome?;
        released?;

        info!(
            "Session finished at {}",
            format_datetime(&OffsetDateTime::now_utc())
        );
        let s = &self.stats;
        info!(
            "Summary: {} PPG frames, {} accel samples, {} baseline publishes, {} commands received",
            s.ppg_frames, s.accel_samples, s.baseline_publishes, s.commands_received
        );
        info!(
            "  {} onboarding cycles, {} operating cycles ({} drowsy, {} crash)",
            s.onboarding_cycles, s.operating_cycles, s.drowsy_cycles, s.crash_cycles
        );

        Ok(self.stats.clone())
    }

    async fn drive(&mut self, status: DeviceStatus) -> Result<(), SimulatorError> {
        self.bootstrap(status).await?;

        if self.state == SessionState::Onboarding {
            self.run_onboarding().await?;
            self.advance(SessionState::Operating)?;
        }

        self.run_operating().await
    }

    fn advance(&mut self, next: SessionState) -> Result<(), SimulatorError> {
        self.state = transition(self.state, next)?;
        self.history.push(next);
        debug!("Session state -> {:?}", next);
        Ok(())
    }

    async fn bootstrap(&mut self, status: DeviceStatus) -> Result<(), SimulatorError> {
        if !status.onboarded {
            let minutes = (self.config.onboarding_cycles * self.config.window_secs) as f64 / 60.0;
            info!(
                "Device not onboarded, streaming baseline data for {} cycles (approx {:.1} min)",
                self.config.onboarding_cycles, minutes
            );
            return self.advance(SessionState::Onboarding);
        }

        info!("Device already onboarded");
        match status.baseline {
            Some(baseline) => {
                self.baseline = baseline;
                info!(
                    "Loaded baseline: SDNN={:.2}, RMSSD={:.2}",
                    baseline.sdnn, baseline.rmssd
                );
                self.publish_baseline().await?;
            }
            None => warn!("No stored baseline for this device, nothing to publish"),
        }

        self.advance(SessionState::Operating)
    }

    async fn publish_baseline(&mut self) -> Result<(), SimulatorError> {
        let payload = serde_json::to_vec(&self.baseline)?;
        self.transport
            .publish(Channel::Baseline, QualityLevel::AtLeastOnce, payload)
            .await?;
        self.stats.baseline_publishes += 1;

        info!(
            "Published baseline: SDNN: {:.2}, RMSSD: {:.2}, pNN50: {:.2}",
            self.baseline.sdnn, self.baseline.rmssd, self.baseline.pnn50
        );
        Ok(())
    }

    async fn run_onboarding(&mut self) -> Result<(), SimulatorError> {
        info!("ONBOARDING PHASE - streaming data for remote baseline computation");
        let total = self.config.onboarding_cycles;

        for cycle in 1..=total {
            let heart_rate = self.rng.gen_range(RESTING_HR) as f64;
            let location = self.config.anchor.jittered(&mut self.rng);

            self.publish_frame(heart_rate, location).await?;
            for _ in 0..self.config.ticks_per_frame {
                self.publish_accel(false, location).await?;
                sleep(self.config.tick_interval).await;
            }

            self.stats.onboarding_cycles += 1;
            info!(
                "[{}/{}] {:3}% | Target HR={:.0} bpm | PPG samples={}",
                cycle,
                total,
                progress_percent(cycle, total),
                heart_rate,
                self.config.frame_len()
            );
        }

        // The baseline is derived remotely from the PPG stream; nothing waits for it here
        info!("Onboarding data sent, baseline will be computed remotely");
        sleep(self.config.onboarding_pause).await;
        Ok(())
    }

    async fn run_operating(&mut self) -> Result<(), SimulatorError> {
        info!("NORMAL OPERATION - real-time monitoring");
        let total = self.config.operating_cycles;

        for cycle in 1..=total {
            let plan = plan_cycle(&self.config, &mut self.rng);
            self.operating_cycle(cycle, plan).await?;
        }

        info!("Simulation complete");
        Ok(())
    }

    async fn operating_cycle(&mut self, cycle: u32, plan: CyclePlan) -> Result<(), SimulatorError> {
        self.publish_frame(plan.heart_rate, plan.location).await?;
        info!(
            "[{:3}/{}] PPG sent (HR~{:.0}) | GPS=({:.4}, {:.4})",
            cycle,
            self.config.operating_cycles,
            plan.heart_rate,
            plan.location.lat,
            plan.location.lon
        );

        for tick in 0..self.config.ticks_per_frame {
            let impact = plan.crash_tick == Some(tick);
            let sample = self.publish_accel(impact, plan.location).await?;
            if impact {
                warn!(
                    "CRASH SIMULATED! Accel=({:.1}, {:.1}, {:.1})",
                    sample.x, sample.y, sample.z
                );
            }

            self.poll_command().await?;
            sleep(self.config.tick_interval).await;
        }

        self.stats.operating_cycles += 1;
        if plan.drowsy {
            self.stats.drowsy_cycles += 1;
        }
        if plan.crash_tick.is_some() {
            self.stats.crash_cycles += 1;
        }

        match self.alert {
            AlertState::Drowsy => info!("[DROWSY]"),
            AlertState::Normal => info!("[NORMAL]"),
        }
        Ok(())
    }

    async fn publish_frame(
        &mut self,
        heart_rate: f64,
        location: GeoPoint,
    ) -> Result<(), SimulatorError> {
        let frame = PpgFrame {
            samples: ppg::synthesize(
                self.config.frame_len(),
                self.config.sample_rate,
                heart_rate,
                true,
                &mut self.rng,
            ),
            sample_rate: self.config.sample_rate,
            location,
        };

        let payload = serde_json::to_vec(&TelemetryPayload::new(&self.config.device_id, &frame))?;
        self.transport
            .publish(Channel::Telemetry, QualityLevel::AtLeastOnce, payload)
            .await?;
        self.stats.ppg_frames += 1;
        Ok(())
    }

    async fn publish_accel(
        &mut self,
        simulate_crash: bool,
        location: GeoPoint,
    ) -> Result<AccelSample, SimulatorError> {
        let sample = motion::generate(simulate_crash, &mut self.rng);

        let payload =
            serde_json::to_vec(&AccelPayload::new(&self.config.device_id, &sample, location))?;
        self.transport
            .publish(Channel::Accel, QualityLevel::FireAndForget, payload)
            .await?;
        self.stats.accel_samples += 1;

        debug!("Accel ({:.4}, {:.4}, {:.4})", sample.x, sample.y, sample.z);
        Ok(sample)
    }

    /// Wait briefly for a command, then apply everything already queued in
    /// arrival order so the alert reflects the latest one
    async fn poll_command(&mut self) -> Result<(), SimulatorError> {
        let mut wait = self.config.command_poll;

        while let Some(raw) = self.transport.receive(wait).await? {
            debug!("Command received: {}", String::from_utf8_lossy(&raw));
            self.stats.commands_received += 1;
            self.alert = command::interpret(&raw);
            wait = Duration::ZERO;
        }
        Ok(())
    }

    async fn terminate(&mut self) -> Result<(), SimulatorError> {
        if self.state == SessionState::Terminated {
            return Ok(());
        }
        self.advance(SessionState::Terminated)?;
        self.transport.disconnect().await?;
        info!("Transport released");
        Ok(())
    }
}
