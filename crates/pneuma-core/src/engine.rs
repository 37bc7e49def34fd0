//! Per-sample orchestration: priming, baseline freeze, feedback control.

use serde::Serialize;

use crate::baseline::BaselineEstimator;
use crate::config::PneumaConfig;
use crate::interval_buffer::IntervalBuffer;
use crate::measurement::HeartRateMeasurement;
use crate::pump::{PumpController, PumpDirection, PumpPins};
use crate::relaxation;
use crate::timestamp::SessionClock;

/// Seed for the step-over-step comparison at the priming→feedback
/// transition; 100 is the baseline itself on the relaxation scale.
const PREV_RELAXATION_SEED: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Priming,
    Feedback,
}

/// Read-only view for display/telemetry; rendering happens in the host
/// after the control path has returned.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub phase: Phase,
    pub connected: bool,
    pub elapsed_ms: u64,
    pub hr_bpm: Option<u16>,
    pub hrv_ms: f32,
    pub baseline_ms: Option<f32>,
    pub relaxation: Option<f32>,
    pub error: Option<f32>,
    pub pump_direction: Option<PumpDirection>,
    pub pump_remaining_ms: Option<u64>,
}

/// Owns all session state (window, baseline, previous relaxation, pump) and
/// sequences the pipeline once per accepted interval sample. Single control
/// flow: the host must not call entry points from more than one execution
/// context.
pub struct FeedbackLoop<P: PumpPins> {
    cfg: PneumaConfig,
    clock: SessionClock,
    intervals: IntervalBuffer,
    baseline: BaselineEstimator,
    pump: PumpController<P>,
    phase: Phase,
    connected: bool,
    prev_relaxation: f32,
    last_hr_bpm: Option<u16>,
    last_relaxation: Option<f32>,
    last_error: Option<f32>,
}

impl<P: PumpPins> FeedbackLoop<P> {
    /// `now_ms` marks the session start; the priming window counts from it.
    pub fn new(cfg: PneumaConfig, pins: P, now_ms: u64) -> Self {
        let intervals = IntervalBuffer::new(
            cfg.session.window_size,
            cfg.session.min_rr_ms,
            cfg.session.max_rr_ms,
        );
        let baseline = BaselineEstimator::new(cfg.session.priming_window_ms);
        let pump = PumpController::new(pins, &cfg.pump);
        Self {
            cfg,
            clock: SessionClock::new(now_ms),
            intervals,
            baseline,
            pump,
            phase: Phase::Priming,
            connected: true,
            prev_relaxation: 0.0,
            last_hr_bpm: None,
            last_relaxation: None,
            last_error: None,
        }
    }

    /// Entry point for one sensor notification. Malformed payloads and
    /// implausible intervals are dropped and the loop continues with stale
    /// HRV; nothing on this path is fatal.
    pub fn on_notification(&mut self, data: &[u8], now_ms: u64) {
        if !self.connected {
            log::debug!("notification while disconnected; ignoring");
            return;
        }
        let measurement = match HeartRateMeasurement::parse(data) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("dropping malformed notification: {}", e);
                return;
            }
        };
        self.last_hr_bpm = Some(measurement.hr_bpm);
        if measurement.rr_ticks.is_empty() {
            return;
        }
        self.clock.note_sample(now_ms);
        for raw_ticks in measurement.rr_ticks {
            self.process_sample(raw_ticks, now_ms);
        }
    }

    fn process_sample(&mut self, raw_ticks: u16, now_ms: u64) {
        if !self.intervals.push(raw_ticks) {
            log::debug!("discarding implausible RR interval: {} ticks", raw_ticks);
            return;
        }
        let hrv = self.intervals.rmssd();
        let elapsed = self.clock.elapsed_ms(now_ms);

        match self.phase {
            Phase::Priming => {
                if elapsed < self.cfg.session.priming_window_ms {
                    self.baseline.observe(hrv, elapsed);
                    // Continuous drive for the whole phase, re-asserted
                    // rather than re-triggered.
                    self.pump.hold(PumpDirection::Inflate);
                } else {
                    // Transition-only step: no actuation for this sample.
                    let baseline = self.baseline.finalize();
                    self.pump.stop();
                    self.prev_relaxation = PREV_RELAXATION_SEED;
                    self.phase = Phase::Feedback;
                    log::info!(
                        "baseline frozen at {:.2} ms ({} samples); entering feedback phase",
                        baseline,
                        self.baseline.sample_count()
                    );
                }
            }
            Phase::Feedback => {
                // Frozen at the transition; finalize() just returns it.
                let baseline = self.baseline.finalize();
                let score = relaxation::score(hrv, baseline, self.prev_relaxation);
                if score.error.abs() > self.cfg.control.noise_threshold
                    && !self.pump.is_actuating()
                {
                    let direction = self.cfg.control.direction_policy.direction_for(score.error);
                    let seconds = score.error.abs() * self.cfg.control.pump_multiplier;
                    self.pump.trigger(direction, seconds, now_ms);
                }
                self.prev_relaxation = score.relaxation;
                self.last_relaxation = Some(score.relaxation);
                self.last_error = Some(score.error);
                log::debug!(
                    "feedback sample: hrv={:.2} relaxation={:.1}% error={:+.3}",
                    hrv,
                    score.relaxation,
                    score.error
                );
            }
        }
    }

    /// Scheduler tick (~10 ms): actuator expiry only. Never blocks.
    pub fn tick(&mut self, now_ms: u64) {
        self.pump.tick(now_ms);
    }

    /// Transport loss: the pump stops immediately regardless of remaining
    /// command time; HRV/baseline state is retained for reconnection.
    pub fn on_disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        self.pump.stop();
        log::info!("sensor disconnected; pump stopped, session state retained");
    }

    /// Reconnection (host-driven) resumes scoring with the existing baseline.
    pub fn on_reconnect(&mut self) {
        if self.connected {
            return;
        }
        self.connected = true;
        log::info!("sensor reconnected; resuming session");
    }

    /// Full session restart: new epoch, empty window, unfrozen baseline.
    pub fn reset(&mut self, now_ms: u64) {
        self.clock.restart(now_ms);
        self.intervals.clear();
        self.baseline = BaselineEstimator::new(self.cfg.session.priming_window_ms);
        self.pump.stop();
        self.phase = Phase::Priming;
        self.connected = true;
        self.prev_relaxation = 0.0;
        self.last_hr_bpm = None;
        self.last_relaxation = None;
        self.last_error = None;
        log::info!("session reset");
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn config(&self) -> &PneumaConfig {
        &self.cfg
    }

    /// Read-only status for the presentation layer.
    pub fn snapshot(&self, now_ms: u64) -> StatusSnapshot {
        StatusSnapshot {
            phase: self.phase,
            connected: self.connected,
            elapsed_ms: self.clock.elapsed_ms(now_ms),
            hr_bpm: self.last_hr_bpm,
            hrv_ms: self.intervals.rmssd(),
            baseline_ms: self.baseline.value(),
            relaxation: self.last_relaxation,
            error: self.last_error,
            pump_direction: self.pump.direction(),
            pump_remaining_ms: self.pump.remaining_ms(now_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PneumaConfig, SessionConfig};

    struct NullPins;

    impl PumpPins for NullPins {
        fn set_in1(&mut self, _high: bool) {}
        fn set_in2(&mut self, _high: bool) {}
    }

    /// Notification payload: flags 0x10 (RR present), HR 70, given RR ms.
    fn note(rr_ms: &[f32]) -> Vec<u8> {
        let mut data = vec![0x10, 70];
        for &ms in rr_ms {
            let ticks = (ms * 1024.0 / 1000.0).round() as u16;
            data.extend_from_slice(&ticks.to_le_bytes());
        }
        data
    }

    /// Short priming window so tests stay readable.
    fn test_config() -> PneumaConfig {
        PneumaConfig {
            session: SessionConfig {
                priming_window_ms: 10_000,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Drive alternating 800/850 ms samples (steady RMSSD ≈ 50) once per
    /// second through the priming window.
    fn primed_loop() -> (FeedbackLoop<NullPins>, u64) {
        let mut fb = FeedbackLoop::new(test_config(), NullPins, 0);
        let mut t = 1_000u64;
        for i in 0..9 {
            let ms = if i % 2 == 0 { 800.0 } else { 850.0 };
            fb.on_notification(&note(&[ms]), t);
            t += 1_000;
        }
        (fb, t)
    }

    #[test]
    fn priming_holds_inflate_continuously() {
        let (fb, t) = primed_loop();
        assert_eq!(fb.phase(), Phase::Priming);
        let snap = fb.snapshot(t);
        assert_eq!(snap.pump_direction, Some(PumpDirection::Inflate));
        assert_eq!(snap.pump_remaining_ms, None); // hold, not a timed pulse
        assert_eq!(snap.baseline_ms, None);
    }

    #[test]
    fn transition_freezes_baseline_and_stops_pump() {
        let (mut fb, t) = primed_loop();
        // t == 10_000: first sample at/after the window boundary
        fb.on_notification(&note(&[800.0]), t);

        assert_eq!(fb.phase(), Phase::Feedback);
        let snap = fb.snapshot(t);
        assert_eq!(snap.pump_direction, None);
        // alternating ±50 ms differences settle RMSSD at ~50
        let baseline = snap.baseline_ms.unwrap();
        assert!((49.0..51.0).contains(&baseline), "baseline={}", baseline);
        // transition-only step: nothing scored yet
        assert_eq!(snap.relaxation, None);
        assert_eq!(snap.error, None);
    }

    #[test]
    fn feedback_triggers_on_noise_exceeding_error() {
        let (mut fb, t) = primed_loop();
        fb.on_notification(&note(&[800.0]), t); // transition

        // A 2000 ms interval spikes RMSSD well past the baseline.
        fb.on_notification(&note(&[2_000.0]), t + 1_000);
        let snap = fb.snapshot(t + 1_000);
        assert!(snap.error.unwrap() > 0.05);
        // rising relaxation inflates under the default policy
        assert_eq!(snap.pump_direction, Some(PumpDirection::Inflate));
        assert!(snap.pump_remaining_ms.unwrap() > 0);
    }

    #[test]
    fn in_flight_command_suppresses_retrigger() {
        let (mut fb, t) = primed_loop();
        fb.on_notification(&note(&[800.0]), t);
        fb.on_notification(&note(&[2_000.0]), t + 1_000);
        let first_end = t + 1_000 + fb.snapshot(t + 1_000).pump_remaining_ms.unwrap();

        // Another qualifying error while still actuating must not extend
        // the in-flight command.
        fb.on_notification(&note(&[300.0]), t + 2_000);
        let snap = fb.snapshot(t + 2_000);
        assert_eq!(t + 2_000 + snap.pump_remaining_ms.unwrap(), first_end);
        // prev_relaxation still updated unconditionally
        assert!(snap.relaxation.is_some());
    }

    #[test]
    fn tick_expires_feedback_command() {
        let (mut fb, t) = primed_loop();
        fb.on_notification(&note(&[800.0]), t);
        fb.on_notification(&note(&[2_000.0]), t + 1_000);
        let end = t + 1_000 + fb.snapshot(t + 1_000).pump_remaining_ms.unwrap();

        fb.tick(end); // not yet past
        assert!(fb.snapshot(end).pump_direction.is_some());
        fb.tick(end + 1);
        assert_eq!(fb.snapshot(end + 1).pump_direction, None);
    }

    #[test]
    fn disconnect_forces_stop_and_preserves_baseline() {
        let (mut fb, t) = primed_loop();
        fb.on_notification(&note(&[800.0]), t);
        fb.on_notification(&note(&[2_000.0]), t + 1_000);
        assert!(fb.snapshot(t + 1_000).pump_direction.is_some());

        fb.on_disconnect();
        let snap = fb.snapshot(t + 1_000);
        assert_eq!(snap.pump_direction, None);
        assert!(!snap.connected);
        assert!(snap.baseline_ms.is_some());

        // notifications while disconnected are ignored
        fb.on_notification(&note(&[900.0]), t + 2_000);
        assert_eq!(fb.snapshot(t + 2_000).hrv_ms, snap.hrv_ms);

        fb.on_reconnect();
        assert_eq!(fb.phase(), Phase::Feedback);
        assert_eq!(fb.snapshot(t + 2_000).baseline_ms, snap.baseline_ms);
    }

    #[test]
    fn reset_restarts_the_session() {
        let (mut fb, t) = primed_loop();
        fb.on_notification(&note(&[800.0]), t);
        assert_eq!(fb.phase(), Phase::Feedback);

        fb.reset(t + 5_000);
        assert_eq!(fb.phase(), Phase::Priming);
        let snap = fb.snapshot(t + 5_000);
        assert_eq!(snap.elapsed_ms, 0);
        assert_eq!(snap.baseline_ms, None);
        assert_eq!(snap.hrv_ms, 0.0);
        assert_eq!(snap.pump_direction, None);
    }

    #[test]
    fn malformed_and_implausible_input_change_nothing() {
        let (mut fb, t) = primed_loop();
        let before = fb.snapshot(t);

        fb.on_notification(&[0x01, 70], t); // truncated 16-bit HR
        fb.on_notification(&note(&[100.0]), t); // below plausible range
        fb.on_notification(&note(&[3_000.0]), t); // above plausible range

        let after = fb.snapshot(t);
        assert_eq!(after.hrv_ms, before.hrv_ms);
        assert_eq!(after.phase, before.phase);
    }

    #[test]
    fn deflate_on_rising_policy_reverses_direction() {
        let mut cfg = test_config();
        cfg.control.direction_policy = crate::config::DirectionPolicy::DeflateOnRising;
        let mut fb = FeedbackLoop::new(cfg, NullPins, 0);
        let mut t = 1_000u64;
        for i in 0..9 {
            let ms = if i % 2 == 0 { 800.0 } else { 850.0 };
            fb.on_notification(&note(&[ms]), t);
            t += 1_000;
        }
        fb.on_notification(&note(&[800.0]), t); // transition
        fb.on_notification(&note(&[2_000.0]), t + 1_000);
        assert_eq!(
            fb.snapshot(t + 1_000).pump_direction,
            Some(PumpDirection::Deflate)
        );
    }

    #[test]
    fn empty_priming_defaults_baseline_to_one() {
        let mut fb = FeedbackLoop::new(test_config(), NullPins, 0);
        // First-ever samples arrive only after the window has elapsed.
        fb.on_notification(&note(&[800.0]), 20_000);
        assert_eq!(fb.phase(), Phase::Feedback);
        assert_eq!(fb.snapshot(20_000).baseline_ms, Some(1.0));
    }
}
