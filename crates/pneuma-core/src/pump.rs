//! Two-direction pump actuation: pin-pair driving and the timed
//! stop/drive state machine.

use serde::{Deserialize, Serialize};

use crate::config::PumpConfig;

/// Host GPIO seam. The controller is the only caller; implementations just
/// forward to the board's two driver inputs.
pub trait PumpPins {
    fn set_in1(&mut self, high: bool);
    fn set_in2(&mut self, high: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpDirection {
    Inflate,
    Deflate,
}

/// Controller state. `until_ms: None` is a continuous drive (priming-phase
/// inflate); `Some` is a timed command that `tick` expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Stopped,
    Driving {
        direction: PumpDirection,
        until_ms: Option<u64>,
    },
}

/// Owns the physical output pins and the only state machine in the system
/// with real time semantics. Expiry is driven by wall-clock comparison from
/// the scheduler tick, never by a sleeping task.
#[derive(Debug)]
pub struct PumpController<P: PumpPins> {
    pins: P,
    state: PumpState,
    min_pump_ms: u64,
    max_pump_ms: u64,
}

impl<P: PumpPins> PumpController<P> {
    /// Takes ownership of the pins and forces them into the safe state.
    pub fn new(mut pins: P, cfg: &PumpConfig) -> Self {
        pins.set_in1(false);
        pins.set_in2(false);
        Self {
            pins,
            state: PumpState::Stopped,
            min_pump_ms: cfg.min_pump_ms,
            max_pump_ms: cfg.max_pump_ms,
        }
    }

    /// Write the pin pair for a direction (or both LOW for stop).
    ///
    /// The pin going LOW is always written before the pin going HIGH, so
    /// (HIGH, HIGH) is unobservable at every transition: driving both driver
    /// inputs high shorts the H-bridge.
    fn apply_pins(&mut self, direction: Option<PumpDirection>) {
        match direction {
            None => {
                self.pins.set_in1(false);
                self.pins.set_in2(false);
            }
            Some(PumpDirection::Inflate) => {
                self.pins.set_in2(false);
                self.pins.set_in1(true);
            }
            Some(PumpDirection::Deflate) => {
                self.pins.set_in1(false);
                self.pins.set_in2(true);
            }
        }
    }

    /// Continuous drive with no end time, re-assertable every sample.
    /// Re-asserting the current hold direction does not rewrite the pins.
    pub fn hold(&mut self, direction: PumpDirection) {
        if self.state
            == (PumpState::Driving {
                direction,
                until_ms: None,
            })
        {
            return;
        }
        log::debug!("pump hold: {:?}", direction);
        self.apply_pins(Some(direction));
        self.state = PumpState::Driving {
            direction,
            until_ms: None,
        };
    }

    /// Timed command. `seconds <= 0` is a silent no-op; the duration is
    /// clamped into the configured safety bounds, never rejected.
    pub fn trigger(&mut self, direction: PumpDirection, seconds: f32, now_ms: u64) {
        if seconds <= 0.0 {
            return;
        }
        let duration_ms = ((seconds * 1000.0) as u64).clamp(self.min_pump_ms, self.max_pump_ms);
        log::info!("pump trigger: {:?} for {} ms", direction, duration_ms);
        self.apply_pins(Some(direction));
        self.state = PumpState::Driving {
            direction,
            until_ms: Some(now_ms + duration_ms),
        };
    }

    /// Both pins LOW. Safe to call from any state.
    pub fn stop(&mut self) {
        if self.state == PumpState::Stopped {
            return;
        }
        log::debug!("pump stop");
        self.apply_pins(None);
        self.state = PumpState::Stopped;
    }

    /// Scheduler tick: expire a timed command whose end time has passed.
    pub fn tick(&mut self, now_ms: u64) {
        if let PumpState::Driving {
            until_ms: Some(end),
            ..
        } = self.state
        {
            if now_ms > end {
                self.stop();
            }
        }
    }

    /// Whether a timed command is in flight. The orchestrator suppresses new
    /// triggers while this holds ("at most one command in flight").
    pub fn is_actuating(&self) -> bool {
        matches!(
            self.state,
            PumpState::Driving {
                until_ms: Some(_),
                ..
            }
        )
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn direction(&self) -> Option<PumpDirection> {
        match self.state {
            PumpState::Stopped => None,
            PumpState::Driving { direction, .. } => Some(direction),
        }
    }

    /// Remaining time of the current timed command, if any.
    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        match self.state {
            PumpState::Driving {
                until_ms: Some(end),
                ..
            } => Some(end.saturating_sub(now_ms)),
            _ => None,
        }
    }
}
