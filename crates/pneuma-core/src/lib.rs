//! pneuma-core: closed-loop HRV biofeedback control.
//!
//! Ingests a wearable sensor's beat-to-beat interval stream, derives a
//! short-term HRV metric (RMSSD), freezes a personal baseline over an
//! initial priming window, scores the relaxation trend against it, and
//! drives a two-direction pneumatic pump whose duty reflects that trend.
//!
//! The crate is host-agnostic: the transport layer feeds raw notification
//! bytes into [`FeedbackLoop::on_notification`], a periodic scheduler calls
//! [`FeedbackLoop::tick`], the GPIO layer implements [`PumpPins`], and the
//! presentation layer renders [`StatusSnapshot`]s. All entry points take the
//! host's monotonic millisecond clock as an argument; nothing blocks and
//! nothing reads wall-clock time.

pub mod baseline;
pub mod config;
pub mod engine;
pub mod interval_buffer;
pub mod measurement;
pub mod pump;
pub mod relaxation;
pub mod timestamp;

#[cfg(test)]
pub mod tests_proptest;

// Configuration
pub use config::{
    ConfigError, ControlConfig, DirectionPolicy, PneumaConfig, PumpConfig, SessionConfig,
};

// Signal pipeline
pub use baseline::BaselineEstimator;
pub use interval_buffer::IntervalBuffer;
pub use measurement::{rr_ticks_to_ms, HeartRateMeasurement, MeasurementError};
pub use relaxation::{score, Score};

// Actuation
pub use pump::{PumpController, PumpDirection, PumpPins, PumpState};

// Orchestrator
pub use engine::{FeedbackLoop, Phase, StatusSnapshot};

// Session time accounting
pub use timestamp::{dt_ms, SessionClock};
