//! Personal HRV reference established during the priming window.

/// Accumulates RMSSD samples while the priming window is open, then freezes
/// their arithmetic mean exactly once for the remainder of the session.
#[derive(Debug, Clone)]
pub struct BaselineEstimator {
    priming_window_ms: u64,
    samples: Vec<f32>,
    frozen: Option<f32>,
}

impl BaselineEstimator {
    pub fn new(priming_window_ms: u64) -> Self {
        Self {
            priming_window_ms,
            samples: Vec::new(),
            frozen: None,
        }
    }

    /// Accumulate one HRV sample. Only mutates while the window is open and
    /// the value is meaningful (`hrv > 0`). After finalization this is a
    /// no-op: late in-flight samples during the phase transition are
    /// tolerated, not an error.
    pub fn observe(&mut self, hrv: f32, elapsed_ms: u64) {
        if self.frozen.is_some() {
            return;
        }
        if elapsed_ms < self.priming_window_ms && hrv > 0.0 {
            self.samples.push(hrv);
        }
    }

    /// Freeze the reference. Idempotent: the first call computes the mean of
    /// the accumulated samples (1.0 when none were collected, so downstream
    /// normalization never divides by zero); later calls return the frozen
    /// value without recomputation.
    pub fn finalize(&mut self) -> f32 {
        if let Some(v) = self.frozen {
            return v;
        }
        let value = if self.samples.is_empty() {
            log::warn!("no HRV samples accumulated during priming; baseline defaults to 1.0");
            1.0
        } else {
            self.samples.iter().sum::<f32>() / self.samples.len() as f32
        };
        self.frozen = Some(value);
        value
    }

    pub fn is_finalized(&self) -> bool {
        self.frozen.is_some()
    }

    /// Frozen reference, if established.
    pub fn value(&self) -> Option<f32> {
        self.frozen
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}
