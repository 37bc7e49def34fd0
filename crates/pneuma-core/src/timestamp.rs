//! Session time accounting.
//!
//! The host supplies a monotonic millisecond clock; the library never reads
//! wall-clock time itself. This keeps every entry point deterministic and
//! replayable from recorded timestamps.

/// Millisecond delta between two host timestamps, clamped to 0 when the
/// clock appears to flow backwards.
#[inline]
pub fn dt_ms(now_ms: u64, last_ms: u64) -> u64 {
    now_ms.saturating_sub(last_ms)
}

/// Per-session clock: tracks the session epoch and the last sample time.
///
/// A backwards-flowing timestamp is tolerated (delta 0) but logged, since it
/// usually indicates the host mixed clock sources.
#[derive(Debug, Clone)]
pub struct SessionClock {
    session_start_ms: u64,
    last_sample_ms: Option<u64>,
}

impl SessionClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            session_start_ms: now_ms,
            last_sample_ms: None,
        }
    }

    /// Restart the session epoch. Clears the last-sample marker.
    pub fn restart(&mut self, now_ms: u64) {
        self.session_start_ms = now_ms;
        self.last_sample_ms = None;
    }

    /// Time since session start.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        dt_ms(now_ms, self.session_start_ms)
    }

    /// Record a sample arrival; returns the delta since the previous sample
    /// (0 for the first sample of a session).
    pub fn note_sample(&mut self, now_ms: u64) -> u64 {
        let dt = match self.last_sample_ms {
            Some(last) => {
                if now_ms < last {
                    log::warn!(
                        "sample timestamp regression: now={} < last={}",
                        now_ms,
                        last
                    );
                }
                dt_ms(now_ms, last)
            }
            None => 0,
        };
        self.last_sample_ms = Some(now_ms);
        dt
    }

    pub fn session_start_ms(&self) -> u64 {
        self.session_start_ms
    }
}
