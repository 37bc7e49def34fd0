use proptest::prelude::*;

/// Property-based suite for the invariants that must hold under arbitrary
/// input: window bounds, duration clamping, and pin-pair exclusivity.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PumpConfig;
    use crate::interval_buffer::IntervalBuffer;
    use crate::measurement::rr_ticks_to_ms;
    use crate::pump::{PumpController, PumpDirection, PumpPins};

    proptest! {
        #[test]
        fn buffer_never_exceeds_capacity(ticks in prop::collection::vec(any::<u16>(), 0..200)) {
            let mut buf = IntervalBuffer::new(30, 200.0, 2500.0);
            for t in ticks {
                let ms = rr_ticks_to_ms(t);
                let accepted = buf.push(t);
                prop_assert_eq!(accepted, (200.0..=2500.0).contains(&ms));
                prop_assert!(buf.len() <= 30);
            }
        }

        #[test]
        fn rejected_ticks_never_move_rmssd(
            valid_ms in prop::collection::vec(250.0f32..2400.0, 2..40),
            bad_tick in any::<u16>(),
        ) {
            let mut buf = IntervalBuffer::new(30, 200.0, 2500.0);
            for ms in valid_ms {
                buf.push((ms * 1024.0 / 1000.0).round() as u16);
            }
            let before = buf.rmssd();
            let ms = rr_ticks_to_ms(bad_tick);
            prop_assume!(!(200.0..=2500.0).contains(&ms));
            prop_assert!(!buf.push(bad_tick));
            prop_assert_eq!(buf.rmssd(), before);
        }

        #[test]
        fn rmssd_matches_direct_computation(
            valid_ms in prop::collection::vec(250.0f32..2400.0, 2..30),
        ) {
            let mut buf = IntervalBuffer::new(30, 200.0, 2500.0);
            let mut stored = Vec::new();
            for ms in valid_ms {
                let ticks = (ms * 1024.0 / 1000.0).round() as u16;
                if buf.push(ticks) {
                    stored.push(rr_ticks_to_ms(ticks));
                }
            }
            prop_assume!(stored.len() >= 2);
            let sum: f32 = stored.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
            let expected = (sum / (stored.len() - 1) as f32).sqrt();
            prop_assert!((buf.rmssd() - expected).abs() < 1e-2);
        }
    }

    /// Panics the instant both driver inputs are high, so any command
    /// sequence that reaches the forbidden pin pair fails its test case.
    #[derive(Default)]
    struct CheckedPins {
        in1: bool,
        in2: bool,
    }

    impl PumpPins for CheckedPins {
        fn set_in1(&mut self, high: bool) {
            self.in1 = high;
            assert!(!(self.in1 && self.in2), "both driver inputs high");
        }
        fn set_in2(&mut self, high: bool) {
            self.in2 = high;
            assert!(!(self.in1 && self.in2), "both driver inputs high");
        }
    }

    /// Arbitrary command stream against the controller.
    #[derive(Debug, Clone)]
    enum Cmd {
        Trigger(bool, f32),
        Hold(bool),
        Stop,
        Tick(u64),
    }

    fn cmd_strategy() -> impl Strategy<Value = Cmd> {
        prop_oneof![
            (any::<bool>(), -5.0f32..20.0).prop_map(|(d, s)| Cmd::Trigger(d, s)),
            any::<bool>().prop_map(Cmd::Hold),
            Just(Cmd::Stop),
            (0u64..100_000).prop_map(Cmd::Tick),
        ]
    }

    fn dir(inflate: bool) -> PumpDirection {
        if inflate {
            PumpDirection::Inflate
        } else {
            PumpDirection::Deflate
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn pins_never_both_high(cmds in prop::collection::vec(cmd_strategy(), 1..60)) {
            // CheckedPins panics on the forbidden pair; surviving the whole
            // sequence is the property.
            let mut pump = PumpController::new(CheckedPins::default(), &PumpConfig::default());
            let mut now = 0u64;
            for cmd in cmds {
                match cmd {
                    Cmd::Trigger(inflate, seconds) => pump.trigger(dir(inflate), seconds, now),
                    Cmd::Hold(inflate) => pump.hold(dir(inflate)),
                    Cmd::Stop => pump.stop(),
                    Cmd::Tick(advance) => {
                        now += advance;
                        pump.tick(now);
                    }
                }
            }
            pump.stop();
            prop_assert_eq!(pump.remaining_ms(now), None);
        }

        #[test]
        fn trigger_duration_always_within_bounds(seconds in 0.0001f32..1000.0) {
            let mut pump = PumpController::new(CheckedPins::default(), &PumpConfig::default());
            pump.trigger(PumpDirection::Inflate, seconds, 0);
            let remaining = pump.remaining_ms(0).expect("positive seconds must actuate");
            prop_assert!((100..=5_000).contains(&remaining));
        }
    }
}
