use clap::{Parser, Subcommand};
use pneuma_core::{FeedbackLoop, Phase, PneumaConfig, PumpConfig, PumpPins, StatusSnapshot};

#[derive(Parser)]
#[command(name = "pneuma", about = "HRV biofeedback pump controller harness")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, validate and print the effective configuration.
    Config {
        /// TOML config file; defaults are used when omitted.
        #[arg(long)]
        path: Option<String>,
    },
    /// Run a simulated session against mock pump pins.
    Demo {
        /// Virtual session length in seconds.
        #[arg(long, default_value_t = 300)]
        seconds: u64,
        /// TOML config file; defaults are used when omitted.
        #[arg(long)]
        config: Option<String>,
        /// Use the high-capacity pump profile (8 s clamp).
        #[arg(long)]
        extended: bool,
        /// Emit snapshots as JSON lines instead of human-readable rows.
        #[arg(long)]
        json: bool,
    },
}

/// Mock GPIO: logs every pin write so pump transitions show up with RUST_LOG.
#[derive(Default)]
struct LoggingPins {
    in1: bool,
    in2: bool,
}

impl PumpPins for LoggingPins {
    fn set_in1(&mut self, high: bool) {
        self.in1 = high;
        log::debug!("pins: IN1={} IN2={}", self.in1 as u8, self.in2 as u8);
    }
    fn set_in2(&mut self, high: bool) {
        self.in2 = high;
        log::debug!("pins: IN1={} IN2={}", self.in1 as u8, self.in2 as u8);
    }
}

fn load_config(path: Option<&str>) -> Result<PneumaConfig, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(PneumaConfig::from_file_with_env(p)?),
        None => Ok(PneumaConfig::default()),
    }
}

/// Synthetic RR interval (ms): slow sinusoidal drift plus alternating
/// jitter whose amplitude itself oscillates, so RMSSD moves enough to
/// cross the feedback noise gate.
fn synth_rr_ms(beat_index: u64, now_ms: u64) -> f64 {
    use std::f64::consts::TAU;
    let t = now_ms as f64 / 1000.0;
    let drift = 40.0 * (t / 45.0 * TAU).sin();
    let amp = 25.0 + 15.0 * (t / 30.0 * TAU).sin();
    let jitter = if beat_index % 2 == 0 { amp } else { -amp };
    800.0 + drift + jitter
}

fn print_snapshot(snap: &StatusSnapshot, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string(snap)?);
        return Ok(());
    }
    let fmt1 = |v: Option<f32>| v.map_or("-".to_string(), |v| format!("{:.1}", v));
    println!(
        "[{:>7} ms] phase={:?} hr={} hrv={:.1} baseline={} relax={}% err={} pump={}",
        snap.elapsed_ms,
        snap.phase,
        snap.hr_bpm.map_or("-".to_string(), |v| v.to_string()),
        snap.hrv_ms,
        fmt1(snap.baseline_ms),
        fmt1(snap.relaxation),
        snap.error.map_or("-".to_string(), |v| format!("{:+.3}", v)),
        snap.pump_direction.map_or("stopped".to_string(), |d| {
            match snap.pump_remaining_ms {
                Some(ms) => format!("{:?}({} ms left)", d, ms),
                None => format!("{:?}(hold)", d),
            }
        }),
    );
    Ok(())
}

fn run_demo(
    cfg: PneumaConfig,
    seconds: u64,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut fb = FeedbackLoop::new(cfg, LoggingPins::default(), 0);
    let end_ms = seconds * 1_000;
    let mut now: u64 = 0;
    let mut next_beat_ms = 1_000.0f64;
    let mut beat_index: u64 = 0;
    let mut last_print: u64 = 0;
    let mut last_phase: Phase = fb.phase();

    // 10 ms scheduler tick, beats scheduled by the synthetic RR itself.
    while now <= end_ms {
        fb.tick(now);
        if now as f64 >= next_beat_ms {
            let rr_ms = synth_rr_ms(beat_index, now);
            let hr_bpm = (60_000.0 / rr_ms).round() as u8;
            let ticks = (rr_ms * 1024.0 / 1000.0).round() as u16;
            let mut data = vec![0x10, hr_bpm];
            data.extend_from_slice(&ticks.to_le_bytes());
            fb.on_notification(&data, now);
            next_beat_ms += rr_ms;
            beat_index += 1;
        }
        let phase = fb.phase();
        if phase != last_phase || now.saturating_sub(last_print) >= 10_000 {
            print_snapshot(&fb.snapshot(now), json)?;
            last_print = now;
            last_phase = phase;
        }
        now += 10;
    }

    // End of session behaves like a transport loss: pump forced off.
    fb.on_disconnect();
    print_snapshot(&fb.snapshot(now), json)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.cmd {
        Commands::Config { path } => {
            let cfg = load_config(path.as_deref())?;
            cfg.validate()?;
            print!("{}", cfg.to_toml_string()?);
        }
        Commands::Demo {
            seconds,
            config,
            extended,
            json,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if extended {
                cfg.pump = PumpConfig::extended();
            }
            cfg.validate()?;
            run_demo(cfg, seconds, json)?;
        }
    }
    Ok(())
}
