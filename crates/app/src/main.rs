use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use ultrasonic_monitor_core::{
    format_frequency, AlertTracker, FrameClock, FrequencyMonitor, Mix, MonitorConfig,
    SimulatedFailure, SyntheticProvider, TickOutcome, Tone, Variant,
};

fn main() -> ultrasonic_monitor_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => run_simulate(args),
        Commands::Config { variant } => print_config(variant.into()),
    }
}

fn run_simulate(args: SimulateArgs) -> ultrasonic_monitor_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::for_variant(args.variant.into()),
    };
    if let Some(sample_rate) = args.sample_rate {
        config.capture.sample_rate = Some(sample_rate);
    }
    config.validate()?;

    let sample_rate = config.capture.sample_rate.unwrap_or(48_000);
    tracing::info!(
        tone_hz = args.tone_hz,
        amplitude = args.amplitude,
        frames = args.frames,
        sample_rate,
        "starting simulation"
    );

    let mut source = Mix::new().with(Tone::new(args.tone_hz, args.amplitude));
    if let Some(hum_hz) = args.hum_hz {
        source = source.with(Tone::new(hum_hz, args.amplitude * 0.5));
    }
    let mut provider = SyntheticProvider::new(source)
        .with_sample_rate(sample_rate)
        .with_frame_rate(config.frame_rate);
    if args.deny_permission {
        provider.fail_with(Some(SimulatedFailure::PermissionDenied));
    }

    let mut clock = FrameClock::new(config.frame_rate);
    let mut monitor = FrequencyMonitor::new(provider, config)?;
    if let Some(sensitivity) = args.sensitivity {
        monitor.adjust_sensitivity(sensitivity)?;
    }

    if let Err(err) = monitor.start() {
        let message = monitor.state().error.clone().unwrap_or_else(|| err.to_string());
        tracing::error!(error = %err, "could not start analysis");
        eprintln!("{message}");
        return Err(err);
    }

    let mut alerts = AlertTracker::new();
    let mut skipped = 0_u64;
    for _ in 0..args.frames {
        if args.realtime {
            clock.wait_next();
        } else {
            clock.advance();
        }

        let Some(token) = monitor.next_frame() else {
            break;
        };
        match monitor.run_frame(token) {
            TickOutcome::Published => {}
            TickOutcome::Skipped => {
                skipped += 1;
                continue;
            }
            TickOutcome::Cancelled => break,
        }

        let state = monitor.state();
        if let Some(event) = alerts.observe(state) {
            tracing::warn!(
                peak = %format_frequency(Some(event.peak_frequency_hz)),
                "high frequency alert"
            );
        }
        if args.json {
            let line = json!({
                "sequence": state.sequence,
                "peakFrequency": state.peak_frequency,
                "isHighFrequency": state.is_high_frequency,
                "audioLevel": state.signal_level,
                "sensitivity": state.sensitivity,
            });
            println!("{line}");
        }
    }

    let state = monitor.state().clone();
    monitor.stop();

    println!(
        "frames: {}  elapsed: {:.2}s  skipped: {}",
        clock.frames(),
        clock.elapsed().as_secs_f32(),
        skipped
    );
    println!(
        "last peak: {}  level: {:.1}  status: {}",
        format_frequency(state.peak_frequency),
        state.signal_level,
        if state.is_high_frequency { "WARNING" } else { "NORMAL" }
    );
    println!("high frequency alerts: {}", alerts.count());
    Ok(())
}

fn print_config(variant: Variant) -> ultrasonic_monitor_core::Result<()> {
    println!("{}", MonitorConfig::for_variant(variant).to_json_pretty()?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time ultrasonic frequency monitor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the analysis pipeline against a synthetic microphone.
    Simulate(SimulateArgs),
    /// Print the preset configuration as JSON.
    Config {
        #[arg(long, value_enum, default_value_t = VariantArg::Baseline)]
        variant: VariantArg,
    },
}

#[derive(clap::Args, Debug)]
struct SimulateArgs {
    /// Frequency of the simulated tone in Hz.
    #[arg(long, default_value_t = 23_000.0)]
    tone_hz: f32,
    /// Peak amplitude of the simulated tone.
    #[arg(long, default_value_t = 0.5)]
    amplitude: f32,
    /// Optional second, quieter tone mixed into the signal.
    #[arg(long)]
    hum_hz: Option<f32>,
    /// Number of display frames to analyse.
    #[arg(long, default_value_t = 120)]
    frames: u64,
    #[arg(long, value_enum, default_value_t = VariantArg::Baseline)]
    variant: VariantArg,
    /// JSON configuration file; overrides --variant.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    sensitivity: Option<f32>,
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Pace frames at the configured refresh rate instead of running flat out.
    #[arg(long)]
    realtime: bool,
    /// Print every published state as a JSON line.
    #[arg(long)]
    json: bool,
    /// Simulate a refused microphone permission prompt.
    #[arg(long)]
    deny_permission: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum VariantArg {
    Baseline,
    Enhanced,
}

impl From<VariantArg> for Variant {
    fn from(value: VariantArg) -> Self {
        match value {
            VariantArg::Baseline => Variant::Baseline,
            VariantArg::Enhanced => Variant::Enhanced,
        }
    }
}
