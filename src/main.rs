use clap::{value_parser, Arg, Command};
use crossbeam_channel::unbounded;
use std::path::PathBuf;
use std::process;
use zen_pulse::camera::MeasurementUpdate;
use zen_pulse::config::{DetectionMode, MeasurementConfig};
use zen_pulse::manager::{MeasurementCommand, MeasurementManager};
use zen_pulse::synthetic::{SyntheticFingertip, SyntheticOptions};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("zen-pulse")
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Measure heart-rate variability from a (synthetic) fingertip camera feed")
        .arg(
            Arg::new("bpm")
                .long("bpm")
                .value_name("BPM")
                .help("Steady heart rate of the synthetic fingertip [default: 75]")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("rr-pattern")
                .long("rr-pattern")
                .value_name("MS,MS,...")
                .help("Beat-to-beat intervals to cycle through; overrides --bpm")
                .conflicts_with("bpm"),
        )
        .arg(
            Arg::new("duration")
                .long("duration")
                .value_name("SECONDS")
                .help("Session length; defaults to the configured duration")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .value_name("MODE")
                .help("Beat detection mode")
                .value_parser(["streaming", "batch"]),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Read settings from this TOML file instead of the default location")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("warmup-frames")
                .long("warmup-frames")
                .value_name("FRAMES")
                .help("Blank frames delivered before the signal starts")
                .value_parser(value_parser!(usize))
                .default_value("15"),
        )
        .get_matches();

    let loaded = match matches.get_one::<PathBuf>("config") {
        Some(path) => MeasurementConfig::load_from(path),
        None => MeasurementConfig::load(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            process::exit(2);
        }
    };

    if let Some(duration) = matches.get_one::<f64>("duration") {
        config.session_duration_secs = *duration;
    }
    if let Some(mode) = matches.get_one::<String>("mode") {
        config.detection_mode = match mode.as_str() {
            "streaming" => DetectionMode::Streaming,
            _ => DetectionMode::Batch,
        };
    }
    if let Err(e) = config.validate() {
        log::error!("{}", e);
        process::exit(2);
    }

    let mut options = match matches.get_one::<String>("rr-pattern") {
        Some(pattern) => match parse_rr_pattern(pattern) {
            Some(rr_pattern_ms) => SyntheticOptions {
                rr_pattern_ms,
                ..Default::default()
            },
            None => {
                log::error!("--rr-pattern expects comma-separated positive milliseconds");
                process::exit(2);
            }
        },
        None => SyntheticOptions::from_bpm(*matches.get_one::<f64>("bpm").unwrap_or(&75.0)),
    };
    options.frame_rate_hz = config.sample_rate_hz;
    options.warmup_frames = *matches.get_one::<usize>("warmup-frames").unwrap_or(&0);

    let (update_sender, update_receiver) = unbounded();
    let (manager, command_sender) = MeasurementManager::new(config.clone(), update_sender);
    std::thread::spawn(move || {
        manager.run();
    });

    // First Ctrl-C finalises the session early with what has been collected
    let stop_sender = command_sender.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_sender.send(MeasurementCommand::Stop);
    }) {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }

    if command_sender
        .send(MeasurementCommand::Start(Box::new(SyntheticFingertip::new(options))))
        .is_err()
    {
        log::error!("Measurement manager is not running");
        process::exit(1);
    }

    let outcome = loop {
        match update_receiver.recv() {
            Ok(MeasurementUpdate::Started) => {
                log::info!(
                    "Hold still... measuring for {:.0} s ({:?} detection)",
                    config.session_duration_secs,
                    config.detection_mode
                );
            }
            Ok(MeasurementUpdate::Progress { elapsed_ms, beats, samples, brightness }) => {
                log::info!(
                    "{:>4.1} s  beats: {:>3}  samples: {:>4}  level: {:>6.1}",
                    elapsed_ms / 1000.0,
                    beats,
                    samples,
                    brightness.unwrap_or(0.0)
                );
            }
            Ok(MeasurementUpdate::Finished(outcome)) => break outcome,
            Ok(MeasurementUpdate::Aborted) => {
                log::info!("Measurement aborted");
                process::exit(130);
            }
            Ok(MeasurementUpdate::Error(message)) => {
                log::error!("{}", message);
                process::exit(1);
            }
            Err(_) => {
                log::error!("Measurement manager stopped unexpectedly");
                process::exit(1);
            }
        }
    };

    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{}", json),
        Err(e) => log::error!("Failed to serialise outcome: {}", e),
    }

    if !outcome.is_success() {
        process::exit(1);
    }
}

fn parse_rr_pattern(pattern: &str) -> Option<Vec<f64>> {
    let values: Vec<f64> = pattern
        .split(',')
        .map(|part| part.trim().parse::<f64>().ok().filter(|rr| *rr > 0.0))
        .collect::<Option<_>>()?;
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}
