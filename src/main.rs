//! tdoa-locate - command-line front end of the TDOA geolocation engine

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tdoa_locator::api::formatting::{JsonFormatter, MapMarker, PinData, TextFormatter};
use tdoa_locator::processing::assembler::{EventAssembler, UplinkRecord};
use tdoa_locator::processing::filter::{trimmed_centroid, TrackedEstimate};
use tdoa_locator::utils::logging::init_logging;
use tdoa_locator::validation::accuracy::AccuracyReport;
use tdoa_locator::validation::data::parse_eui_list;
use tdoa_locator::{EngineConfig, Event, LocationEngine, Observation};
use tracing::{info, warn};

/// Minimum estimates kept by the trimmed-centroid filter
const FILTER_MIN_SAMPLES: usize = 10;

#[derive(Parser)]
#[command(name = "tdoa-locate")]
#[command(about = "Locate radio transmitters from time-difference-of-arrival observations", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging and per-iteration solver traces
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Locate a single event read from a JSON file
    Locate {
        /// Event file
        event: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Group uplink records into events, locate them and report accuracy
    Batch {
        /// JSON array of uplink records
        records: PathBuf,

        /// Comma-separated device EUIs to process
        #[arg(long)]
        devices: String,

        /// Write map pins to this file
        #[arg(long)]
        pins: Option<PathBuf>,
    },
    /// Locate the three-station reference event
    Demo,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if cli.debug {
        config.trace_iterations = true;
    }
    let engine = LocationEngine::new(config)?;

    match cli.command {
        Command::Locate { event, json } => locate(&engine, &event, json, cli.debug),
        Command::Batch {
            records,
            devices,
            pins,
        } => batch(&engine, &records, &devices, pins.as_deref()),
        Command::Demo => demo(&engine, cli.debug),
    }
}

fn locate(engine: &LocationEngine, path: &Path, json: bool, debug: bool) -> Result<(), Box<dyn Error>> {
    let content = fs::read_to_string(path)?;
    let event: Event = serde_json::from_str(&content)?;
    let result = engine.compute_device_location(&event)?;

    if json {
        println!("{}", JsonFormatter::pretty().format_json(&result)?);
    } else {
        let formatter = TextFormatter {
            compact: false,
            include_trace: debug,
        };
        print!("{}", formatter.format_text(&result));
    }
    Ok(())
}

fn batch(
    engine: &LocationEngine,
    records_path: &Path,
    devices: &str,
    pins_path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let content = fs::read_to_string(records_path)?;
    let records: Vec<UplinkRecord> = serde_json::from_str(&content)?;
    let devices = parse_eui_list(devices);
    if devices.is_empty() {
        return Err("no valid device EUI given".into());
    }

    let assembler = EventAssembler::default();
    let mut pins = PinData::new();

    for device in &devices {
        let assembly = assembler.assemble(device, &records);
        let mut report = AccuracyReport::new();
        let mut tracked = Vec::new();
        let mut failures: BTreeMap<&'static str, usize> = BTreeMap::new();

        for assembled in &assembly.events {
            for observation in &assembled.event.observations {
                pins.add_station(observation);
            }

            let result = match engine.compute_device_location(&assembled.event) {
                Ok(result) => result,
                Err(err) => {
                    warn!(device = %device, sequence = assembled.event.sequence_no, error = %err, "event not located");
                    *failures.entry(err.kind()).or_default() += 1;
                    continue;
                }
            };

            pins.push(MapMarker::estimate(
                &result,
                format!("Seq {}", assembled.event.sequence_no),
            ));
            if let Some(truth) = assembled.ground_truth {
                report.record(&result.position(), &truth);
                tracked.push(TrackedEstimate {
                    estimate: result.position(),
                    truth,
                });
            }
        }

        let stats = assembly.stats;
        println!("Device: {}", device);
        println!("  Events:            {}", stats.total_events);
        println!("  Usable events:     {}", stats.usable_events());
        println!("  Located events:    {}", stats.usable_events() - failures.values().sum::<usize>());
        for (kind, count) in &failures {
            println!("  Failed ({}): {}", kind, count);
        }
        if report.total > 0 {
            println!("{}", report);
        }

        match trimmed_centroid(&tracked, FILTER_MIN_SAMPLES) {
            Some(filtered) => {
                println!(
                    "  Filtered estimate: {:.6}, {:.6} ({} samples, error {:.1} m)",
                    filtered.centroid.lat, filtered.centroid.lng, filtered.retained, filtered.error_m
                );
                pins.add_filtered(&filtered);
            }
            None if !tracked.is_empty() => println!("  Filtered estimate: not available for a moving device"),
            None => {}
        }
    }

    if let Some(path) = pins_path {
        pins.write_to_file(path)?;
        info!(path = %path.display(), markers = pins.locations.len(), "pin data written");
    }
    Ok(())
}

fn demo(engine: &LocationEngine, debug: bool) -> Result<(), Box<dyn Error>> {
    let event = Event::new(
        "00000000FFFFFFFF",
        0,
        0,
        0,
        vec![
            Observation::new("FF250C00010001A8", 29563, 0.0, 0.0, 43.128362, -70.742126),
            Observation::new("FF250C00010001A9", 49133, 0.0, 0.0, 42.951207, -70.895935),
            Observation::new("FF250C00010001A7", 49534, 0.0, 0.0, 43.118840, -70.941940),
        ],
    );

    let result = engine.compute_device_location(&event)?;
    let formatter = TextFormatter {
        compact: false,
        include_trace: debug,
    };
    print!("{}", formatter.format_text(&result));
    println!("Reported device position: 43.054150, -70.781951");
    Ok(())
}
