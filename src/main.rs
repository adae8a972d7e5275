//! Synchrony - biosignal notification demultiplexer
//!
//! Entry point for the capture replay tool.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use synchrony::{replay_capture, ReplaySummary, SessionConfig};
use tracing::info;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("synchrony=info".parse()?),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    let mut command: Option<String> = None;
    let mut capture_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut print_config = false;
    let mut json = false;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("synchrony {} ({})", synchrony::VERSION, synchrony::BUILD_DATE);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--print-config" => {
                print_config = true;
            }
            "--json" => {
                json = true;
            }
            "--config" | "-c" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --config requires a path");
                    return Ok(());
                }
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(());
            }
            arg => {
                if command.is_none() {
                    command = Some(arg.to_string());
                } else if capture_path.is_none() {
                    capture_path = Some(PathBuf::from(arg));
                }
            }
        }
        i += 1;
    }

    let config = match &config_path {
        Some(path) => SessionConfig::load_from(path),
        None => SessionConfig::load(),
    };

    if print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    match command.as_deref() {
        Some("replay") => {
            let Some(path) = capture_path else {
                eprintln!("Error: replay requires a capture file");
                print_help();
                return Ok(());
            };
            run_replay(&path, &config, json)
        }
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            print_help();
            Ok(())
        }
        None => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Usage: synchrony [OPTIONS] replay <CAPTURE.bin>");
    println!();
    println!("Commands:");
    println!("  replay FILE             Replay a notification capture and summarize it");
    println!();
    println!("Options:");
    println!("  -c, --config PATH       Session config (default: {})", SessionConfig::path().display());
    println!("      --print-config      Print the effective config and exit");
    println!("      --json              Print the replay summary as JSON");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Examples:");
    println!("  synchrony replay capture_20250101_120000_0.bin");
    println!("  synchrony --config session.json replay capture.bin --json");
}

fn run_replay(path: &Path, config: &SessionConfig, json: bool) -> Result<()> {
    info!(path = %path.display(), "Replaying capture");

    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let summary = replay_capture(BufReader::new(file), config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &ReplaySummary) {
    println!(
        "Replayed {} notifications over {:.3}s in {} batches",
        summary.records,
        summary.duration_us as f64 / 1_000_000.0,
        summary.batches
    );
    println!("────────────────────────────────────────");

    if summary.streams.is_empty() {
        println!("No channel data decoded.");
    }
    for stream in &summary.streams {
        let counters = summary.diagnostics.stats.stream(stream.data_type);
        println!(
            "{:<5} samples/ch: {:>8} | lost/ch: {:>6} | packages lost: {:>5} | discarded: {:>4} | malformed: {:>4}",
            stream.data_type.to_string(),
            stream.samples_per_channel,
            stream.lost_per_channel,
            counters.packages_lost,
            counters.packages_discarded,
            counters.malformed
        );
    }

    if summary.impedance_readings > 0 {
        println!(
            "IMPEDANCE readings: {:>6} | lost: {:>5}",
            summary.impedance_readings, summary.impedance_lost
        );
    }

    let stats = &summary.diagnostics.stats;
    if stats.unknown_type > 0 || stats.truncated_frames > 0 {
        println!(
            "Unknown type: {} | Truncated frames: {}",
            stats.unknown_type, stats.truncated_frames
        );
    }
}
