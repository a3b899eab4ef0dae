//! CAN State Decoder CLI Application
//!
//! This is the bench command-line interface for the can-state-decoder library.
//! It adds:
//! - TOML bench configuration (vehicle, simulated state, parameter store)
//! - A file-backed parameter store with background writes
//! - JSON-lines input and output for frames, commands and snapshots

use anyhow::{Context, Result};
use can_state_decoder::signals::dbc;
use can_state_decoder::{
    CanFrame, CodecSchema, CommandDecoder, DecoderSession, FrameCodec, ParamStore, RawSignalFrame,
    VehicleStateDecoder, VehicleVariant,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

mod config;
mod params;

use config::AppConfig;
use params::FileParamStore;

/// CAN State Decoder - Toyota carstate decoding and bench frame synthesis
#[derive(Parser, Debug)]
#[command(name = "can-state-cli")]
#[command(about = "Decode Toyota CAN state and drive a bench loop", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Vehicle variant, overrides the configuration file (e.g. COROLLA_TSS2)
    #[arg(long, value_name = "VARIANT", global = true)]
    variant: Option<VehicleVariant>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the signal schema of the vehicle as JSON
    Schema,

    /// Emit encoded bench frames as JSON lines
    Simulate {
        /// Number of frame instants to encode
        #[arg(long, value_name = "COUNT")]
        frames: Option<u64>,

        /// Simulated speed in m/s
        #[arg(long)]
        speed: Option<f64>,

        /// Simulated road-wheel angle in radians
        #[arg(long, allow_hyphen_values = true)]
        angle: Option<f64>,

        /// DBC replacing the built-in bench profile
        #[arg(long, value_name = "FILE")]
        dbc: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Read JSON-lines CAN frames and print decoded actuator commands
    DecodeCommands {
        /// Input file (default: stdin)
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// DBC replacing the built-in bench profile
        #[arg(long, value_name = "FILE")]
        dbc: Option<PathBuf>,
    },

    /// Read JSON-lines bus snapshots and print decoded vehicle state
    DecodeState {
        /// Input file (default: stdin)
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
}

/// One decode cycle of input: the latest values of both buses
#[derive(Debug, Deserialize)]
struct CycleInput {
    powertrain: RawSignalFrame,
    camera: RawSignalFrame,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN State Decoder CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", can_state_decoder::VERSION);

    let config = resolve_config(args.config.as_deref(), args.variant)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match &args.command {
        Command::Schema => print_schema(&config, &mut out)?,
        Command::Simulate {
            frames,
            speed,
            angle,
            dbc,
            output,
        } => {
            let mut bench = config.bench.clone();
            bench.frames = frames.unwrap_or(bench.frames);
            bench.speed = speed.unwrap_or(bench.speed);
            bench.angle_rad = angle.unwrap_or(bench.angle_rad);
            if dbc.is_some() {
                bench.dbc = dbc.clone();
            }

            let codec = FrameCodec::new(codec_schema(bench.dbc.as_deref())?);
            match output {
                Some(path) => {
                    let file = File::create(path)
                        .with_context(|| format!("Failed to create output file: {:?}", path))?;
                    simulate(&codec, &bench, &mut BufWriter::new(file))?;
                }
                None => simulate(&codec, &bench, &mut out)?,
            }
        }
        Command::DecodeCommands { input, dbc } => {
            let schema = codec_schema(dbc.as_deref().or(config.bench.dbc.as_deref()))?;
            let mut decoder = CommandDecoder::new(schema);
            decode_commands(&mut decoder, open_input(input.as_deref())?, &mut out)?;
        }
        Command::DecodeState { input } => {
            let (decoder, mut session) = build_decoder(&config)?;
            decode_state(&decoder, &mut session, open_input(input.as_deref())?, &mut out)?;
        }
    }

    out.flush()?;
    Ok(())
}

/// Configuration from file and command line; the command line wins
fn resolve_config(path: Option<&Path>, variant: Option<VehicleVariant>) -> Result<AppConfig> {
    let mut config = match (path, variant) {
        (Some(path), _) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        (None, Some(variant)) => AppConfig::for_variant(variant),
        (None, None) => {
            anyhow::bail!("No vehicle given: pass --config <FILE> or --variant <VARIANT>")
        }
    };
    if let Some(variant) = variant {
        config.vehicle.variant = variant;
    }
    Ok(config)
}

fn codec_schema(dbc_path: Option<&Path>) -> Result<CodecSchema> {
    match dbc_path {
        Some(path) => {
            let db = dbc::load_database(path)
                .with_context(|| format!("Failed to load DBC: {:?}", path))?;
            Ok(CodecSchema::with_database(db)?)
        }
        None => Ok(CodecSchema::honda_bench()),
    }
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input file: {:?}", path))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

/// Decoder and session for the configured vehicle, wired to the parameter store
fn build_decoder(config: &AppConfig) -> Result<(VehicleStateDecoder, DecoderSession)> {
    let mut decoder_config = config.vehicle.decoder_config();

    let store = match &config.params.dir {
        Some(dir) => Some(FileParamStore::open(dir)?),
        None => None,
    };
    if let Some(store) = &store {
        decoder_config = decoder_config.with_param_toggles(store);
    }

    let session = DecoderSession::new(&decoder_config);
    let mut decoder =
        VehicleStateDecoder::new(decoder_config).context("Failed to configure decoder")?;
    if let Some(store) = store {
        decoder = decoder.with_param_store(Box::new(store) as Box<dyn ParamStore>);
    }
    Ok((decoder, session))
}

fn print_schema(config: &AppConfig, out: &mut impl Write) -> Result<()> {
    let decoder = VehicleStateDecoder::new(config.vehicle.decoder_config())
        .context("Failed to build schema")?;
    serde_json::to_writer_pretty(&mut *out, decoder.schema())?;
    writeln!(out)?;
    Ok(())
}

fn simulate(codec: &FrameCodec, bench: &config::BenchConfig, out: &mut impl Write) -> Result<()> {
    let state = bench.simulated_state();
    let mut total = 0;
    for index in 0..bench.frames {
        for frame in codec.encode(&state, index)? {
            serde_json::to_writer(&mut *out, &frame)?;
            writeln!(out)?;
            total += 1;
        }
    }
    out.flush()?;
    log::info!("Encoded {} frames over {} instants", total, bench.frames);
    Ok(())
}

fn decode_commands(
    decoder: &mut CommandDecoder,
    input: impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    let mut rejected = 0;
    for (number, line) in input.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: CanFrame =
            serde_json::from_str(&line)
                .with_context(|| format!("Line {}: not a CAN frame", number + 1))?;

        match decoder.decode_frame(&frame) {
            Ok(Some(_)) => {
                decoder.update(&frame)?;
                serde_json::to_writer(&mut *out, &decoder.latest())?;
                writeln!(out)?;
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Line {}: {}", number + 1, e);
                rejected += 1;
            }
        }
    }
    if rejected > 0 {
        log::warn!("{} command frames rejected", rejected);
    }
    Ok(())
}

fn decode_state(
    decoder: &VehicleStateDecoder,
    session: &mut DecoderSession,
    input: impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    for (number, line) in input.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let cycle: CycleInput =
            serde_json::from_str(&line)
                .with_context(|| format!("Line {}: not a decode cycle", number + 1))?;

        let state = decoder.decode(&cycle.powertrain, &cycle.camera, session);
        serde_json::to_writer(&mut *out, &state)?;
        writeln!(out)?;
    }
    log::info!("Decoded {} cycles", session.cycles());
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_state_decoder::{ActuatorCommand, VehicleStateSnapshot};

    fn bench(frames: u64) -> config::BenchConfig {
        config::BenchConfig {
            speed: 8.0,
            frames,
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_config_requires_vehicle() {
        assert!(resolve_config(None, None).is_err());
        let config = resolve_config(None, Some(VehicleVariant::Prius)).unwrap();
        assert_eq!(config.vehicle.variant, VehicleVariant::Prius);
    }

    #[test]
    fn test_simulate_writes_json_lines() {
        let codec = FrameCodec::new(CodecSchema::honda_bench());
        let mut out = Vec::new();
        simulate(&codec, &bench(2), &mut out).unwrap();

        let lines: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().collect();
        // Instant 0 carries the radar group, instant 1 does not
        assert_eq!(lines.len(), 38 + 21);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["frame_index"], 0);
    }

    #[test]
    fn test_decode_commands_from_json_lines() {
        let codec = FrameCodec::new(CodecSchema::honda_bench());
        let command = ActuatorCommand {
            gas: 0.5,
            brake: 0.0,
            steer_torque: -0.25,
        };

        let mut input = String::new();
        for frame in codec.encode_commands(&command, 0).unwrap() {
            input.push_str(&serde_json::to_string(&frame.into_can_frame(0)).unwrap());
            input.push('\n');
        }
        // A corrupt frame is reported and skipped
        let mut corrupt = codec.encode_commands(&command, 1).unwrap().remove(2).into_can_frame(0);
        corrupt.data[0] ^= 0x01;
        input.push_str(&serde_json::to_string(&corrupt).unwrap());
        input.push('\n');

        let mut decoder = CommandDecoder::new(CodecSchema::honda_bench());
        let mut out = Vec::new();
        decode_commands(&mut decoder, input.as_bytes(), &mut out).unwrap();

        let lines: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().collect();
        assert_eq!(lines.len(), 3);
        let last: ActuatorCommand = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last, command);
    }

    #[test]
    fn test_decode_state_from_json_lines() {
        let config = AppConfig::for_variant(VehicleVariant::Corolla);
        let (decoder, mut session) = build_decoder(&config).unwrap();

        let powertrain = RawSignalFrame::new(0)
            .with_value("WHEEL_SPEEDS", "WHEEL_SPEED_FL", 5.0)
            .with_value("WHEEL_SPEEDS", "WHEEL_SPEED_FR", 5.0)
            .with_value("WHEEL_SPEEDS", "WHEEL_SPEED_RL", 5.0)
            .with_value("WHEEL_SPEEDS", "WHEEL_SPEED_RR", 5.0);
        let line = serde_json::json!({
            "powertrain": powertrain,
            "camera": RawSignalFrame::new(2),
        })
        .to_string();
        let input = format!("{}\n\n{}\n", line, line);

        let mut out = Vec::new();
        decode_state(&decoder, &mut session, input.as_bytes(), &mut out).unwrap();

        let snapshots: Vec<VehicleStateSnapshot> = std::str::from_utf8(&out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[1].v_ego_raw, 5.0);
        assert_eq!(session.cycles(), 2);
    }

    #[test]
    fn test_decode_state_rejects_garbage() {
        let config = AppConfig::for_variant(VehicleVariant::Corolla);
        let (decoder, mut session) = build_decoder(&config).unwrap();
        let mut out = Vec::new();
        assert!(decode_state(&decoder, &mut session, "not json\n".as_bytes(), &mut out).is_err());
    }

    #[test]
    fn test_param_store_toggles_reach_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let key = can_state_decoder::params::KEY_SECONDARY_STEER_SENSOR;
        std::fs::write(dir.path().join(key), "1").unwrap();

        let mut config = AppConfig::for_variant(VehicleVariant::Corolla);
        config.params.dir = Some(dir.path().to_path_buf());
        let (decoder, _) = build_decoder(&config).unwrap();
        assert!(decoder
            .flags()
            .contains(can_state_decoder::FeatureFlags::SECONDARY_STEER_SENSOR));
    }
}
