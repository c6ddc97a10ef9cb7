// markov_music generator, CLI entry point.
//
// Trains a context table on the given MIDI files, walks it once, and writes
// the result as a MIDI file. The pipeline: load config → decode and train →
// generate → encode.
//
// Usage:
//   cargo run -p markov_music -- [OPTIONS] <INPUT>...
//     -o, --output <FILE>   Output path (default: output.mid)
//     -c, --config <FILE>   JSON config (see config.rs)
//     --order <N> --seed <N> --max-events <N> --channel <N>...
//
// Command-line values override the config file. Set RUST_LOG for finer
// log control; -v switches the default level to debug.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use markov_music::config::MarkovConfig;
use markov_music::corpus::train_files;
use markov_music::generator::generate;
use markov_music::midi::encode_file;
use markov_music_prng::MarkovRng;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("generate")
        .about("Generate a MIDI piece from a Markov model trained on MIDI files")
        .arg(
            Arg::new("inputs")
                .value_name("INPUT")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf))
                .help("MIDI files to train on"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .default_value("output.mid")
                .value_parser(value_parser!(PathBuf))
                .help("Where to write the generated MIDI file"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("JSON config file"),
        )
        .arg(
            Arg::new("order")
                .long("order")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Longest context window, in notes"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("PRNG seed for a reproducible piece"),
        )
        .arg(
            Arg::new("max-events")
                .long("max-events")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Stop after this many generated notes"),
        )
        .arg(
            Arg::new("channel")
                .long("channel")
                .value_name("N")
                .action(ArgAction::Append)
                .value_parser(value_parser!(u8))
                .help("Only learn from this channel (repeatable)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log per-file details"),
        )
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let config = load_config(&matches)?;
    let inputs: Vec<PathBuf> = matches
        .get_many::<PathBuf>("inputs")
        .map(|paths| paths.cloned().collect())
        .unwrap_or_default();
    let output = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("output.mid"));

    info!("[1/3] training on {} file(s), order {}", inputs.len(), config.order);
    let corpus = train_files(&inputs, &config)?;
    if !corpus.failures.is_empty() {
        warn!(
            "{} of {} file(s) could not be read",
            corpus.failures.len(),
            inputs.len()
        );
    }
    info!("  {} mappings made from {} notes", corpus.table.len(), corpus.notes);

    let seed = config.seed.unwrap_or_else(clock_seed);
    info!("[2/3] generating (seed {seed})");
    let mut rng = MarkovRng::new(seed);
    let generation = generate(&corpus.table, &mut rng, &config.generate_options())?;
    info!(
        "  {} notes generated (stopped: {:?})",
        generation.events.len(),
        generation.stop
    );

    info!("[3/3] writing {}", output.display());
    encode_file(&generation.events, corpus.resolution, &output)?;
    info!("  done");
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Config file (or defaults) with command-line overrides applied.
fn load_config(matches: &ArgMatches) -> Result<MarkovConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => MarkovConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MarkovConfig::default(),
    };

    if let Some(&order) = matches.get_one::<usize>("order") {
        config.order = order;
    }
    if let Some(&seed) = matches.get_one::<u64>("seed") {
        config.seed = Some(seed);
    }
    if let Some(&max_events) = matches.get_one::<usize>("max-events") {
        config.max_events = max_events;
    }
    if let Some(channels) = matches.get_many::<u8>("channel") {
        config.channel_filter = Some(channels.copied().collect());
    }

    config.validate().context("invalid options")?;
    Ok(config)
}

/// Seed for runs without `--seed`. Logged so the run can be repeated.
fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
