// Error taxonomy for the markov_music crate.
//
// Each layer has its own enum: `MidiError` for the decoder/encoder,
// `ConfigError` for loading and validating `MarkovConfig`, and `ModelError`
// for the builder and generator. `Error` unions them for callers that run
// the whole pipeline (see `corpus.rs` and the `generate` binary).
//
// The builder and generator are pure computations. They never log and
// continue on bad input; every failure is returned to the caller.

use crate::corpus::FileFailure;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while decoding or encoding Standard MIDI Files.
#[derive(Debug, Error)]
pub enum MidiError {
    /// The byte stream is not a well-formed SMF.
    #[error("malformed MIDI data: {0}")]
    Parse(#[from] midly::Error),
    /// SMPTE timecode files carry no ticks-per-beat resolution.
    #[error("unsupported timing: only metrical (ticks-per-beat) files are supported")]
    UnsupportedTiming,
    #[error("cannot read or write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Two consecutive events are more than 2^28 - 1 ticks apart.
    #[error("gap of {delta} ticks before tick {tick} exceeds the MIDI delta-time limit")]
    DeltaOverflow { tick: u64, delta: u64 },
    /// Serializing the SMF into a buffer failed.
    #[error("cannot serialize MIDI data: {0}")]
    Write(#[source] io::Error),
}

/// Failures while loading or validating a `MarkovConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures of the model builder and generator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// No training input produced any table entries.
    #[error("training produced an empty context table")]
    EmptyCorpus,
    /// A distribution with no entries (or zero total weight) was sampled.
    /// A context present in the table always has successors, so this
    /// indicates a broken table.
    #[error("cannot sample from an empty distribution")]
    EmptyDistribution,
    /// The table holds no event that could start a generated sequence.
    #[error("no seed event available in the context table")]
    NoSeedAvailable,
    /// Two tables with different order or rounding cannot be merged.
    #[error("cannot merge tables built with different order or rounding")]
    OrderMismatch,
}

/// Any failure of the full decode/train/generate/encode pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Midi(#[from] MidiError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Model(#[from] ModelError),
    /// Every input file failed to decode.
    #[error("none of the {} input file(s) could be decoded", .0.len())]
    NoReadableFiles(Vec<FileFailure>),
}
