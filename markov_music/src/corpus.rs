// Multi-file training.
//
// Each input file is decoded on its own and absorbed into one shared
// ContextTable as an independent sequence, so no transition is ever
// recorded between the last note of one file and the first note of the
// next. A file that fails to decode is logged and recorded in
// `Corpus::failures`, and training continues with the remaining files.
// Training only fails as a whole when the table ends up empty, or with
// `Error::NoReadableFiles` (carrying every failure) when no file decodes.
//
// The output resolution (ticks per beat) comes from the first file that
// decodes. Files with a different resolution are still used; their tick
// values are learned as-is, which is logged as a warning.

use crate::config::MarkovConfig;
use crate::error::{Error, MidiError, ModelError};
use crate::event::Event;
use crate::midi::decode_file;
use crate::table::ContextTable;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// A file that could not be used for training.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: MidiError,
}

/// A trained table plus what the encoder needs to write output.
#[derive(Debug)]
pub struct Corpus {
    pub table: ContextTable,
    /// Ticks per beat for the generated file.
    pub resolution: u16,
    /// Number of sequences absorbed into the table.
    pub sequences: usize,
    /// Total notes absorbed.
    pub notes: usize,
    pub failures: Vec<FileFailure>,
}

/// Decode every file and train one table on all of them.
pub fn train_files<P: AsRef<Path>>(paths: &[P], config: &MarkovConfig) -> Result<Corpus, Error> {
    config.validate()?;
    let options = config.decode_options();
    let mut table = ContextTable::new(config.order, config.rounding());
    let mut resolution: Option<u16> = None;
    let mut sequences = 0;
    let mut notes = 0;
    let mut failures = Vec::new();

    for path in paths {
        let path = path.as_ref();
        info!(path = %path.display(), "reading file");
        let decoded = match decode_file(path, &options) {
            Ok(decoded) => decoded,
            Err(e) => {
                error!(path = %path.display(), error = %e, "skipping file");
                failures.push(FileFailure {
                    path: path.to_path_buf(),
                    error: e,
                });
                continue;
            }
        };

        match resolution {
            None => resolution = Some(decoded.resolution),
            Some(first) if first != decoded.resolution => warn!(
                path = %path.display(),
                resolution = decoded.resolution,
                output_resolution = first,
                "resolution differs from the first file"
            ),
            Some(_) => {}
        }

        table.absorb(&decoded.events);
        sequences += 1;
        notes += decoded.events.len();
        info!(notes = decoded.events.len(), "notes converted");
    }

    let Some(resolution) = resolution else {
        if failures.is_empty() {
            return Err(ModelError::EmptyCorpus.into());
        }
        return Err(Error::NoReadableFiles(failures));
    };
    finish(table, resolution, sequences, notes, failures).map_err(Error::from)
}

/// Train one table on already-decoded sequences, each absorbed independently.
pub fn train_sequences(
    sequences: &[Vec<Event>],
    resolution: u16,
    config: &MarkovConfig,
) -> Result<Corpus, Error> {
    config.validate()?;
    let mut table = ContextTable::new(config.order, config.rounding());
    for sequence in sequences {
        table.absorb(sequence);
    }
    let notes = sequences.iter().map(Vec::len).sum();
    finish(table, resolution, sequences.len(), notes, Vec::new()).map_err(Error::from)
}

fn finish(
    table: ContextTable,
    resolution: u16,
    sequences: usize,
    notes: usize,
    failures: Vec<FileFailure>,
) -> Result<Corpus, ModelError> {
    if table.is_empty() {
        return Err(ModelError::EmptyCorpus);
    }
    info!(
        contexts = table.len(),
        order = table.order(),
        sequences,
        notes,
        "context table built"
    );
    debug!(failed_files = failures.len(), resolution, "training finished");
    Ok(Corpus {
        table,
        resolution,
        sequences,
        notes,
        failures,
    })
}
