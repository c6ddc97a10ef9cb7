// Weighted random walk over a ContextTable.
//
// Generation starts from a seed event and repeatedly extends the sequence.
// At each step the longest suffix of the output (up to the table's order)
// is rounded and looked up; when it is missing, the next shorter suffix is
// tried, down to the last event alone. The first match yields a weighted
// pick among its successors (pick.rs). The walk stops when no suffix
// matches, when the end marker is drawn, or when the output reaches
// `GenerateOptions::max_events`.
//
// Seed selection is deliberately unweighted: a context is chosen uniformly
// from the table's distinct contexts, then a successor uniformly by list
// position. A drawn end marker cannot start a sequence, so the seed draw is
// repeated until it produces a note.

use crate::error::ModelError;
use crate::event::Event;
use crate::pick::{choose_uniform, pick};
use crate::table::{ContextTable, Successor};
use markov_music_prng::MarkovRng;

/// Default ceiling on generated sequence length.
pub const DEFAULT_MAX_EVENTS: usize = 100_000;

/// Tuning for a single generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// The walk stops once the output holds this many events.
    pub max_events: usize,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        GenerateOptions {
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

/// Why a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The end marker was drawn.
    End,
    /// No suffix of the output, not even the last event, is in the table.
    NoMatch,
    /// The output reached `GenerateOptions::max_events`.
    LengthLimit,
}

/// A generated sequence and the reason the walk stopped.
#[derive(Debug, Clone)]
pub struct Generation {
    pub events: Vec<Event>,
    pub stop: StopReason,
}

/// Generate a sequence from a randomly drawn seed.
pub fn generate(
    table: &ContextTable,
    rng: &mut MarkovRng,
    options: &GenerateOptions,
) -> Result<Generation, ModelError> {
    let seed = choose_seed(table, rng)?;
    generate_from(table, seed, rng, options)
}

/// Generate a sequence whose first event is `seed`.
pub fn generate_from(
    table: &ContextTable,
    seed: Event,
    rng: &mut MarkovRng,
    options: &GenerateOptions,
) -> Result<Generation, ModelError> {
    continue_from(table, vec![seed], rng, options)
}

/// Extend an existing, non-empty phrase until the walk stops.
///
/// The returned sequence starts with `prefix` unchanged.
pub fn continue_from(
    table: &ContextTable,
    prefix: Vec<Event>,
    rng: &mut MarkovRng,
    options: &GenerateOptions,
) -> Result<Generation, ModelError> {
    if prefix.is_empty() {
        return Err(ModelError::NoSeedAvailable);
    }
    let mut events = prefix;
    loop {
        if events.len() >= options.max_events {
            return Ok(Generation {
                events,
                stop: StopReason::LengthLimit,
            });
        }
        let stop = match next_successor(table, &events, rng)? {
            Some(Successor::Event(next)) => {
                events.push(next);
                continue;
            }
            Some(Successor::End) => StopReason::End,
            None => StopReason::NoMatch,
        };
        return Ok(Generation { events, stop });
    }
}

/// Draw the first event: uniform over contexts, then uniform over the
/// chosen context's successors, redrawing while the draw is the end marker.
pub fn choose_seed(table: &ContextTable, rng: &mut MarkovRng) -> Result<Event, ModelError> {
    let has_event = table
        .entries()
        .iter()
        .flat_map(|entry| &entry.successors)
        .any(|ws| matches!(ws.successor, Successor::Event(_)));
    if !has_event {
        return Err(ModelError::NoSeedAvailable);
    }

    loop {
        let entry = choose_uniform(table.entries(), rng)?;
        if let Successor::Event(seed) = choose_uniform(&entry.successors, rng)?.successor {
            return Ok(seed);
        }
    }
}

/// Pick the successor for the longest matching suffix of `events`, or
/// `None` when no suffix is in the table.
fn next_successor(
    table: &ContextTable,
    events: &[Event],
    rng: &mut MarkovRng,
) -> Result<Option<Successor>, ModelError> {
    let window_start = events.len().saturating_sub(table.order());
    for start in window_start..events.len() {
        if let Some(successors) = table.lookup(&events[start..]) {
            let chosen = pick(successors, |ws| ws.weight, rng)?;
            return Ok(Some(chosen.successor));
        }
    }
    Ok(None)
}
