// markov_music: variable-order Markov generation over MIDI note events.
//
// Reads one or more MIDI files, learns which notes follow which short
// phrases, and random-walks that model to write a new piece. Notes are
// compared through rounded keys so that near-identical notes (slightly
// different velocity or length) share transitions.
//
// Architecture:
// - event.rs: Note events, rounded comparison keys, bucket sizes
// - table.rs: Context table and the builder (every suffix window up to the order)
// - pick.rs: Weighted and uniform random selection
// - generator.rs: Weighted walk with longest-to-shortest context fallback
// - midi.rs: SMF decoding to note events and encoding back (via `midly`)
// - config.rs: JSON configuration and validation
// - corpus.rs: Multi-file training into one table
// - error.rs: Error types for each layer
//
// The generator is deterministic given a seed (see `markov_music_prng`).

pub mod config;
pub mod corpus;
pub mod error;
pub mod event;
pub mod generator;
pub mod midi;
pub mod pick;
pub mod table;
