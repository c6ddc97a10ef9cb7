// Standard MIDI File decoding and encoding.
//
// `decode` turns an SMF into the time-ordered note list the model trains
// on. Every track is walked with absolute ticks; note-ons are paired with
// the oldest open note of the same key and channel, tempo changes from all
// tracks form one tempo map, and program changes form one map per channel.
// A note takes the tempo and program of the latest change strictly before
// its onset tick: a change on the very tick of the note does not apply to
// it. Notes from all tracks are merged and sorted by onset tick, notes on
// the same tick keeping their note-on order, and each note's `gap_to_next` is the distance to the following onset (0 for the
// last note).
//
// `encode` writes a generated note list back as a single-track SMF.
// Notes start at tick 1 and are laid out by their gaps. Tempo and program
// changes are placed one tick before the note that needs them so that
// `decode` attributes them to that note under the strict rule above.
//
// Uses the `midly` crate for the byte-level format.

use crate::error::MidiError;
use crate::event::Event;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Program every channel starts with when no program change precedes a note.
const DEFAULT_PROGRAM: u8 = 0;

/// Universal SysEx "General MIDI System On", without the leading 0xF0.
const GM_SYSTEM_ON: &[u8] = &[0x7E, 0x7F, 0x09, 0x01, 0xF7];

const TRACK_NAME: &[u8] = b"markov_music";

/// Controller numbers for the channel-mode messages written in the header.
const OMNI_ON: u8 = 0x7D;
const POLY_ON: u8 = 0x7F;

/// Ticks of silence after the last onset before end-of-track.
const END_OF_TRACK_PADDING: u64 = 20;

/// Largest delta time an SMF variable-length quantity can hold (28 bits).
const MAX_DELTA: u64 = 0x0FFF_FFFF;

/// Decoder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOptions {
    /// When set, channel messages on any other channel are ignored.
    pub channel_filter: Option<BTreeSet<u8>>,
    /// Tempo (microseconds per beat) for notes before any tempo change.
    pub default_tempo: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            channel_filter: None,
            default_tempo: 500_000,
        }
    }
}

impl DecodeOptions {
    fn accepts(&self, channel: u8) -> bool {
        self.channel_filter
            .as_ref()
            .is_none_or(|channels| channels.contains(&channel))
    }
}

/// The notes of one decoded file and its ticks-per-beat resolution.
#[derive(Debug, Clone)]
pub struct DecodedMidi {
    pub resolution: u16,
    pub events: Vec<Event>,
}

/// A note-on waiting for its note-off.
struct OpenNote {
    channel: u8,
    key: u8,
    velocity: u8,
    tick: u64,
    /// Position of the note-on among all note-ons of the file.
    onset: usize,
}

/// A complete note before tempo and program are resolved.
struct RawNote {
    channel: u8,
    key: u8,
    start_velocity: u8,
    end_velocity: u8,
    start_tick: u64,
    end_tick: u64,
    onset: usize,
}

/// Read and decode a MIDI file.
pub fn decode_file(path: &Path, options: &DecodeOptions) -> Result<DecodedMidi, MidiError> {
    let bytes = std::fs::read(path).map_err(|source| MidiError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&bytes, options)
}

/// Decode an in-memory SMF into a time-ordered note list.
pub fn decode(bytes: &[u8], options: &DecodeOptions) -> Result<DecodedMidi, MidiError> {
    let smf = Smf::parse(bytes)?;
    let resolution = match smf.header.timing {
        Timing::Metrical(ticks_per_beat) => ticks_per_beat.as_int(),
        Timing::Timecode(..) => return Err(MidiError::UnsupportedTiming),
    };

    let mut notes: Vec<RawNote> = Vec::new();
    let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
    let mut program_changes: [Vec<(u64, u8)>; 16] = Default::default();
    let mut onsets_seen: usize = 0;

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut tick: u64 = 0;
        let mut open: Vec<OpenNote> = Vec::new();

        for event in track {
            tick += u64::from(event.delta.as_int());
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    tempo_changes.push((tick, tempo.as_int()));
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    if !options.accepts(channel) {
                        continue;
                    }
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open.push(OpenNote {
                                channel,
                                key: key.as_int(),
                                velocity: vel.as_int(),
                                tick,
                                onset: onsets_seen,
                            });
                            onsets_seen += 1;
                        }
                        MidiMessage::NoteOn { key, .. } => {
                            close_note(&mut open, &mut notes, channel, key.as_int(), 0, tick);
                        }
                        MidiMessage::NoteOff { key, vel } => {
                            let (key, vel) = (key.as_int(), vel.as_int());
                            close_note(&mut open, &mut notes, channel, key, vel, tick);
                        }
                        MidiMessage::ProgramChange { program } => {
                            program_changes[usize::from(channel)].push((tick, program.as_int()));
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if !open.is_empty() {
            debug!(
                track = track_index,
                dropped = open.len(),
                "notes without a note-off were dropped"
            );
        }
    }

    tempo_changes.sort_by_key(|&(tick, _)| tick);
    for changes in &mut program_changes {
        changes.sort_by_key(|&(tick, _)| tick);
    }
    // Notes are completed in release order; restore onset order.
    notes.sort_by_key(|note| (note.start_tick, note.onset));

    let mut events: Vec<Event> = notes
        .iter()
        .map(|note| Event {
            pitch: note.key,
            start_intensity: note.start_velocity,
            end_intensity: note.end_velocity,
            duration: clamp_ticks(note.end_tick - note.start_tick),
            gap_to_next: 0,
            tempo: value_before(&tempo_changes, note.start_tick).unwrap_or(options.default_tempo),
            instrument: value_before(&program_changes[usize::from(note.channel)], note.start_tick)
                .unwrap_or(DEFAULT_PROGRAM),
            timestamp: note.start_tick,
        })
        .collect();

    let onsets: Vec<u64> = events.iter().map(|e| e.timestamp).collect();
    for (event, &next_onset) in events.iter_mut().zip(onsets.iter().skip(1)) {
        event.gap_to_next = clamp_ticks(next_onset - event.timestamp);
    }

    debug!(
        resolution,
        tracks = smf.tracks.len(),
        notes = events.len(),
        tempo_changes = tempo_changes.len(),
        "decoded MIDI data"
    );

    Ok(DecodedMidi { resolution, events })
}

/// Pair a note-off with the oldest open note of the same key and channel.
/// A note-off with no matching note-on is ignored.
fn close_note(
    open: &mut Vec<OpenNote>,
    notes: &mut Vec<RawNote>,
    channel: u8,
    key: u8,
    end_velocity: u8,
    tick: u64,
) {
    if let Some(pos) = open
        .iter()
        .position(|o| o.channel == channel && o.key == key)
    {
        let started = open.remove(pos);
        notes.push(RawNote {
            channel,
            key,
            start_velocity: started.velocity,
            end_velocity,
            start_tick: started.tick,
            end_tick: tick,
            onset: started.onset,
        });
    }
}

/// The value of the last change strictly before `tick`, from a list sorted
/// by tick. For equal ticks the later entry wins.
fn value_before<T: Copy>(changes: &[(u64, T)], tick: u64) -> Option<T> {
    let applied = changes.partition_point(|&(at, _)| at < tick);
    applied.checked_sub(1).map(|i| changes[i].1)
}

fn clamp_ticks(ticks: u64) -> u32 {
    u32::try_from(ticks).unwrap_or(u32::MAX)
}

/// Encode notes and write them to a file.
pub fn encode_file(events: &[Event], resolution: u16, path: &Path) -> Result<(), MidiError> {
    let bytes = encode(events, resolution)?;
    std::fs::write(path, bytes).map_err(|source| MidiError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode notes as an in-memory single-track SMF.
pub fn encode(events: &[Event], resolution: u16) -> Result<Vec<u8>, MidiError> {
    let smf = events_to_smf(events, resolution)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf).map_err(MidiError::Write)?;
    Ok(buf)
}

fn events_to_smf(events: &[Event], resolution: u16) -> Result<Smf<'static>, MidiError> {
    let channel = u4::new(0);
    let midi = |message| TrackEventKind::Midi { channel, message };
    let controller = |number: u8| {
        midi(MidiMessage::Controller {
            controller: u7::new(number),
            value: u7::new(0),
        })
    };

    let mut timed: Vec<(u64, TrackEventKind<'static>)> = vec![
        (0, TrackEventKind::SysEx(GM_SYSTEM_ON)),
        (0, TrackEventKind::Meta(MetaMessage::TrackName(TRACK_NAME))),
        (0, controller(OMNI_ON)),
        (0, controller(POLY_ON)),
        (
            0,
            midi(MidiMessage::ProgramChange {
                program: u7::new(DEFAULT_PROGRAM),
            }),
        ),
    ];

    let mut tick: u64 = 1;
    let mut current_tempo: Option<u32> = None;
    let mut current_program = DEFAULT_PROGRAM;

    for event in events {
        if current_tempo != Some(event.tempo) {
            let tempo = u24::new(event.tempo.min(0xFF_FFFF));
            timed.push((tick - 1, TrackEventKind::Meta(MetaMessage::Tempo(tempo))));
            current_tempo = Some(event.tempo);
        }
        if current_program != event.instrument {
            let program = u7::new(event.instrument.min(127));
            timed.push((tick - 1, midi(MidiMessage::ProgramChange { program })));
            current_program = event.instrument;
        }

        let key = u7::new(event.pitch.min(127));
        timed.push((
            tick,
            midi(MidiMessage::NoteOn {
                key,
                vel: u7::new(event.start_intensity.min(127)),
            }),
        ));
        timed.push((
            tick + u64::from(event.duration),
            midi(MidiMessage::NoteOff {
                key,
                vel: u7::new(event.end_intensity.min(127)),
            }),
        ));

        tick += u64::from(event.gap_to_next);
    }

    let last_tick = timed.iter().map(|&(at, _)| at).max().unwrap_or(0);
    let end = last_tick.max(tick + END_OF_TRACK_PADDING);
    timed.push((end, TrackEventKind::Meta(MetaMessage::EndOfTrack)));

    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(resolution.min(0x7FFF))),
    ));
    smf.tracks.push(timed_to_track(timed)?);
    Ok(smf)
}

/// Convert absolute-tick events to a delta-timed track. Events on the same
/// tick keep their relative order. Fails if two consecutive events are
/// further apart than a delta time can express.
fn timed_to_track(mut timed: Vec<(u64, TrackEventKind<'_>)>) -> Result<Track<'_>, MidiError> {
    timed.sort_by_key(|&(at, _)| at);
    let mut last = 0;
    timed
        .into_iter()
        .map(|(at, kind)| {
            let delta = at - last;
            if delta > MAX_DELTA {
                return Err(MidiError::DeltaOverflow { tick: at, delta });
            }
            last = at;
            Ok(TrackEvent {
                delta: u28::new(delta as u32),
                kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::Fps;

    type Timed = Vec<(u64, TrackEventKind<'static>)>;

    fn on(channel: u8, key: u8, vel: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(channel),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        }
    }

    fn off(channel: u8, key: u8, vel: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(channel),
            message: MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        }
    }

    fn program(channel: u8, program: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(channel),
            message: MidiMessage::ProgramChange {
                program: u7::new(program),
            },
        }
    }

    fn tempo(micros: u32) -> TrackEventKind<'static> {
        TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros)))
    }

    fn smf_bytes(tracks: Vec<Timed>) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(480)),
        ));
        for mut track in tracks {
            let end = track.iter().map(|&(at, _)| at).max().unwrap_or(0);
            track.push((end, TrackEventKind::Meta(MetaMessage::EndOfTrack)));
            smf.tracks.push(timed_to_track(track).unwrap());
        }
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();
        buf
    }

    fn decode_default(tracks: Vec<Timed>) -> DecodedMidi {
        decode(&smf_bytes(tracks), &DecodeOptions::default()).unwrap()
    }

    #[test]
    fn pairs_notes_and_computes_gaps() {
        let decoded = decode_default(vec![vec![
            (0, on(0, 60, 100)),
            (480, off(0, 60, 40)),
            (480, on(0, 64, 90)),
            (720, off(0, 64, 30)),
        ]]);
        assert_eq!(decoded.resolution, 480);
        let e = &decoded.events;
        assert_eq!(e.len(), 2);
        assert_eq!(
            (e[0].pitch, e[0].start_intensity, e[0].end_intensity),
            (60, 100, 40)
        );
        assert_eq!((e[0].duration, e[0].gap_to_next, e[0].timestamp), (480, 480, 0));
        assert_eq!((e[1].pitch, e[1].duration, e[1].gap_to_next), (64, 240, 0));
        assert_eq!(e[1].timestamp, 480);
        assert_eq!(e[0].tempo, 500_000);
    }

    #[test]
    fn zero_velocity_note_on_closes_note() {
        let decoded = decode_default(vec![vec![(0, on(0, 60, 100)), (240, on(0, 60, 0))]]);
        assert_eq!(decoded.events.len(), 1);
        assert_eq!(decoded.events[0].duration, 240);
        assert_eq!(decoded.events[0].end_intensity, 0);
    }

    #[test]
    fn same_key_notes_close_oldest_first() {
        let decoded = decode_default(vec![vec![
            (0, on(0, 60, 100)),
            (100, on(0, 60, 80)),
            (200, off(0, 60, 0)),
            (300, off(0, 60, 0)),
        ]]);
        let e = &decoded.events;
        assert_eq!((e[0].start_intensity, e[0].duration), (100, 200));
        assert_eq!((e[1].start_intensity, e[1].duration), (80, 200));
    }

    #[test]
    fn unclosed_notes_are_dropped() {
        let decoded = decode_default(vec![vec![
            (0, on(0, 60, 100)),
            (0, on(0, 62, 100)),
            (480, off(0, 62, 0)),
        ]]);
        assert_eq!(decoded.events.len(), 1);
        assert_eq!(decoded.events[0].pitch, 62);
    }

    #[test]
    fn tempo_change_applies_strictly_after_its_tick() {
        // Tempo on a separate track, as in typical format 1 files.
        let decoded = decode_default(vec![
            vec![(0, tempo(400_000)), (960, tempo(300_000))],
            vec![
                (0, on(0, 60, 100)),
                (100, off(0, 60, 0)),
                (480, on(0, 62, 100)),
                (580, off(0, 62, 0)),
                (960, on(0, 64, 100)),
                (1060, off(0, 64, 0)),
                (1200, on(0, 65, 100)),
                (1300, off(0, 65, 0)),
            ],
        ]);
        let tempos: Vec<u32> = decoded.events.iter().map(|e| e.tempo).collect();
        assert_eq!(tempos, vec![500_000, 400_000, 400_000, 300_000]);
    }

    #[test]
    fn custom_default_tempo() {
        let options = DecodeOptions {
            default_tempo: 600_000,
            ..DecodeOptions::default()
        };
        let bytes = smf_bytes(vec![vec![(0, on(0, 60, 100)), (10, off(0, 60, 0))]]);
        let decoded = decode(&bytes, &options).unwrap();
        assert_eq!(decoded.events[0].tempo, 600_000);
    }

    #[test]
    fn programs_are_tracked_per_channel() {
        let decoded = decode_default(vec![vec![
            (0, program(0, 40)),
            (0, program(1, 73)),
            (10, on(0, 60, 100)),
            (10, on(1, 72, 100)),
            (20, off(0, 60, 0)),
            (20, off(1, 72, 0)),
            (30, on(2, 48, 100)),
            (40, off(2, 48, 0)),
        ]]);
        let instruments: Vec<(u8, u8)> = decoded
            .events
            .iter()
            .map(|e| (e.pitch, e.instrument))
            .collect();
        assert_eq!(instruments, vec![(60, 40), (72, 73), (48, DEFAULT_PROGRAM)]);
    }

    #[test]
    fn channel_filter_skips_other_channels() {
        let bytes = smf_bytes(vec![vec![
            (0, on(0, 60, 100)),
            (0, on(9, 36, 100)),
            (100, off(0, 60, 0)),
            (100, off(9, 36, 0)),
        ]]);
        let options = DecodeOptions {
            channel_filter: Some(BTreeSet::from([9])),
            ..DecodeOptions::default()
        };
        let decoded = decode(&bytes, &options).unwrap();
        assert_eq!(decoded.events.len(), 1);
        assert_eq!(decoded.events[0].pitch, 36);
    }

    #[test]
    fn notes_from_all_tracks_are_merged_in_time_order() {
        let decoded = decode_default(vec![
            vec![
                (0, on(0, 60, 100)),
                (100, off(0, 60, 0)),
                (200, on(0, 62, 100)),
                (300, off(0, 62, 0)),
            ],
            vec![(100, on(1, 48, 100)), (400, off(1, 48, 0))],
        ]);
        let pitches: Vec<u8> = decoded.events.iter().map(|e| e.pitch).collect();
        assert_eq!(pitches, vec![60, 48, 62]);
        let gaps: Vec<u32> = decoded.events.iter().map(|e| e.gap_to_next).collect();
        assert_eq!(gaps, vec![100, 100, 0]);
    }

    #[test]
    fn timecode_files_are_rejected() {
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Timecode(Fps::Fps25, 40)));
        smf.tracks.push(
            timed_to_track(vec![(0, TrackEventKind::Meta(MetaMessage::EndOfTrack))]).unwrap(),
        );
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();
        assert!(matches!(
            decode(&buf, &DecodeOptions::default()),
            Err(MidiError::UnsupportedTiming)
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            decode(b"definitely not a midi file", &DecodeOptions::default()),
            Err(MidiError::Parse(_))
        ));
    }

    #[test]
    fn encoded_file_has_header_events() {
        let smf = events_to_smf(&[Event::note(60, 480, 0)], 96).unwrap();
        assert_eq!(smf.tracks.len(), 1);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(96)));
        let track = &smf.tracks[0];
        assert_eq!(track[0].kind, TrackEventKind::SysEx(GM_SYSTEM_ON));
        assert_eq!(
            track.last().map(|e| e.kind),
            Some(TrackEventKind::Meta(MetaMessage::EndOfTrack))
        );
        assert!(track.iter().any(|e| e.kind == tempo(500_000)));
    }

    #[test]
    fn encode_then_decode_preserves_notes() {
        let events = vec![
            Event {
                start_intensity: 100,
                end_intensity: 10,
                ..Event::note(60, 480, 480)
            },
            Event {
                tempo: 400_000,
                instrument: 19,
                ..Event::note(64, 240, 0)
            },
            Event {
                tempo: 400_000,
                instrument: 19,
                ..Event::note(67, 240, 240)
            },
            Event {
                start_intensity: 1,
                end_intensity: 127,
                ..Event::note(72, 0, 1)
            },
            Event::note(60, 960, 0),
        ];
        let bytes = encode(&events, 480).unwrap();
        let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();
        assert_eq!(decoded.resolution, 480);
        assert_eq!(decoded.events, events);

        let stamps: Vec<u64> = decoded.events.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![1, 481, 481, 721, 722]);
    }

    #[test]
    fn chord_keeps_onset_order() {
        // The later note-on is released first; decoding must not reorder.
        let events = vec![
            Event::note(60, 480, 0),
            Event::note(64, 240, 480),
            Event::note(67, 240, 0),
        ];
        let bytes = encode(&events, 480).unwrap();
        let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();
        let shape: Vec<(u8, u32, u32)> = decoded
            .events
            .iter()
            .map(|e| (e.pitch, e.duration, e.gap_to_next))
            .collect();
        assert_eq!(shape, vec![(60, 480, 0), (64, 240, 480), (67, 240, 0)]);
    }

    #[test]
    fn chord_order_follows_note_ons_across_tracks() {
        // First track's note is released later than the second track's.
        let decoded = decode_default(vec![
            vec![(0, on(0, 72, 90)), (960, off(0, 72, 0))],
            vec![(0, on(1, 48, 90)), (480, off(1, 48, 0))],
        ]);
        let pitches: Vec<u8> = decoded.events.iter().map(|e| e.pitch).collect();
        assert_eq!(pitches, vec![72, 48]);
        assert_eq!(decoded.events[0].gap_to_next, 0);
    }

    #[test]
    fn oversized_gap_is_an_error() {
        let events = vec![Event::note(60, 0, u32::MAX), Event::note(62, 0, 0)];
        let err = encode(&events, 480).unwrap_err();
        assert!(matches!(
            err,
            MidiError::DeltaOverflow {
                delta: 0xFFFF_FFFF,
                ..
            }
        ));
    }

    #[test]
    fn largest_delta_is_accepted() {
        let events = vec![Event::note(60, 0, 0x0FFF_FFFF), Event::note(62, 0, 0)];
        let bytes = encode(&events, 480).unwrap();
        let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();
        assert_eq!(decoded.events[0].gap_to_next, 0x0FFF_FFFF);
    }
}
