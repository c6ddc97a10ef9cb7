// Note events and their rounded comparison keys.
//
// An `Event` is one decoded note with the timing information the model
// learns from: how long it sounds, how long until the next note starts,
// and the tempo and instrument in effect at its onset. `timestamp` is only
// used for ordering during decoding and is ignored by equality and hashing,
// so the same note played at two points in a piece compares equal.
//
// `RoundedEvent` buckets the velocity, timing and tempo fields so that
// near-identical notes share one model key. All context lookups go through
// `RoundedEvent`; the generator always emits the original `Event`.

use std::hash::{Hash, Hasher};

/// One note, as decoded from a MIDI file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Event {
    /// MIDI key number.
    pub pitch: u8,
    /// Note-on velocity.
    pub start_intensity: u8,
    /// Note-off (release) velocity.
    pub end_intensity: u8,
    /// Ticks between note-on and note-off.
    pub duration: u32,
    /// Ticks until the next event starts. 0 for simultaneous notes and for
    /// the last note of a sequence.
    pub gap_to_next: u32,
    /// Microseconds per beat in effect at the onset.
    pub tempo: u32,
    /// Program number in effect at the onset.
    pub instrument: u8,
    /// Absolute onset tick. Not part of equality.
    pub timestamp: u64,
}

impl Event {
    /// A note with the given pitch and timing, default velocity 64 and the
    /// MIDI default tempo of 120 BPM.
    pub fn note(pitch: u8, duration: u32, gap_to_next: u32) -> Self {
        Event {
            pitch,
            start_intensity: 64,
            end_intensity: 64,
            duration,
            gap_to_next,
            tempo: 500_000,
            instrument: 0,
            timestamp: 0,
        }
    }

    /// Round this event's bucketed fields down to their bucket multiples.
    pub fn rounded(&self, rounding: &Rounding) -> RoundedEvent {
        let intensity = |v: u8| floor_to(u32::from(v), rounding.intensity_bucket) as u8;
        RoundedEvent(Event {
            pitch: self.pitch,
            start_intensity: intensity(self.start_intensity),
            end_intensity: intensity(self.end_intensity),
            duration: floor_to(self.duration, rounding.duration_bucket),
            gap_to_next: floor_to(self.gap_to_next, rounding.duration_bucket),
            tempo: floor_to(self.tempo, rounding.tempo_bucket),
            instrument: self.instrument,
            timestamp: self.timestamp,
        })
    }

    /// Every field that takes part in equality, in declaration order.
    fn key(&self) -> (u8, u8, u8, u32, u32, u32, u8) {
        (
            self.pitch,
            self.start_intensity,
            self.end_intensity,
            self.duration,
            self.gap_to_next,
            self.tempo,
            self.instrument,
        )
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Bucket sizes used to build `RoundedEvent`s.
///
/// A bucket of 1 leaves the field unchanged. Buckets are validated to be
/// non-zero by `MarkovConfig::validate`; a zero bucket is treated as 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rounding {
    /// Applied to `start_intensity` and `end_intensity`.
    pub intensity_bucket: u32,
    /// Applied to `duration` and `gap_to_next`.
    pub duration_bucket: u32,
    /// Applied to `tempo`.
    pub tempo_bucket: u32,
}

impl Rounding {
    /// No-op rounding: every bucket is 1.
    pub const EXACT: Rounding = Rounding {
        intensity_bucket: 1,
        duration_bucket: 1,
        tempo_bucket: 1,
    };
}

/// An `Event` with its bucketed fields floor-rounded. Used as a model key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundedEvent(Event);

impl RoundedEvent {
    pub fn event(&self) -> &Event {
        &self.0
    }
}

fn floor_to(value: u32, bucket: u32) -> u32 {
    value - value.checked_rem(bucket).unwrap_or(0)
}
