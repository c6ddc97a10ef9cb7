// Generator configuration.
//
// All tunable parameters live in `MarkovConfig`, loaded from JSON. Every
// field is optional in the file; missing fields take the defaults below.
// The `generate` binary applies command-line overrides on top of the loaded
// config and validates the result before any file is read.
//
// The default buckets are deliberately coarse: velocities in steps of 40,
// durations and gaps in steps of 2000 ticks, and tempo effectively ignored.
// Coarse keys give the walk more branching points between source phrases.

use crate::error::ConfigError;
use crate::event::Rounding;
use crate::generator::{DEFAULT_MAX_EVENTS, GenerateOptions};
use crate::midi::DecodeOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Highest MIDI channel number (channels are 0..=15).
const MAX_CHANNEL: u8 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkovConfig {
    /// Longest context window, in events.
    pub order: usize,
    /// Bucket for note-on and note-off velocities.
    pub intensity_bucket: u32,
    /// Bucket for durations and gaps, in ticks.
    pub duration_bucket: u32,
    /// Bucket for tempo, in microseconds per beat.
    pub tempo_bucket: u32,
    /// Only ingest these channels. `None` ingests all of them.
    pub channel_filter: Option<BTreeSet<u8>>,
    /// Tempo for notes before the first tempo change.
    pub default_tempo: u32,
    /// Ceiling on generated sequence length.
    pub max_events: usize,
    /// PRNG seed. `None` derives one from the clock.
    pub seed: Option<u64>,
}

impl Default for MarkovConfig {
    fn default() -> Self {
        MarkovConfig {
            order: 2,
            intensity_bucket: 40,
            duration_bucket: 2000,
            tempo_bucket: 1_000_000_000,
            channel_filter: None,
            default_tempo: 500_000,
            max_events: DEFAULT_MAX_EVENTS,
            seed: None,
        }
    }
}

impl MarkovConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data)
    }

    /// Parse and validate a JSON config.
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: MarkovConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.order == 0 {
            return Err(ConfigError::Invalid("order must be at least 1".into()));
        }
        for (name, bucket) in [
            ("intensity_bucket", self.intensity_bucket),
            ("duration_bucket", self.duration_bucket),
            ("tempo_bucket", self.tempo_bucket),
        ] {
            if bucket == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        let bad_channel = self
            .channel_filter
            .iter()
            .flatten()
            .find(|&&c| c > MAX_CHANNEL);
        if let Some(bad) = bad_channel {
            return Err(ConfigError::Invalid(format!(
                "channel {bad} is out of range (0-{MAX_CHANNEL})"
            )));
        }
        if self.max_events == 0 {
            return Err(ConfigError::Invalid("max_events must be at least 1".into()));
        }
        Ok(())
    }

    pub fn rounding(&self) -> Rounding {
        Rounding {
            intensity_bucket: self.intensity_bucket,
            duration_bucket: self.duration_bucket,
            tempo_bucket: self.tempo_bucket,
        }
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            channel_filter: self.channel_filter.clone(),
            default_tempo: self.default_tempo,
        }
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            max_events: self.max_events,
        }
    }
}
