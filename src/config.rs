/// Engine configuration shared by the generator, sequencer and drivers
use std::time::Duration;

use crate::synth::Waveform;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_POLYPHONY: usize = 16;
pub const DEFAULT_STEPS: usize = 16;
pub const DEFAULT_TRACKS: usize = 4;
pub const DEFAULT_BPM: f32 = 120.0;
pub const DEFAULT_BLOCK_SIZE: usize = 512;

pub const MIN_BPM: f32 = 40.0;
pub const MAX_BPM: f32 = 240.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub polyphony: usize,
    pub steps: usize,
    pub tracks: usize,
    pub bpm: f32,
    pub block_size: usize,
    pub waveform: Waveform,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            polyphony: DEFAULT_POLYPHONY,
            steps: DEFAULT_STEPS,
            tracks: DEFAULT_TRACKS,
            bpm: DEFAULT_BPM,
            block_size: DEFAULT_BLOCK_SIZE,
            waveform: Waveform::Sine,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate.max(1);
        self
    }

    pub fn with_polyphony(mut self, polyphony: usize) -> Self {
        self.polyphony = polyphony;
        self
    }

    pub fn with_grid(mut self, steps: usize, tracks: usize) -> Self {
        self.steps = steps.max(1);
        self.tracks = tracks;
        self
    }

    pub fn with_bpm(mut self, bpm: f32) -> Self {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    /// Duration of one step (a 16th note) at the configured tempo
    pub fn step_duration(&self) -> Duration {
        step_duration(self.bpm)
    }
}

/// One step is a 16th note, four steps per beat
pub fn step_duration(bpm: f32) -> Duration {
    let steps_per_beat = 4.0;
    let beats_per_second = bpm / 60.0;
    Duration::from_secs_f32(1.0 / (beats_per_second * steps_per_beat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_step_duration() {
        let config = EngineConfig::default();
        assert_eq!(config.step_duration().as_millis(), 125);
    }

    #[test]
    fn test_bpm_clamped() {
        assert_eq!(EngineConfig::default().with_bpm(1000.0).bpm, MAX_BPM);
        assert_eq!(EngineConfig::default().with_bpm(0.0).bpm, MIN_BPM);
    }
}
