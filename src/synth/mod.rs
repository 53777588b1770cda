//! Voice pool and sample generator.
//!
//! The generator owns a fixed arena of voice slots. Every call to
//! [`WaveformGenerator::generate_sample`] sums the active voices into one
//! signed 8-bit sample and advances each of their phases by one.

use std::sync::{Arc, Mutex};

use log::debug;

use crate::config::EngineConfig;
use crate::error::VoiceError;

pub mod voice;
pub mod waveform;

pub use voice::{frequency, note_name, Voice};
pub use waveform::Waveform;

/// Output samples are clamped to this symmetric range
pub const SAMPLE_MAX: i32 = 127;

/// Generator shared between the step driver and the render path
pub type SharedGenerator = Arc<Mutex<WaveformGenerator>>;

/// The operations a sequencer issues against a voice pool
pub trait VoiceControl {
    /// Start a voice in the first free slot, returning the slot index
    fn start_voice(&mut self, pitch: i32, velocity: i8) -> Result<usize, VoiceError>;

    /// First slot holding `pitch`, active or not
    fn find_voice_index(&self, pitch: i32) -> Option<usize>;

    /// Whether `index` holds an active voice playing `pitch`
    fn is_sounding(&self, index: usize, pitch: i32) -> bool;

    /// Deactivate the voice in `index`
    fn stop_voice(&mut self, index: usize);
}

pub struct WaveformGenerator {
    /// Fixed-size slot arena (None = never used)
    slots: Vec<Option<Voice>>,
    sample_rate: u32,
    waveform: Waveform,
    halted: bool,
}

impl WaveformGenerator {
    pub fn new(sample_rate: u32, polyphony: usize, waveform: Waveform) -> Self {
        Self {
            slots: vec![None; polyphony],
            sample_rate: sample_rate.max(1),
            waveform,
            halted: false,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.sample_rate, config.polyphony, config.waveform)
    }

    pub fn shared(self) -> SharedGenerator {
        Arc::new(Mutex::new(self))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().flatten().filter(|v| v.active).count()
    }

    pub fn start_voice(&mut self, pitch: i32, velocity: i8) -> Result<usize, VoiceError> {
        if self.halted {
            return Err(VoiceError::Halted);
        }
        let index = self
            .slots
            .iter()
            .position(|s| s.map_or(true, |v| !v.active))
            .ok_or(VoiceError::Overflow { pitch })?;

        self.slots[index] = Some(Voice::new(pitch, velocity));
        debug!("voice start pitch={} velocity={} slot={}", pitch, velocity, index);
        Ok(index)
    }

    pub fn find_voice_index(&self, pitch: i32) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.map_or(false, |v| v.pitch == pitch))
    }

    /// Panics if `index` is not a slot of this pool.
    pub fn stop_voice(&mut self, index: usize) {
        assert!(
            index < self.slots.len(),
            "voice index {} out of range for pool of {}",
            index,
            self.slots.len()
        );
        if let Some(voice) = self.slots[index].as_mut() {
            voice.active = false;
            debug!("voice stop pitch={} slot={}", voice.pitch, index);
        }
    }

    pub fn stop_all(&mut self) {
        for voice in self.slots.iter_mut().flatten() {
            voice.active = false;
        }
    }

    /// Refuse new voices; sounding voices keep their phase.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn resume(&mut self) {
        self.halted = false;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Sum every active voice into one clamped sample and advance their phases
    pub fn generate_sample(&mut self) -> i8 {
        let sample_rate = self.sample_rate;
        let waveform = self.waveform;
        let mut total: i32 = 0;

        for voice in self.slots.iter_mut().flatten().filter(|v| v.active) {
            let t = voice.time(sample_rate);
            let value = voice.amplitude() as f64 * waveform.value(voice.frequency(), t);
            total += value as i32;
            voice.phase += 1;
        }

        total.clamp(-SAMPLE_MAX, SAMPLE_MAX) as i8
    }

    pub fn generate_block(&mut self, n: usize) -> Vec<i8> {
        (0..n).map(|_| self.generate_sample()).collect()
    }

    /// Fill `out` in order without allocating
    pub fn generate_into(&mut self, out: &mut [i8]) {
        for sample in out.iter_mut() {
            *sample = self.generate_sample();
        }
    }
}

impl Default for WaveformGenerator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl VoiceControl for WaveformGenerator {
    fn start_voice(&mut self, pitch: i32, velocity: i8) -> Result<usize, VoiceError> {
        WaveformGenerator::start_voice(self, pitch, velocity)
    }

    fn find_voice_index(&self, pitch: i32) -> Option<usize> {
        WaveformGenerator::find_voice_index(self, pitch)
    }

    fn is_sounding(&self, index: usize, pitch: i32) -> bool {
        self.voice(index)
            .map_or(false, |v| v.active && v.pitch == pitch)
    }

    fn stop_voice(&mut self, index: usize) {
        WaveformGenerator::stop_voice(self, index)
    }
}
