/// stepsynth - a polyphonic step sequencer and sample-by-sample synthesizer
///
/// This library provides the core components:
/// - A fixed-polyphony voice pool that renders signed 8-bit samples
/// - A steps x tracks note grid with edge-triggered voice control
/// - Drivers for stepping at tempo and feeding an audio sink
/// - Audio output through cpal

pub mod audio;
pub mod config;
pub mod error;
pub mod sequencer;
pub mod synth;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-export commonly used types
pub use audio::{render_steps, AudioRenderer, AudioSink, CpalOutput, CpalSink, MemorySink};
pub use config::EngineConfig;
pub use error::{AudioError, Error, VoiceError};
pub use sequencer::playback::{PlaybackEngine, PlaybackEvent};
pub use sequencer::{Cell, Grid, Sequencer, SharedSequencer, StepEvent};
pub use synth::{
    frequency, note_name, SharedGenerator, Voice, VoiceControl, Waveform, WaveformGenerator,
};

/// Lock a mutex, recovering the data if another thread panicked while holding it
#[doc(hidden)]
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
