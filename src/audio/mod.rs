//! Audio output: the sink boundary and the drivers that feed it.
//!
//! The generator never talks to a device directly. Blocks of signed 8-bit
//! samples are handed to an [`AudioSink`], either from a render thread
//! ([`AudioRenderer`]) or synchronously ([`render_steps`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{error, info};

use crate::error::AudioError;
use crate::lock;
use crate::sequencer::Sequencer;
use crate::synth::{SharedGenerator, WaveformGenerator};

pub mod cpal_sink;

pub use cpal_sink::{CpalOutput, CpalSink};

/// Receives generated samples in order. May block until there is room.
pub trait AudioSink: Send {
    fn play(&mut self, samples: &[i8]) -> Result<(), AudioError>;
}

/// Collects every sample it is given. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    samples: Arc<Mutex<Vec<i8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<i8> {
        lock(&self.samples).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.samples).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AudioSink for MemorySink {
    fn play(&mut self, samples: &[i8]) -> Result<(), AudioError> {
        lock(&self.samples).extend_from_slice(samples);
        Ok(())
    }
}

/// Pulls blocks from a shared generator on its own thread and hands them
/// to a sink until stopped or until the sink fails.
pub struct AudioRenderer {
    is_running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), AudioError>>>,
}

impl AudioRenderer {
    pub fn start<S>(generator: SharedGenerator, mut sink: S, block_size: usize) -> Self
    where
        S: AudioSink + 'static,
    {
        let is_running = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&is_running);

        let handle = thread::spawn(move || {
            let mut block = vec![0i8; block_size.max(1)];

            while running.load(Ordering::SeqCst) {
                lock(&generator).generate_into(&mut block);

                if let Err(err) = sink.play(&block) {
                    error!("audio sink failed: {}", err);
                    lock(&generator).halt();
                    running.store(false, Ordering::SeqCst);
                    return Err(err);
                }
            }
            Ok(())
        });
        info!("render thread started, block size {}", block_size);

        Self {
            is_running,
            handle: Some(handle),
        }
    }

    /// False once stopped or after the sink failed
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Stop rendering and wait for the in-flight block to finish. Returns
    /// the sink failure that ended rendering, if any.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        self.is_running.store(false, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(AudioError::Playback("render thread panicked".into()))),
            None => Ok(()),
        }
    }
}

impl Drop for AudioRenderer {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!("render thread ended with: {}", err);
        }
    }
}

/// Samples rendered per sequencer step at the sequencer's tempo
pub fn samples_per_step(sequencer: &Sequencer, sample_rate: u32) -> usize {
    (sequencer.step_duration().as_secs_f64() * sample_rate as f64).round() as usize
}

/// Single-threaded driver: tick `steps` steps, rendering one step's worth
/// of samples to `sink` after each. A sink failure halts the generator and
/// is returned.
pub fn render_steps(
    sequencer: &mut Sequencer,
    generator: &mut WaveformGenerator,
    sink: &mut dyn AudioSink,
    steps: usize,
) -> Result<(), AudioError> {
    let mut block = vec![0i8; samples_per_step(sequencer, generator.sample_rate())];

    for _ in 0..steps {
        sequencer.tick(generator);
        generator.generate_into(&mut block);
        if let Err(err) = sink.play(&block) {
            error!("audio sink failed: {}", err);
            generator.halt();
            return Err(err);
        }
    }
    Ok(())
}
