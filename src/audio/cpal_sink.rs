/// Audio output using cpal
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use super::AudioSink;
use crate::error::AudioError;
use crate::lock;

type SampleQueue = Arc<Mutex<VecDeque<i8>>>;
type Failure = Arc<Mutex<Option<String>>>;

/// Owns the device stream. Stays on the thread that opened it; samples go
/// in through the paired [`CpalSink`]. Dropping it closes the sink.
pub struct CpalOutput {
    _stream: Stream,
    sample_rate: u32,
    closed: Arc<AtomicBool>,
}

/// Feeding half of a cpal output. `play` blocks while the queue is full
/// and fails once the output has been dropped.
#[derive(Clone)]
pub struct CpalSink {
    queue: SampleQueue,
    failure: Failure,
    closed: Arc<AtomicBool>,
    capacity: usize,
}

impl CpalOutput {
    /// Open the default output device, preferring `sample_rate`. The rate
    /// actually used is reported by [`CpalOutput::sample_rate`].
    pub fn open(sample_rate: u32) -> Result<(Self, CpalSink), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let (config, format) = pick_config(&device, sample_rate)?;
        let sample_rate = config.sample_rate.0;

        // About 100ms of buffered audio
        let capacity = (sample_rate as usize / 10).max(1);
        let queue: SampleQueue = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let failure: Failure = Arc::new(Mutex::new(None));

        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, &queue, &failure),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, &queue, &failure),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, &queue, &failure),
            other => Err(AudioError::StreamCreate(format!(
                "unsupported sample format {:?}",
                other
            ))),
        }?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        info!(
            "audio output open: {} Hz, {} channels, {:?}",
            sample_rate, config.channels, format
        );

        let closed = Arc::new(AtomicBool::new(false));
        Ok((
            Self {
                _stream: stream,
                sample_rate,
                closed: Arc::clone(&closed),
            },
            CpalSink {
                queue,
                failure,
                closed,
                capacity,
            },
        ))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        info!("audio output closed");
    }
}

/// Requested rate if any supported range covers it, otherwise the default config
fn pick_config(device: &Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| AudioError::DeviceInit(e.to_string()))?
        .find(|range| {
            matches!(
                range.sample_format(),
                SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
            ) && range.min_sample_rate().0 <= sample_rate
                && sample_rate <= range.max_sample_rate().0
        })
        .map(|range| range.with_sample_rate(cpal::SampleRate(sample_rate)));

    let supported = match supported {
        Some(config) => config,
        None => {
            let fallback = device
                .default_output_config()
                .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
            warn!(
                "{} Hz not supported, falling back to {} Hz",
                sample_rate,
                fallback.sample_rate().0
            );
            fallback
        }
    };

    Ok((supported.config(), supported.sample_format()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    queue: &SampleQueue,
    failure: &Failure,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let queue = Arc::clone(queue);
    let failure = Arc::clone(failure);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut queue = lock(&queue);
                // Mono source duplicated to every channel; underruns play silence
                for frame in data.chunks_mut(channels) {
                    let value = queue.pop_front().map_or(0.0, |s| s as f32 / 128.0);
                    for sample in frame.iter_mut() {
                        *sample = T::from_sample(value);
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                *lock(&failure) = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| AudioError::StreamCreate(e.to_string()))
}

impl CpalSink {
    fn check_failure(&self) -> Result<(), AudioError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AudioError::Playback("output closed".into()));
        }
        match lock(&self.failure).as_ref() {
            Some(msg) => Err(AudioError::Playback(msg.clone())),
            None => Ok(()),
        }
    }
}

impl AudioSink for CpalSink {
    fn play(&mut self, samples: &[i8]) -> Result<(), AudioError> {
        let mut remaining = samples;

        while !remaining.is_empty() {
            self.check_failure()?;

            let pushed = {
                let mut queue = lock(&self.queue);
                let room = self.capacity.saturating_sub(queue.len());
                let n = room.min(remaining.len());
                queue.extend(&remaining[..n]);
                n
            };
            remaining = &remaining[pushed..];

            if !remaining.is_empty() {
                thread::sleep(Duration::from_millis(1));
            }
        }
        self.check_failure()
    }
}
