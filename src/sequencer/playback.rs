/// Playback engine - steps the sequencer at tempo on its own thread
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info};

use super::{SharedSequencer, StepEvent};
use crate::lock;
use crate::synth::SharedGenerator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    StepAdvanced(usize),
    Note(StepEvent),
}

pub struct PlaybackEngine {
    sender: Sender<PlaybackEvent>,
    receiver: Receiver<PlaybackEvent>,
    is_running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    shared: Option<(SharedSequencer, SharedGenerator)>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        let (sender, receiver) = channel();

        Self {
            sender,
            receiver,
            is_running: Arc::new(AtomicBool::new(false)),
            handle: None,
            shared: None,
        }
    }

    /// Start stepping from the sequencer's cued position. The first step
    /// plays immediately; the interval follows the sequencer's BPM live.
    pub fn start(&mut self, sequencer: SharedSequencer, generator: SharedGenerator) {
        if self.is_running() {
            return;
        }
        // Reap a previous thread that stopped on its own
        self.join();

        self.is_running.store(true, Ordering::SeqCst);
        self.shared = Some((Arc::clone(&sequencer), Arc::clone(&generator)));
        info!("playback started");

        let is_running = Arc::clone(&self.is_running);
        let sender = self.sender.clone();

        self.handle = Some(thread::spawn(move || {
            let mut last_step_time: Option<Instant> = None;

            while is_running.load(Ordering::SeqCst) {
                let now = Instant::now();
                let step_duration = lock(&sequencer).step_duration();

                if last_step_time.map_or(true, |last| now.duration_since(last) >= step_duration) {
                    // Sequencer before generator, the whole step under one generator lock
                    let (position, events) = {
                        let mut seq = lock(&sequencer);
                        let mut gen = lock(&generator);
                        let events = seq.tick(&mut *gen);
                        (seq.current_position(), events)
                    };

                    let _ = sender.send(PlaybackEvent::StepAdvanced(position));
                    for event in events {
                        let _ = sender.send(PlaybackEvent::Note(event));
                    }

                    last_step_time = Some(now);
                }

                thread::sleep(Duration::from_millis(1));
            }
        }));
    }

    /// Stop stepping and silence every track. Returns once the step thread
    /// has exited, so no step runs after this call.
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        self.join();

        if let Some((sequencer, generator)) = self.shared.take() {
            let events = {
                let mut seq = lock(&sequencer);
                let mut gen = lock(&generator);
                let events = seq.release_all(&mut *gen);
                gen.stop_all();
                events
            };
            for event in events {
                let _ = self.sender.send(PlaybackEvent::Note(event));
            }
            info!("playback stopped");
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("step thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
