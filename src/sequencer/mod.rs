/// Core sequencer logic - note grid and edge-triggered step diffing
/// The grid is steps x tracks; each track drives at most one voice at a time
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};

use crate::config::{self, EngineConfig, MAX_BPM, MIN_BPM};
use crate::synth::VoiceControl;

pub mod playback;

/// Middle C
pub const DEFAULT_PITCH: i32 = 60;

/// Sequencer shared between the grid editor and the step driver
pub type SharedSequencer = Arc<Mutex<Sequencer>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub pitch: i32,
    pub velocity: i8,
    pub active: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            pitch: DEFAULT_PITCH,
            velocity: 0,
            active: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Grid {
    /// Indexed `[step][track]`
    cells: Vec<Vec<Cell>>,
    steps: usize,
    tracks: usize,
}

impl Grid {
    pub fn new(steps: usize, tracks: usize) -> Self {
        let steps = steps.max(1);
        Self {
            cells: vec![vec![Cell::default(); tracks]; steps],
            steps,
            tracks,
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn tracks(&self) -> usize {
        self.tracks
    }

    pub fn get(&self, step: usize, track: usize) -> Cell {
        self.cells
            .get(step)
            .and_then(|row| row.get(track))
            .copied()
            .unwrap_or_default()
    }

    fn cell_mut(&mut self, step: usize, track: usize) -> Option<&mut Cell> {
        self.cells.get_mut(step).and_then(|row| row.get_mut(track))
    }

    pub fn set(&mut self, step: usize, track: usize, value: Cell) {
        if let Some(cell) = self.cell_mut(step, track) {
            *cell = value;
        }
    }

    /// Place an active note in a cell
    pub fn set_note(&mut self, step: usize, track: usize, pitch: i32, velocity: i8) {
        self.set(
            step,
            track,
            Cell {
                pitch,
                velocity,
                active: true,
            },
        );
    }

    pub fn set_pitch(&mut self, step: usize, track: usize, pitch: i32) {
        if let Some(cell) = self.cell_mut(step, track) {
            cell.pitch = pitch;
        }
    }

    pub fn set_velocity(&mut self, step: usize, track: usize, velocity: i8) {
        if let Some(cell) = self.cell_mut(step, track) {
            cell.velocity = velocity;
        }
    }

    pub fn set_active(&mut self, step: usize, track: usize, active: bool) {
        if let Some(cell) = self.cell_mut(step, track) {
            cell.active = active;
        }
    }

    pub fn toggle(&mut self, step: usize, track: usize) {
        let current = self.get(step, track).active;
        self.set_active(step, track, !current);
    }

    /// Deactivate every cell, keeping pitches and velocities
    pub fn clear(&mut self) {
        for row in &mut self.cells {
            for cell in row {
                cell.active = false;
            }
        }
    }

    pub fn fill(&mut self) {
        for row in &mut self.cells {
            for cell in row {
                cell.active = true;
            }
        }
    }
}

/// What a single `step` did on one track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    NoteOn {
        track: usize,
        pitch: i32,
        velocity: i8,
        slot: usize,
    },
    NoteOff {
        track: usize,
        pitch: i32,
        slot: usize,
    },
    /// The voice could not be started; the track still counts it as sounding
    Dropped { track: usize, pitch: i32 },
}

/// Pitch a track last started and the slot it landed in (None if dropped)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sounding {
    pitch: i32,
    slot: Option<usize>,
}

pub struct Sequencer {
    grid: Grid,
    /// None while resting
    sounding: Vec<Option<Sounding>>,
    current_position: usize,
    next_position: usize,
    bpm: f32,
}

impl Sequencer {
    pub fn new(steps: usize, tracks: usize) -> Self {
        let grid = Grid::new(steps, tracks);

        Self {
            sounding: vec![None; grid.tracks()],
            grid,
            current_position: 0,
            next_position: 0,
            bpm: config::DEFAULT_BPM,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut seq = Self::new(config.steps, config.tracks);
        seq.set_bpm(config.bpm);
        seq
    }

    pub fn shared(self) -> SharedSequencer {
        Arc::new(Mutex::new(self))
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    /// The step most recently played
    pub fn current_position(&self) -> usize {
        self.current_position
    }

    /// Make `pos` the step played by the next `tick`
    pub fn cue(&mut self, pos: usize) {
        self.next_position = pos % self.grid.steps();
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f32) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    }

    pub fn step_duration(&self) -> Duration {
        config::step_duration(self.bpm)
    }

    pub fn sounding(&self, track: usize) -> Option<i32> {
        self.sounding
            .get(track)
            .copied()
            .flatten()
            .map(|s| s.pitch)
    }

    /// Play the cued step and cue the one after it
    pub fn tick<V: VoiceControl + ?Sized>(&mut self, voices: &mut V) -> Vec<StepEvent> {
        let t = self.next_position;
        self.step(t, voices)
    }

    /// Apply step `t` (wrapped to the grid length): for each track whose
    /// target pitch differs from what it is sounding, stop the old voice and
    /// start the new one. Unchanged tracks are left alone.
    pub fn step<V: VoiceControl + ?Sized>(&mut self, t: usize, voices: &mut V) -> Vec<StepEvent> {
        let t = t % self.grid.steps();
        let mut events = Vec::new();

        for track in 0..self.grid.tracks() {
            let cell = self.grid.get(t, track);
            let target = cell.active.then_some(cell.pitch);
            let last = self.sounding[track];
            if target == last.map(|s| s.pitch) {
                continue;
            }

            if let Some(last) = last {
                if let Some(slot) = stop_track(voices, &self.sounding, track, last) {
                    events.push(StepEvent::NoteOff {
                        track,
                        pitch: last.pitch,
                        slot,
                    });
                }
            }

            self.sounding[track] = target.map(|pitch| {
                let slot = match voices.start_voice(pitch, cell.velocity) {
                    Ok(slot) => {
                        events.push(StepEvent::NoteOn {
                            track,
                            pitch,
                            velocity: cell.velocity,
                            slot,
                        });
                        Some(slot)
                    }
                    Err(err) => {
                        warn!("step {} track {}: {}", t, track, err);
                        events.push(StepEvent::Dropped { track, pitch });
                        None
                    }
                };
                Sounding { pitch, slot }
            });
        }

        debug!("step {} -> {} events", t, events.len());
        self.current_position = t;
        self.next_position = (t + 1) % self.grid.steps();
        events
    }

    /// Stop every sounding track so the next step retriggers from silence
    pub fn release_all<V: VoiceControl + ?Sized>(&mut self, voices: &mut V) -> Vec<StepEvent> {
        let mut events = Vec::new();
        for track in 0..self.sounding.len() {
            if let Some(last) = self.sounding[track] {
                if let Some(slot) = stop_track(voices, &self.sounding, track, last) {
                    events.push(StepEvent::NoteOff {
                        track,
                        pitch: last.pitch,
                        slot,
                    });
                }
            }
        }
        self.sounding.fill(None);
        events
    }
}

/// Stop the voice `track` started. A recorded slot is only stopped while it
/// still plays that pitch; a dropped start falls back to the first slot
/// holding the pitch, unless another track started it.
fn stop_track<V: VoiceControl + ?Sized>(
    voices: &mut V,
    sounding: &[Option<Sounding>],
    track: usize,
    last: Sounding,
) -> Option<usize> {
    let slot = match last.slot {
        Some(slot) => slot,
        None => {
            let slot = voices.find_voice_index(last.pitch)?;
            let owned = sounding
                .iter()
                .enumerate()
                .any(|(other, s)| other != track && s.and_then(|s| s.slot) == Some(slot));
            if owned {
                return None;
            }
            slot
        }
    };

    if !voices.is_sounding(slot, last.pitch) {
        return None;
    }
    voices.stop_voice(slot);
    Some(slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoiceError;
    use crate::synth::{Waveform, WaveformGenerator};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Start(i32, i8),
        Stop(usize),
    }

    /// Pool stand-in that records every call
    #[derive(Default)]
    struct RecordingVoices {
        pitches: Vec<(i32, bool)>,
        capacity: Option<usize>,
        calls: Vec<Call>,
    }

    impl VoiceControl for RecordingVoices {
        fn start_voice(&mut self, pitch: i32, velocity: i8) -> Result<usize, VoiceError> {
            self.calls.push(Call::Start(pitch, velocity));
            if let Some(slot) = self.pitches.iter().position(|(_, active)| !active) {
                self.pitches[slot] = (pitch, true);
                return Ok(slot);
            }
            if self.capacity.map_or(false, |cap| self.pitches.len() >= cap) {
                return Err(VoiceError::Overflow { pitch });
            }
            self.pitches.push((pitch, true));
            Ok(self.pitches.len() - 1)
        }

        fn find_voice_index(&self, pitch: i32) -> Option<usize> {
            self.pitches.iter().position(|(p, _)| *p == pitch)
        }

        fn is_sounding(&self, index: usize, pitch: i32) -> bool {
            self.pitches.get(index) == Some(&(pitch, true))
        }

        fn stop_voice(&mut self, index: usize) {
            self.calls.push(Call::Stop(index));
            self.pitches[index].1 = false;
        }
    }

    #[test]
    fn test_grid_creation() {
        let grid = Grid::new(16, 4);
        assert_eq!(grid.steps(), 16);
        assert_eq!(grid.tracks(), 4);
        assert!(!grid.get(0, 0).active);
        assert_eq!(grid.get(0, 0).pitch, DEFAULT_PITCH);
    }

    #[test]
    fn test_grid_toggle() {
        let mut grid = Grid::new(4, 4);
        grid.toggle(0, 0);
        assert!(grid.get(0, 0).active);
        grid.toggle(0, 0);
        assert!(!grid.get(0, 0).active);
    }

    #[test]
    fn test_grid_out_of_range_is_ignored() {
        let mut grid = Grid::new(4, 2);
        grid.set_note(10, 10, 72, 5);
        assert_eq!(grid.get(10, 10), Cell::default());
    }

    #[test]
    fn test_grid_clear_keeps_notes() {
        let mut grid = Grid::new(4, 2);
        grid.set_note(1, 1, 72, 5);
        grid.clear();
        let cell = grid.get(1, 1);
        assert!(!cell.active);
        assert_eq!((cell.pitch, cell.velocity), (72, 5));
        grid.fill();
        assert!(grid.get(3, 0).active);
    }

    #[test]
    fn test_held_pitch_is_not_retriggered() {
        let mut seq = Sequencer::new(16, 4);
        for t in 0..3 {
            seq.grid_mut().set_note(t, 0, 69, 10);
        }
        seq.grid_mut().set_note(3, 0, 73, 20);

        let mut voices = RecordingVoices::default();
        seq.step(0, &mut voices);
        assert_eq!(voices.calls, vec![Call::Start(69, 10)]);

        seq.step(1, &mut voices);
        seq.step(2, &mut voices);
        assert_eq!(voices.calls.len(), 1);

        let events = seq.step(3, &mut voices);
        assert_eq!(
            voices.calls,
            vec![Call::Start(69, 10), Call::Stop(0), Call::Start(73, 20)]
        );
        assert_eq!(
            events,
            vec![
                StepEvent::NoteOff { track: 0, pitch: 69, slot: 0 },
                StepEvent::NoteOn { track: 0, pitch: 73, velocity: 20, slot: 0 },
            ]
        );
        assert_eq!(seq.sounding(0), Some(73));
    }

    #[test]
    fn test_steps_drive_generator() {
        let mut gen = WaveformGenerator::new(44_100, 16, Waveform::Sine);
        let mut seq = Sequencer::new(16, 4);
        seq.grid_mut().set_note(0, 0, 69, 0);
        seq.grid_mut().set_note(0, 1, 76, 0);
        seq.grid_mut().set_note(1, 0, 69, 0);
        seq.grid_mut().set_note(1, 1, 77, 0);

        seq.step(0, &mut gen);
        assert_eq!(gen.active_count(), 2);
        gen.generate_block(50);

        seq.step(1, &mut gen);
        assert_eq!(gen.active_count(), 2);
        // Held note keeps its phase, changed note restarts in the freed slot
        assert_eq!(gen.voice(0).unwrap().phase, 50);
        assert_eq!(gen.voice(1).unwrap().pitch, 77);
        assert_eq!(gen.voice(1).unwrap().phase, 0);
    }

    #[test]
    fn test_inactive_cell_rests() {
        let mut seq = Sequencer::new(4, 1);
        seq.grid_mut().set_note(0, 0, 64, 0);
        seq.grid_mut().set_note(1, 0, 67, 0);
        seq.grid_mut().set_active(1, 0, false);

        let mut voices = RecordingVoices::default();
        seq.step(0, &mut voices);
        let events = seq.step(1, &mut voices);

        assert_eq!(events, vec![StepEvent::NoteOff { track: 0, pitch: 64, slot: 0 }]);
        assert_eq!(seq.sounding(0), None);

        // Resting twice in a row does nothing
        assert!(seq.step(2, &mut voices).is_empty());
    }

    #[test]
    fn test_empty_grid_starts_nothing() {
        let mut seq = Sequencer::new(16, 4);
        let mut voices = RecordingVoices::default();
        for t in 0..16 {
            assert!(seq.step(t, &mut voices).is_empty());
        }
        assert!(voices.calls.is_empty());
    }

    #[test]
    fn test_overflow_is_reported_and_bookkeeping_advances() {
        let mut seq = Sequencer::new(2, 4);
        for track in 0..4 {
            seq.grid_mut().set_note(0, track, 60 + track as i32, 0);
        }
        let mut voices = RecordingVoices {
            capacity: Some(2),
            ..Default::default()
        };

        let events = seq.step(0, &mut voices);
        let dropped = events
            .iter()
            .filter(|e| matches!(e, StepEvent::Dropped { .. }))
            .count();
        assert_eq!(dropped, 2);
        assert_eq!(seq.sounding(3), Some(63));
    }

    #[test]
    fn test_grid_edit_affects_only_future_steps() {
        let mut gen = WaveformGenerator::default();
        let mut seq = Sequencer::new(4, 1);
        seq.grid_mut().set_note(0, 0, 60, 0);
        seq.step(0, &mut gen);

        seq.grid_mut().set_note(0, 0, 62, 0);
        assert_eq!(gen.voice(0).unwrap().pitch, 60);
        assert!(gen.voice(0).unwrap().active);
    }

    #[test]
    fn test_tick_wraps_and_cue() {
        let mut seq = Sequencer::new(4, 1);
        let mut voices = RecordingVoices::default();
        for _ in 0..5 {
            seq.tick(&mut voices);
        }
        assert_eq!(seq.current_position(), 0);

        seq.cue(2);
        seq.tick(&mut voices);
        assert_eq!(seq.current_position(), 2);

        seq.step(9, &mut voices);
        assert_eq!(seq.current_position(), 1);
    }

    #[test]
    fn test_release_all_retriggers_next_step() {
        let mut gen = WaveformGenerator::default();
        let mut seq = Sequencer::new(4, 2);
        seq.grid_mut().set_note(0, 0, 60, 0);
        seq.grid_mut().set_note(0, 1, 64, 0);
        seq.step(0, &mut gen);

        let events = seq.release_all(&mut gen);
        assert_eq!(events.len(), 2);
        assert_eq!(gen.active_count(), 0);

        seq.step(0, &mut gen);
        assert_eq!(gen.active_count(), 2);
    }

    #[test]
    fn test_shared_pitch_tracks_rest_together() {
        let mut gen = WaveformGenerator::default();
        let mut seq = Sequencer::new(2, 2);
        // Toggling uses the default pitch on both tracks
        seq.grid_mut().toggle(0, 0);
        seq.grid_mut().toggle(0, 1);

        seq.step(0, &mut gen);
        assert_eq!(gen.active_count(), 2);

        let events = seq.step(1, &mut gen);
        assert_eq!(
            events,
            vec![
                StepEvent::NoteOff { track: 0, pitch: DEFAULT_PITCH, slot: 0 },
                StepEvent::NoteOff { track: 1, pitch: DEFAULT_PITCH, slot: 1 },
            ]
        );
        assert_eq!(gen.active_count(), 0);
        assert!(gen.generate_block(100).iter().all(|&s| s == 0));
    }

    #[test]
    fn test_shared_pitch_does_not_leak_over_laps() {
        let mut gen = WaveformGenerator::default();
        let mut seq = Sequencer::new(2, 2);
        seq.grid_mut().set_note(0, 0, 60, 0);
        seq.grid_mut().set_note(0, 1, 60, 0);

        for _ in 0..40 {
            let events = seq.tick(&mut gen);
            assert!(!events.iter().any(|e| matches!(e, StepEvent::Dropped { .. })));
            assert!(gen.active_count() <= 2);
            seq.tick(&mut gen);
            assert_eq!(gen.active_count(), 0);
        }
    }

    #[test]
    fn test_release_all_with_shared_pitch() {
        let mut gen = WaveformGenerator::default();
        let mut seq = Sequencer::new(2, 3);
        for track in 0..3 {
            seq.grid_mut().set_note(0, track, 64, 0);
        }
        seq.step(0, &mut gen);

        let events = seq.release_all(&mut gen);
        assert_eq!(events.len(), 3);
        assert_eq!(gen.active_count(), 0);
        assert_eq!(seq.sounding(2), None);
    }

    #[test]
    fn test_dropped_track_leaves_other_tracks_sounding() {
        let mut gen = WaveformGenerator::new(44_100, 1, Waveform::Sine);
        let mut seq = Sequencer::new(2, 2);
        seq.grid_mut().set_note(0, 0, 60, 0);
        seq.grid_mut().set_note(0, 1, 60, 0);
        seq.grid_mut().set_note(1, 0, 60, 0);

        let events = seq.step(0, &mut gen);
        assert_eq!(events[1], StepEvent::Dropped { track: 1, pitch: 60 });

        // Track 1 rests; the only voice belongs to track 0 and keeps playing
        assert!(seq.step(1, &mut gen).is_empty());
        assert!(gen.voice(0).unwrap().active);
    }

    #[test]
    fn test_bpm_and_step_duration() {
        let mut seq = Sequencer::new(16, 4);
        assert_eq!(seq.step_duration().as_millis(), 125);
        seq.set_bpm(500.0);
        assert_eq!(seq.bpm(), 240.0);
    }
}
