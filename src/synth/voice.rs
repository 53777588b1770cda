//! A single sounding oscillator: parameters plus running phase

/// MIDI note 69 (A4) is tuned to 440 Hz
pub const A4_PITCH: i32 = 69;
pub const A4_FREQUENCY: f64 = 440.0;

/// 12-tone equal temperament frequency for a note number
pub fn frequency(pitch: i32) -> f64 {
    A4_FREQUENCY * 2.0_f64.powf((pitch - A4_PITCH) as f64 / 12.0)
}

/// Note name with octave, e.g. 60 -> "C4"
pub fn note_name(pitch: i32) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = pitch.div_euclid(12) - 1;
    let note_index = pitch.rem_euclid(12) as usize;
    format!("{}{}", note_names[note_index], octave)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub pitch: i32,
    /// Signed byte; the effective gain is `velocity + 127`
    pub velocity: i8,
    /// Reserved for stereo routing, not applied to output
    pub pan: i8,
    pub active: bool,
    /// Samples generated since the voice started
    pub phase: u64,
}

impl Voice {
    pub fn new(pitch: i32, velocity: i8) -> Self {
        Self {
            pitch,
            velocity,
            pan: 0,
            active: true,
            phase: 0,
        }
    }

    pub fn amplitude(&self) -> i32 {
        self.velocity as i32 + 127
    }

    pub fn frequency(&self) -> f64 {
        frequency(self.pitch)
    }

    /// Oscillator time argument in seconds
    pub fn time(&self, sample_rate: u32) -> f64 {
        self.phase as f64 / sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a4_is_440() {
        assert!((frequency(69) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_octaves_double() {
        assert!((frequency(81) - 880.0).abs() < 1e-9);
        assert!((frequency(57) - 220.0).abs() < 1e-9);
        // Middle C
        assert!((frequency(60) - 261.625_565).abs() < 1e-5);
    }

    #[test]
    fn test_semitone_ratio() {
        for pitch in [0, 21, 60, 100, 127] {
            let ratio = frequency(pitch + 1) / frequency(pitch);
            assert!((ratio - 2.0_f64.powf(1.0 / 12.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(-1), "B-2");
    }

    #[test]
    fn test_velocity_maps_to_gain() {
        assert_eq!(Voice::new(60, -128).amplitude(), -1);
        assert_eq!(Voice::new(60, 0).amplitude(), 127);
        assert_eq!(Voice::new(60, 127).amplitude(), 254);
    }

    #[test]
    fn test_new_voice_starts_at_phase_zero() {
        let voice = Voice::new(69, 0);
        assert!(voice.active);
        assert_eq!(voice.phase, 0);
        assert_eq!(voice.time(44_100), 0.0);
    }
}
