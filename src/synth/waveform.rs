use std::f64::consts::PI;

/// Oscillator shape rendered by a generator. Naive (aliasing) shapes,
/// all returning values in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Saw,
    Triangle,
}

impl Waveform {
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Saw,
        Waveform::Triangle,
    ];

    /// Oscillator value at `t` seconds for a tone of `freq` Hz
    pub fn value(self, freq: f64, t: f64) -> f64 {
        match self {
            Waveform::Sine => (2.0 * PI * freq * t).sin(),
            Waveform::Square => {
                if cycle_position(freq, t) < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Saw => 2.0 * cycle_position(freq, t) - 1.0,
            Waveform::Triangle => {
                let pos = cycle_position(freq, t);
                if pos < 0.25 {
                    4.0 * pos
                } else if pos < 0.75 {
                    2.0 - 4.0 * pos
                } else {
                    4.0 * pos - 4.0
                }
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "Sine",
            Waveform::Square => "Square",
            Waveform::Saw => "Saw",
            Waveform::Triangle => "Triangle",
        }
    }
}

/// Fractional position within the current cycle, in `[0, 1)`
fn cycle_position(freq: f64, t: f64) -> f64 {
    (freq * t).rem_euclid(1.0)
}
