#[cfg(feature = "gui")]
use eframe::egui;

use stepsynth::{Grid, Sequencer};

#[cfg(feature = "gui")]
use stepsynth::{
    lock, note_name, AudioRenderer, CpalOutput, EngineConfig, PlaybackEngine, PlaybackEvent,
    SharedGenerator, SharedSequencer, WaveformGenerator,
};

#[cfg(feature = "gui")]
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 520.0])
            .with_title("stepsynth"),
        ..Default::default()
    };

    eframe::run_native(
        "stepsynth",
        options,
        Box::new(|_cc| Ok(Box::new(SequencerApp::new(EngineConfig::default())))),
    )
    .map_err(|e| anyhow::anyhow!("Application error: {}", e))
}

/// Without the editor, play the demo pattern for a few bars on the default device
#[cfg(not(feature = "gui"))]
fn main() -> anyhow::Result<()> {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use stepsynth::{AudioRenderer, CpalOutput, EngineConfig, PlaybackEngine, WaveformGenerator};

    const BARS: u32 = 4;

    env_logger::init();
    let config = EngineConfig::default();

    let (output, sink) = CpalOutput::open(config.sample_rate)?;
    let generator =
        WaveformGenerator::new(output.sample_rate(), config.polyphony, config.waveform).shared();

    let mut sequencer = Sequencer::from_config(&config);
    demo_pattern(sequencer.grid_mut());
    let length = sequencer.step_duration() * (sequencer.grid().steps() as u32 * BARS);
    let sequencer = sequencer.shared();

    let mut renderer = AudioRenderer::start(Arc::clone(&generator), sink, config.block_size);
    let mut engine = PlaybackEngine::new();
    engine.start(Arc::clone(&sequencer), Arc::clone(&generator));

    let deadline = Instant::now() + length;
    while Instant::now() < deadline && renderer.is_running() {
        thread::sleep(Duration::from_millis(10));
    }
    engine.stop();

    // Let the queued tail drain before closing the device
    thread::sleep(Duration::from_millis(150));
    renderer.stop()?;
    drop(output);
    Ok(())
}

/// Bass line, held chord tones and a short lead figure
fn demo_pattern(grid: &mut Grid) {
    let bass = [45, 45, 45, 45, 41, 41, 41, 41, 48, 48, 48, 48, 43, 43, 43, 43];
    let pad = [57, 57, 57, 57, 57, 57, 57, 57, 60, 60, 60, 60, 59, 59, 59, 59];
    let lead = [69, 72, 76, 72, 69, 72, 77, 72, 72, 76, 79, 76, 71, 74, 79, 74];

    for step in 0..grid.steps() {
        let i = step % bass.len();
        grid.set_note(step, 0, bass[i], 20);
        if grid.tracks() > 1 {
            grid.set_note(step, 1, pad[i], -60);
        }
        if grid.tracks() > 2 && step % 2 == 0 {
            grid.set_note(step, 2, lead[i], -40);
        }
    }
}

#[cfg(feature = "gui")]
struct SequencerApp {
    config: EngineConfig,
    sequencer: SharedSequencer,
    generator: SharedGenerator,
    playback_engine: PlaybackEngine,
    // The device stream must outlive the renderer feeding it
    renderer: Option<AudioRenderer>,
    _output: Option<CpalOutput>,

    // UI state
    selected_cell: Option<(usize, usize)>,
    current_visual_step: usize,
    status: Option<String>,
}

#[cfg(feature = "gui")]
impl SequencerApp {
    fn new(config: EngineConfig) -> Self {
        let mut sequencer = Sequencer::from_config(&config);
        demo_pattern(sequencer.grid_mut());

        let (output, generator, renderer, status) = match CpalOutput::open(config.sample_rate) {
            Ok((output, sink)) => {
                let generator = WaveformGenerator::new(
                    output.sample_rate(),
                    config.polyphony,
                    config.waveform,
                )
                .shared();
                let renderer = AudioRenderer::start(generator.clone(), sink, config.block_size);
                (Some(output), generator, Some(renderer), None)
            }
            Err(err) => {
                log::error!("audio output unavailable: {}", err);
                let generator = WaveformGenerator::from_config(&config).shared();
                (None, generator, None, Some(err.to_string()))
            }
        };

        Self {
            config,
            sequencer: sequencer.shared(),
            generator,
            playback_engine: PlaybackEngine::new(),
            renderer,
            _output: output,
            selected_cell: None,
            current_visual_step: 0,
            status,
        }
    }

    fn handle_playback_events(&mut self) {
        for event in self.playback_engine.poll_events() {
            if let PlaybackEvent::StepAdvanced(step) = event {
                self.current_visual_step = step;
            }
        }

        let failed = self.renderer.as_ref().is_some_and(|r| !r.is_running());
        if failed {
            if let Some(mut renderer) = self.renderer.take() {
                if let Err(err) = renderer.stop() {
                    self.status = Some(err.to_string());
                }
            }
            self.playback_engine.stop();
        }
    }

    fn start_playback(&mut self) {
        lock(&self.sequencer).cue(0);
        self.playback_engine
            .start(self.sequencer.clone(), self.generator.clone());
    }

    fn stop_playback(&mut self) {
        self.playback_engine.stop();
    }

    fn transport_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let is_playing = self.playback_engine.is_running();

            if is_playing {
                if ui.button("⏸ Stop").clicked() {
                    self.stop_playback();
                }
            } else if ui
                .add_enabled(self.renderer.is_some(), egui::Button::new("▶ Play"))
                .clicked()
            {
                self.start_playback();
            }

            ui.add_space(20.0);

            ui.label("BPM:");
            let mut bpm = lock(&self.sequencer).bpm();
            if ui
                .add(egui::Slider::new(&mut bpm, 40.0..=240.0).step_by(1.0))
                .changed()
            {
                lock(&self.sequencer).set_bpm(bpm);
            }

            ui.add_space(20.0);
            if ui.button("Clear").clicked() {
                lock(&self.sequencer).grid_mut().clear();
            }

            ui.add_space(20.0);
            let voices = lock(&self.generator).active_count();
            ui.label(format!(
                "{} | voices {}/{}",
                self.config.waveform.name(),
                voices,
                self.config.polyphony
            ));
        });
    }

    fn grid_ui(&mut self, ui: &mut egui::Ui) {
        let is_playing = self.playback_engine.is_running();
        let mut sequencer = lock(&self.sequencer);
        let (steps, tracks) = (sequencer.grid().steps(), sequencer.grid().tracks());

        egui::Grid::new("steps").spacing([4.0, 4.0]).show(ui, |ui| {
            for track in 0..tracks {
                ui.label(format!("Track {}", track + 1));
                for step in 0..steps {
                    let cell = sequencer.grid().get(step, track);
                    let is_current = is_playing && self.current_visual_step == step;
                    let is_selected = self.selected_cell == Some((step, track));

                    let text = if cell.active {
                        note_name(cell.pitch)
                    } else {
                        "·".to_string()
                    };
                    let button = egui::Button::new(text)
                        .min_size(egui::vec2(52.0, 40.0))
                        .selected(is_selected)
                        .fill(if is_current {
                            egui::Color32::from_rgb(100, 200, 100)
                        } else if cell.active {
                            egui::Color32::from_rgb(60, 60, 200)
                        } else {
                            egui::Color32::from_rgb(40, 40, 40)
                        });

                    let response = ui.add(button);
                    if response.clicked() {
                        sequencer.grid_mut().toggle(step, track);
                        self.selected_cell = Some((step, track));
                    }
                    if response.secondary_clicked() {
                        self.selected_cell = Some((step, track));
                    }
                }
                ui.end_row();
            }
        });

        if let Some((step, track)) = self.selected_cell {
            let cell = sequencer.grid().get(step, track);
            let (mut pitch, mut velocity) = (cell.pitch, cell.velocity);

            ui.add_space(10.0);
            ui.horizontal(|ui| {
                ui.label(format!("Step {} / Track {}", step + 1, track + 1));
                ui.add_space(10.0);
                ui.label("Pitch:");
                if ui
                    .add(egui::DragValue::new(&mut pitch).range(0..=127))
                    .changed()
                {
                    sequencer.grid_mut().set_pitch(step, track, pitch);
                }
                ui.label(format!("({})", note_name(pitch)));
                ui.add_space(10.0);
                ui.label("Velocity:");
                if ui
                    .add(egui::Slider::new(&mut velocity, i8::MIN..=i8::MAX))
                    .changed()
                {
                    sequencer.grid_mut().set_velocity(step, track, velocity);
                }
            });
        }
    }
}

#[cfg(feature = "gui")]
impl eframe::App for SequencerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_playback_events();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("stepsynth");
            ui.add_space(10.0);

            self.transport_ui(ui);
            ui.add_space(20.0);
            self.grid_ui(ui);

            ui.separator();
            ui.label("Click a step to toggle it, right-click to select it for editing");
            if let Some(status) = &self.status {
                ui.colored_label(egui::Color32::YELLOW, format!("⚠ {}", status));
            }
        });
    }
}
