//! Terminal control surface for the FM ring.
//!
//! Keys become [`ControlEvent`]s; the patch schedules them against the render
//! clock. The UI never waits on the audio thread: the oscilloscope reads
//! whatever samples the callback has pushed since the last frame.

mod operators;
mod transport;
mod waveform;

use color_eyre::eyre::Result as EyreResult;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::Paragraph,
    DefaultTerminal, Frame,
};
use rtrb::Consumer;
use std::time::Duration;
use tracing::warn;

use saavy_patch::{
    control::ControlEvent,
    patch::{FmPatch, PLAY},
    PatchError,
};

use operators::{render_operators, OperatorRow};
use transport::{render_transport, AudioStats, TransportView};
use waveform::render_waveform;

/// Samples shown by the oscilloscope
const VIS_BUFFER_SIZE: usize = 1024;

/// One semitone up
const SEMITONE: f32 = 1.059_463_1;
const GAIN_STEP: f32 = 0.05;
const DECAY_STEP: f32 = 0.1;

pub struct PatchUi {
    patch: FmPatch,
    scope_rx: Consumer<f32>,
    scope: Vec<f32>,
    selected: usize,
    status: String,
    should_quit: bool,
}

impl PatchUi {
    pub fn new(patch: FmPatch, scope_rx: Consumer<f32>) -> Self {
        Self {
            patch,
            scope_rx,
            scope: vec![0.0; VIS_BUFFER_SIZE],
            selected: 0,
            status: String::new(),
            should_quit: false,
        }
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> EyreResult<()> {
        while !self.should_quit {
            self.poll_scope();
            terminal.draw(|frame| self.render(frame))?;

            // ~60fps
            if event::poll(Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }
        }

        Ok(())
    }

    fn poll_scope(&mut self) {
        while let Ok(sample) = self.scope_rx.pop() {
            self.scope.push(sample);
        }
        if self.scope.len() > VIS_BUFFER_SIZE {
            let excess = self.scope.len() - VIS_BUFFER_SIZE;
            self.scope.drain(0..excess);
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        let result = match key {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.should_quit = true;
                Ok(())
            }
            KeyCode::Char(' ') => self.send(ControlEvent::trigger(PLAY)),
            KeyCode::Char('p') | KeyCode::Char('P') => self.send(ControlEvent::TransportToggled),
            KeyCode::Char(c @ '1'..='9') => {
                let index = c as usize - '1' as usize;
                if index < self.patch.operators().len() {
                    self.selected = index;
                }
                Ok(())
            }
            KeyCode::Up => self.nudge_frequency(SEMITONE),
            KeyCode::Down => self.nudge_frequency(1.0 / SEMITONE),
            KeyCode::Right => self.nudge_gain(GAIN_STEP),
            KeyCode::Left => self.nudge_gain(-GAIN_STEP),
            KeyCode::Char('w') | KeyCode::Char('W') => self.cycle_waveform(),
            KeyCode::Char('D') => self.nudge_decay(DECAY_STEP),
            KeyCode::Char('d') => self.nudge_decay(-DECAY_STEP),
            _ => Ok(()),
        };

        if let Err(err) = result {
            warn!(%err, "control event rejected");
            self.status = err.to_string();
        }
    }

    fn send(&mut self, event: ControlEvent) -> Result<(), PatchError> {
        self.patch.handle(&event)?;
        self.status.clear();
        Ok(())
    }

    fn nudge_frequency(&mut self, ratio: f32) -> Result<(), PatchError> {
        let Some(op) = self.patch.operator(self.selected) else {
            return Ok(());
        };
        let hz = op.frequency(self.patch.graph())? * ratio;
        let name = op.name().to_string();
        self.send(ControlEvent::parameter(name, "frequency", hz))
    }

    fn nudge_gain(&mut self, step: f32) -> Result<(), PatchError> {
        let Some(op) = self.patch.operator(self.selected) else {
            return Ok(());
        };
        let gain = op.gain(self.patch.graph())? + step;
        let name = op.name().to_string();
        self.send(ControlEvent::parameter(name, "gain", gain))
    }

    fn cycle_waveform(&mut self) -> Result<(), PatchError> {
        let Some(op) = self.patch.operator(self.selected) else {
            return Ok(());
        };
        let waveform = op.waveform(self.patch.graph())?.next();
        let name = op.name().to_string();
        self.send(ControlEvent::waveform(name, waveform))
    }

    fn nudge_decay(&mut self, step: f32) -> Result<(), PatchError> {
        let amp = self.patch.amplitude_envelope();
        let decay = self.patch.graph().decay_time(amp)? + step;
        self.send(ControlEvent::parameter("patch", "decay", decay))
    }

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        let rows = self.operator_rows();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),                     // Transport bar
                Constraint::Length(rows.len() as u16 + 2), // Operators
                Constraint::Min(8),                        // Oscilloscope
                Constraint::Length(1),                     // Status / help
            ])
            .split(area);

        let graph = self.patch.graph();
        let amp = self.patch.amplitude_envelope();
        let view = TransportView {
            suspended: graph.clock().is_suspended(),
            time: graph.clock().now(),
            sample_rate: graph.clock().sample_rate(),
            decay: graph.decay_time(amp).unwrap_or_default(),
            envelope: graph.envelope_state(amp).ok(),
        };
        render_transport(frame, chunks[0], &view, &AudioStats::from_buffer(&self.scope));
        render_operators(frame, chunks[1], &rows, self.selected);
        render_waveform(frame, chunks[2], &self.scope);

        let (text, color) = if self.status.is_empty() {
            (
                " [Space] Play  [P] Pause  [1-3] Operator  [↑↓] Pitch  [←→] Gain  [W] Wave  [d/D] Decay  [Q] Quit"
                    .to_string(),
                Color::DarkGray,
            )
        } else {
            (format!(" {}", self.status), Color::Red)
        };
        frame.render_widget(Paragraph::new(text).style(Style::default().fg(color)), chunks[3]);
    }

    fn operator_rows(&self) -> Vec<OperatorRow> {
        let graph = self.patch.graph();
        self.patch
            .operators()
            .iter()
            .map(|op| OperatorRow {
                name: op.name().to_string(),
                frequency: op.frequency(graph).unwrap_or_default(),
                gain: op.gain(graph).unwrap_or_default(),
                depth: op.gain(graph).unwrap_or_default() * op.modulation_scale(),
                waveform: op.waveform(graph).unwrap_or_default(),
                envelope: graph.envelope_state(op.envelope).ok(),
            })
            .collect()
    }
}
