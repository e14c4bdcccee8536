//! Transport bar: run state, render clock, decay and output level

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use saavy_patch::graph::EnvelopeState;

/// Peak and RMS of the scope buffer
pub struct AudioStats {
    pub peak: f32,
    pub rms: f32,
}

impl AudioStats {
    pub fn from_buffer(buffer: &[f32]) -> Self {
        if buffer.is_empty() {
            return Self { peak: 0.0, rms: 0.0 };
        }
        let peak = buffer.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
        let rms = (buffer.iter().map(|&x| x * x).sum::<f32>() / buffer.len() as f32).sqrt();
        Self { peak, rms }
    }
}

pub struct TransportView {
    pub suspended: bool,
    pub time: f64,
    pub sample_rate: f32,
    pub decay: f32,
    pub envelope: Option<EnvelopeState>,
}

pub fn render_transport(frame: &mut Frame, area: Rect, view: &TransportView, stats: &AudioStats) {
    let block = Block::default().title(" saavy-patch ").borders(Borders::ALL);

    let (symbol, state, color) = if view.suspended {
        ("⏸", "Suspended", Color::Yellow)
    } else {
        ("▶", "Running", Color::Green)
    };
    let amp = match view.envelope {
        Some(EnvelopeState::Decaying) => "decaying",
        _ => "idle",
    };

    let line = Line::from(vec![
        Span::styled(format!(" {symbol} {state}  "), Style::default().fg(color)),
        Span::styled(format!("t = {:.2}s  ", view.time), Style::default().fg(Color::White)),
        Span::styled(
            format!("decay {:.2}s ({amp})  ", view.decay),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(
            format!("{:.1}kHz  ", view.sample_rate / 1000.0),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("Peak: {:.2}  RMS: {:.2}", stats.peak, stats.rms),
            Style::default().fg(Color::Magenta),
        ),
    ]);

    frame.render_widget(Paragraph::new(line).block(block), area);
}
