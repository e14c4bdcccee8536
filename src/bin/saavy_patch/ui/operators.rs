//! One line per operator; the selected one is highlighted

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use saavy_patch::{dsp::oscillator::Waveform, graph::EnvelopeState};

pub struct OperatorRow {
    pub name: String,
    pub frequency: f32,
    pub gain: f32,
    pub depth: f32,
    pub waveform: Waveform,
    pub envelope: Option<EnvelopeState>,
}

pub fn render_operators(frame: &mut Frame, area: Rect, rows: &[OperatorRow], selected: usize) {
    let block = Block::default().title(" Operators ").borders(Borders::ALL);

    let lines: Vec<Line> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let style = if i == selected {
                Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            let env = match row.envelope {
                Some(EnvelopeState::Decaying) => "●",
                _ => "○",
            };

            Line::from(vec![
                Span::styled(format!(" {} {:<4}", i + 1, row.name), style),
                Span::raw(format!(
                    "  {:>7.1} Hz  {:<8}  gain {:.2}  depth {:>6.1} Hz  {env}",
                    row.frequency,
                    row.waveform.name(),
                    row.gain,
                    row.depth
                )),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
