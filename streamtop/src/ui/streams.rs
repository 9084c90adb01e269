//! Live streams table: one row per stream, degraded streams highlighted.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Row, Table},
};

use crate::types::StreamMetrics;
use crate::ui::util::{human_bitrate, truncate_middle};

pub fn draw_streams(f: &mut ratatui::Frame<'_>, area: Rect, streams: &[StreamMetrics], scroll: usize) {
    let visible = area.height.saturating_sub(3) as usize; // borders + header
    let rows = streams.iter().skip(scroll).take(visible.max(1)).map(|s| {
        let viewers = s
            .viewers
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".into());
        let endpoints = s
            .endpoint_stats
            .as_ref()
            .map(|e| e.len().to_string())
            .unwrap_or_else(|| "0".into());
        let row = Row::new(vec![
            truncate_middle(&s.stream_id, 14),
            s.ingress_name.clone(),
            s.input_resolution.clone(),
            format!("{:.1}/{:.0}", s.average_fps, s.target_fps),
            human_bitrate(s.ingress_throughput_bps),
            viewers,
            endpoints,
        ]);
        // Falling well under the target frame rate is the thing operators
        // scan this table for.
        if s.target_fps > 0.0 && s.average_fps < s.target_fps * 0.9 {
            row.style(Style::default().fg(Color::Red))
        } else {
            row
        }
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Length(5),
        ],
    )
    .header(Row::new(vec!["ID", "INGRESS", "RES", "FPS", "RATE", "VIEWERS", "EPS"]).style(Style::default().fg(Color::Cyan)))
    .block(
        Block::default()
            .title(format!("Streams ({})", streams.len()))
            .borders(Borders::ALL),
    )
    .column_spacing(1);

    f.render_widget(table, area);
}

pub fn streams_handle_key(scroll: &mut usize, k: KeyEvent, page: usize) {
    match k.code {
        KeyCode::Up => *scroll = scroll.saturating_sub(1),
        KeyCode::Down => *scroll += 1,
        KeyCode::PageUp => *scroll = scroll.saturating_sub(page.max(1)),
        KeyCode::PageDown => *scroll += page.max(1),
        KeyCode::Home => *scroll = 0,
        _ => {}
    }
}

pub fn streams_clamp(scroll: &mut usize, total: usize, visible: usize) {
    let max = total.saturating_sub(visible.max(1));
    if *scroll > max {
        *scroll = max;
    }
}
