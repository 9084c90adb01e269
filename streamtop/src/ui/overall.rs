//! Overall platform metrics: totals line plus CPU/memory gauges, and the
//! sparkline panes fed from bounded histories.

use std::collections::VecDeque;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Gauge, Paragraph, Sparkline},
};

use crate::types::OverallMetrics;
use crate::ui::util::{fmt_uptime, human_bitrate};

pub fn draw_overall(f: &mut ratatui::Frame<'_>, area: Rect, overall: Option<&OverallMetrics>) {
    let block = Block::default().title("Overall").borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(m) = overall else {
        f.render_widget(
            Paragraph::new("no overall metrics (admin sessions only)")
                .style(Style::default().fg(Color::DarkGray)),
            inner,
        );
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner);

    let totals = format!(
        "streams: {} | viewers: {} | bandwidth: {} | up: {}",
        m.total_streams,
        m.total_viewers,
        human_bitrate(m.total_bandwidth),
        fmt_uptime(m.uptime_seconds),
    );
    f.render_widget(Paragraph::new(totals), rows[0]);

    f.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Green))
            .label(format!("CPU {:.0}%", m.cpu_load * 100.0))
            .ratio(m.cpu_load.clamp(0.0, 1.0)),
        rows[1],
    );
    f.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Blue))
            .label(format!("MEM {:.0}%", m.memory_load * 100.0))
            .ratio(m.memory_load.clamp(0.0, 1.0)),
        rows[2],
    );
}

pub fn draw_trend_spark(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    title: &str,
    hist: &VecDeque<u64>,
    color: Color,
) {
    let data: Vec<u64> = hist.iter().copied().collect();
    let spark = Sparkline::default()
        .block(Block::default().title(title.to_string()).borders(Borders::ALL))
        .style(Style::default().fg(color))
        .data(&data);
    f.render_widget(spark, area);
}
