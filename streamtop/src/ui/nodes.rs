//! Per-node resource usage table.

use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Row, Table},
};

use crate::types::NodeMetrics;
use crate::ui::util::{fmt_uptime, human_bytes};

pub fn draw_nodes(f: &mut ratatui::Frame<'_>, area: Rect, nodes: &[NodeMetrics]) {
    let rows = nodes.iter().map(|n| {
        let mem_pct = if n.memory_total > 0 {
            (n.memory_used as f64 / n.memory_total as f64) * 100.0
        } else {
            0.0
        };
        let row = Row::new(vec![
            n.node_name.clone(),
            format!("{:.0}%", n.cpu * 100.0),
            format!(
                "{}/{} ({mem_pct:.0}%)",
                human_bytes(n.memory_used),
                human_bytes(n.memory_total)
            ),
            fmt_uptime(n.uptime),
        ]);
        if n.cpu >= 0.9 || mem_pct >= 90.0 {
            row.style(Style::default().fg(Color::Red))
        } else {
            row
        }
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(5),
            Constraint::Min(18),
            Constraint::Length(10),
        ],
    )
    .header(Row::new(vec!["NODE", "CPU", "MEM", "UPTIME"]).style(Style::default().fg(Color::Cyan)))
    .block(
        Block::default()
            .title(format!("Nodes ({})", nodes.len()))
            .borders(Borders::ALL),
    )
    .column_spacing(1);

    f.render_widget(table, area);
}
