//! Top header: endpoint, operator identity, connection status and the
//! most recent error, if any.

use ratatui::{
    layout::Rect,
    widgets::{Block, Borders},
};

use crate::client::{LiveView, Phase};
use crate::ui::util::short_pubkey;

pub fn draw_header(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    view: &LiveView,
    endpoint: &str,
    pubkey: Option<&str>,
) {
    let status = match view.phase {
        Phase::Idle => "idle",
        Phase::Connecting => "connecting...",
        Phase::AuthPending => "authenticating...",
        Phase::Live if view.is_admin => "live (admin)",
        Phase::Live => "live",
        Phase::Closed => "disconnected",
        Phase::Errored => "error",
    };
    let who = pubkey.map(short_pubkey).unwrap_or_else(|| "-".into());
    let mut title = format!(
        "streamtop — {endpoint} | operator: {who} | {status}  (press 'q' to quit)"
    );
    if let Some(err) = &view.last_error {
        title.push_str(&format!("  !! {err}"));
    }
    f.render_widget(Block::default().title(title).borders(Borders::BOTTOM), area);
}
