//! App state and main loop: input handling, reading live-view snapshots,
//! updating histories, and drawing.

use std::{
    collections::VecDeque,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::Color,
    Terminal,
};
use tokio::time::sleep;

use crate::client::{ClientConfig, LiveView, MetricsClient};
use crate::history::push_capped;
use crate::session::SESSION;
use crate::signer::Signer;
use crate::ui::{
    header::draw_header,
    nodes::draw_nodes,
    overall::{draw_overall, draw_trend_spark},
    streams::{draw_streams, streams_clamp, streams_handle_key},
};

pub struct App {
    client: MetricsClient,
    cfg: ClientConfig,
    signer: Arc<dyn Signer>,
    endpoint_label: String,

    // Trend histories fed from snapshots
    viewers_hist: VecDeque<u64>,
    bw_hist: VecDeque<u64>,

    stream_scroll: usize,
    should_quit: bool,

    // Set by the session-store listener; checked once per tick
    session_changed: Arc<AtomicBool>,
}

impl App {
    pub fn new(cfg: ClientConfig, signer: Arc<dyn Signer>, endpoint_label: String) -> Self {
        Self {
            client: MetricsClient::new(),
            cfg,
            signer,
            endpoint_label,
            viewers_hist: VecDeque::with_capacity(600),
            bw_hist: VecDeque::with_capacity(600),
            stream_scroll: 0,
            should_quit: false,
            session_changed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        // Logging out elsewhere (or via the 'o' key) must drop the
        // connection; the store pokes the flag, the tick acts on it.
        let changed = self.session_changed.clone();
        let sub = SESSION.subscribe(move || {
            changed.store(true, Ordering::SeqCst);
        });

        self.client.connect(self.cfg.clone(), self.signer.clone());

        // Terminal setup
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let res = self.event_loop(&mut terminal).await;

        // Teardown
        disable_raw_mode()?;
        let backend = terminal.backend_mut();
        execute!(backend, DisableMouseCapture, LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        SESSION.unsubscribe(sub);
        self.client.disconnect();

        res
    }

    async fn event_loop<B: ratatui::backend::Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
    ) -> anyhow::Result<()> {
        loop {
            // Input (non-blocking)
            while event::poll(Duration::from_millis(10))? {
                match event::read()? {
                    Event::Key(k) => match k.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                            self.should_quit = true;
                        }
                        KeyCode::Char('r') => {
                            self.client.connect(self.cfg.clone(), self.signer.clone());
                        }
                        KeyCode::Char('o') => {
                            SESSION.logout();
                        }
                        _ => {
                            let page = terminal.size()?.height.saturating_sub(12) as usize;
                            streams_handle_key(&mut self.stream_scroll, k, page);
                        }
                    },
                    Event::Resize(_, _) => {}
                    _ => {}
                }
            }
            if self.should_quit {
                break;
            }

            if self.session_changed.swap(false, Ordering::SeqCst) && !SESSION.is_logged_in() {
                self.client.disconnect();
            }

            let view = self.client.snapshot();
            self.update_histories(&view);

            terminal.draw(|f| self.draw(f, &view))?;

            // Tick rate
            sleep(Duration::from_millis(500)).await;
        }

        Ok(())
    }

    fn update_histories(&mut self, view: &LiveView) {
        if !view.connected {
            return;
        }
        // Admins get server totals; everyone else sees sums over the
        // streams they were pushed.
        let (viewers, bw) = match &view.overall {
            Some(m) => (m.total_viewers, m.total_bandwidth),
            None => (
                view.streams.iter().filter_map(|s| s.viewers).sum(),
                view.streams.iter().map(|s| s.ingress_throughput_bps).sum(),
            ),
        };
        push_capped(&mut self.viewers_hist, viewers, 600);
        push_capped(&mut self.bw_hist, bw / 1000, 600); // Kb/s keeps bars visible
    }

    fn draw(&mut self, f: &mut ratatui::Frame<'_>, view: &LiveView) {
        let area = f.area();

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // header
                Constraint::Length(5), // overall + viewers trend
                Constraint::Min(8),    // streams + nodes
                Constraint::Length(5), // bandwidth trend
            ])
            .split(area);

        let pubkey = SESSION
            .pubkey()
            .unwrap_or_else(|| self.signer.public_key());
        draw_header(f, rows[0], view, &self.endpoint_label, Some(pubkey.as_str()));

        let top = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
            .split(rows[1]);
        draw_overall(f, top[0], view.overall.as_ref());
        draw_trend_spark(
            f,
            top[1],
            &format!(
                "Viewers — now: {}",
                self.viewers_hist.back().copied().unwrap_or(0)
            ),
            &self.viewers_hist,
            Color::Magenta,
        );

        let mid = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
            .split(rows[2]);
        let visible = mid[0].height.saturating_sub(3) as usize;
        streams_clamp(&mut self.stream_scroll, view.streams.len(), visible);
        draw_streams(f, mid[0], &view.streams, self.stream_scroll);
        draw_nodes(f, mid[1], &view.nodes);

        draw_trend_spark(
            f,
            rows[3],
            &format!(
                "Ingress (Kb/s) — now: {}",
                self.bw_hist.back().copied().unwrap_or(0)
            ),
            &self.bw_hist,
            Color::Green,
        );
    }
}
