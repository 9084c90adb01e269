//! streamtop_sim: a development stand-in for the platform's push metrics
//! channel. Speaks the same `{type, data}` protocol, verifies real signed
//! auth tokens, and pushes synthetic stream metrics plus host node
//! metrics. Used by `streamtop --demo` and by integration tests.

mod auth;
mod state;
mod synth;
mod ws;

use std::env;
use std::net::SocketAddr;

use axum::{routing::get, Router};
use tracing::info;
use tracing_subscriber::EnvFilter;

use state::AppState;

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<(u16, bool), String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "streamtop_sim".into());
    let mut port: u16 = 3230;
    let mut viewer_only = false;

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                return Err(format!("Usage: {prog} [--port PORT|-p PORT] [--viewer-only]"));
            }
            "--port" | "-p" => {
                port = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| format!("{prog}: --port needs a number"))?;
            }
            "--viewer-only" => {
                viewer_only = true;
            }
            other => {
                return Err(format!("{prog}: unexpected argument '{other}'"));
            }
        }
    }
    Ok((port, viewer_only))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (port, viewer_only) = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    let state = AppState::new(viewer_only);
    let app = Router::new()
        .route("/api/v1/ws", get(ws::ws_handler))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("streamtop_sim listening on {addr} (viewer_only: {viewer_only})");
    axum::serve(listener, app).await?;
    Ok(())
}
