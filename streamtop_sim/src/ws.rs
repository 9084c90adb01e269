//! WebSocket upgrade and per-connection handler: one auth round, then
//! periodic pushes. Overall metrics go only to subscribed admins.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::Utc;
use futures_util::stream::StreamExt;
use tracing::{debug, info, warn};

use streamtop::types::{AuthReply, ClientMessage, NodeMetrics, ServerError, ServerMessage};

use crate::auth::check_token;
use crate::state::AppState;
use crate::synth;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    // First round: a verifiable Auth token, or nothing else happens.
    let pubkey = loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => match ClientMessage::parse(&text) {
                Ok(ClientMessage::Auth { token }) => match check_token(&token) {
                    Ok(pk) => {
                        info!(pubkey = %pk, admin = !state.viewer_only, "operator authenticated");
                        let reply = ServerMessage::AuthResponse(AuthReply {
                            success: true,
                            is_admin: !state.viewer_only,
                            pubkey: pk.clone(),
                        });
                        if socket.send(Message::Text(reply.to_frame())).await.is_err() {
                            return;
                        }
                        break pk;
                    }
                    Err(err) => {
                        warn!(%err, "rejecting auth token");
                        let reply = ServerMessage::AuthResponse(AuthReply {
                            success: false,
                            is_admin: false,
                            pubkey: String::new(),
                        });
                        let _ = socket.send(Message::Text(reply.to_frame())).await;
                        return;
                    }
                },
                Ok(_) => {
                    let err = ServerMessage::Error(ServerError {
                        message: "authenticate first".into(),
                    });
                    if socket.send(Message::Text(err.to_frame())).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    debug!(%err, "ignoring unparseable frame before auth");
                }
            },
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => {}
            Some(Err(_)) => return,
        }
    };

    let started = Utc::now();
    let mut subscribed = false;
    let mut tick: u64 = 0;
    let mut push = tokio::time::interval(state.push_every);

    loop {
        tokio::select! {
            _ = push.tick() => {
                tick += 1;
                let mut samples = Vec::with_capacity(state.roster.len());
                for (i, s) in state.roster.iter().enumerate() {
                    let m = synth::sample(s, i, tick, started);
                    if socket
                        .send(Message::Text(ServerMessage::Stream(m.clone()).to_frame()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                    samples.push(m);
                }

                let node = node_metrics(&state).await;
                let cpu_load = node.cpu;
                let memory_load = if node.memory_total > 0 {
                    node.memory_used as f64 / node.memory_total as f64
                } else {
                    0.0
                };
                if socket
                    .send(Message::Text(ServerMessage::Node(node).to_frame()))
                    .await
                    .is_err()
                {
                    return;
                }

                if subscribed {
                    let o = synth::overall(
                        &samples,
                        cpu_load,
                        memory_load,
                        state.started.elapsed().as_secs(),
                    );
                    if socket
                        .send(Message::Text(ServerMessage::Overall(o).to_frame()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            msg = socket.next() => match msg {
                Some(Ok(Message::Text(text))) => match ClientMessage::parse(&text) {
                    Ok(ClientMessage::SubscribeOverall) => {
                        // The overall topic is admin-only; everyone else
                        // is ignored rather than errored.
                        if state.viewer_only {
                            debug!(pubkey = %pubkey, "ignoring overall subscription from non-admin");
                        } else {
                            debug!(pubkey = %pubkey, "subscribed to overall metrics");
                            subscribed = true;
                        }
                    }
                    Ok(ClientMessage::Auth { .. }) => {} // already authenticated
                    Ok(ClientMessage::Unknown(kind)) => {
                        debug!(%kind, "ignoring unknown control message");
                    }
                    Err(err) => {
                        debug!(%err, "ignoring unparseable frame");
                    }
                },
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(_)) => return,
            }
        }
    }
}

async fn node_metrics(state: &AppState) -> NodeMetrics {
    let mut sys = state.sys.lock().await;
    sys.refresh_cpu_usage();
    sys.refresh_memory();
    NodeMetrics {
        node_name: state.node_name.clone(),
        cpu: (sys.global_cpu_usage() as f64 / 100.0).clamp(0.0, 1.0),
        memory_used: sys.used_memory(),
        memory_total: sys.total_memory(),
        uptime: sysinfo::System::uptime(),
    }
}
