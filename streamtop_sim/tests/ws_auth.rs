//! Integration probes against a spawned simulator: auth acceptance and
//! rejection, push cadence, and the admin-only overall topic.

use std::process::{Child, Command};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use streamtop::signer::{AssertionRequest, KeySigner, Signer};
use streamtop::types::{ClientMessage, ServerMessage};

struct SimGuard(Child);
impl Drop for SimGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_sim(port: u16, viewer_only: bool) -> SimGuard {
    let exe = env!("CARGO_BIN_EXE_streamtop_sim");
    let mut cmd = Command::new(exe);
    cmd.args(["--port", &port.to_string()]);
    if viewer_only {
        cmd.arg("--viewer-only");
    }
    let child = cmd.spawn().expect("spawn streamtop_sim");
    // Give it a moment to bind
    std::thread::sleep(Duration::from_millis(400));
    SimGuard(child)
}

async fn recv_message(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> ServerMessage {
    loop {
        match tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("message within timeout")
        {
            Some(Ok(Message::Text(t))) => return ServerMessage::parse(&t).expect("parseable frame"),
            Some(Ok(_)) => continue,
            other => panic!("stream ended unexpectedly: {other:?}"),
        }
    }
}

async fn authenticate(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    url: &str,
) -> streamtop::types::AuthReply {
    let signer = KeySigner::generate();
    let assertion = signer.sign(AssertionRequest::get(url)).await.unwrap();
    let auth = ClientMessage::Auth {
        token: assertion.token(),
    };
    ws.send(Message::Text(auth.to_frame())).await.unwrap();
    match recv_message(ws).await {
        ServerMessage::AuthResponse(r) => r,
        other => panic!("expected AuthResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn admin_flow_pushes_all_three_kinds() {
    let port = 9743;
    let _sim = spawn_sim(port, false);
    let url = format!("ws://127.0.0.1:{port}/api/v1/ws");

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");
    let reply = authenticate(&mut ws, &url).await;
    assert!(reply.success && reply.is_admin);
    assert!(!reply.pubkey.is_empty());

    ws.send(Message::Text(ClientMessage::SubscribeOverall.to_frame()))
        .await
        .unwrap();

    // Within a few push rounds all three kinds must show up.
    let (mut saw_stream, mut saw_node, mut saw_overall) = (false, false, false);
    for _ in 0..24 {
        match recv_message(&mut ws).await {
            ServerMessage::Stream(m) => {
                assert!(!m.stream_id.is_empty());
                saw_stream = true;
            }
            ServerMessage::Node(n) => {
                assert!(!n.node_name.is_empty());
                assert!(n.memory_total > 0);
                saw_node = true;
            }
            ServerMessage::Overall(o) => {
                assert_eq!(o.total_streams, 3);
                saw_overall = true;
            }
            _ => {}
        }
        if saw_stream && saw_node && saw_overall {
            return;
        }
    }
    panic!("missing kinds: stream={saw_stream} node={saw_node} overall={saw_overall}");
}

#[tokio::test]
async fn viewer_only_sessions_are_not_admin() {
    let port = 9744;
    let _sim = spawn_sim(port, true);
    let url = format!("ws://127.0.0.1:{port}/api/v1/ws");

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");
    let reply = authenticate(&mut ws, &url).await;
    assert!(reply.success);
    assert!(!reply.is_admin);

    // Without a subscription no overall metrics may arrive, but stream
    // pushes still do.
    let mut rounds = 0;
    while rounds < 8 {
        match recv_message(&mut ws).await {
            ServerMessage::Overall(_) => panic!("overall metrics pushed to non-admin"),
            ServerMessage::Stream(_) => rounds += 1,
            _ => {}
        }
    }
}

#[tokio::test]
async fn garbage_tokens_are_rejected() {
    let port = 9745;
    let _sim = spawn_sim(port, false);
    let url = format!("ws://127.0.0.1:{port}/api/v1/ws");

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");
    let auth = ClientMessage::Auth {
        token: "bm90IGEgcmVhbCB0b2tlbg==".into(),
    };
    ws.send(Message::Text(auth.to_frame())).await.unwrap();
    match recv_message(&mut ws).await {
        ServerMessage::AuthResponse(r) => {
            assert!(!r.success);
            assert!(!r.is_admin);
        }
        other => panic!("expected AuthResponse, got {other:?}"),
    }
}
