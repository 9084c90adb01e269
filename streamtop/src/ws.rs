//! WebSocket transport for the metrics channel: plain or TLS connects,
//! with an optional private CA for self-hosted deployments.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect to the metrics channel and return the WS stream.
pub async fn connect(url: &str, tls_ca: Option<&str>) -> anyhow::Result<WsStream> {
    let ws = match tls_ca {
        Some(ca) => {
            let connector = rustls_connector(ca)?;
            let (ws, _) = connect_async_tls_with_config(url, None, false, Some(connector))
                .await
                .with_context(|| format!("connect {url}"))?;
            ws
        }
        None => {
            let (ws, _) = connect_async(url)
                .await
                .with_context(|| format!("connect {url}"))?;
            ws
        }
    };
    Ok(ws)
}

// Trust only the given CA; used against deployments with private PKI.
fn rustls_connector(ca_path: &str) -> anyhow::Result<Connector> {
    let pem = std::fs::read(ca_path).with_context(|| format!("read TLS CA {ca_path}"))?;
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        roots
            .add(cert.context("parse TLS CA certificate")?)
            .context("add TLS CA certificate")?;
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Connector::Rustls(Arc::new(config)))
}
