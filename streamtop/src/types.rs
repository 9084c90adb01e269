//! Types that mirror the metrics channel's JSON schema.
//! Keep this module minimal and stable — it defines the wire format.
//!
//! Every frame is a `{type, data}` envelope. Inbound frames decode into
//! [`ServerMessage`], outbound control frames are built from
//! [`ClientMessage`]; both keep an explicit arm for unknown tags so a newer
//! server never breaks an older client.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthReply {
    pub success: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub pubkey: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EndpointStats {
    pub name: String,
    pub bitrate: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OverallMetrics {
    pub total_streams: u64,
    pub total_viewers: u64,
    // bits per second across all delivery endpoints
    pub total_bandwidth: u64,
    // load fractions in 0..=1
    pub cpu_load: f64,
    pub memory_load: f64,
    pub uptime_seconds: u64,
    pub timestamp: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamMetrics {
    pub stream_id: String,
    #[serde(default)]
    pub started_at: String,
    // RFC 3339; the ingest writes it on every segment
    #[serde(default)]
    pub last_segment_time: String,
    #[serde(default)]
    pub average_fps: f32,
    #[serde(default)]
    pub target_fps: f32,
    #[serde(default)]
    pub frame_count: u64,
    #[serde(default)]
    pub ingress_throughput_bps: u64,
    #[serde(default)]
    pub ingress_name: String,
    #[serde(default)]
    pub input_resolution: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewers: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_name: Option<String>,
    // per-delivery-endpoint bandwidth breakdown, keyed by endpoint name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_stats: Option<HashMap<String, EndpointStats>>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeMetrics {
    pub node_name: String,
    // load fraction in 0..=1
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory_used: u64,
    #[serde(default)]
    pub memory_total: u64,
    #[serde(default)]
    pub uptime: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Messages pushed by the server.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    AuthResponse(AuthReply),
    Overall(OverallMetrics),
    Stream(StreamMetrics),
    Node(NodeMetrics),
    Error(ServerError),
    /// Tag we do not recognize; callers log and drop it.
    Unknown(String),
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let env: Envelope = serde_json::from_str(text)?;
        Ok(match env.kind.as_str() {
            "AuthResponse" => Self::AuthResponse(serde_json::from_value(env.data)?),
            "OverallMetrics" => Self::Overall(serde_json::from_value(env.data)?),
            "StreamMetrics" => Self::Stream(serde_json::from_value(env.data)?),
            "NodeMetrics" => Self::Node(serde_json::from_value(env.data)?),
            "Error" => Self::Error(serde_json::from_value(env.data)?),
            _ => Self::Unknown(env.kind),
        })
    }

    pub fn to_frame(&self) -> String {
        let v = match self {
            Self::AuthResponse(d) => json!({"type": "AuthResponse", "data": d}),
            Self::Overall(d) => json!({"type": "OverallMetrics", "data": d}),
            Self::Stream(d) => json!({"type": "StreamMetrics", "data": d}),
            Self::Node(d) => json!({"type": "NodeMetrics", "data": d}),
            Self::Error(d) => json!({"type": "Error", "data": d}),
            Self::Unknown(kind) => json!({"type": kind, "data": null}),
        };
        v.to_string()
    }
}

/// Control messages sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Auth { token: String },
    SubscribeOverall,
    /// Tag we do not recognize (seen only server-side).
    Unknown(String),
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct AuthData {
            token: String,
        }
        let env: Envelope = serde_json::from_str(text)?;
        Ok(match env.kind.as_str() {
            "Auth" => {
                let d: AuthData = serde_json::from_value(env.data)?;
                Self::Auth { token: d.token }
            }
            "SubscribeOverall" => Self::SubscribeOverall,
            _ => Self::Unknown(env.kind),
        })
    }

    pub fn to_frame(&self) -> String {
        let v = match self {
            Self::Auth { token } => json!({"type": "Auth", "data": {"token": token}}),
            Self::SubscribeOverall => json!({"type": "SubscribeOverall", "data": null}),
            Self::Unknown(kind) => json!({"type": kind, "data": null}),
        };
        v.to_string()
    }
}
