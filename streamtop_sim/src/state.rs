//! Shared simulator state: host sysinfo handle and the synthetic roster.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sysinfo::System;
use tokio::sync::Mutex;

use crate::synth::{roster, SynthStream};

pub type SharedSystem = Arc<Mutex<System>>;

#[derive(Clone)]
pub struct AppState {
    /// Reply `is_admin: false` to every operator; exercises the
    /// no-subscription path in clients.
    pub viewer_only: bool,
    pub push_every: Duration,
    pub started: Instant,
    pub node_name: String,

    // Persistent sysinfo handle for node metrics
    pub sys: SharedSystem,
    pub roster: Arc<Vec<SynthStream>>,
}

impl AppState {
    pub fn new(viewer_only: bool) -> Self {
        Self {
            viewer_only,
            push_every: Duration::from_secs(2),
            started: Instant::now(),
            node_name: System::host_name().unwrap_or_else(|| "sim-node".into()),
            sys: Arc::new(Mutex::new(System::new())),
            roster: Arc::new(roster()),
        }
    }
}
