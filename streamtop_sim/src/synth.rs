//! Synthetic per-stream metrics. Deterministic wobble, no RNG, so runs
//! are reproducible and tests can assert on shape.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use streamtop::types::{EndpointStats, OverallMetrics, StreamMetrics};

pub struct SynthStream {
    pub id: &'static str,
    pub ingress_name: &'static str,
    pub input_resolution: &'static str,
    pub target_fps: f32,
    pub base_bps: u64,
    pub base_viewers: u64,
    pub ip: &'static str,
}

pub fn roster() -> Vec<SynthStream> {
    vec![
        SynthStream {
            id: "9d3fec02-7788-4a4f-b7f1-00f4cf1d2d71",
            ingress_name: "rtmp-ingest-1",
            input_resolution: "1920x1080",
            target_fps: 60.0,
            base_bps: 6_000_000,
            base_viewers: 240,
            ip: "203.0.113.10",
        },
        SynthStream {
            id: "2b1a7c55-09cd-4e39-9147-1f7ea1c0a5c3",
            ingress_name: "rtmp-ingest-2",
            input_resolution: "1280x720",
            target_fps: 30.0,
            base_bps: 3_000_000,
            base_viewers: 55,
            ip: "203.0.113.27",
        },
        SynthStream {
            id: "f4d0a1be-6f5f-4d2a-b3fe-8a1fc9a54d10",
            ingress_name: "srt-ingest-1",
            input_resolution: "854x480",
            target_fps: 30.0,
            base_bps: 1_200_000,
            base_viewers: 9,
            ip: "198.51.100.4",
        },
    ]
}

// Triangle wave in -1..=1, phase-shifted per stream.
fn wobble(idx: usize, tick: u64) -> f64 {
    let step = (tick + idx as u64 * 7) % 20;
    let up = step.min(20 - step) as f64; // 0..=10
    up / 5.0 - 1.0
}

pub fn sample(s: &SynthStream, idx: usize, tick: u64, started: DateTime<Utc>) -> StreamMetrics {
    let w = wobble(idx, tick);
    // The last roster entry periodically drops frames so clients have a
    // degraded row to render.
    let fps_factor = if idx == 2 && (tick / 15) % 2 == 1 {
        0.6
    } else {
        0.97 + 0.03 * w
    };
    let bps = (s.base_bps as f64 * (1.0 + 0.1 * w)) as u64;
    let viewers = (s.base_viewers as f64 * (1.0 + 0.2 * w)).max(0.0) as u64;
    let endpoint_stats: HashMap<String, EndpointStats> = [
        (
            "hls".to_string(),
            EndpointStats {
                name: "hls".into(),
                bitrate: bps * 7 / 10,
            },
        ),
        (
            "webrtc".to_string(),
            EndpointStats {
                name: "webrtc".into(),
                bitrate: bps * 3 / 10,
            },
        ),
    ]
    .into_iter()
    .collect();

    StreamMetrics {
        stream_id: s.id.to_string(),
        started_at: started.to_rfc3339(),
        last_segment_time: Utc::now().to_rfc3339(),
        average_fps: (s.target_fps as f64 * fps_factor) as f32,
        target_fps: s.target_fps,
        frame_count: tick * s.target_fps as u64 * 2,
        ingress_throughput_bps: bps,
        ingress_name: s.ingress_name.to_string(),
        input_resolution: s.input_resolution.to_string(),
        ip_address: s.ip.to_string(),
        viewers: Some(viewers),
        endpoint_name: None,
        endpoint_stats: Some(endpoint_stats),
    }
}

pub fn overall(
    samples: &[StreamMetrics],
    cpu_load: f64,
    memory_load: f64,
    uptime_seconds: u64,
) -> OverallMetrics {
    OverallMetrics {
        total_streams: samples.len() as u64,
        total_viewers: samples.iter().filter_map(|s| s.viewers).sum(),
        total_bandwidth: samples.iter().map(|s| s.ingress_throughput_bps).sum(),
        cpu_load,
        memory_load,
        uptime_seconds,
        timestamp: Utc::now().timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wobble_stays_in_range() {
        for idx in 0..3 {
            for tick in 0..100 {
                let w = wobble(idx, tick);
                assert!((-1.0..=1.0).contains(&w), "wobble {w} out of range");
            }
        }
    }

    #[test]
    fn samples_keep_stable_identity() {
        let r = roster();
        let started = Utc::now();
        let a = sample(&r[0], 0, 1, started);
        let b = sample(&r[0], 0, 50, started);
        assert_eq!(a.stream_id, b.stream_id);
        assert_eq!(a.ingress_name, b.ingress_name);
        assert!(a.average_fps > 0.0 && a.average_fps <= a.target_fps);
    }

    #[test]
    fn overall_sums_the_samples() {
        let r = roster();
        let started = Utc::now();
        let samples: Vec<_> = r
            .iter()
            .enumerate()
            .map(|(i, s)| sample(s, i, 3, started))
            .collect();
        let o = overall(&samples, 0.5, 0.5, 100);
        assert_eq!(o.total_streams, 3);
        assert_eq!(
            o.total_bandwidth,
            samples.iter().map(|s| s.ingress_throughput_bps).sum::<u64>()
        );
    }
}
