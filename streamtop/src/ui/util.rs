//! Small UI helpers: human-readable sizes, rates, uptimes, truncation.

pub fn human_bytes(b: u64) -> String {
    const K: f64 = 1024.0;
    let b = b as f64;
    if b < K {
        return format!("{b:.0}B");
    }
    let kb = b / K;
    if kb < K {
        return format!("{kb:.1}KB");
    }
    let mb = kb / K;
    if mb < K {
        return format!("{mb:.1}MB");
    }
    let gb = mb / K;
    if gb < K {
        return format!("{gb:.1}GB");
    }
    let tb = gb / K;
    format!("{tb:.2}TB")
}

// Decimal units: bandwidth is quoted in bits/s on the wire.
pub fn human_bitrate(bps: u64) -> String {
    const K: f64 = 1000.0;
    let b = bps as f64;
    if b < K {
        return format!("{b:.0}b/s");
    }
    let kb = b / K;
    if kb < K {
        return format!("{kb:.1}Kb/s");
    }
    let mb = kb / K;
    if mb < K {
        return format!("{mb:.1}Mb/s");
    }
    let gb = mb / K;
    format!("{gb:.2}Gb/s")
}

pub fn fmt_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

pub fn truncate_middle(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return "...".into();
    }
    let keep = max - 3;
    let left = keep / 2;
    let right = keep - left;
    format!("{}...{}", &s[..left], &s[s.len() - right..])
}

// Operator keys are 64 hex chars; show both ends so they stay tellable apart.
pub fn short_pubkey(pk: &str) -> String {
    truncate_middle(pk, 19)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_pick_sensible_units() {
        assert_eq!(human_bytes(512), "512B");
        assert_eq!(human_bytes(2048), "2.0KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.0MB");
    }

    #[test]
    fn bitrates_use_decimal_units() {
        assert_eq!(human_bitrate(900), "900b/s");
        assert_eq!(human_bitrate(4_500_000), "4.5Mb/s");
    }

    #[test]
    fn uptime_omits_leading_zero_fields() {
        assert_eq!(fmt_uptime(59), "0m");
        assert_eq!(fmt_uptime(3_661), "1h 1m");
        assert_eq!(fmt_uptime(90_061), "1d 1h 1m");
    }

    #[test]
    fn truncation_keeps_both_ends() {
        let pk = "a".repeat(30) + &"b".repeat(34);
        let short = short_pubkey(&pk);
        assert_eq!(short.len(), 19);
        assert!(short.starts_with("aaaa") && short.ends_with("bbbb"));
        assert_eq!(truncate_middle("short", 10), "short");
    }
}
