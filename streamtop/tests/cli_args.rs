//! CLI arg parsing tests for streamtop (client)
use std::process::Command;

// We test the parsing by invoking the binary with --help and ensuring the
// help mentions short and long flags.

#[test]
fn test_help_mentions_short_and_long_flags() {
    let output = Command::new(env!("CARGO_BIN_EXE_streamtop"))
        .arg("--help")
        .output()
        .expect("run streamtop --help");
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(
        text.contains("--tls-ca")
            && text.contains("-t")
            && text.contains("--endpoint")
            && text.contains("-e"),
        "help text missing expected flags (--tls-ca/-t, --endpoint/-e)\n{text}"
    );
    assert!(
        text.contains("--stale-after") && text.contains("--stale-by"),
        "help text missing sweep tuning flags\n{text}"
    );
}

#[test]
fn test_flags_accepted_alongside_help() {
    // Combine flags with --help to exercise arg acceptance without a
    // network attempt.
    let exe = env!("CARGO_BIN_EXE_streamtop");
    for args in [
        &["--tls-ca", "/tmp/cert.pem", "--help"][..],
        &["-t", "/tmp/cert.pem", "--help"][..],
        &["--endpoint", "prod", "--help"][..],
        &["--stale-by", "segment", "--stale-after", "120", "--help"][..],
    ] {
        let out = Command::new(exe).args(args).output().expect("run streamtop");
        assert!(out.status.success(), "streamtop {args:?} did not succeed");
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        );
        assert!(text.contains("Usage:"), "no usage for {args:?}:\n{text}");
    }
}

#[test]
fn test_bad_stale_by_is_rejected_with_usage() {
    let out = Command::new(env!("CARGO_BIN_EXE_streamtop"))
        .args(["--stale-by", "sometimes"])
        .output()
        .expect("run streamtop");
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(text.contains("Usage:"), "expected usage on bad --stale-by:\n{text}");
}
