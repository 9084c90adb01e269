//! Auth token acceptance: decode, shape, freshness, then the signature.

use anyhow::{bail, Context, Result};
use chrono::Utc;

use streamtop::endpoints::METRICS_PATH;
use streamtop::signer::{verify_assertion, SignedAssertion, AUTH_KIND};

/// Tolerated clock skew between operator and simulator.
pub const MAX_SKEW_SECS: i64 = 60;

/// Checks a token from an `Auth` message and returns the operator pubkey.
pub fn check_token(token: &str) -> Result<String> {
    let a = SignedAssertion::from_token(token).context("decode token")?;
    if a.kind != AUTH_KIND {
        bail!("wrong assertion kind {}", a.kind);
    }
    if a.tag("method") != Some("GET") {
        bail!("method tag is not GET");
    }
    let url = a.tag("u").context("missing u tag")?;
    if !url.ends_with(METRICS_PATH) {
        bail!("u tag does not name the metrics channel: {url}");
    }
    let age = (Utc::now().timestamp() - a.created_at).abs();
    if age > MAX_SKEW_SECS {
        bail!("assertion is {age}s old");
    }
    verify_assertion(&a).context("verify signature")?;
    Ok(a.pubkey)
}
