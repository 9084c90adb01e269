//! Signed auth assertions for the metrics channel.
//!
//! The server authenticates operators with a one-shot signed event scoped
//! to a target URL and HTTP method, carried inside the `Auth` control
//! message as base64 of the JSON-encoded event. The base64 wrapping is a
//! transport convention only; the security boundary is the schnorr
//! signature, which the server verifies.

use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use futures::future::BoxFuture;
use secp256k1::hashes::{sha256, Hash};
use secp256k1::{Keypair, Message, Secp256k1, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event kind tag for URL/method-scoped auth assertions.
pub const AUTH_KIND: u32 = 27235;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("no signer available; log in first")]
    Unavailable,
    #[error("auth token is not base64(JSON) of a signed assertion")]
    BadToken,
    #[error("assertion id or signature does not verify")]
    BadSignature,
    #[error("key file is not a 64-char hex secret key")]
    BadKey,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What an assertion must attest to: one URL, one method.
#[derive(Debug, Clone)]
pub struct AssertionRequest {
    pub url: String,
    pub method: String,
}

impl AssertionRequest {
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            method: "GET".into(),
        }
    }
}

/// A timestamped, tagged, signed event proving the operator's identity
/// for one specific request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignedAssertion {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl SignedAssertion {
    /// The base64(JSON) form carried in the `Auth` message.
    pub fn token(&self) -> String {
        BASE64.encode(serde_json::to_vec(self).expect("assertion serializes"))
    }

    pub fn from_token(token: &str) -> Result<Self, SignerError> {
        let raw = BASE64.decode(token).map_err(|_| SignerError::BadToken)?;
        serde_json::from_slice(&raw).map_err(|_| SignerError::BadToken)
    }

    /// First value of the named tag pair, if present.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }
}

fn assertion_digest(
    pubkey: &str,
    created_at: i64,
    kind: u32,
    tags: &[Vec<String>],
    content: &str,
) -> sha256::Hash {
    // Canonical form: [0, pubkey, created_at, kind, tags, content]
    let canonical = serde_json::json!([0, pubkey, created_at, kind, tags, content]);
    sha256::Hash::hash(canonical.to_string().as_bytes())
}

/// Recomputes the id and checks the schnorr signature against the
/// embedded pubkey. This is the server-side acceptance test; the client
/// crate carries it so the simulator and tests share one definition.
pub fn verify_assertion(a: &SignedAssertion) -> Result<(), SignerError> {
    let digest = assertion_digest(&a.pubkey, a.created_at, a.kind, &a.tags, &a.content);
    if digest.to_string() != a.id {
        return Err(SignerError::BadSignature);
    }
    let secp = Secp256k1::verification_only();
    let pubkey = XOnlyPublicKey::from_str(&a.pubkey).map_err(|_| SignerError::BadSignature)?;
    let sig =
        secp256k1::schnorr::Signature::from_str(&a.sig).map_err(|_| SignerError::BadSignature)?;
    let msg = Message::from_digest(digest.to_byte_array());
    secp.verify_schnorr(&sig, &msg, &pubkey)
        .map_err(|_| SignerError::BadSignature)
}

/// A capability able to produce signed assertions on the operator's
/// behalf. The metrics client calls it once per connection attempt and
/// never retries on its own.
pub trait Signer: Send + Sync {
    fn public_key(&self) -> String;
    fn sign(&self, req: AssertionRequest) -> BoxFuture<'static, Result<SignedAssertion, SignerError>>;
}

/// Local schnorr signer over a secp256k1 keypair, the terminal's
/// stand-in for a browser-extension signer.
pub struct KeySigner {
    keypair: Keypair,
}

impl KeySigner {
    pub fn from_hex(hex: &str) -> Result<Self, SignerError> {
        let secp = Secp256k1::new();
        let keypair =
            Keypair::from_seckey_str(&secp, hex.trim()).map_err(|_| SignerError::BadKey)?;
        Ok(Self { keypair })
    }

    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        Self {
            keypair: Keypair::new(&secp, &mut rand::thread_rng()),
        }
    }

    /// Loads the key file, creating a fresh key on first use.
    pub fn load_or_generate(path: &Path) -> Result<Self, SignerError> {
        match fs::read_to_string(path) {
            Ok(hex) => Self::from_hex(&hex),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let signer = Self::generate();
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, signer.secret_hex())?;
                Ok(signer)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn secret_hex(&self) -> String {
        self.keypair.display_secret().to_string()
    }

    fn sign_now(&self, req: &AssertionRequest) -> SignedAssertion {
        let secp = Secp256k1::new();
        let pubkey = self.public_key();
        let created_at = Utc::now().timestamp();
        let tags = vec![
            vec!["u".to_string(), req.url.clone()],
            vec!["method".to_string(), req.method.clone()],
        ];
        let content = String::new();
        let digest = assertion_digest(&pubkey, created_at, AUTH_KIND, &tags, &content);
        let msg = Message::from_digest(digest.to_byte_array());
        let sig = secp.sign_schnorr(&msg, &self.keypair);
        SignedAssertion {
            id: digest.to_string(),
            pubkey,
            created_at,
            kind: AUTH_KIND,
            tags,
            content,
            sig: sig.to_string(),
        }
    }
}

impl Signer for KeySigner {
    fn public_key(&self) -> String {
        self.keypair.x_only_public_key().0.to_string()
    }

    fn sign(&self, req: AssertionRequest) -> BoxFuture<'static, Result<SignedAssertion, SignerError>> {
        // Local signing is synchronous; the future is for parity with
        // remote signers that round-trip to another process.
        let signed = self.sign_now(&req);
        Box::pin(async move { Ok(signed) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_then_verify() {
        let signer = KeySigner::generate();
        let a = signer
            .sign(AssertionRequest::get("wss://api.example.com/api/v1/ws"))
            .await
            .unwrap();
        assert_eq!(a.kind, AUTH_KIND);
        assert_eq!(a.tag("u"), Some("wss://api.example.com/api/v1/ws"));
        assert_eq!(a.tag("method"), Some("GET"));
        assert!(a.content.is_empty());
        verify_assertion(&a).expect("assertion verifies");
    }

    #[tokio::test]
    async fn tampering_breaks_verification() {
        let signer = KeySigner::generate();
        let mut a = signer
            .sign(AssertionRequest::get("wss://api.example.com/api/v1/ws"))
            .await
            .unwrap();
        a.tags[1][1] = "POST".into();
        assert!(verify_assertion(&a).is_err());
    }

    #[tokio::test]
    async fn token_round_trips() {
        let signer = KeySigner::generate();
        let a = signer
            .sign(AssertionRequest::get("wss://api.example.com/api/v1/ws"))
            .await
            .unwrap();
        let back = SignedAssertion::from_token(&a.token()).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn bad_tokens_are_rejected() {
        assert!(SignedAssertion::from_token("!!!not-base64!!!").is_err());
        let not_an_assertion = BASE64.encode(b"{\"hello\":1}");
        assert!(SignedAssertion::from_token(&not_an_assertion).is_err());
    }

    #[test]
    fn key_round_trips_through_hex() {
        let a = KeySigner::generate();
        let b = KeySigner::from_hex(&a.secret_hex()).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert!(KeySigner::from_hex("zz").is_err());
    }

    #[test]
    fn load_or_generate_creates_then_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.key");
        let first = KeySigner::load_or_generate(&path).unwrap();
        let second = KeySigner::load_or_generate(&path).unwrap();
        assert_eq!(first.public_key(), second.public_key());
    }
}
