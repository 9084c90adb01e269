//! Endpoint registry: load/save a simple JSON mapping of endpoint name -> { url, tls_ca }
//! Stored under XDG config dir: $XDG_CONFIG_HOME/streamtop/endpoints.json (fallback ~/.config/streamtop/endpoints.json)
//!
//! An entry's `url` is the platform API base address; the metrics channel
//! URL is derived from it with [`metrics_url`].

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::PathBuf};

/// Fixed path segment of the push metrics channel.
pub const METRICS_PATH: &str = "/api/v1/ws";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EndpointEntry {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_ca: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EndpointsFile {
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointEntry>,
    #[serde(default)]
    pub version: u32,
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("streamtop")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("streamtop")
    }
}

pub fn endpoints_path() -> PathBuf {
    config_dir().join("endpoints.json")
}

pub fn load_endpoints() -> EndpointsFile {
    let path = endpoints_path();
    match fs::read_to_string(&path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => EndpointsFile::default(),
    }
}

pub fn save_endpoints(e: &EndpointsFile) -> std::io::Result<()> {
    let path = endpoints_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(e).expect("serialize endpoints");
    fs::write(path, data)
}

/// Derives the metrics channel URL from a configured base address: swap
/// the scheme for its WebSocket twin and append the fixed channel path.
/// Addresses that are already `ws://`/`wss://` are taken verbatim.
pub fn metrics_url(base: &str) -> String {
    if base.starts_with("ws://") || base.starts_with("wss://") {
        return base.to_string();
    }
    let base = base.trim_end_matches('/');
    let swapped = if let Some(rest) = base.strip_prefix("https:") {
        format!("wss:{rest}")
    } else if let Some(rest) = base.strip_prefix("http:") {
        format!("ws:{rest}")
    } else {
        base.to_string()
    };
    format!("{swapped}{METRICS_PATH}")
}

pub enum ResolveEndpoint {
    /// Use the provided runtime inputs (not persisted). (url, tls_ca)
    Direct(String, Option<String>),
    /// Loaded from an existing registry entry (url, tls_ca)
    Loaded(String, Option<String>),
    /// Should prompt user to select among endpoint names
    PromptSelect(Vec<String>),
    /// Should prompt user to create a new endpoint (name)
    PromptCreate(String),
    /// No endpoint could be resolved (e.g., missing arguments)
    None,
}

pub struct EndpointRequest {
    pub endpoint_name: Option<String>,
    pub url: Option<String>,
    pub tls_ca: Option<String>,
}

impl EndpointRequest {
    pub fn resolve(self, ef: &EndpointsFile) -> ResolveEndpoint {
        // Case: only endpoint name given -> try load
        if self.url.is_none() && self.endpoint_name.is_some() {
            let name = self.endpoint_name.unwrap();
            if let Some(entry) = ef.endpoints.get(&name) {
                return ResolveEndpoint::Loaded(entry.url.clone(), entry.tls_ca.clone());
            } else {
                return ResolveEndpoint::PromptCreate(name);
            }
        }
        // Both provided -> direct (maybe later saved by caller)
        if let Some(u) = self.url {
            return ResolveEndpoint::Direct(u, self.tls_ca);
        }
        // Nothing provided -> maybe prompt select if entries exist
        if self.endpoint_name.is_none() {
            if ef.endpoints.is_empty() {
                ResolveEndpoint::None
            } else {
                ResolveEndpoint::PromptSelect(ef.endpoints.keys().cloned().collect())
            }
        } else {
            ResolveEndpoint::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_url_swaps_scheme_and_appends_path() {
        assert_eq!(
            metrics_url("https://api.stream.example"),
            "wss://api.stream.example/api/v1/ws"
        );
        assert_eq!(
            metrics_url("http://127.0.0.1:8080/"),
            "ws://127.0.0.1:8080/api/v1/ws"
        );
    }

    #[test]
    fn metrics_url_passes_ws_addresses_through() {
        assert_eq!(
            metrics_url("ws://127.0.0.1:3230/api/v1/ws"),
            "ws://127.0.0.1:3230/api/v1/ws"
        );
        assert_eq!(
            metrics_url("wss://api.stream.example/api/v1/ws"),
            "wss://api.stream.example/api/v1/ws"
        );
    }

    #[test]
    fn resolve_prefers_loaded_entry_for_bare_name() {
        let mut ef = EndpointsFile::default();
        ef.endpoints.insert(
            "prod".into(),
            EndpointEntry {
                url: "https://api.stream.example".into(),
                tls_ca: None,
            },
        );
        let req = EndpointRequest {
            endpoint_name: Some("prod".into()),
            url: None,
            tls_ca: None,
        };
        match req.resolve(&ef) {
            ResolveEndpoint::Loaded(u, ca) => {
                assert_eq!(u, "https://api.stream.example");
                assert!(ca.is_none());
            }
            _ => panic!("expected Loaded"),
        }
    }

    #[test]
    fn resolve_unknown_name_asks_to_create() {
        let ef = EndpointsFile::default();
        let req = EndpointRequest {
            endpoint_name: Some("staging".into()),
            url: None,
            tls_ca: None,
        };
        assert!(matches!(req.resolve(&ef), ResolveEndpoint::PromptCreate(n) if n == "staging"));
    }

    #[test]
    fn resolve_nothing_given() {
        let ef = EndpointsFile::default();
        let req = EndpointRequest {
            endpoint_name: None,
            url: None,
            tls_ca: None,
        };
        assert!(matches!(req.resolve(&ef), ResolveEndpoint::None));

        let mut ef = EndpointsFile::default();
        ef.endpoints.insert("prod".into(), EndpointEntry::default());
        let req = EndpointRequest {
            endpoint_name: None,
            url: None,
            tls_ca: None,
        };
        assert!(matches!(req.resolve(&ef), ResolveEndpoint::PromptSelect(v) if v == ["prod"]));
    }
}
