//! Static asset URLs
//!
//! Maps logical asset names (`site.css`) to their fingerprinted files via a
//! JSON manifest, spreading hosted assets over the configured static hosts.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetsError {
    #[error("failed to read asset manifest {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid asset manifest {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct StaticAssets {
    manifest: HashMap<String, String>,
    prefix: String,
    http_hosts: Vec<String>,
    https_hosts: Vec<String>,
    hosted: bool,
}

impl StaticAssets {
    pub fn new(
        manifest: HashMap<String, String>,
        prefix: &str,
        http_hosts: Vec<String>,
        https_hosts: Vec<String>,
        hosted: bool,
    ) -> Self {
        Self {
            manifest,
            prefix: prefix.to_string(),
            http_hosts,
            https_hosts,
            hosted,
        }
    }

    /// Read a `{"name": "fingerprinted-file"}` manifest
    pub fn load_manifest(path: &str) -> Result<HashMap<String, String>, AssetsError> {
        let raw = std::fs::read(path).map_err(|source| AssetsError::Read {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| AssetsError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Path of an asset under the static prefix, without any host
    pub fn path(&self, name: &str) -> String {
        let file = self.manifest.get(name).map_or(name, String::as_str);
        format!("{}{file}", self.prefix)
    }

    /// Protocol-relative URL of an asset; hosted apps pick a static host by
    /// hashing the name, otherwise the request host serves it
    pub fn url(&self, name: &str, request_host: &str, https: bool) -> String {
        let hosts = if https {
            &self.https_hosts
        } else {
            &self.http_hosts
        };
        let host = if self.hosted && !hosts.is_empty() {
            let digest = Sha256::digest(name.as_bytes());
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&digest[..8]);
            let slot = u64::from_be_bytes(prefix) % hosts.len() as u64;
            usize::try_from(slot)
                .ok()
                .and_then(|i| hosts.get(i))
                .map_or(request_host, String::as_str)
        } else {
            request_host
        };
        format!("//{host}{}", self.path(name))
    }

    /// Every manifest entry resolved to its URL, for templates
    pub fn url_map(&self, request_host: &str, https: bool) -> serde_json::Map<String, serde_json::Value> {
        self.manifest
            .keys()
            .map(|name| {
                (
                    name.clone(),
                    serde_json::Value::String(self.url(name, request_host, https)),
                )
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.manifest.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> HashMap<String, String> {
        HashMap::from([
            ("site.css".to_string(), "site.1a2b.css".to_string()),
            ("app.js".to_string(), "app.9f8e.js".to_string()),
        ])
    }

    #[test]
    fn test_local_urls_use_request_host() {
        let assets = StaticAssets::new(manifest(), "/static/", vec!["cdn".into()], vec![], false);
        assert_eq!(
            assets.url("site.css", "localhost:8080", false),
            "//localhost:8080/static/site.1a2b.css"
        );
        assert_eq!(assets.path("missing.png"), "/static/missing.png");
    }

    #[test]
    fn test_hosted_urls_are_stable() {
        let hosts = vec!["s1.example.com".to_string(), "s2.example.com".to_string()];
        let assets = StaticAssets::new(manifest(), "/static/", hosts.clone(), vec![], true);
        let first = assets.url("app.js", "www.example.com", false);
        assert_eq!(first, assets.url("app.js", "www.example.com", false));
        assert!(hosts
            .iter()
            .any(|h| first == format!("//{h}/static/app.9f8e.js")));
        // no https hosts configured
        assert_eq!(
            assets.url("app.js", "www.example.com", true),
            "//www.example.com/static/app.9f8e.js"
        );
    }

    #[test]
    fn test_load_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assets.json");
        std::fs::write(&path, r#"{"site.css": "site.1a2b.css"}"#).unwrap();
        let loaded = StaticAssets::load_manifest(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded["site.css"], "site.1a2b.css");

        std::fs::write(&path, "[1]").unwrap();
        assert!(matches!(
            StaticAssets::load_manifest(path.to_str().unwrap()),
            Err(AssetsError::Parse { .. })
        ));
    }

    #[test]
    fn test_url_map() {
        let assets = StaticAssets::new(manifest(), "/s/", vec![], vec![], false);
        let map = assets.url_map("h", true);
        assert_eq!(map["site.css"], "//h/s/site.1a2b.css");
        assert_eq!(map.len(), 2);
    }
}
