//! Proxy rotation for browser sessions.

use crate::core::error::{AppError, Result};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A resolved proxy assignment for one browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProxiesFile {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    rotation: RotationSection,
    #[serde(default)]
    credentials: CredentialsSection,
    #[serde(default)]
    fallback_proxies: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RotationSection {
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default = "default_countries")]
    country_targets: Vec<String>,
}

impl Default for RotationSection {
    fn default() -> Self {
        RotationSection {
            mode: default_mode(),
            country_targets: default_countries(),
        }
    }
}

fn default_mode() -> String {
    "per_request".to_string()
}

fn default_countries() -> Vec<String> {
    vec!["US".to_string()]
}

#[derive(Debug, Default, Deserialize)]
struct CredentialsSection {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
}

/// Manages proxy rotation across browser sessions.
///
/// Rotation modes: `per_request` (new proxy per session), `per_site`
/// and `sticky_session` (reuse the current assignment until rotated).
pub struct ProxyManager {
    config: ProxiesFile,
    pub enabled: bool,
    current: Mutex<Option<ProxyEndpoint>>,
    request_count: AtomicUsize,
}

impl ProxyManager {
    /// Load from a TOML config file. A missing path disables proxying.
    pub fn from_file(path: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(p) if Path::new(p).exists() => {
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content)
                    .map_err(|e| AppError::Config(format!("Invalid proxies config '{}': {}", p, e)))?
            }
            Some(p) => {
                tracing::warn!("Proxies config '{}' not found; proxying disabled.", p);
                ProxiesFile::default()
            }
            None => ProxiesFile::default(),
        };
        let enabled = config.enabled;
        Ok(ProxyManager {
            config,
            enabled,
            current: Mutex::new(None),
            request_count: AtomicUsize::new(0),
        })
    }

    pub fn disabled() -> Self {
        ProxyManager {
            config: ProxiesFile::default(),
            enabled: false,
            current: Mutex::new(None),
            request_count: AtomicUsize::new(0),
        }
    }

    /// Next proxy according to the rotation mode, or `None` when disabled.
    pub fn get_proxy(&self, site_name: &str) -> Option<ProxyEndpoint> {
        if !self.enabled {
            return None;
        }

        let mode = self.config.rotation.mode.as_str();
        {
            let current = self.current.lock();
            if let Some(ref proxy) = *current {
                if mode == "sticky_session" || (mode == "per_site" && !site_name.is_empty()) {
                    return Some(proxy.clone());
                }
            }
        }

        // Provider credentials: country and session id are encoded into
        // the username (BrightData-style gateway format).
        if let Some(ref host) = self.config.credentials.host {
            let mut rng = rand::thread_rng();
            let country = self
                .config
                .rotation
                .country_targets
                .choose(&mut rng)
                .cloned()
                .unwrap_or_else(|| "US".to_string());
            let session_id: u32 = rng.gen_range(100_000..999_999);
            let proxy = ProxyEndpoint {
                server: format!(
                    "http://{}:{}",
                    host,
                    self.config.credentials.port.unwrap_or(22225)
                ),
                username: Some(format!(
                    "{}-country-{}-session-{}",
                    self.config.credentials.username.clone().unwrap_or_default(),
                    country.to_lowercase(),
                    session_id
                )),
                password: self.config.credentials.password.clone(),
            };
            *self.current.lock() = Some(proxy.clone());
            self.request_count.fetch_add(1, Ordering::Relaxed);
            return Some(proxy);
        }

        // Fallback to a plain proxy list
        if !self.config.fallback_proxies.is_empty() {
            let server = self
                .config
                .fallback_proxies
                .choose(&mut rand::thread_rng())
                .cloned()?;
            let proxy = ProxyEndpoint {
                server,
                username: None,
                password: None,
            };
            *self.current.lock() = Some(proxy.clone());
            self.request_count.fetch_add(1, Ordering::Relaxed);
            return Some(proxy);
        }

        None
    }

    /// Force rotation to a new proxy on the next `get_proxy` call.
    pub fn rotate(&self) {
        *self.current.lock() = None;
    }

    pub fn provider(&self) -> &str {
        self.config.provider.as_deref().unwrap_or("none")
    }

    pub fn total_requests_proxied(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(config: &str) -> ProxyManager {
        let file: ProxiesFile = toml::from_str(config).unwrap();
        let enabled = file.enabled;
        ProxyManager {
            config: file,
            enabled,
            current: Mutex::new(None),
            request_count: AtomicUsize::new(0),
        }
    }

    #[test]
    fn disabled_manager_yields_no_proxy() {
        let manager = ProxyManager::disabled();
        assert_eq!(manager.get_proxy("openvc"), None);
    }

    #[test]
    fn provider_credentials_build_session_username() {
        let manager = manager_with(
            r#"
            enabled = true
            provider = "brightdata"
            [credentials]
            host = "brd.superproxy.io"
            port = 22225
            username = "brd-customer"
            password = "secret"
            [rotation]
            mode = "per_request"
            country_targets = ["US"]
            "#,
        );
        let proxy = manager.get_proxy("openvc").unwrap();
        assert_eq!(proxy.server, "http://brd.superproxy.io:22225");
        let username = proxy.username.unwrap();
        assert!(username.starts_with("brd-customer-country-us-session-"));
        assert_eq!(proxy.password.as_deref(), Some("secret"));
    }

    #[test]
    fn sticky_session_reuses_assignment() {
        let manager = manager_with(
            r#"
            enabled = true
            fallback_proxies = ["http://p1:8080", "http://p2:8080"]
            [rotation]
            mode = "sticky_session"
            "#,
        );
        let first = manager.get_proxy("a").unwrap();
        for _ in 0..10 {
            assert_eq!(manager.get_proxy("b").unwrap(), first);
        }
        manager.rotate();
        // After rotation a fresh assignment is made (may or may not differ).
        assert!(manager.get_proxy("c").is_some());
    }

    #[test]
    fn missing_file_disables_proxying() {
        let manager = ProxyManager::from_file(Some("does/not/exist.toml")).unwrap();
        assert!(!manager.enabled);
    }
}
