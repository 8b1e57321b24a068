// src/config.rs

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::{EngineError, EngineResult};
use crate::logging::get_config_dir;

pub const CONFIG_FILE: &str = "engine.json";

/// Engine-wide settings. Every field has a default, so an empty `engine.json`
/// (or none at all) yields a working engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ceiling on concurrently active (STARTED or SCANNING) scans.
    pub max_scans: usize,
    /// Number of pooled probes allowed to run at once.
    pub pool_size: usize,
    pub nameservers: Vec<String>,
    pub dns_timeout_secs: u64,
    /// Default lookalike-search timeout, overridden per scan by `max_timeout`.
    pub scan_timeout_secs: u64,
    pub reverse_whois_max_pages: u32,
    pub whoisfreaks_api_tokens: Vec<String>,
    /// JSON dataset of CDN/WAF/Cloud/SaaS subnets.
    pub external_ip_ranges_path: Option<PathBuf>,
    /// JSON dataset of Secure Email Gateway providers.
    pub seg_path: Option<PathBuf>,
    pub lookalike_common_tlds: Vec<String>,
    pub dkim_selectors: Vec<String>,
    pub spf_max_depth: usize,
    pub spf_max_queries: usize,
    pub results_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_scans: 10,
            pool_size: 5,
            nameservers: vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()],
            dns_timeout_secs: 5,
            scan_timeout_secs: 3600,
            reverse_whois_max_pages: 10,
            whoisfreaks_api_tokens: Vec::new(),
            external_ip_ranges_path: None,
            seg_path: None,
            lookalike_common_tlds: ["com", "net", "org", "info", "io", "co", "fr", "de", "eu", "biz"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            dkim_selectors: default_dkim_selectors(),
            spf_max_depth: 20,
            spf_max_queries: 500,
            results_dir: None,
        }
    }
}

fn default_dkim_selectors() -> Vec<String> {
    [
        "default", "dkim", "google", "selector1", "selector2", "k1", "k2", "k3", "s1", "s2", "mail",
        "smtp", "mx", "email", "everlytickey1", "everlytickey2", "mandrill", "mailjet", "zendesk1",
        "zendesk2", "sendgrid", "sm", "pm", "mxvault", "dkim1024", "amazonses", "protonmail",
        "protonmail2", "protonmail3", "fm1", "fm2", "fm3",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl EngineConfig {
    /// Loads `engine.json` from the per-user config directory when it exists,
    /// then applies the process environment on top.
    pub fn load() -> EngineResult<Self> {
        let path = get_config_dir().join(CONFIG_FILE);
        let config = if path.exists() {
            Self::from_file(&path)?
        } else {
            debug!(path = %path.display(), "no engine config file, using defaults");
            Self::default()
        };
        let config = config.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: EngineConfig = serde_json::from_str(&content).map_err(|e| {
            EngineError::configuration(format!("failed to parse {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Applies `APP_MAXSCANS`, `APP_POOL_SIZE`, `APP_TIMEOUT`, `APP_WF_MAX_PAGE`
    /// and `NAMESERVER` through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("APP_MAXSCANS") {
            self.max_scans = parse_var("APP_MAXSCANS", &v)?;
        }
        if let Some(v) = lookup("APP_POOL_SIZE") {
            self.pool_size = parse_var("APP_POOL_SIZE", &v)?;
        }
        if let Some(v) = lookup("APP_TIMEOUT") {
            self.scan_timeout_secs = parse_var("APP_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("APP_WF_MAX_PAGE") {
            self.reverse_whois_max_pages = parse_var("APP_WF_MAX_PAGE", &v)?;
        }
        if let Some(v) = lookup("NAMESERVER") {
            self.nameservers = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(self)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_scans == 0 {
            return Err(EngineError::configuration("max_scans must be at least 1"));
        }
        if self.pool_size == 0 {
            return Err(EngineError::configuration("pool_size must be at least 1"));
        }
        if self.nameservers.is_empty() {
            return Err(EngineError::configuration("at least one nameserver is required"));
        }
        self.nameserver_addrs()?;
        Ok(())
    }

    /// Nameservers as socket addresses; a bare IP gets port 53.
    pub fn nameserver_addrs(&self) -> EngineResult<Vec<SocketAddr>> {
        self.nameservers
            .iter()
            .map(|ns| {
                ns.parse::<SocketAddr>()
                    .or_else(|_| ns.parse::<IpAddr>().map(|ip| SocketAddr::new(ip, 53)))
                    .map_err(|_| EngineError::configuration(format!("invalid nameserver address '{ns}'")))
            })
            .collect()
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> EngineResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| EngineError::configuration(format!("{name} has an invalid value '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_scans, 10);
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.nameserver_addrs().unwrap()[0], "8.8.8.8:53".parse().unwrap());
    }

    #[test]
    fn environment_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("APP_MAXSCANS", "3"),
            ("APP_WF_MAX_PAGE", "2"),
            ("NAMESERVER", "1.1.1.1, 9.9.9.9"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.max_scans, 3);
        assert_eq!(config.reverse_whois_max_pages, 2);
        assert_eq!(config.nameservers, vec!["1.1.1.1", "9.9.9.9"]);
    }

    #[test]
    fn bad_override_is_a_configuration_error() {
        let err = EngineConfig::default()
            .with_overrides(|key| (key == "APP_POOL_SIZE").then(|| "five".to_string()))
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn rejects_zero_capacity_and_bad_nameservers() {
        let config = EngineConfig { max_scans: 0, ..EngineConfig::default() };
        assert!(config.validate().is_err());

        let config = EngineConfig { nameservers: vec!["not-an-ip".into()], ..EngineConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"pool_size": 2, "whoisfreaks_api_tokens": ["abc"]}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.whoisfreaks_api_tokens, vec!["abc"]);
        assert_eq!(config.max_scans, 10);
    }
}
