// src/core/scanner/subdomain_scanner.rs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::{failure, resolve_all, DnsLookup, Probe, RecordKind};
use crate::core::error::ProbeResult;
use crate::core::findings::RawResult;
use crate::core::models::{Asset, DnsRecordSet};
use crate::core::options::CheckConfig;

const CRTSH_URL: &str = "https://crt.sh/";
const RESOLVE_CONCURRENCY: usize = 10;
const BRUTEFORCE_CONCURRENCY: usize = 16;

/// Labels tried by the brute-force check.
const WORDLIST: &[&str] = &[
    "www", "www1", "www2", "www3", "m", "mob", "mobile", "ftp", "ftp1", "ftp2", "ftp3", "sftp", "mail", "mail1",
    "mail2", "mail3", "webmail", "smtp", "mx", "email", "owa", "imap", "prod", "dev", "pro", "test", "demo",
    "demo1", "demo2", "beta", "pre-prod", "preprod", "int", "acc", "uat", "stg", "intra", "intranet", "internal",
    "backup", "backups", "share", "db", "db1", "db2", "data", "mysql", "oracle", "pg", "ldap", "ldap2", "open",
    "survey", "remote", "blog", "blogs", "server", "git", "sys", "svn", "ns", "ns1", "ns2", "dns", "dns1", "dns2",
    "vpn", "vpn2", "support", "web", "api", "cdn", "ssh", "admin", "adm", "rec", "recette", "re7", "pp", "stag",
    "staging", "video", "videos", "mobi", "ws", "ad", "doc", "docs", "new", "news", "cpanel", "static", "store",
    "feeds", "rss", "files", "mantis", "nagios", "outlook", "zabbix", "it", "pt", "es", "uk", "us", "ir", "ch",
    "de", "br", "in",
];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Passive subdomain discovery.
#[async_trait]
pub trait SubdomainSource: Send + Sync {
    async fn subdomains(&self, domain: &str) -> Result<Vec<String>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct CertEntry {
    name_value: String,
}

/// Certificate-transparency search on crt.sh.
pub struct CrtSh {
    client: reqwest::Client,
}

impl CrtSh {
    pub fn new() -> Self {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(60)).build().unwrap_or_default();
        Self { client }
    }
}

impl Default for CrtSh {
    fn default() -> Self {
        Self::new()
    }
}

/// Names under `domain` found in certificate `name_value` fields, wildcards stripped.
fn names_under<'a>(entries: impl Iterator<Item = &'a str>, domain: &str) -> Vec<String> {
    let suffix = format!(".{domain}");
    let names: BTreeSet<String> = entries
        .flat_map(str::lines)
        .map(|name| name.trim().trim_start_matches("*.").to_lowercase())
        .filter(|name| name.ends_with(&suffix))
        .collect();
    names.into_iter().collect()
}

#[async_trait]
impl SubdomainSource for CrtSh {
    async fn subdomains(&self, domain: &str) -> Result<Vec<String>, SourceError> {
        let query = format!("%.{domain}");
        let entries: Vec<CertEntry> = self
            .client
            .get(CRTSH_URL)
            .query(&[("q", query.as_str()), ("output", "json")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(names_under(entries.iter().map(|e| e.name_value.as_str()), domain))
    }
}

/// Resolves every name, keeping the ones with at least one record.
///
/// # Arguments
///
/// * `dns` - The resolver, shared with the lookups in flight.
/// * `names` - Fully qualified names to resolve.
///
/// # Returns
///
/// A map from each answered name to its record sets.
async fn resolve_names(dns: Arc<dyn DnsLookup>, names: Vec<String>) -> BTreeMap<String, Vec<DnsRecordSet>> {
    let answers: Vec<(String, Vec<DnsRecordSet>)> = stream::iter(names)
        .map(move |name: String| {
            let dns = Arc::clone(&dns);
            async move {
                let records = resolve_all(dns.as_ref(), &name).await;
                (name, records)
            }
        })
        .buffer_unordered(RESOLVE_CONCURRENCY)
        .collect()
        .await;
    answers.into_iter().filter(|(_, records)| !records.is_empty()).collect()
}

pub struct SubdomainEnumProbe {
    source: Arc<dyn SubdomainSource>,
    dns: Arc<dyn DnsLookup>,
}

impl SubdomainEnumProbe {
    pub fn new(source: Arc<dyn SubdomainSource>, dns: Arc<dyn DnsLookup>) -> Self {
        Self { source, dns }
    }
}

#[async_trait]
impl Probe for SubdomainEnumProbe {
    async fn invoke(&self, asset: &Asset, check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        let found = self
            .source
            .subdomains(&asset.value)
            .await
            .map_err(|e| failure(asset, check, e.to_string()))?;
        info!(asset = %asset.value, count = found.len(), "subdomains enumerated");

        let mut results = Vec::new();
        if matches!(check, CheckConfig::SubdomainEnum { resolve: true }) && !found.is_empty() {
            let resolved = resolve_names(Arc::clone(&self.dns), found.clone()).await;
            debug!(asset = %asset.value, resolved = resolved.len(), "subdomains resolved");
            if !resolved.is_empty() {
                results.push(RawResult::SubdomainRecords(resolved));
            }
        }
        results.insert(0, RawResult::Subdomains(found));
        Ok(results)
    }
}

/// Tries a fixed word list of labels. Wildcard zones are skipped.
pub struct BruteforceProbe {
    dns: Arc<dyn DnsLookup>,
    words: Vec<String>,
}

impl BruteforceProbe {
    pub fn new(dns: Arc<dyn DnsLookup>) -> Self {
        Self::with_words(dns, WORDLIST.iter().map(|w| w.to_string()).collect())
    }

    pub fn with_words(dns: Arc<dyn DnsLookup>, mut words: Vec<String>) -> Self {
        words.sort();
        words.dedup();
        Self { dns, words }
    }
}

/// Whether `name` has an A, AAAA or CNAME record.
async fn exists(dns: &dyn DnsLookup, name: &str) -> bool {
    for kind in [RecordKind::A, RecordKind::Aaaa, RecordKind::Cname] {
        if dns.lookup(name, kind).await.is_some() {
            return true;
        }
    }
    false
}

fn random_label() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(12).map(char::from).collect::<String>().to_lowercase()
}

#[async_trait]
impl Probe for BruteforceProbe {
    async fn invoke(&self, asset: &Asset, _check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        let wildcard_name = format!("{}.{}", random_label(), asset.value);
        if exists(self.dns.as_ref(), &wildcard_name).await {
            info!(asset = %asset.value, "wildcard DNS detected, skipping brute force");
            return Ok(Vec::new());
        }

        let candidates: Vec<String> = self.words.iter().map(|w| format!("{w}.{}", asset.value)).collect();
        let dns = Arc::clone(&self.dns);
        let mut hits: Vec<String> = stream::iter(candidates)
            .map(move |name: String| {
                let dns = Arc::clone(&dns);
                async move { exists(dns.as_ref(), &name).await.then_some(name) }
            })
            .buffer_unordered(BRUTEFORCE_CONCURRENCY)
            .filter_map(futures::future::ready)
            .collect()
            .await;
        hits.sort();
        debug!(asset = %asset.value, hits = hits.len(), "brute force done");

        if hits.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![RawResult::Subdomains(hits)])
    }
}
