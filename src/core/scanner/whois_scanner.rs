// src/core/scanner/whois_scanner.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::{failure, Probe};
use crate::core::error::ProbeResult;
use crate::core::findings::RawResult;
use crate::core::models::{Asset, AssetKind, ReverseWhoisResult, WhoisLookup, WhoisRecord, WhoisTarget};
use crate::core::options::CheckConfig;

const IANA_SERVER: &str = "whois.iana.org";
const WHOIS_TIMEOUT: Duration = Duration::from_secs(15);
/// Largest reply kept from a port-43 server; the rest is dropped.
const MAX_WHOIS_BYTES: u64 = 256 * 1024;
const WHOISFREAKS_URL: &str = "https://api.whoisfreaks.com/v1.0/whois";

/// Registry answers meaning "this name is not registered".
const NO_MATCH_MARKERS: &[&str] = &[
    "no match for",
    "not found",
    "no data found",
    "no entries found",
    "no object found",
    "status: free",
    "status: available",
];

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email regex"));

#[derive(Debug, Error)]
pub enum WhoisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no answer from {server} within {timeout:?}")]
    Timeout { server: String, timeout: Duration },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait WhoisSource: Send + Sync {
    async fn lookup(&self, query: &str, target: WhoisTarget) -> Result<WhoisLookup, WhoisError>;
}

/// Domains registered under a search term, e.g. a registrant company.
#[async_trait]
pub trait ReverseWhoisSource: Send + Sync {
    async fn domains(&self, search_type: &str, value: &str, max_pages: u32) -> Result<Vec<String>, WhoisError>;
}

/// Plain WHOIS over TCP port 43. Starts at IANA and follows the referral,
/// then the registrar's own server once.
#[derive(Debug, Clone)]
pub struct Port43Whois {
    timeout: Duration,
}

impl Default for Port43Whois {
    fn default() -> Self {
        Self { timeout: WHOIS_TIMEOUT }
    }
}

impl Port43Whois {
    async fn query(&self, server: &str, query: &str) -> Result<String, WhoisError> {
        let exchange = async {
            let mut stream = TcpStream::connect((server, 43)).await?;
            stream.write_all(format!("{query}\r\n").as_bytes()).await?;
            Ok::<_, WhoisError>(read_reply(&mut stream, MAX_WHOIS_BYTES).await?)
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| WhoisError::Timeout { server: server.to_string(), timeout: self.timeout })?
    }
}

/// Reads a reply until EOF, keeping at most `limit` bytes.
async fn read_reply<R: AsyncRead + Unpin>(reader: R, limit: u64) -> std::io::Result<String> {
    let mut buf = Vec::new();
    reader.take(limit).read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Value of the first `key:` line, case-insensitive.
fn field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim().eq_ignore_ascii_case(key) && !v.trim().is_empty()).then(|| v.trim())
    })
}

#[async_trait]
impl WhoisSource for Port43Whois {
    async fn lookup(&self, query: &str, target: WhoisTarget) -> Result<WhoisLookup, WhoisError> {
        let iana = self.query(IANA_SERVER, query).await?;
        let Some(server) = field(&iana, "refer").or_else(|| field(&iana, "whois")).map(str::to_string) else {
            return Ok(parse_lookup(&iana, target));
        };
        debug!(query, %server, "following WHOIS referral");
        let mut text = self.query(&server, query).await?;

        if let Some(registrar) = field(&text, "Registrar WHOIS Server").map(str::to_string) {
            let registrar = registrar.trim_start_matches("whois://").to_string();
            if !registrar.eq_ignore_ascii_case(&server) {
                match self.query(&registrar, query).await {
                    Ok(detail) if !detail.trim().is_empty() => text = detail,
                    Ok(_) => {}
                    Err(e) => debug!(query, %registrar, error = %e, "registrar WHOIS unavailable"),
                }
            }
        }
        Ok(parse_lookup(&text, target))
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let stamp = raw.trim_end_matches(" UTC").trim_end_matches('Z');
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(stamp, format) {
            return Some(dt.and_utc());
        }
    }
    let day = raw.split_whitespace().next().unwrap_or(raw);
    ["%Y-%m-%d", "%d-%b-%Y", "%Y.%m.%d", "%d.%m.%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(day, format).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

/// Turns a WHOIS answer into a record, or a no-match marker.
pub fn parse_lookup(text: &str, target: WhoisTarget) -> WhoisLookup {
    let lower = text.to_lowercase();
    if text.trim().is_empty() || NO_MATCH_MARKERS.iter().any(|marker| lower.contains(marker)) {
        let details = text.lines().map(str::trim).find(|l| !l.is_empty() && !l.starts_with('%')).unwrap_or("empty answer");
        return WhoisLookup::NoMatch { details: details.to_string() };
    }

    let mut record = WhoisRecord {
        target,
        domain_name: None,
        registrar: None,
        registrar_id: None,
        registrar_url: Vec::new(),
        registrant: None,
        status: Vec::new(),
        emails: Vec::new(),
        name_servers: Vec::new(),
        updated_date: Vec::new(),
        creation_date: None,
        expiration_date: None,
        text: text.to_string(),
    };

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        for email in EMAIL.find_iter(value) {
            push_unique(&mut record.emails, email.as_str().to_lowercase());
        }
        match key.trim().to_lowercase().as_str() {
            "domain name" | "domain" => {
                record.domain_name.get_or_insert_with(|| value.to_lowercase());
            }
            "registrar" | "sponsoring registrar" => {
                record.registrar.get_or_insert_with(|| value.to_string());
            }
            "registrar iana id" => {
                record.registrar_id.get_or_insert_with(|| value.to_string());
            }
            "registrar url" => push_unique(&mut record.registrar_url, value.to_string()),
            "registrant organization" | "registrant organisation" | "registrant" | "org-name" | "orgname" => {
                record.registrant.get_or_insert_with(|| value.to_string());
            }
            "domain status" | "status" => {
                let status = value.split_whitespace().next().unwrap_or(value);
                push_unique(&mut record.status, status.to_string());
            }
            "name server" | "nserver" | "nameserver" => {
                let server = value.split_whitespace().next().unwrap_or(value);
                push_unique(&mut record.name_servers, server.trim_end_matches('.').to_lowercase());
            }
            "updated date" | "last-modified" | "last updated" | "changed" => {
                if let Some(date) = parse_date(value) {
                    if !record.updated_date.contains(&date) {
                        record.updated_date.push(date);
                    }
                }
            }
            "creation date" | "created" | "registered on" | "regdate" => {
                if record.creation_date.is_none() {
                    record.creation_date = parse_date(value);
                }
            }
            "registry expiry date"
            | "registrar registration expiration date"
            | "expiration date"
            | "expiry date"
            | "expires"
            | "paid-till" => {
                if record.expiration_date.is_none() {
                    record.expiration_date = parse_date(value);
                }
            }
            _ => {}
        }
    }
    WhoisLookup::Found(record)
}

pub struct WhoisProbe {
    source: Arc<dyn WhoisSource>,
}

impl WhoisProbe {
    pub fn new(source: Arc<dyn WhoisSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Probe for WhoisProbe {
    async fn invoke(&self, asset: &Asset, check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        let target = if asset.datatype == AssetKind::Ip { WhoisTarget::Ip } else { WhoisTarget::Domain };
        let lookup = self
            .source
            .lookup(&asset.value, target)
            .await
            .map_err(|e| failure(asset, check, e.to_string()))?;
        Ok(vec![RawResult::Whois(lookup)])
    }
}

#[derive(Debug, Deserialize)]
struct WfDomain {
    domain_name: String,
}

#[derive(Debug, Deserialize)]
struct WfPage {
    #[serde(rename = "total_Pages", default)]
    total_pages: u32,
    #[serde(default)]
    whois_domains_historical: Vec<WfDomain>,
}

/// Reverse WHOIS through the WhoisFreaks API. Each call picks one of the
/// configured API tokens at random.
pub struct WhoisFreaks {
    client: reqwest::Client,
    tokens: Vec<String>,
}

impl WhoisFreaks {
    pub fn new(tokens: Vec<String>) -> Self {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build().unwrap_or_default();
        Self { client, tokens }
    }

    async fn page(&self, token: &str, search_type: &str, value: &str, page: u32) -> Result<WfPage, WhoisError> {
        let page_number = page.to_string();
        let response = self
            .client
            .get(WHOISFREAKS_URL)
            .query(&[
                ("apiKey", token),
                ("whois", "reverse"),
                (search_type, value),
                ("mode", "mini"),
                ("page", page_number.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ReverseWhoisSource for WhoisFreaks {
    async fn domains(&self, search_type: &str, value: &str, max_pages: u32) -> Result<Vec<String>, WhoisError> {
        let Some(token) = self.tokens.choose(&mut rand::thread_rng()).cloned() else {
            debug!("no WhoisFreaks API token configured");
            return Ok(Vec::new());
        };

        let first = self.page(&token, search_type, value, 1).await?;
        let last = max_pages.min(first.total_pages);
        let mut domains: Vec<String> = first.whois_domains_historical.into_iter().map(|d| d.domain_name).collect();

        for page in 2..=last {
            tokio::time::sleep(Duration::from_secs(1)).await;
            match self.page(&token, search_type, value, page).await {
                Ok(next) => domains.extend(next.whois_domains_historical.into_iter().map(|d| d.domain_name)),
                Err(e) => warn!(search_type, page, error = %e, "reverse WHOIS page failed"),
            }
        }
        Ok(domains)
    }
}

pub struct ReverseWhoisProbe {
    source: Arc<dyn ReverseWhoisSource>,
    whois: Arc<dyn WhoisSource>,
}

impl ReverseWhoisProbe {
    pub fn new(source: Arc<dyn ReverseWhoisSource>, whois: Arc<dyn WhoisSource>) -> Self {
        Self { source, whois }
    }

    /// The search value and the search types to run for an asset.
    async fn search_terms(&self, asset: &Asset) -> Option<(String, Vec<&'static str>)> {
        match asset.datatype {
            AssetKind::Domain | AssetKind::Fqdn => {
                let lookup = self.whois.lookup(&asset.value, WhoisTarget::Domain).await.ok()?;
                let WhoisLookup::Found(record) = lookup else { return None };
                let registrant = record.registrant?.to_lowercase();
                if registrant.is_empty() || registrant.contains("redacted") {
                    debug!(asset = %asset.value, "registrant hidden, skipping reverse WHOIS");
                    return None;
                }
                Some((registrant, vec!["company", "owner"]))
            }
            AssetKind::Email => Some((asset.value.clone(), vec!["email"])),
            AssetKind::Keyword => Some((asset.value.clone(), vec!["keyword", "owner", "company"])),
            AssetKind::Ip | AssetKind::Url => None,
        }
    }
}

#[async_trait]
impl Probe for ReverseWhoisProbe {
    async fn invoke(&self, asset: &Asset, check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        let max_pages = match check {
            CheckConfig::ReverseWhois { max_pages } => *max_pages,
            _ => 1,
        };
        let Some((value, types)) = self.search_terms(asset).await else {
            return Ok(Vec::new());
        };

        let mut domains = Vec::new();
        for search_type in &types {
            match self.source.domains(search_type, &value, max_pages).await {
                Ok(found) => domains.extend(found),
                Err(e) => warn!(asset = %asset.value, search_type, error = %e, "reverse WHOIS failed"),
            }
        }
        if domains.is_empty() {
            return Ok(Vec::new());
        }
        domains.sort();
        domains.dedup();
        info!(asset = %asset.value, count = domains.len(), "reverse WHOIS domains found");

        Ok(vec![RawResult::ReverseWhois(ReverseWhoisResult {
            domains,
            types: types.iter().map(|t| t.to_string()).collect(),
            value,
        })])
    }
}
