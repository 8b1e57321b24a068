// src/core/models.rs

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// --- Assets ---

/// The kind of value an asset holds. Each check only accepts a subset of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AssetKind {
    Domain,
    Fqdn,
    Ip,
    Url,
    Keyword,
    Email,
}

/// A scan target. Immutable once the scan has started.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub value: String,
    pub datatype: AssetKind,
}

impl Asset {
    pub fn new(value: impl Into<String>, datatype: AssetKind) -> Self {
        Self { value: value.into(), datatype }
    }

    /// Guesses the datatype of a free-form value typed by a user.
    ///
    /// Two-label names (`example.com`) are treated as registrable domains,
    /// anything deeper as a fully-qualified hostname.
    pub fn infer(raw: &str) -> Self {
        let value = raw.trim().trim_end_matches('.').to_lowercase();

        let datatype = if value.parse::<IpAddr>().is_ok() {
            AssetKind::Ip
        } else if value.contains("://") && url::Url::parse(&value).is_ok() {
            AssetKind::Url
        } else if value.contains('@') {
            AssetKind::Email
        } else if value.contains('.') {
            if value.split('.').count() == 2 {
                AssetKind::Domain
            } else {
                AssetKind::Fqdn
            }
        } else {
            AssetKind::Keyword
        };

        Self { value, datatype }
    }
}

// --- Scan lifecycle ---

/// The lifecycle of a scan. Status only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ScanStatus {
    Started,
    Scanning,
    Finished,
    Stopped,
    Error,
}

impl ScanStatus {
    /// A scan counts against the concurrency ceiling while it is in one of these states.
    pub fn is_active(self) -> bool {
        matches!(self, ScanStatus::Started | ScanStatus::Scanning)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Finished | ScanStatus::Stopped | ScanStatus::Error)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_advance_to(self, next: ScanStatus) -> bool {
        match (self, next) {
            (a, b) if a == b => true,
            (ScanStatus::Started, _) => true,
            (ScanStatus::Scanning, ScanStatus::Started) => false,
            (ScanStatus::Scanning, _) => true,
            _ => false,
        }
    }
}

// --- Issues ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Confidence {
    Certain,
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueTarget {
    pub addr: Vec<String>,
    pub protocol: String,
}

impl IssueTarget {
    pub fn domain(addr: impl Into<String>) -> Self {
        Self { addr: vec![addr.into()], protocol: "domain".to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueMetadata {
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vuln_refs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
}

impl IssueMetadata {
    pub fn tagged(tags: &[&str]) -> Self {
        Self { tags: tags.iter().map(|t| t.to_string()).collect(), ..Self::default() }
    }
}

/// A normalized finding, produced only by materialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub issue_id: u32,
    pub severity: Severity,
    pub confidence: Confidence,
    pub target: IssueTarget,
    pub title: String,
    pub description: String,
    pub solution: String,
    pub metadata: IssueMetadata,
    #[serde(rename = "type")]
    pub kind: String,
    pub raw: serde_json::Value,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingsSummary {
    pub nb_issues: usize,
    pub nb_info: usize,
    pub nb_low: usize,
    pub nb_medium: usize,
    pub nb_high: usize,
    pub nb_critical: usize,
    pub engine_name: String,
    pub engine_version: String,
}

impl FindingsSummary {
    pub fn tally(issues: &[Issue]) -> Self {
        let count = |severity: Severity| issues.iter().filter(|i| i.severity == severity).count();
        Self {
            nb_issues: issues.len(),
            nb_info: count(Severity::Info),
            nb_low: count(Severity::Low),
            nb_medium: count(Severity::Medium),
            nb_high: count(Severity::High),
            nb_critical: count(Severity::Critical),
            engine_name: env!("CARGO_PKG_NAME").to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// What `get_findings` hands back to the shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingsReport {
    pub scan_id: String,
    pub summary: FindingsSummary,
    pub issues: Vec<Issue>,
}

// --- Raw probe data ---

/// The answers for one record type, as returned by the DNS collaborator.
///
/// `answers` keeps the presentation form (TXT strings quoted), `values` the
/// unquoted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordSet {
    pub record_type: String,
    pub values: Vec<String>,
    pub answers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WhoisTarget {
    Domain,
    Ip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhoisRecord {
    pub target: WhoisTarget,
    pub domain_name: Option<String>,
    pub registrar: Option<String>,
    pub registrar_id: Option<String>,
    pub registrar_url: Vec<String>,
    pub registrant: Option<String>,
    pub status: Vec<String>,
    pub emails: Vec<String>,
    pub name_servers: Vec<String>,
    pub updated_date: Vec<DateTime<Utc>>,
    pub creation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub text: String,
}

/// A WHOIS answer: either a record or the registry's "no match" text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WhoisLookup {
    Found(WhoisRecord),
    NoMatch { details: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseWhoisResult {
    pub domains: Vec<String>,
    pub types: Vec<String>,
    pub value: String,
}

/// Provider attribution of an address (CDN, WAF, Cloud or SaaS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub provider: String,
    pub attributes: Vec<String>,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegProvider {
    pub name: String,
    pub provider: String,
    pub product: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegReport {
    pub gateways: Vec<SegProvider>,
    pub mx_records: Vec<DnsRecordSet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkimReport {
    /// Selector → record value for every selector that answered.
    pub selectors: BTreeMap<String, String>,
    pub records: Vec<DnsRecordSet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmarcReport {
    /// Finding code → severity, e.g. `insecure_dmarc_policy` → high.
    pub findings: BTreeMap<String, Severity>,
    pub records: Vec<DnsRecordSet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookalikeDomain {
    pub fuzzer: String,
    pub domain: String,
    pub dns_a: Vec<String>,
    pub dns_mx: Vec<String>,
}
