// src/core/scanner/mail_scanner.rs

//! Mail-security probes: SPF, DKIM, DMARC and Secure Email Gateway detection.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{DnsLookup, Probe, RecordKind};
use crate::core::error::{EngineError, EngineResult, ProbeResult};
use crate::core::findings::RawResult;
use crate::core::models::{Asset, DkimReport, DmarcReport, SegProvider, SegReport, Severity};
use crate::core::options::CheckConfig;
use crate::core::spf::{analyze, count_lookups, LookupLimit, LookupLimits, SpfError, SpfIssue, SpfIssueKind, DNS_LOOKUP_LIMIT};

/// Runs the SPF analyzer on a domain's TXT answers, then the legacy record
/// and lookup-count checks.
pub struct SpfProbe {
    dns: Arc<dyn DnsLookup>,
    limits: LookupLimits,
}

impl SpfProbe {
    pub fn new(dns: Arc<dyn DnsLookup>, max_depth: usize, max_queries: usize) -> Self {
        Self { dns, limits: LookupLimits { max_depth, max_queries } }
    }
}

#[async_trait]
impl Probe for SpfProbe {
    async fn invoke(&self, asset: &Asset, _check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        let domain = asset.value.as_str();
        let answers = self.dns.lookup(domain, RecordKind::Txt).await.map(|r| r.answers).unwrap_or_default();
        let mut analysis = analyze(&answers);

        if let Some(legacy) = self.dns.lookup(domain, RecordKind::Spf).await {
            analysis.issues.push(SpfIssue {
                kind: SpfIssueKind::DeprecatedSpfRecord,
                value: legacy.values.first().cloned(),
                extra_info: None,
            });
        }

        match count_lookups(self.dns.as_ref(), domain, self.limits).await {
            Err(SpfError::RecursionLimitExceeded { depth, limit }) => {
                let extra_info = match limit {
                    LookupLimit::Depth => {
                        format!("More than {depth} nested SPF lookups are required to validate SPF record.")
                    }
                    LookupLimit::Queries => format!(
                        "More than {} DNS queries are required to validate SPF record (stopped at depth {depth}).",
                        self.limits.max_queries
                    ),
                };
                analysis.issues.push(SpfIssue {
                    kind: SpfIssueKind::DnsLookupLimit,
                    value: None,
                    extra_info: Some(extra_info),
                })
            }
            Ok(lookups) if lookups.count > DNS_LOOKUP_LIMIT => analysis.issues.push(SpfIssue {
                kind: SpfIssueKind::DnsLookupLimit,
                value: lookups.records.first().map(|(_, record)| record.clone()),
                extra_info: Some(format!("{} DNS lookups are required to validate SPF record.", lookups.count)),
            }),
            Ok(_) => {}
        }

        debug!(domain, issues = analysis.issues.len(), "SPF analysis done");
        Ok(vec![RawResult::Spf(analysis)])
    }
}

/// Tries a fixed list of selectors at `<selector>._domainkey.<domain>`.
pub struct DkimProbe {
    dns: Arc<dyn DnsLookup>,
    selectors: Vec<String>,
}

impl DkimProbe {
    pub fn new(dns: Arc<dyn DnsLookup>, selectors: Vec<String>) -> Self {
        Self { dns, selectors }
    }
}

#[async_trait]
impl Probe for DkimProbe {
    async fn invoke(&self, asset: &Asset, _check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        let names: Vec<String> =
            self.selectors.iter().map(|selector| format!("{selector}._domainkey.{}", asset.value)).collect();
        let answers =
            futures::future::join_all(names.iter().map(|name| self.dns.lookup(name, RecordKind::Txt))).await;

        let mut report = DkimReport { selectors: BTreeMap::new(), records: Vec::new() };
        for (selector, answer) in self.selectors.iter().zip(answers) {
            if let Some(records) = answer {
                report.selectors.insert(selector.clone(), records.values.concat());
                report.records.push(records);
            }
        }
        debug!(domain = %asset.value, matched = report.selectors.len(), "DKIM selectors checked");
        Ok(vec![RawResult::Dkim(report)])
    }
}

/// Queries `_dmarc.<domain>` and grades the published policy.
pub struct DmarcProbe {
    dns: Arc<dyn DnsLookup>,
}

impl DmarcProbe {
    pub fn new(dns: Arc<dyn DnsLookup>) -> Self {
        Self { dns }
    }
}

/// Finding codes raised by a DMARC record.
fn grade_dmarc(record: &str) -> BTreeMap<String, Severity> {
    let mut findings = BTreeMap::new();
    for tag in record.split(';') {
        let Some((name, value)) = tag.split_once('=') else { continue };
        let value = value.trim().to_lowercase();
        match name.trim().to_lowercase().as_str() {
            "p" if value == "none" => {
                findings.insert("insecure_dmarc_policy".to_string(), Severity::High);
            }
            "sp" if value == "none" => {
                findings.insert("insecure_dmarc_subdomain_sp".to_string(), Severity::High);
            }
            "pct" => {
                let digits: String = value.chars().filter(char::is_ascii_digit).collect();
                if digits.parse::<u32>().is_ok_and(|pct| pct < 100) {
                    findings.insert("dmarc_partial_coverage".to_string(), Severity::Medium);
                }
            }
            _ => {}
        }
    }
    findings
}

#[async_trait]
impl Probe for DmarcProbe {
    async fn invoke(&self, asset: &Asset, _check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        let name = format!("_dmarc.{}", asset.value);
        let records: Vec<_> = self.dns.lookup(&name, RecordKind::Txt).await.into_iter().collect();
        let policy = records
            .iter()
            .flat_map(|r| r.values.iter())
            .find(|value| value.to_lowercase().contains("v=dmarc1"));

        let findings = match policy {
            Some(record) => grade_dmarc(record),
            None => BTreeMap::from([("no_dmarc_record".to_string(), Severity::Info)]),
        };
        Ok(vec![RawResult::Dmarc(DmarcReport { findings, records })])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct SegEntry {
    provider: String,
    product: String,
    mx_records: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SegFile {
    seg: BTreeMap<String, SegEntry>,
}

/// Known Secure Email Gateway providers, keyed by name, matched on MX suffix.
#[derive(Debug, Clone, Default)]
pub struct SegDataset {
    providers: BTreeMap<String, SegEntry>,
}

impl SegDataset {
    /// Reads a `{"seg": {name: {provider, product, mx_records}}}` file.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::configuration(format!("failed to read {}: {e}", path.display())))?;
        let dataset = Self::from_json(&content)
            .map_err(|e| EngineError::configuration(format!("failed to parse {}: {e}", path.display())))?;
        info!(path = %path.display(), providers = dataset.providers.len(), "SEG dataset loaded");
        Ok(dataset)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let file: SegFile = serde_json::from_str(content)?;
        Ok(Self { providers: file.seg })
    }

    pub fn builtin() -> Self {
        let entry = |provider: &str, product: &str, mx: &[&str]| SegEntry {
            provider: provider.to_string(),
            product: product.to_string(),
            mx_records: mx.iter().map(|m| m.to_string()).collect(),
        };
        let providers = BTreeMap::from([
            ("proofpoint".to_string(), entry("Proofpoint", "Email Protection", &["pphosted.com", "ppe-hosted.com"])),
            ("mimecast".to_string(), entry("Mimecast", "Email Security", &["mimecast.com", "mimecast.co.za"])),
            ("barracuda".to_string(), entry("Barracuda", "Email Security Gateway", &["barracudanetworks.com"])),
            ("cisco".to_string(), entry("Cisco", "Secure Email", &["iphmx.com"])),
            ("trendmicro".to_string(), entry("Trend Micro", "Email Security", &["tmes.trendmicro.eu", "tmes.trendmicro.com"])),
            ("vade".to_string(), entry("Vade", "Secure", &["vadesecure.com"])),
            ("microsoft".to_string(), entry("Microsoft", "Exchange Online Protection", &["mail.protection.outlook.com"])),
        ]);
        Self { providers }
    }

    /// Providers whose MX suffix matches one of `mx_values`, in dataset order.
    pub fn classify(&self, mx_values: &[String]) -> Vec<SegProvider> {
        self.providers
            .iter()
            .filter(|(_, entry)| {
                mx_values.iter().any(|value| {
                    let host = value.rsplit(' ').next().unwrap_or(value).trim_end_matches('.').to_lowercase();
                    entry.mx_records.iter().any(|suffix| host.ends_with(&suffix.to_lowercase()))
                })
            })
            .map(|(name, entry)| SegProvider {
                name: name.clone(),
                provider: entry.provider.clone(),
                product: entry.product.clone(),
            })
            .collect()
    }
}

pub struct SegProbe {
    dns: Arc<dyn DnsLookup>,
    dataset: Arc<SegDataset>,
}

impl SegProbe {
    pub fn new(dns: Arc<dyn DnsLookup>, dataset: Arc<SegDataset>) -> Self {
        Self { dns, dataset }
    }
}

#[async_trait]
impl Probe for SegProbe {
    async fn invoke(&self, asset: &Asset, _check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        // Without MX records there is nothing to grade.
        let Some(mx) = self.dns.lookup(&asset.value, RecordKind::Mx).await else {
            return Ok(Vec::new());
        };
        let gateways = self.dataset.classify(&mx.values);
        Ok(vec![RawResult::Seg(SegReport { gateways, mx_records: vec![mx] })])
    }
}
