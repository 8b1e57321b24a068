// src/core/findings/materialize.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sha1::{Digest, Sha1};

use super::whois::whois_issues;
use super::{FindingsStore, RawResult, Section};
use crate::core::knowledge_base::get_finding_detail;
use crate::core::models::{
    Confidence, DnsRecordSet, FindingsSummary, Issue, IssueMetadata, IssueTarget, Severity,
};
use crate::core::options::{ProviderCategory, ScanOptions};

/// Lines returned by subdomain sources that are not subdomains at all.
const SUBDOMAIN_NOISE: &[&str] = &[
    "go to http://ptrarchive.com for best",
    "use http://ptrarchive.com, the engine",
    "sublist3r recommends",
    "api count exceeded",
    "too many requests",
    "error invalid host",
    "<",
    ">",
];
const PTR_ARCHIVE_PREFIX: &str = "from http://ptrarchive.com: ";

/// Issue list under construction. Ids are assigned in push order.
pub(super) struct Issues {
    list: Vec<Issue>,
    timestamp: i64,
}

impl Issues {
    fn new(now: DateTime<Utc>) -> Self {
        Self { list: Vec::new(), timestamp: now.timestamp_millis() }
    }

    pub(super) fn push(
        &mut self,
        severity: Severity,
        addr: &str,
        title: String,
        description: String,
        tags: &[&str],
        kind: &str,
        raw: Value,
    ) -> &mut Issue {
        let index = self.list.len();
        self.list.push(Issue {
            issue_id: index as u32 + 1,
            severity,
            confidence: Confidence::Certain,
            target: IssueTarget::domain(addr),
            title,
            description,
            solution: "n/a".to_string(),
            metadata: IssueMetadata::tagged(tags),
            kind: kind.to_string(),
            raw,
            timestamp: self.timestamp,
        });
        &mut self.list[index]
    }
}

/// First 6 hex characters of the SHA-1 of `text`, used in titles to spot changes between scans.
pub(super) fn short_hash(text: &str) -> String {
    let digest = Sha1::digest(text.as_bytes());
    hex::encode(digest)[..6].to_string()
}

pub(super) fn to_raw<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn render_records(records: &[DnsRecordSet]) -> String {
    records
        .iter()
        .map(|r| format!("Record type '{}': {}\n", r.record_type, r.values.join(", ")))
        .collect()
}

/// Derives the full issue list from a snapshot of a scan's raw results.
///
/// Not incremental: every call re-derives every issue, so ids are only stable
/// for an unchanged store.
pub fn materialize(store: &FindingsStore, options: &ScanOptions, now: DateTime<Utc>) -> (Vec<Issue>, FindingsSummary) {
    let mut issues = Issues::new(now);

    lookalike_issues(&mut issues, store);
    dns_resolve_issues(&mut issues, store);
    seg_issues(&mut issues, store);
    spf_issues(&mut issues, store);
    dkim_issues(&mut issues, store);
    dmarc_issues(&mut issues, store);
    subdomain_resolve_issues(&mut issues, store);
    reverse_dns_issues(&mut issues, store);
    reverse_whois_issues(&mut issues, store);
    for category in [ProviderCategory::Cdn, ProviderCategory::Waf, ProviderCategory::Cloud, ProviderCategory::Saas] {
        attribution_issues(&mut issues, store, category);
    }
    subdomain_list_issues(&mut issues, store, options.subdomain_as_new_asset);
    whois_issues(&mut issues, store, options.advanced_whois, now);

    let summary = FindingsSummary::tally(&issues.list);
    (issues.list, summary)
}

fn lookalike_issues(issues: &mut Issues, store: &FindingsStore) {
    for (asset, raw) in store.data(Section::Dnstwist) {
        let RawResult::Lookalikes(domains) = raw else { continue };
        for found in domains {
            let mut description = format!(
                "The domain '{}' looks like '{asset}' ({} permutation) and is registered.\n\nA records: {}",
                found.domain,
                found.fuzzer,
                found.dns_a.join(", ")
            );
            if !found.dns_mx.is_empty() {
                description.push_str(&format!("\nMX records: {}", found.dns_mx.join(", ")));
            }
            let issue = issues.push(
                Severity::Low,
                asset,
                format!("Lookalike domain registered: '{}' ({})", found.domain, found.fuzzer),
                description,
                &["domains", "dnstwist", found.fuzzer.as_str()],
                "dnstwist_lookalike",
                to_raw(found),
            );
            issue.solution = "Check whether the domain is used for phishing and request a takedown if so.".into();
        }
    }
}

fn dns_resolve_issues(issues: &mut Issues, store: &FindingsStore) {
    for (asset, raw) in store.data(Section::DnsResolve) {
        let RawResult::DnsRecords(records) = raw else { continue };
        let rendered = render_records(records);
        issues.push(
            Severity::Info,
            asset,
            format!("DNS Resolution entries for '{asset}' (HASH: {})", short_hash(&rendered)),
            format!("DNS Resolution entries for '{asset}':\n\n{rendered}"),
            &["domains", "dns", "resolution"],
            "dns_resolve",
            to_raw(records),
        );
    }
}

fn seg_issues(issues: &mut Issues, store: &FindingsStore) {
    for (asset, raw) in store.data(Section::SegCheck) {
        let RawResult::Seg(report) = raw else { continue };
        if report.gateways.is_empty() {
            if !report.mx_records.is_empty() {
                issues.push(
                    Severity::Info,
                    asset,
                    "No Secure Email Gateway found".into(),
                    "MX records found but no Secure Email Gateway set\n".into(),
                    &["domains", "no_seg"],
                    "seg_check",
                    to_raw(&report.mx_records),
                );
            }
            continue;
        }
        for gateway in &report.gateways {
            issues.push(
                Severity::Info,
                asset,
                format!("Secure Email Gateway found: {}/{}", gateway.provider, gateway.product),
                format!("{}: {} {}\n", gateway.name, gateway.provider, gateway.product),
                &["domains", "seg"],
                "seg_check",
                json!({ "provider": gateway, "mx_records": report.mx_records }),
            );
        }
    }
}

fn spf_issues(issues: &mut Issues, store: &FindingsStore) {
    for (asset, raw) in store.data(Section::SpfCheck) {
        let RawResult::Spf(analysis) = raw else { continue };
        for spf_issue in &analysis.issues {
            let code = spf_issue.kind.to_string();
            let detail = get_finding_detail(&code);
            let base = detail.map(|d| d.description).unwrap_or_default();
            let mut description = base.to_string();
            if let Some(value) = &spf_issue.value {
                description.push_str(&format!("\n\nThe SPF record is: {value}"));
            }
            if let Some(extra) = &spf_issue.extra_info {
                description.push_str(&format!("\n\n{extra}"));
            }
            let solution = detail.map(|d| d.remediation).unwrap_or("n/a");

            let issue = issues.push(
                detail.map(|d| d.severity).unwrap_or(Severity::Low),
                asset,
                detail.map(|d| d.title.to_string()).unwrap_or(code),
                description,
                &["domains", "spf"],
                "spf_check",
                json!({
                    "description": base,
                    "solution": solution,
                    "parsed": analysis.directives,
                    "value": spf_issue.value,
                    "extra_info": spf_issue.extra_info,
                }),
            );
            issue.solution = solution.to_string();
            if let Some(detail) = detail {
                issue.confidence = detail.confidence;
            }
        }
    }
}

fn dkim_issues(issues: &mut Issues, store: &FindingsStore) {
    for (asset, raw) in store.data(Section::DkimCheck) {
        let RawResult::Dkim(report) = raw else { continue };
        if report.selectors.is_empty() {
            issues.push(
                Severity::Info,
                asset,
                format!("No DKIM selector matched for '{asset}'"),
                format!("DKIM check for '{asset}':\n\ncouldn't find the selector in our list"),
                &["domains", "dkim"],
                "dkim_check",
                to_raw(report),
            );
            continue;
        }
        let listed: String = report.selectors.iter().map(|(selector, value)| format!("{selector}: {value}\n")).collect();
        issues.push(
            Severity::Info,
            asset,
            format!("DKIM check for '{asset}' (HASH: {})", short_hash(&render_records(&report.records))),
            format!("DKIM check for '{asset}':\n\n{listed}"),
            &["domains", "dkim"],
            "dkim_check",
            to_raw(report),
        );
    }
}

fn dmarc_issues(issues: &mut Issues, store: &FindingsStore) {
    for (asset, raw) in store.data(Section::DmarcCheck) {
        let RawResult::Dmarc(report) = raw else { continue };
        let rendered = render_records(&report.records);
        for (code, severity) in &report.findings {
            let detail = get_finding_detail(code);
            let description = match detail {
                Some(d) => format!("{}: {}\n", d.title, d.description),
                None => format!("{code}\n"),
            };
            let issue = issues.push(
                *severity,
                asset,
                format!("DMARC for '{asset}' (HASH: {})", short_hash(&format!("{code}{rendered}"))),
                description,
                &["domains", "dmarc"],
                "dmarc_check",
                to_raw(report),
            );
            if let Some(detail) = detail {
                issue.solution = detail.remediation.to_string();
            }
        }
    }
}

fn subdomain_resolve_issues(issues: &mut Issues, store: &FindingsStore) {
    for (asset, raw) in store.data(Section::SubdomainsResolve) {
        let RawResult::SubdomainRecords(subdomains) = raw else { continue };
        for (subdomain, records) in subdomains {
            let rendered = render_records(records);
            issues.push(
                Severity::Info,
                asset,
                format!("DNS Resolution entries for '{subdomain}' (HASH: {})", short_hash(&rendered)),
                format!("DNS Resolution entries for '{subdomain}':\n\n{rendered}"),
                &["dns", "resolution", "subdomain"],
                "subdomains_resolve",
                json!({ "dns_record": records, "subdomain": subdomain }),
            );
        }
    }
}

fn reverse_dns_issues(issues: &mut Issues, store: &FindingsStore) {
    for (asset, raw) in store.data(Section::ReverseDns) {
        let RawResult::ReverseDns(names) = raw else { continue };
        if names.is_empty() {
            continue;
        }
        let text = format!("IP '{asset}' points to domain name '{}'", names.join(", "));
        issues.push(
            Severity::Info,
            asset,
            text.clone(),
            text,
            &["domains", "dns", "reverse", "lookup"],
            "reverse_dns",
            to_raw(names),
        );
    }
}

fn reverse_whois_issues(issues: &mut Issues, store: &FindingsStore) {
    for (asset, raw) in store.data(Section::ReverseWhois) {
        let RawResult::ReverseWhois(result) = raw else { continue };
        let listed: String = result.domains.iter().map(|d| format!("{d}\n")).collect();
        let hash = short_hash(&listed);
        issues.push(
            Severity::Info,
            asset,
            format!("Reverse Whois lookup on '{asset}' ({hash})"),
            format!("Reverse Whois lookup on '{asset}' ({hash})\nFound domains: {}", result.domains.len()),
            &["domains", "dns", "reverse", "lookup", "whois"],
            "reverse_whois_data",
            to_raw(result),
        );
    }
}

fn attribution_issues(issues: &mut Issues, store: &FindingsStore, category: ProviderCategory) {
    let (section, label) = match category {
        ProviderCategory::Cdn => (Section::CdnCheck, "CDN"),
        ProviderCategory::Waf => (Section::WafCheck, "WAF"),
        ProviderCategory::Cloud => (Section::CloudCheck, "Cloud Provider"),
        ProviderCategory::Saas => (Section::SaasCheck, "SaaS Provider"),
    };
    let category_tag = category.to_string();
    for (asset, raw) in store.data(section) {
        let RawResult::Attribution { attribution, .. } = raw else { continue };
        let text = format!("Behind {label}: '{}'", attribution.provider);
        issues.push(
            Severity::Info,
            asset,
            text.clone(),
            text,
            &[category_tag.as_str(), attribution.provider.as_str()],
            &format!("{category_tag}_check"),
            to_raw(attribution),
        );
    }
}

/// Drops enumeration noise, normalizes case, dedups and sorts.
fn clean_subdomains(found: &[String]) -> Vec<String> {
    let mut clean: Vec<String> = found
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.replace(' ', "").is_empty())
        .filter(|s| !SUBDOMAIN_NOISE.iter().any(|noise| s.contains(noise)))
        .map(|s| s.strip_prefix(PTR_ARCHIVE_PREFIX).map(String::from).unwrap_or(s))
        .collect();
    clean.sort();
    clean.dedup();
    clean
}

fn subdomain_list_issues(issues: &mut Issues, store: &FindingsStore, as_new_asset: bool) {
    for (asset, raw) in store.data(Section::SubdomainsList) {
        let RawResult::Subdomains(found) = raw else { continue };
        let subdomains = clean_subdomains(found);
        let mut listed = String::new();
        for subdomain in &subdomains {
            listed.push_str(subdomain);
            listed.push('\n');
            issues.push(
                Severity::Info,
                if as_new_asset { subdomain } else { asset },
                format!("Subdomain found: {subdomain}"),
                format!("Subdomain found:\n\n{subdomain}"),
                &["domains", "subdomain"],
                "subdomain",
                Value::String(subdomain.clone()),
            );
        }
        issues.push(
            Severity::Info,
            asset,
            format!(
                "List of subdomains for '{asset}' ({} found, HASH: {})",
                subdomains.len(),
                short_hash(&listed)
            ),
            format!("Subdomain list for '{asset}': \n\n{listed}"),
            &["domains", "subdomains"],
            "subdomains_enum",
            to_raw(&subdomains),
        );
    }
}
