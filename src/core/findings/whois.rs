// src/core/findings/whois.rs

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use super::materialize::{short_hash, to_raw, Issues};
use super::{FindingsStore, RawResult, Section};
use crate::core::models::{Severity, WhoisLookup, WhoisRecord, WhoisTarget};

const RENEW: &str = "Renew the domain";

fn no_match(issues: &mut Issues, asset: &str, details: &str) {
    issues.push(
        Severity::Info,
        asset,
        format!("[Whois] No match for '{asset}'"),
        format!(
            "No Whois data available for domain '{asset}'. Note that Whois is available for registered domains only (not sub-domains): \n{details}"
        ),
        &["whois"],
        "whois_domain_error",
        json!({ "details": details }),
    );
}

/// Full-info and error issues for every asset, then the per-field ones when
/// `advanced` is set.
pub(super) fn whois_issues(issues: &mut Issues, store: &FindingsStore, advanced: bool, now: DateTime<Utc>) {
    for (asset, failure) in store.failures(Section::Whois) {
        no_match(issues, asset, &failure.reason);
    }

    for (asset, raw) in store.data(Section::Whois) {
        let RawResult::Whois(lookup) = raw else { continue };
        match lookup {
            WhoisLookup::NoMatch { details } => no_match(issues, asset, details),
            WhoisLookup::Found(record) => {
                let target = record.target.to_string();
                issues.push(
                    Severity::Info,
                    asset,
                    format!("Whois info for '{asset}' (HASH: {})", short_hash(&record.text)),
                    format!("Whois Info (raw): \n\n{}", record.text),
                    &["whois", target.as_str()],
                    &format!("whois_{target}_fullinfo"),
                    to_raw(record),
                );
            }
        }
    }

    if !advanced {
        return;
    }
    for (asset, raw) in store.data(Section::Whois) {
        if let RawResult::Whois(WhoisLookup::Found(record)) = raw {
            if record.target == WhoisTarget::Domain {
                advanced_issues(issues, asset, record, now);
            }
        }
    }
}

fn advanced_issues(issues: &mut Issues, asset: &str, record: &WhoisRecord, now: DateTime<Utc>) {
    if let Some(first) = record.status.first() {
        issues.push(
            Severity::Info,
            asset,
            format!("[Whois] '{asset}' domain has status '{first}'"),
            format!("[Whois] '{asset}' domain has status: \n{}", record.status.join(",\n")),
            &["whois", "domain"],
            "whois_domain_status",
            json!({ "status": record.status }),
        );
    }

    if let Some(registrar) = &record.registrar {
        issues.push(
            Severity::Info,
            asset,
            format!("[Whois] '{asset}' domain registrar is '{registrar}'"),
            format!(
                "[Whois] '{asset}' domain registrar is '{registrar}': \nName: {registrar}\nID: {}\nURL(s): {}\n",
                record.registrar_id.as_deref().unwrap_or("n/a"),
                record.registrar_url.join(", ")
            ),
            &["whois", "domain"],
            "whois_registrar",
            json!({
                "registrar_name": registrar,
                "registrar_id": record.registrar_id,
                "registrar_url": record.registrar_url,
            }),
        );
    }

    if !record.emails.is_empty() {
        issues.push(
            Severity::Info,
            asset,
            format!("[Whois] '{asset}' domain contact emails are set."),
            format!("[Whois] '{asset}' domain contact emails are: \n{}", record.emails.join(",\n")),
            &["whois", "domain"],
            "whois_emails",
            json!({ "emails": record.emails }),
        );
    }

    if !record.name_servers.is_empty() {
        issues.push(
            Severity::Info,
            asset,
            format!("[Whois] '{asset}' domain nameservers are set."),
            format!("[Whois] '{asset}' domain nameservers are: \n{}", record.name_servers.join(",\n")),
            &["whois", "domain"],
            "whois_nameservers",
            json!({ "nameservers": record.name_servers }),
        );
    }

    if let Some(latest) = record.updated_date.iter().max() {
        let dates: Vec<String> = record.updated_date.iter().map(|d| d.to_rfc3339()).collect();
        issues.push(
            Severity::Info,
            asset,
            format!("[Whois] '{asset}' domain was lastly updated the '{}'", latest.to_rfc3339()),
            format!("[Whois] '{asset}' domain was updated at the following dates: \n{}", dates.join(",\n")),
            &["whois", "domain"],
            "whois_update_dates",
            json!({ "updated_date": dates }),
        );
    }

    if let Some(created) = record.creation_date {
        issues.push(
            Severity::Info,
            asset,
            format!("[Whois] '{asset}' domain was created the '{}'", created.to_rfc3339()),
            format!("[Whois] '{asset}' domain was created the '{}'", created.to_rfc3339()),
            &["whois", "domain"],
            "whois_creation_dates",
            json!({ "creation_date": created }),
        );
    }

    if let Some(expires) = record.expiration_date {
        expiry_issues(issues, asset, expires, now);
    }
}

fn expiry_issues(issues: &mut Issues, asset: &str, expires: DateTime<Utc>, now: DateTime<Utc>) {
    let date = expires.to_rfc3339();
    issues.push(
        Severity::Info,
        asset,
        format!("[Whois] '{asset}' domain is registered until '{date}'"),
        format!("[Whois] '{asset}' domain is registered until '{date}'"),
        &["whois", "domain"],
        "whois_expiration_dates",
        json!({ "expiration_date": expires }),
    );

    // Only the tightest window applies.
    let (severity, title) = if expires < now {
        (Severity::High, format!("[Whois] '{asset}' domain is expired since '{date}'"))
    } else if expires < now + Duration::days(15) {
        (Severity::High, format!("[Whois] '{asset}' domain will expire soon: '{date}' (less than 2 weeks)"))
    } else if expires < now + Duration::days(90) {
        (Severity::Medium, format!("[Whois] '{asset}' domain will expire soon: '{date}' (less than 3 months)"))
    } else if expires < now + Duration::days(182) + Duration::hours(12) {
        (Severity::Low, format!("[Whois] '{asset}' domain will expire soon: '{date}' (less than 6 months)"))
    } else {
        return;
    };
    let issue = issues.push(
        severity,
        asset,
        title.clone(),
        title,
        &["whois", "domain"],
        "whois_expiration_dates",
        json!({ "expiration_date": expires }),
    );
    issue.solution = RENEW.to_string();
}
