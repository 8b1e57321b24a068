// src/core/spf.rs

//! SPF record compliance checks (RFC 7208).
//!
//! [`analyze`] is a pure pass over the TXT answers of one domain. The DNS
//! lookup budget is counted separately by [`count_lookups`], which walks
//! `include:`/`redirect=` chains with an explicit stack and hard limits, so a
//! self-referencing chain ends in [`SpfError::RecursionLimitExceeded`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::debug;

use crate::core::scanner::{DnsLookup, RecordKind};

/// RFC 7208 section 4.6.4.
pub const DNS_LOOKUP_LIMIT: usize = 10;
const MAX_STRING_LENGTH: usize = 255;
const MECHANISMS: [&str; 8] = ["all", "include", "a", "mx", "ptr", "ip4", "ip6", "exists"];

static TERMINATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-~?+]?(all|redirect=)").expect("valid termination regex"));
static ALL_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-~?+]?all$").expect("valid all regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SpfIssueKind {
    NoSpfRecord,
    MultipleSpfRecords,
    StringTooLong,
    DnsLookupLimit,
    DirectivesAfterAll,
    PresenceOfPtr,
    DeprecatedSpfRecord,
    MalformedSpfRecord,
    PermissiveSpfRecord,
    MissSpfRecordTermination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpfIssue {
    pub kind: SpfIssueKind,
    pub value: Option<String>,
    pub extra_info: Option<String>,
}

impl SpfIssue {
    fn new(kind: SpfIssueKind, value: Option<&str>, extra_info: Option<String>) -> Self {
        Self { kind, value: value.map(String::from), extra_info }
    }
}

/// One parsed term, mechanism or modifier. Modifiers always carry `+`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpfDirective {
    pub qualifier: char,
    pub name: String,
    pub value: String,
}

impl SpfDirective {
    fn new(qualifier: char, name: &str, value: &str) -> Self {
        Self { qualifier, name: name.to_string(), value: value.to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpfAnalysis {
    pub directives: Vec<SpfDirective>,
    pub issues: Vec<SpfIssue>,
}

/// Checks the TXT answers of a domain, given in presentation form (each
/// character-string quoted). Only the first `v=spf1` record is parsed.
///
/// # Arguments
/// * `answers` - Every TXT record of the domain.
///
/// # Returns
/// The directives of the first SPF record in encounter order, and the policy
/// issues found.
pub fn analyze<S: AsRef<str>>(answers: &[S]) -> SpfAnalysis {
    let mut analysis = SpfAnalysis::default();
    let mut spf_records = 0usize;

    for raw in answers.iter().map(AsRef::as_ref) {
        let joined = raw.strip_prefix('"').unwrap_or(raw);
        let joined = joined.strip_suffix('"').unwrap_or(joined).replace("\" \"", "");
        if !joined.to_lowercase().contains("v=spf1") {
            continue;
        }
        spf_records += 1;
        if spf_records == 1 {
            parse_record(raw, joined, &mut analysis);
        }
    }

    let others = || {
        let listed: Vec<&str> = answers.iter().map(AsRef::as_ref).collect();
        format!("Other DNS TXT records are: {}.", listed.join(", "))
    };
    match spf_records {
        0 => {
            let extra = if answers.is_empty() { "There is no DNS TXT record.".to_string() } else { others() };
            analysis.issues.push(SpfIssue::new(SpfIssueKind::NoSpfRecord, None, Some(extra)));
        }
        1 => {}
        _ => analysis.issues.push(SpfIssue::new(SpfIssueKind::MultipleSpfRecords, None, Some(others()))),
    }
    analysis
}

fn parse_record(raw: &str, mut value: String, analysis: &mut SpfAnalysis) {
    let issues = &mut analysis.issues;
    let malformed = |issues: &mut Vec<SpfIssue>, value: &str, info: &str| {
        issues.push(SpfIssue::new(SpfIssueKind::MalformedSpfRecord, Some(value), Some(info.to_string())));
    };

    if value.starts_with(' ') {
        malformed(issues, &value, "There is an extra space before the start of the string.");
        value = value.trim_start_matches(' ').to_string();
    }
    if value.ends_with(' ') {
        malformed(issues, &value, "There is an extra space after the end of the string.");
        value = value.trim_end_matches(' ').to_string();
    }
    if value.starts_with('"') || value.ends_with('"') {
        malformed(issues, &value, "The SPF record is surrounded quotation marks.");
        value = value.trim_matches('"').to_string();
    }

    // The version tag is not a directive.
    let tokens: Vec<&str> = value.split_whitespace().skip(1).collect();

    if let Some(pos) = tokens.iter().position(|t| ALL_TOKEN.is_match(&t.to_lowercase())) {
        if pos + 1 < tokens.len() {
            issues.push(SpfIssue::new(
                SpfIssueKind::DirectivesAfterAll,
                Some(&value),
                Some(format!("These directives after \"all\" are ignored: {}.", tokens[pos + 1..].join(" "))),
            ));
        }
    }

    for piece in raw.trim_matches('"').split("\" \"") {
        let length = piece.chars().count();
        if length > MAX_STRING_LENGTH {
            issues.push(SpfIssue::new(
                SpfIssueKind::StringTooLong,
                Some(&value),
                Some(format!("This part is {length} characters long, and therefore too long: {piece}.")),
            ));
        }
    }

    let terminated = tokens.last().is_some_and(|last| TERMINATION.is_match(&last.to_lowercase()));
    if !terminated {
        issues.push(SpfIssue::new(SpfIssueKind::MissSpfRecordTermination, Some(&value), None));
    }

    for token in &tokens {
        // Modifiers; unknown ones are ignored by receivers.
        if let Some((name, modifier_value)) = token.split_once('=') {
            analysis
                .directives
                .push(SpfDirective::new('+', &name.to_lowercase(), &modifier_value.to_lowercase()));
            continue;
        }

        let lower = token.to_lowercase();
        let (mut name, mechanism_value) = match lower.split_once(':') {
            Some((name, rest)) => (name, rest.to_string()),
            None => match lower.find('/') {
                Some(idx) => (&lower[..idx], lower[idx..].to_string()),
                None => (lower.as_str(), String::new()),
            },
        };
        let mut qualifier = '+';
        if let Some(first) = name.chars().next().filter(|c| matches!(c, '+' | '-' | '~' | '?')) {
            qualifier = first;
            name = &name[1..];
        }

        if !MECHANISMS.contains(&name) {
            issues.push(SpfIssue::new(
                SpfIssueKind::MalformedSpfRecord,
                Some(&value),
                Some(format!("'{name}' is an illegal term.")),
            ));
        }
        if name == "ptr" {
            issues.push(SpfIssue::new(SpfIssueKind::PresenceOfPtr, Some(&value), None));
        } else if name == "all" && matches!(qualifier, '+' | '?') {
            issues.push(SpfIssue::new(SpfIssueKind::PermissiveSpfRecord, Some(&value), None));
        }

        analysis.directives.push(SpfDirective::new(qualifier, name, &mechanism_value));
    }
}

/// Which ceiling of [`LookupLimits`] ended an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LookupLimit {
    Depth,
    Queries,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpfError {
    #[error("SPF evaluation hit its {limit} limit at depth {depth}")]
    RecursionLimitExceeded { depth: usize, limit: LookupLimit },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupLimits {
    /// Deepest `include:`/`redirect=` nesting followed.
    pub max_depth: usize,
    /// Total TXT queries allowed for one evaluation.
    pub max_queries: usize,
}

impl Default for LookupLimits {
    fn default() -> Self {
        Self { max_depth: 20, max_queries: 500 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupCount {
    pub count: usize,
    /// `(domain, record)` for every SPF record visited, in visit order.
    pub records: Vec<(String, String)>,
}

/// Counts the DNS-querying terms met while evaluating `domain`'s SPF policy,
/// following `include:` and `redirect=` targets depth-first.
///
/// # Arguments
/// * `dns` - Resolver used for every TXT query.
/// * `domain` - The domain whose policy is evaluated.
/// * `limits` - Nesting depth and total query ceilings.
///
/// # Returns
/// The term count with the visited records, or `RecursionLimitExceeded`
/// carrying the depth reached and the ceiling that was hit.
pub async fn count_lookups(
    dns: &dyn DnsLookup,
    domain: &str,
    limits: LookupLimits,
) -> Result<LookupCount, SpfError> {
    let mut result = LookupCount::default();
    let mut stack = vec![(domain.to_string(), 0usize)];
    let mut queries = 0usize;

    while let Some((name, depth)) = stack.pop() {
        queries += 1;
        let limit = if depth > limits.max_depth {
            Some(LookupLimit::Depth)
        } else if queries > limits.max_queries {
            Some(LookupLimit::Queries)
        } else {
            None
        };
        if let Some(limit) = limit {
            debug!(domain, depth, queries, %limit, "SPF lookup limits reached");
            return Err(SpfError::RecursionLimitExceeded { depth, limit });
        }

        let Some(records) = dns.lookup(&name, RecordKind::Txt).await else {
            continue;
        };
        let Some(record) = records.values.into_iter().find(|v| v.to_lowercase().starts_with("v=spf1")) else {
            continue;
        };

        let (terms, targets) = lookup_terms(&record);
        result.count += terms;
        result.records.push((name, record));
        // Reversed so the first target is visited first.
        stack.extend(targets.into_iter().rev().map(|t| (t, depth + 1)));
    }
    Ok(result)
}

/// Returns the number of lookup-causing terms and the domains to follow.
fn lookup_terms(record: &str) -> (usize, Vec<String>) {
    let mut count = 0;
    let mut targets = Vec::new();
    for token in record.split_whitespace().skip(1) {
        let lower = token.to_lowercase();
        let term = lower.strip_prefix(['+', '-', '~', '?']).unwrap_or(&lower);
        if let Some(target) = term.strip_prefix("include:").or_else(|| term.strip_prefix("redirect=")) {
            count += 1;
            if !target.is_empty() {
                targets.push(target.to_string());
            }
        } else {
            let name = term.split([':', '/']).next().unwrap_or_default();
            if matches!(name, "a" | "mx" | "ptr" | "exists") {
                count += 1;
            }
        }
    }
    (count, targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::DnsRecordSet;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn issue(kind: SpfIssueKind, value: Option<&str>, extra: Option<&str>) -> SpfIssue {
        SpfIssue { kind, value: value.map(String::from), extra_info: extra.map(String::from) }
    }

    #[test]
    fn parses_a_clean_record() {
        let analysis = analyze(&["v=spf1 include:spf.protection.outlook.com -all"]);
        assert!(analysis.issues.is_empty());
        assert_eq!(
            analysis.directives,
            vec![
                SpfDirective::new('+', "include", "spf.protection.outlook.com"),
                SpfDirective::new('-', "all", ""),
            ]
        );
        assert_eq!(analysis, analyze(&["v=spf1 include:spf.protection.outlook.com -all"]));
    }

    #[test]
    fn no_txt_record_at_all() {
        let analysis = analyze::<&str>(&[]);
        assert_eq!(
            analysis.issues,
            vec![issue(SpfIssueKind::NoSpfRecord, None, Some("There is no DNS TXT record."))]
        );
        assert!(analysis.directives.is_empty());
    }

    #[test]
    fn no_spf_among_other_records() {
        let analysis = analyze(&["\"BLA-BLA-BLA\"", "\"BLA-BLA-BLA-2\""]);
        assert_eq!(
            analysis.issues,
            vec![issue(
                SpfIssueKind::NoSpfRecord,
                None,
                Some("Other DNS TXT records are: \"BLA-BLA-BLA\", \"BLA-BLA-BLA-2\".")
            )]
        );
        assert!(analysis.directives.is_empty());
    }

    #[test]
    fn multiple_records_still_parse_the_first() {
        let records = [
            "\"v=spf1 include:spf.protection.outlook -all\"",
            "\"v=spf1 include:_spf.google.com ~all\"",
            "\"v=spf1 redirect=_spf.facebook.com\"",
        ];
        let analysis = analyze(&records);
        assert_eq!(
            analysis.issues,
            vec![issue(
                SpfIssueKind::MultipleSpfRecords,
                None,
                Some(&format!("Other DNS TXT records are: {}.", records.join(", ")))
            )]
        );
        assert_eq!(analysis.directives.len(), 2);
    }

    #[test]
    fn directives_after_all() {
        let analysis = analyze(&["\"v=spf1 ~all include:spf.protection.outlook -all\""]);
        assert_eq!(
            analysis.issues,
            vec![issue(
                SpfIssueKind::DirectivesAfterAll,
                Some("v=spf1 ~all include:spf.protection.outlook -all"),
                Some("These directives after \"all\" are ignored: include:spf.protection.outlook -all.")
            )]
        );
    }

    #[test]
    fn string_too_long() {
        let long = format!("v=spf1 include:verylo{}g -all", "o".repeat(300));
        let analysis = analyze(&[format!("\"{long}\"")]);
        let expected = format!(
            "This part is {} characters long, and therefore too long: {long}.",
            long.chars().count()
        );
        assert_eq!(analysis.issues, vec![issue(SpfIssueKind::StringTooLong, Some(&long), Some(&expected))]);
    }

    #[test]
    fn split_strings_are_measured_separately() {
        let first = format!("v=spf1 include:verylo{}", "o".repeat(200));
        let ok_second = format!("{}g -all", "o".repeat(200));
        let analysis = analyze(&[format!("\"{first}\" \"{ok_second}\"")]);
        assert!(analysis.issues.is_empty());

        let long_second = format!("{}g -all", "o".repeat(250));
        let analysis = analyze(&[format!("\"{first}\" \"{long_second}\"")]);
        assert_eq!(analysis.issues.len(), 1);
        assert_eq!(analysis.issues[0].kind, SpfIssueKind::StringTooLong);
        assert_eq!(
            analysis.issues[0].extra_info.as_deref(),
            Some(format!("This part is 256 characters long, and therefore too long: {long_second}.").as_str())
        );
        assert_eq!(analysis.issues[0].value.as_deref(), Some(format!("{first}{long_second}").as_str()));
    }

    #[test]
    fn ptr_is_flagged() {
        let analysis = analyze(&["\"v=spf1 include:spf.protection.outlook ptr -all\""]);
        assert_eq!(
            analysis.issues,
            vec![issue(SpfIssueKind::PresenceOfPtr, Some("v=spf1 include:spf.protection.outlook ptr -all"), None)]
        );
    }

    #[test]
    fn extra_spaces_and_quotes_are_reported() {
        let analysis = analyze(&["\" v=spf1 include:spf.protection.outlook -all\""]);
        assert_eq!(
            analysis.issues,
            vec![issue(
                SpfIssueKind::MalformedSpfRecord,
                Some(" v=spf1 include:spf.protection.outlook -all"),
                Some("There is an extra space before the start of the string.")
            )]
        );

        let analysis = analyze(&["\"v=spf1 include:spf.protection.outlook -all \""]);
        assert_eq!(
            analysis.issues,
            vec![issue(
                SpfIssueKind::MalformedSpfRecord,
                Some("v=spf1 include:spf.protection.outlook -all "),
                Some("There is an extra space after the end of the string.")
            )]
        );

        let analysis = analyze(&["\"\"v=spf1 include:spf.protection.outlook -all\"\""]);
        assert_eq!(
            analysis.issues,
            vec![issue(
                SpfIssueKind::MalformedSpfRecord,
                Some("\"v=spf1 include:spf.protection.outlook -all\""),
                Some("The SPF record is surrounded quotation marks.")
            )]
        );
    }

    #[test]
    fn illegal_terms() {
        let analysis = analyze(&["\"v=spf1 include:spf.protection.outlook includes:spf.protection.outlook -all\""]);
        assert_eq!(
            analysis.issues,
            vec![issue(
                SpfIssueKind::MalformedSpfRecord,
                Some("v=spf1 include:spf.protection.outlook includes:spf.protection.outlook -all"),
                Some("'includes' is an illegal term.")
            )]
        );

        let analysis = analyze(&["\"v=spf1 include:spf.protection.outlook -alll\""]);
        assert_eq!(
            analysis.issues,
            vec![issue(
                SpfIssueKind::MalformedSpfRecord,
                Some("v=spf1 include:spf.protection.outlook -alll"),
                Some("'alll' is an illegal term.")
            )]
        );
    }

    #[test]
    fn case_insensitive() {
        assert!(analyze(&["\"V=SPF1 InClUdE:spf.protection.outlook -All\""]).issues.is_empty());
    }

    #[test]
    fn permissive_all() {
        for record in ["v=spf1 include:spf.protection.outlook all", "v=spf1 include:spf.protection.outlook +all", "v=spf1 include:spf.protection.outlook ?all"] {
            let analysis = analyze(&[format!("\"{record}\"")]);
            assert_eq!(analysis.issues, vec![issue(SpfIssueKind::PermissiveSpfRecord, Some(record), None)]);
        }
    }

    #[test]
    fn termination() {
        let analysis = analyze(&["\"v=spf1 include:spf.protection.outlook\""]);
        assert_eq!(
            analysis.issues,
            vec![issue(SpfIssueKind::MissSpfRecordTermination, Some("v=spf1 include:spf.protection.outlook"), None)]
        );
        assert!(analyze(&["\"v=spf1 include:spf.protection.outlook -all\""]).issues.is_empty());
        assert!(analyze(&["\"v=spf1 redirect=_spf.facebook.com\""]).issues.is_empty());

        let bare = analyze(&["v=spf1"]);
        assert_eq!(bare.issues, vec![issue(SpfIssueKind::MissSpfRecordTermination, Some("v=spf1"), None)]);
    }

    #[test]
    fn cidr_and_ip6_values() {
        let analysis = analyze(&["v=spf1 a/24 ip6:2a01:111:f400::/48 -all"]);
        assert!(analysis.issues.is_empty());
        assert_eq!(analysis.directives[0], SpfDirective::new('+', "a", "/24"));
        assert_eq!(analysis.directives[1], SpfDirective::new('+', "ip6", "2a01:111:f400::/48"));
    }

    /// Serves TXT values by name; `fallback` answers every unknown name.
    struct ScriptedTxt {
        records: HashMap<String, String>,
        fallback: Option<String>,
    }

    #[async_trait]
    impl DnsLookup for ScriptedTxt {
        async fn lookup(&self, name: &str, kind: RecordKind) -> Option<DnsRecordSet> {
            if kind != RecordKind::Txt {
                return None;
            }
            let value = self.records.get(name).or(self.fallback.as_ref())?.clone();
            Some(DnsRecordSet { record_type: "TXT".into(), answers: vec![format!("\"{value}\"")], values: vec![value] })
        }
    }

    #[tokio::test]
    async fn counts_includes_across_the_chain() {
        let records = [
            ("patrowl.io", "v=spf1 include:spf.protection.outlook.com include:servers.mcsv.net include:7593890.spf10.hubspotemail.net -all"),
            ("spf.protection.outlook.com", "v=spf1 ip4:40.92.0.0/15 ip6:2a01:111:f400::/48 -all"),
            ("servers.mcsv.net", "v=spf1 ip4:205.201.128.0/20 -all"),
            ("7593890.spf10.hubspotemail.net", "v=spf1 ip4:3.93.157.0/24 -all"),
        ];
        let dns = ScriptedTxt {
            records: records.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            fallback: None,
        };

        let count = count_lookups(&dns, "patrowl.io", LookupLimits::default()).await.unwrap();
        assert_eq!(count.count, 3);
        assert_eq!(count.records.len(), 4);
        assert_eq!(count.records[0].0, "patrowl.io");
        assert_eq!(count.records[1].0, "spf.protection.outlook.com");
    }

    #[tokio::test]
    async fn counts_other_lookup_terms() {
        let dns = ScriptedTxt {
            records: [("example.com".to_string(), "v=spf1 a mx:mail.example.com ptr exists:%{i}.x.example.com ip4:192.0.2.1 -all".to_string())]
                .into_iter()
                .collect(),
            fallback: None,
        };
        let count = count_lookups(&dns, "example.com", LookupLimits::default()).await.unwrap();
        assert_eq!(count.count, 4);
    }

    #[tokio::test]
    async fn self_referencing_chain_hits_the_depth_limit() {
        let dns = ScriptedTxt {
            records: HashMap::new(),
            fallback: Some("v=spf1 include:spf.protection.outlook.com -all".into()),
        };
        let limits = LookupLimits { max_depth: 20, max_queries: 500 };
        let err = count_lookups(&dns, "patrowl.io", limits).await.unwrap_err();
        assert_eq!(err, SpfError::RecursionLimitExceeded { depth: 21, limit: LookupLimit::Depth });
    }

    #[tokio::test]
    async fn wide_fan_out_hits_the_query_budget() {
        let wide = format!(
            "v=spf1 {} -all",
            (0..10).map(|i| format!("include:n{i}.example")).collect::<Vec<_>>().join(" ")
        );
        let dns = ScriptedTxt { records: HashMap::new(), fallback: Some(wide) };
        let limits = LookupLimits { max_depth: 50, max_queries: 100 };
        assert!(matches!(
            count_lookups(&dns, "example.com", limits).await,
            Err(SpfError::RecursionLimitExceeded { limit: LookupLimit::Queries, .. })
        ));
    }

    #[tokio::test]
    async fn missing_records_count_nothing() {
        let dns = ScriptedTxt { records: HashMap::new(), fallback: None };
        let count = count_lookups(&dns, "example.com", LookupLimits::default()).await.unwrap();
        assert_eq!(count, LookupCount::default());
    }
}
