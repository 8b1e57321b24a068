// src/core/knowledge_base.rs

//! Static catalog of the mail-security findings the engine can raise, with the
//! human-readable explanation and remediation attached to each code.

use crate::core::models::{Confidence, Severity};
use std::fmt;

/// Groups catalog entries for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FindingCategory {
    Spf,
    Dmarc,
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingCategory::Spf => write!(f, "SPF Policy"),
            FindingCategory::Dmarc => write!(f, "DMARC Policy"),
        }
    }
}

pub struct FindingDetail {
    /// Machine-readable code, e.g. `NO_SPF_RECORD` or `insecure_dmarc_policy`.
    pub code: &'static str,
    pub title: &'static str,
    pub category: FindingCategory,
    pub severity: Severity,
    pub confidence: Confidence,
    pub description: &'static str,
    pub remediation: &'static str,
}

static FINDINGS: &[FindingDetail] = &[
    // --- SPF (RFC 7208) ---
    FindingDetail {
        code: "NO_SPF_RECORD",
        title: "No SPF record",
        category: FindingCategory::Spf,
        severity: Severity::Low,
        confidence: Confidence::Certain,
        description: "An SPF (Sender Policy Framework) record defines the mail servers and domains that are allowed to send email on behalf of your domain. It also tells receiving servers what to do with messages after they're checked.",
        remediation: "List which servers are allowed to send email on behalf of your domain, and add an SPF record on that domain. If your domain doesn't send mail, this SPF record must be added: v=spf1 -all, or at least v=spf1 ~all",
    },
    FindingDetail {
        code: "MULTIPLE_SPF_RECORDS",
        title: "Multiple SPF records",
        category: FindingCategory::Spf,
        severity: Severity::Low,
        confidence: Confidence::Certain,
        description: "A domain name must not have multiple records that would cause an authorization check to select more than one record (see RFC 7208, Section 3.2).",
        remediation: "Keep only one SPF record and delete the others: you should always update your SPF record, rather than creating a new record in addition to the existing one.",
    },
    FindingDetail {
        code: "STRING_TOO_LONG",
        title: "String longer than 255 characters",
        category: FindingCategory::Spf,
        severity: Severity::Low,
        confidence: Confidence::Certain,
        description: "A TXT record string cannot be longer than 255 characters (see RFC 7208, Section 3.3).",
        remediation: "A single TXT record can be composed of more than one string, which are useful in constructing records that would exceed the 255-octet maximum length of a character-string within a single TXT record.",
    },
    FindingDetail {
        code: "DNS_LOOKUP_LIMIT",
        title: "High number of DNS lookup",
        category: FindingCategory::Spf,
        severity: Severity::Low,
        confidence: Confidence::Certain,
        description: "The following terms cause DNS queries: the INCLUDE, A, MX, PTR, and EXISTS mechanisms, and the REDIRECT modifier. SPF implementations limit the total number of those terms to 10 during SPF evaluation, to avoid unreasonable load on the DNS.",
        remediation: "Review and adjust if necessary.",
    },
    FindingDetail {
        code: "DIRECTIVES_AFTER_ALL",
        title: "Directives after ALL not allowed",
        category: FindingCategory::Spf,
        severity: Severity::Low,
        confidence: Confidence::Certain,
        description: "Mechanisms after ALL will never be tested and are ignored by mail servers (see RFC 7208, Section 5.1).",
        remediation: "Be sure to insert all desired tags before the ~all stipulation or the ensuing text will be disregarded.",
    },
    FindingDetail {
        code: "PRESENCE_OF_PTR",
        title: "Mechanism PTR not recommended",
        category: FindingCategory::Spf,
        severity: Severity::Low,
        confidence: Confidence::Certain,
        description: "Use of PTR is discouraged, because it is slow and not as reliable as other mechanisms in cases of DNS errors, and it places a large burden on the .arpa name servers (see RFC 7208, Section 5.5). Besides, several senders may ignore the SPF record when this mechanism is used.",
        remediation: "Alternative mechanisms should be used instead. If used, proper PTR records have to be in place for the domain's hosts and the PTR mechanism should be one of the last mechanisms checked.",
    },
    FindingDetail {
        code: "DEPRECATED_SPF_RECORD",
        title: "Deprecated SPF record",
        category: FindingCategory::Spf,
        severity: Severity::Low,
        confidence: Confidence::Certain,
        description: "SPF (Sender Policy Framework) records must now only be published as a TXT resource record type, with code 16, and not with formerly supported SPF resource record type, with code 99 (see RFC 7208, Section 14.1).",
        remediation: "Change SPF resource record type (code 99) to TXT resource record (code 16).",
    },
    FindingDetail {
        code: "MALFORMED_SPF_RECORD",
        title: "Malformed SPF record",
        category: FindingCategory::Spf,
        severity: Severity::Low,
        confidence: Confidence::Certain,
        description: "The SPF record does not follow the record syntax, so receiving servers may reject it or evaluate it differently than intended.",
        remediation: "Rewrite the record so that it is a single unquoted string starting with v=spf1, without leading or trailing spaces, and using only the mechanisms all, include, a, mx, ptr, ip4, ip6 and exists.",
    },
    FindingDetail {
        code: "PERMISSIVE_SPF_RECORD",
        title: "Permissive SPF record",
        category: FindingCategory::Spf,
        severity: Severity::Low,
        confidence: Confidence::Certain,
        description: "An SPF record is interpreted from left to right, the all mechanism will match all senders that did not match the preceding mechanisms. Therefore, you should place the all mechanism at the end of the SPF record, and use it with the ~ (softfail) or - (fail) prefix. Do note that if no prefix is set, the + (pass) is used by default. This setup is discouraged.",
        remediation: "Use more strict mechanism like '-all', or '~all' if you do not feel ready yet.",
    },
    FindingDetail {
        code: "MISS_SPF_RECORD_TERMINATION",
        title: "Miss SPF record termination",
        category: FindingCategory::Spf,
        severity: Severity::Low,
        confidence: Confidence::Certain,
        description: "An SPF record should conclude with either an 'all' mechanism or a 'redirect' modifier.",
        remediation: "End the record with '-all', '~all' or a 'redirect=' modifier.",
    },

    // --- DMARC ---
    FindingDetail {
        code: "no_dmarc_record",
        title: "No DMARC record",
        category: FindingCategory::Dmarc,
        severity: Severity::Info,
        confidence: Confidence::Certain,
        description: "DMARC tells receiving mail servers how to handle emails that fail SPF and DKIM checks. Without it, spoofed mail from the domain is handled at the receiver's discretion.",
        remediation: "Publish a TXT record at _dmarc.<domain>. Start with 'v=DMARC1; p=none; rua=mailto:...' and move to 'p=quarantine' or 'p=reject' once reports look clean.",
    },
    FindingDetail {
        code: "insecure_dmarc_policy",
        title: "DMARC policy is 'none'",
        category: FindingCategory::Dmarc,
        severity: Severity::High,
        confidence: Confidence::Certain,
        description: "The DMARC policy is in monitoring mode. Failing messages are reported but never quarantined or rejected.",
        remediation: "Once legitimate senders pass SPF and DKIM, set 'p=quarantine' or 'p=reject'.",
    },
    FindingDetail {
        code: "insecure_dmarc_subdomain_sp",
        title: "DMARC subdomain policy is 'none'",
        category: FindingCategory::Dmarc,
        severity: Severity::High,
        confidence: Confidence::Certain,
        description: "The 'sp=none' tag leaves every subdomain without enforcement, so attackers can spoof any name under the domain.",
        remediation: "Set 'sp=quarantine' or 'sp=reject', or drop the tag so subdomains inherit the main policy.",
    },
    FindingDetail {
        code: "dmarc_partial_coverage",
        title: "DMARC policy applies to a fraction of messages",
        category: FindingCategory::Dmarc,
        severity: Severity::Medium,
        confidence: Confidence::Certain,
        description: "The 'pct' tag is below 100, so the policy is only enforced on a sample of failing messages.",
        remediation: "Raise 'pct' to 100 (or remove it) once the policy has been validated.",
    },
];

/// Looks a finding up by code.
pub fn get_finding_detail(code: &str) -> Option<&'static FindingDetail> {
    FINDINGS.iter().find(|f| f.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        for (i, a) in FINDINGS.iter().enumerate() {
            assert!(FINDINGS[i + 1..].iter().all(|b| b.code != a.code), "duplicate {}", a.code);
        }
    }

    #[test]
    fn spf_findings_are_low_and_certain() {
        for f in FINDINGS.iter().filter(|f| f.category == FindingCategory::Spf) {
            assert_eq!(f.severity, Severity::Low);
            assert_eq!(f.confidence, Confidence::Certain);
        }
        assert_eq!(get_finding_detail("insecure_dmarc_policy").unwrap().severity, Severity::High);
        assert!(get_finding_detail("NOPE").is_none());
    }
}
