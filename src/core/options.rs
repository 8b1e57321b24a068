// src/core/options.rs

//! Scan options in two forms: the string-keyed flags a start request carries,
//! and the validated list of checks the dispatcher schedules.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::config::EngineConfig;
use crate::core::error::{EngineError, EngineResult};
use crate::core::models::AssetKind;

/// Upper bound on a per-request `max_timeout`, one week.
pub const MAX_TIMEOUT_SECS: i64 = 7 * 24 * 3600;

/// The kinds of checks the engine knows how to schedule. Each maps to one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckKind {
    DnsResolve,
    ReverseDns,
    Whois,
    ReverseWhois,
    SubdomainEnum,
    SubdomainBruteforce,
    SegCheck,
    SpfCheck,
    DkimCheck,
    DmarcCheck,
    Lookalike,
    CdnCheck,
    WafCheck,
    CloudCheck,
    SaasCheck,
}

/// How a check is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    /// Submitted to the fixed-size worker pool; the result is merged when the
    /// registry polls the completed handle.
    Pooled,
    /// A multi-step chain run as its own task that merges its consolidated
    /// result on completion.
    Background,
}

impl CheckKind {
    pub fn discipline(self) -> Discipline {
        match self {
            CheckKind::SpfCheck | CheckKind::DkimCheck | CheckKind::DmarcCheck => Discipline::Background,
            _ => Discipline::Pooled,
        }
    }
}

/// IP-attribution dataset categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderCategory {
    Cdn,
    Waf,
    Cloud,
    Saas,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookalikeOptions {
    /// Alternative TLDs to try; empty disables TLD swapping.
    pub tlds: Vec<String>,
    pub check_mx: bool,
    pub timeout: Duration,
}

/// One enabled check with its own typed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckConfig {
    DnsResolve,
    ReverseDns,
    Whois { domains_only: bool },
    ReverseWhois { max_pages: u32 },
    SubdomainEnum { resolve: bool },
    SubdomainBruteforce,
    SegCheck,
    SpfCheck,
    DkimCheck,
    DmarcCheck,
    Lookalike(LookalikeOptions),
    Attribution(ProviderCategory),
}

impl CheckConfig {
    pub fn kind(&self) -> CheckKind {
        match self {
            CheckConfig::DnsResolve => CheckKind::DnsResolve,
            CheckConfig::ReverseDns => CheckKind::ReverseDns,
            CheckConfig::Whois { .. } => CheckKind::Whois,
            CheckConfig::ReverseWhois { .. } => CheckKind::ReverseWhois,
            CheckConfig::SubdomainEnum { .. } => CheckKind::SubdomainEnum,
            CheckConfig::SubdomainBruteforce => CheckKind::SubdomainBruteforce,
            CheckConfig::SegCheck => CheckKind::SegCheck,
            CheckConfig::SpfCheck => CheckKind::SpfCheck,
            CheckConfig::DkimCheck => CheckKind::DkimCheck,
            CheckConfig::DmarcCheck => CheckKind::DmarcCheck,
            CheckConfig::Lookalike(_) => CheckKind::Lookalike,
            CheckConfig::Attribution(ProviderCategory::Cdn) => CheckKind::CdnCheck,
            CheckConfig::Attribution(ProviderCategory::Waf) => CheckKind::WafCheck,
            CheckConfig::Attribution(ProviderCategory::Cloud) => CheckKind::CloudCheck,
            CheckConfig::Attribution(ProviderCategory::Saas) => CheckKind::SaasCheck,
        }
    }

    /// Whether this check applies to an asset of the given datatype.
    pub fn accepts(&self, datatype: AssetKind) -> bool {
        use AssetKind::*;
        match self {
            CheckConfig::Whois { domains_only: true } => datatype == Domain,
            CheckConfig::Whois { domains_only: false } => matches!(datatype, Domain | Ip | Fqdn),
            CheckConfig::ReverseWhois { .. } => matches!(datatype, Domain | Fqdn | Keyword | Email),
            CheckConfig::ReverseDns => datatype == Ip,
            CheckConfig::SegCheck => matches!(datatype, Domain | Fqdn),
            CheckConfig::Attribution(ProviderCategory::Cdn) => matches!(datatype, Ip | Domain | Fqdn),
            CheckConfig::Attribution(_) => datatype == Ip,
            CheckConfig::DnsResolve
            | CheckConfig::SubdomainEnum { .. }
            | CheckConfig::SubdomainBruteforce
            | CheckConfig::SpfCheck
            | CheckConfig::DkimCheck
            | CheckConfig::DmarcCheck
            | CheckConfig::Lookalike(_) => datatype == Domain,
        }
    }
}

/// The flags of a start request, as sent by the shell. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionFlags {
    pub do_dns_resolve: bool,
    pub do_subdomains_resolve: bool,
    pub do_reverse_dns: bool,
    pub do_whois: bool,
    pub do_advanced_whois: bool,
    pub do_reverse_whois: bool,
    pub do_subdomain_enum: bool,
    pub do_subdomain_bruteforce: bool,
    pub do_seg_check: bool,
    pub do_spf_check: bool,
    pub do_dkim_check: bool,
    pub do_dmarc_check: bool,
    pub do_dnstwist_subdomain_search: bool,
    pub do_cdn_check: bool,
    pub do_waf_check: bool,
    pub do_cloud_check: bool,
    pub do_saas_check: bool,
    pub reverse_whois_max_pages: Option<i64>,
    pub subdomain_as_new_asset: bool,
    pub dnstwist_check_tld: bool,
    pub dnstwist_check_mx: bool,
    pub max_timeout: Option<i64>,
}

/// Validated options of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    pub checks: Vec<CheckConfig>,
    /// Emit the per-field WHOIS issues on top of the full-info one.
    pub advanced_whois: bool,
    /// Target discovered subdomains directly instead of their parent asset.
    pub subdomain_as_new_asset: bool,
}

impl ScanOptions {
    pub fn from_flags(flags: &OptionFlags, config: &EngineConfig) -> EngineResult<Self> {
        let max_pages = match flags.reverse_whois_max_pages {
            Some(pages) if pages <= 0 || pages > i64::from(u32::MAX) => {
                return Err(EngineError::invalid_options(format!(
                    "reverse_whois_max_pages must be a positive integer, got {pages}"
                )));
            }
            Some(pages) => pages as u32,
            None => config.reverse_whois_max_pages,
        };
        let timeout = match flags.max_timeout {
            Some(secs) if secs <= 0 || secs > MAX_TIMEOUT_SECS => {
                return Err(EngineError::invalid_options(format!(
                    "max_timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds, got {secs}"
                )));
            }
            Some(secs) => Duration::from_secs(secs as u64),
            None => Duration::from_secs(config.scan_timeout_secs),
        };

        let mut checks = Vec::new();
        if flags.do_whois || flags.do_advanced_whois {
            checks.push(CheckConfig::Whois { domains_only: !flags.do_whois });
        }
        if flags.do_subdomain_enum {
            checks.push(CheckConfig::SubdomainEnum { resolve: flags.do_subdomains_resolve });
        }
        if flags.do_dns_resolve || flags.do_subdomains_resolve {
            checks.push(CheckConfig::DnsResolve);
        }
        if flags.do_seg_check {
            checks.push(CheckConfig::SegCheck);
        }
        if flags.do_spf_check {
            checks.push(CheckConfig::SpfCheck);
        }
        if flags.do_dkim_check {
            checks.push(CheckConfig::DkimCheck);
        }
        if flags.do_dmarc_check {
            checks.push(CheckConfig::DmarcCheck);
        }
        if flags.do_subdomain_bruteforce {
            checks.push(CheckConfig::SubdomainBruteforce);
        }
        if flags.do_reverse_dns {
            checks.push(CheckConfig::ReverseDns);
        }
        if flags.do_dnstwist_subdomain_search {
            checks.push(CheckConfig::Lookalike(LookalikeOptions {
                tlds: if flags.dnstwist_check_tld { config.lookalike_common_tlds.clone() } else { Vec::new() },
                check_mx: flags.dnstwist_check_mx,
                timeout,
            }));
        }
        if flags.do_reverse_whois {
            checks.push(CheckConfig::ReverseWhois { max_pages });
        }
        for (enabled, category) in [
            (flags.do_cdn_check, ProviderCategory::Cdn),
            (flags.do_waf_check, ProviderCategory::Waf),
            (flags.do_cloud_check, ProviderCategory::Cloud),
            (flags.do_saas_check, ProviderCategory::Saas),
        ] {
            if enabled {
                checks.push(CheckConfig::Attribution(category));
            }
        }

        Ok(Self {
            checks,
            advanced_whois: flags.do_advanced_whois,
            subdomain_as_new_asset: flags.subdomain_as_new_asset,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(json: &str) -> OptionFlags {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn unknown_and_disabled_keys_schedule_nothing() {
        let config = EngineConfig::default();
        let options =
            ScanOptions::from_flags(&flags(r#"{"do_nmap": true, "do_whois": false}"#), &config).unwrap();
        assert!(options.is_empty());
    }

    #[test]
    fn advanced_whois_alone_only_targets_domains() {
        let config = EngineConfig::default();
        let options = ScanOptions::from_flags(&flags(r#"{"do_advanced_whois": true}"#), &config).unwrap();
        assert_eq!(options.checks, vec![CheckConfig::Whois { domains_only: true }]);
        assert!(options.advanced_whois);
        assert!(!options.checks[0].accepts(AssetKind::Ip));

        let both = ScanOptions::from_flags(&flags(r#"{"do_whois": true, "do_advanced_whois": true}"#), &config)
            .unwrap();
        assert_eq!(both.checks, vec![CheckConfig::Whois { domains_only: false }]);
        assert!(both.checks[0].accepts(AssetKind::Ip));
    }

    #[test]
    fn subdomains_resolve_implies_dns_resolve_once() {
        let config = EngineConfig::default();
        let options = ScanOptions::from_flags(
            &flags(r#"{"do_dns_resolve": true, "do_subdomains_resolve": true, "do_subdomain_enum": true}"#),
            &config,
        )
        .unwrap();
        assert_eq!(
            options.checks,
            vec![CheckConfig::SubdomainEnum { resolve: true }, CheckConfig::DnsResolve]
        );
    }

    #[test]
    fn rejects_non_positive_pages_and_timeouts() {
        let config = EngineConfig::default();
        let err = ScanOptions::from_flags(
            &flags(r#"{"do_reverse_whois": true, "reverse_whois_max_pages": 0}"#),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidOptions { .. }));

        let err = ScanOptions::from_flags(&flags(r#"{"max_timeout": -5}"#), &config).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOptions { .. }));
    }

    #[test]
    fn rejects_timeouts_past_the_upper_bound() {
        let config = EngineConfig::default();
        let huge = format!(r#"{{"do_dnstwist_subdomain_search": true, "max_timeout": {}}}"#, i64::MAX);
        let err = ScanOptions::from_flags(&flags(&huge), &config).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOptions { .. }));

        let edge = format!(r#"{{"do_dnstwist_subdomain_search": true, "max_timeout": {MAX_TIMEOUT_SECS}}}"#);
        let options = ScanOptions::from_flags(&flags(&edge), &config).unwrap();
        let [CheckConfig::Lookalike(lookalike)] = options.checks.as_slice() else {
            panic!("unexpected {:?}", options.checks);
        };
        assert_eq!(lookalike.timeout, Duration::from_secs(MAX_TIMEOUT_SECS as u64));
    }

    #[test]
    fn reverse_whois_pages_default_from_config() {
        let config = EngineConfig { reverse_whois_max_pages: 3, ..EngineConfig::default() };
        let options = ScanOptions::from_flags(&flags(r#"{"do_reverse_whois": true}"#), &config).unwrap();
        assert_eq!(options.checks, vec![CheckConfig::ReverseWhois { max_pages: 3 }]);
    }

    #[test]
    fn mail_checks_run_in_background() {
        assert_eq!(CheckKind::SpfCheck.discipline(), Discipline::Background);
        assert_eq!(CheckKind::DmarcCheck.discipline(), Discipline::Background);
        assert_eq!(CheckKind::Whois.discipline(), Discipline::Pooled);
        assert_eq!(CheckKind::Lookalike.discipline(), Discipline::Pooled);
    }

    #[test]
    fn attribution_datatypes() {
        assert!(CheckConfig::Attribution(ProviderCategory::Cdn).accepts(AssetKind::Fqdn));
        assert!(!CheckConfig::Attribution(ProviderCategory::Waf).accepts(AssetKind::Domain));
        assert_eq!(CheckConfig::Attribution(ProviderCategory::Saas).kind(), CheckKind::SaasCheck);
    }
}
