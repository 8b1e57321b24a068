// src/core/scanner/mod.rs

//! Probe seams and the default collaborators behind them.
//!
//! A probe turns one `(asset, check)` pair into raw results. Probes never
//! touch the findings store; the engine merges what they return.

pub mod attribution;
pub mod dns_scanner;
pub mod lookalike;
pub mod mail_scanner;
pub mod subdomain_scanner;
pub mod whois_scanner;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use strum::{Display, EnumIter};
use tracing::info;

use crate::config::EngineConfig;
use crate::core::error::{EngineResult, ProbeFailure, ProbeResult};
use crate::core::findings::RawResult;
use crate::core::models::{Asset, DnsRecordSet};
use crate::core::options::{CheckConfig, CheckKind, ProviderCategory};

use self::attribution::{AttributionProbe, IpRangeDataset};
use self::dns_scanner::{DnsResolveProbe, HickoryDns, ReverseDnsProbe};
use self::lookalike::LookalikeProbe;
use self::mail_scanner::{DkimProbe, DmarcProbe, SegDataset, SegProbe, SpfProbe};
use self::subdomain_scanner::{BruteforceProbe, CrtSh, SubdomainEnumProbe};
use self::whois_scanner::{Port43Whois, ReverseWhoisProbe, WhoisFreaks, WhoisProbe};

/// DNS record types the engine asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "UPPERCASE")]
pub enum RecordKind {
    Cname,
    A,
    Aaaa,
    Mx,
    Ns,
    Txt,
    Soa,
    Srv,
    Ptr,
    /// Legacy RR type 99.
    Spf,
}

impl RecordKind {
    /// Types queried by the resolve checks.
    pub const RESOLVE_SET: [RecordKind; 8] = [
        RecordKind::Cname,
        RecordKind::A,
        RecordKind::Aaaa,
        RecordKind::Mx,
        RecordKind::Ns,
        RecordKind::Txt,
        RecordKind::Soa,
        RecordKind::Srv,
    ];
}

/// The DNS collaborator. Every negative outcome (no answer, NXDOMAIN,
/// timeout) is `None`.
#[async_trait]
pub trait DnsLookup: Send + Sync {
    async fn lookup(&self, name: &str, kind: RecordKind) -> Option<DnsRecordSet>;

    /// PTR names of an address.
    async fn reverse(&self, _ip: IpAddr) -> Vec<String> {
        Vec::new()
    }
}

/// Resolves every type of [`RecordKind::RESOLVE_SET`], keeping the ones that answered.
pub async fn resolve_all(dns: &dyn DnsLookup, name: &str) -> Vec<DnsRecordSet> {
    let lookups = RecordKind::RESOLVE_SET.into_iter().map(|kind| dns.lookup(name, kind));
    futures::future::join_all(lookups).await.into_iter().flatten().collect()
}

/// A failure of `check` on `asset`, for probes to return.
pub(crate) fn failure(asset: &Asset, check: &CheckConfig, reason: impl Into<String>) -> ProbeFailure {
    ProbeFailure::new(check.kind().to_string(), asset.value.clone(), reason)
}

/// One check kind run against one asset.
///
/// Implementations must be safe to call concurrently for several assets of
/// the same scan.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Runs the check.
    ///
    /// # Arguments
    /// * `asset` - An asset whose datatype the check accepts.
    /// * `check` - The validated check and its parameters.
    ///
    /// # Returns
    /// Zero or more raw results to merge, or a failure to record for the pair.
    async fn invoke(&self, asset: &Asset, check: &CheckConfig) -> ProbeResult<Vec<RawResult>>;
}

/// The probe registered for each check kind.
#[derive(Clone, Default)]
pub struct ProbeSet {
    probes: HashMap<CheckKind, Arc<dyn Probe>>,
}

impl ProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: CheckKind, probe: Arc<dyn Probe>) -> Self {
        self.probes.insert(kind, probe);
        self
    }

    pub fn get(&self, kind: CheckKind) -> Option<Arc<dyn Probe>> {
        self.probes.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Wires the network-backed collaborators for every check kind.
    pub fn standard(config: &EngineConfig) -> EngineResult<Self> {
        let dns: Arc<dyn DnsLookup> = Arc::new(HickoryDns::new(config)?);
        let whois = Arc::new(Port43Whois::default());
        let ranges = Arc::new(match &config.external_ip_ranges_path {
            Some(path) => IpRangeDataset::from_file(path)?,
            None => IpRangeDataset::default(),
        });
        let segs = Arc::new(match &config.seg_path {
            Some(path) => SegDataset::from_file(path)?,
            None => SegDataset::builtin(),
        });

        let mut set = Self::new()
            .with(CheckKind::DnsResolve, Arc::new(DnsResolveProbe::new(dns.clone())))
            .with(CheckKind::ReverseDns, Arc::new(ReverseDnsProbe::new(dns.clone())))
            .with(CheckKind::Whois, Arc::new(WhoisProbe::new(whois.clone())))
            .with(
                CheckKind::ReverseWhois,
                Arc::new(ReverseWhoisProbe::new(
                    Arc::new(WhoisFreaks::new(config.whoisfreaks_api_tokens.clone())),
                    whois,
                )),
            )
            .with(CheckKind::SubdomainEnum, Arc::new(SubdomainEnumProbe::new(Arc::new(CrtSh::new()), dns.clone())))
            .with(CheckKind::SubdomainBruteforce, Arc::new(BruteforceProbe::new(dns.clone())))
            .with(CheckKind::SegCheck, Arc::new(SegProbe::new(dns.clone(), segs)))
            .with(
                CheckKind::SpfCheck,
                Arc::new(SpfProbe::new(dns.clone(), config.spf_max_depth, config.spf_max_queries)),
            )
            .with(CheckKind::DkimCheck, Arc::new(DkimProbe::new(dns.clone(), config.dkim_selectors.clone())))
            .with(CheckKind::DmarcCheck, Arc::new(DmarcProbe::new(dns.clone())))
            .with(CheckKind::Lookalike, Arc::new(LookalikeProbe::new(dns.clone())));

        let attribution: Arc<dyn Probe> = Arc::new(AttributionProbe::new(dns, ranges));
        for category in [ProviderCategory::Cdn, ProviderCategory::Waf, ProviderCategory::Cloud, ProviderCategory::Saas] {
            set = set.with(CheckConfig::Attribution(category).kind(), attribution.clone());
        }

        info!(probes = set.len(), "standard probes ready");
        Ok(set)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticDns;
    use super::*;

    #[test]
    fn record_kinds_render_uppercase() {
        assert_eq!(RecordKind::Aaaa.to_string(), "AAAA");
        assert_eq!(RecordKind::Cname.to_string(), "CNAME");
        assert!(!RecordKind::RESOLVE_SET.contains(&RecordKind::Ptr));
    }

    #[tokio::test]
    async fn resolve_all_keeps_answered_types_in_order() {
        let dns = StaticDns::default()
            .with("example.com", RecordKind::Txt, &["v=spf1 -all"])
            .with("example.com", RecordKind::A, &["192.0.2.1"]);
        let records = resolve_all(&dns, "example.com").await;
        let types: Vec<&str> = records.iter().map(|r| r.record_type.as_str()).collect();
        assert_eq!(types, vec!["A", "TXT"]);
        assert_eq!(records[1].answers, vec!["\"v=spf1 -all\""]);
    }
}
