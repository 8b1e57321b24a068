// src/core/scanner/dns_scanner.rs

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;
use tracing::{debug, info, warn};

use super::{failure, resolve_all, DnsLookup, Probe, RecordKind};
use crate::config::EngineConfig;
use crate::core::error::{EngineResult, ProbeResult};
use crate::core::findings::RawResult;
use crate::core::models::{Asset, DnsRecordSet};
use crate::core::options::CheckConfig;

/// The network DNS collaborator, backed by a Tokio-based asynchronous resolver.
pub struct HickoryDns {
    resolver: TokioAsyncResolver,
}

impl HickoryDns {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let servers: Vec<NameServerConfig> = config
            .nameserver_addrs()?
            .into_iter()
            .map(|addr| NameServerConfig::new(addr, Protocol::Udp))
            .collect();
        let resolver_config = ResolverConfig::from_parts(None, vec![], NameServerConfigGroup::from(servers));

        let mut opts = ResolverOpts::default();
        opts.timeout = config.dns_timeout();
        opts.attempts = 2;

        info!(nameservers = ?config.nameservers, "DNS resolver configured");
        Ok(Self { resolver: TokioAsyncResolver::tokio(resolver_config, opts) })
    }
}

fn record_type(kind: RecordKind) -> RecordType {
    match kind {
        RecordKind::Cname => RecordType::CNAME,
        RecordKind::A => RecordType::A,
        RecordKind::Aaaa => RecordType::AAAA,
        RecordKind::Mx => RecordType::MX,
        RecordKind::Ns => RecordType::NS,
        RecordKind::Txt => RecordType::TXT,
        RecordKind::Soa => RecordType::SOA,
        RecordKind::Srv => RecordType::SRV,
        RecordKind::Ptr => RecordType::PTR,
        RecordKind::Spf => RecordType::from(99u16),
    }
}

/// Renders one answer as `(presentation form, value)`. TXT character-strings
/// are quoted in the former and concatenated in the latter.
fn render(rdata: &RData) -> (String, String) {
    match rdata {
        RData::TXT(txt) => {
            let pieces: Vec<String> =
                txt.txt_data().iter().map(|piece| String::from_utf8_lossy(piece).into_owned()).collect();
            let quoted: Vec<String> = pieces.iter().map(|p| format!("\"{p}\"")).collect();
            (quoted.join(" "), pieces.concat())
        }
        other => {
            let text = other.to_string();
            (text.clone(), text)
        }
    }
}

#[async_trait]
impl DnsLookup for HickoryDns {
    async fn lookup(&self, name: &str, kind: RecordKind) -> Option<DnsRecordSet> {
        match self.resolver.lookup(name, record_type(kind)).await {
            Ok(answer) => {
                let (answers, values): (Vec<String>, Vec<String>) = answer.iter().map(render).unzip();
                if answers.is_empty() {
                    return None;
                }
                debug!(name, %kind, count = answers.len(), "DNS answer");
                Some(DnsRecordSet { record_type: kind.to_string(), values, answers })
            }
            Err(e) => {
                match e.kind() {
                    ResolveErrorKind::NoRecordsFound { .. } | ResolveErrorKind::Timeout => {
                        debug!(name, %kind, error = %e, "no DNS data");
                    }
                    _ => warn!(name, %kind, error = %e, "DNS lookup failed"),
                }
                None
            }
        }
    }

    async fn reverse(&self, ip: IpAddr) -> Vec<String> {
        match self.resolver.reverse_lookup(ip).await {
            Ok(names) => names.iter().map(|ptr| ptr.to_string().trim_end_matches('.').to_string()).collect(),
            Err(e) => {
                debug!(%ip, error = %e, "no PTR record");
                Vec::new()
            }
        }
    }
}

/// Resolves the standard record types of a domain.
pub struct DnsResolveProbe {
    dns: Arc<dyn DnsLookup>,
}

impl DnsResolveProbe {
    pub fn new(dns: Arc<dyn DnsLookup>) -> Self {
        Self { dns }
    }
}

#[async_trait]
impl Probe for DnsResolveProbe {
    async fn invoke(&self, asset: &Asset, _check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        let records = resolve_all(self.dns.as_ref(), &asset.value).await;
        debug!(asset = %asset.value, types = records.len(), "DNS resolution done");
        if records.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![RawResult::DnsRecords(records)])
    }
}

pub struct ReverseDnsProbe {
    dns: Arc<dyn DnsLookup>,
}

impl ReverseDnsProbe {
    pub fn new(dns: Arc<dyn DnsLookup>) -> Self {
        Self { dns }
    }
}

#[async_trait]
impl Probe for ReverseDnsProbe {
    async fn invoke(&self, asset: &Asset, check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        let ip: IpAddr = asset
            .value
            .parse()
            .map_err(|e| failure(asset, check, format!("not an IP address: {e}")))?;
        let names = self.dns.reverse(ip).await;
        if names.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![RawResult::ReverseDns(names)])
    }
}
