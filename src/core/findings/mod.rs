// src/core/findings/mod.rs

//! Raw probe output, accumulated per scan until it is materialized into issues.

mod materialize;
mod whois;

pub use materialize::materialize;

use std::collections::btree_map::Entry as MapEntry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::core::error::ProbeFailure;
use crate::core::models::{
    Attribution, DkimReport, DmarcReport, DnsRecordSet, LookalikeDomain, ReverseWhoisResult, SegReport,
    WhoisLookup,
};
use crate::core::options::{CheckKind, ProviderCategory};
use crate::core::spf::SpfAnalysis;

/// Where a raw result is filed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Section {
    Dnstwist,
    DnsResolve,
    SegCheck,
    SpfCheck,
    DkimCheck,
    DmarcCheck,
    SubdomainsResolve,
    ReverseDns,
    ReverseWhois,
    CdnCheck,
    WafCheck,
    CloudCheck,
    SaasCheck,
    SubdomainsList,
    Whois,
}

impl Section {
    /// The section a failed check is recorded under.
    pub fn for_check(kind: CheckKind) -> Self {
        match kind {
            CheckKind::DnsResolve => Section::DnsResolve,
            CheckKind::ReverseDns => Section::ReverseDns,
            CheckKind::Whois => Section::Whois,
            CheckKind::ReverseWhois => Section::ReverseWhois,
            CheckKind::SubdomainEnum | CheckKind::SubdomainBruteforce => Section::SubdomainsList,
            CheckKind::SegCheck => Section::SegCheck,
            CheckKind::SpfCheck => Section::SpfCheck,
            CheckKind::DkimCheck => Section::DkimCheck,
            CheckKind::DmarcCheck => Section::DmarcCheck,
            CheckKind::Lookalike => Section::Dnstwist,
            CheckKind::CdnCheck => Section::CdnCheck,
            CheckKind::WafCheck => Section::WafCheck,
            CheckKind::CloudCheck => Section::CloudCheck,
            CheckKind::SaasCheck => Section::SaasCheck,
        }
    }

    fn for_category(category: ProviderCategory) -> Self {
        match category {
            ProviderCategory::Cdn => Section::CdnCheck,
            ProviderCategory::Waf => Section::WafCheck,
            ProviderCategory::Cloud => Section::CloudCheck,
            ProviderCategory::Saas => Section::SaasCheck,
        }
    }
}

/// What a probe hands back for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RawResult {
    DnsRecords(Vec<DnsRecordSet>),
    /// Discovered subdomain → its records.
    SubdomainRecords(BTreeMap<String, Vec<DnsRecordSet>>),
    ReverseDns(Vec<String>),
    Whois(WhoisLookup),
    ReverseWhois(ReverseWhoisResult),
    Subdomains(Vec<String>),
    Seg(SegReport),
    Spf(SpfAnalysis),
    Dkim(DkimReport),
    Dmarc(DmarcReport),
    Lookalikes(Vec<LookalikeDomain>),
    Attribution { category: ProviderCategory, attribution: Attribution },
}

impl RawResult {
    pub fn section(&self) -> Section {
        match self {
            RawResult::DnsRecords(_) => Section::DnsResolve,
            RawResult::SubdomainRecords(_) => Section::SubdomainsResolve,
            RawResult::ReverseDns(_) => Section::ReverseDns,
            RawResult::Whois(_) => Section::Whois,
            RawResult::ReverseWhois(_) => Section::ReverseWhois,
            RawResult::Subdomains(_) => Section::SubdomainsList,
            RawResult::Seg(_) => Section::SegCheck,
            RawResult::Spf(_) => Section::SpfCheck,
            RawResult::Dkim(_) => Section::DkimCheck,
            RawResult::Dmarc(_) => Section::DmarcCheck,
            RawResult::Lookalikes(_) => Section::Dnstwist,
            RawResult::Attribution { category, .. } => Section::for_category(*category),
        }
    }

    /// List-valued results are unioned; everything else is replaced.
    fn absorb(&mut self, incoming: RawResult) {
        match (self, incoming) {
            (RawResult::Subdomains(current), RawResult::Subdomains(new)) => union_into(current, new),
            (RawResult::ReverseWhois(current), RawResult::ReverseWhois(new)) => {
                union_into(&mut current.domains, new.domains);
                union_into(&mut current.types, new.types);
                current.value = new.value;
            }
            (RawResult::SubdomainRecords(current), RawResult::SubdomainRecords(new)) => current.extend(new),
            (slot, incoming) => *slot = incoming,
        }
    }
}

fn union_into(current: &mut Vec<String>, new: Vec<String>) {
    for item in new {
        if !current.contains(&item) {
            current.push(item);
        }
    }
}

/// One `(section, asset)` slot: data, or the reason the probe produced none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entry {
    Data(RawResult),
    Failed(ProbeFailure),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingsStore {
    sections: BTreeMap<Section, BTreeMap<String, Entry>>,
}

impl FindingsStore {
    /// Stores one probe result under its section.
    ///
    /// # Arguments
    /// * `asset` - The asset the probe ran on.
    /// * `raw` - The result; list-valued ones are unioned with what is stored,
    ///   others replace it.
    pub fn merge(&mut self, asset: &str, raw: RawResult) {
        let section = raw.section();
        match self.sections.entry(section).or_default().entry(asset.to_string()) {
            MapEntry::Vacant(slot) => {
                slot.insert(Entry::Data(raw));
            }
            MapEntry::Occupied(slot) => {
                let current = slot.into_mut();
                match current {
                    Entry::Data(existing) => existing.absorb(raw),
                    Entry::Failed(_) => *current = Entry::Data(raw),
                }
            }
        }
    }

    /// Records a failure marker unless the slot already holds data.
    pub fn record_failure(&mut self, section: Section, failure: ProbeFailure) {
        match self.sections.entry(section).or_default().entry(failure.asset.clone()) {
            MapEntry::Vacant(slot) => {
                slot.insert(Entry::Failed(failure));
            }
            MapEntry::Occupied(mut slot) => {
                if matches!(slot.get(), Entry::Data(_)) {
                    debug!(%section, asset = %failure.asset, "keeping earlier data over failure");
                } else {
                    slot.insert(Entry::Failed(failure));
                }
            }
        }
    }

    pub fn get(&self, section: Section, asset: &str) -> Option<&Entry> {
        self.sections.get(&section)?.get(asset)
    }

    /// Successful results of a section, ordered by asset.
    pub fn data(&self, section: Section) -> impl Iterator<Item = (&str, &RawResult)> {
        self.entries(section).filter_map(|(asset, entry)| match entry {
            Entry::Data(raw) => Some((asset, raw)),
            Entry::Failed(_) => None,
        })
    }

    pub fn failures(&self, section: Section) -> impl Iterator<Item = (&str, &ProbeFailure)> {
        self.entries(section).filter_map(|(asset, entry)| match entry {
            Entry::Failed(failure) => Some((asset, failure)),
            Entry::Data(_) => None,
        })
    }

    fn entries(&self, section: Section) -> impl Iterator<Item = (&str, &Entry)> {
        self.sections.get(&section).into_iter().flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.sections.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
