// src/core/scanner/attribution.rs

//! CDN/WAF/Cloud/SaaS attribution of addresses against published subnets.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use serde::Deserialize;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

use super::{failure, DnsLookup, Probe, RecordKind};
use crate::core::error::{EngineError, EngineResult, ProbeResult};
use crate::core::findings::RawResult;
use crate::core::models::{Asset, AssetKind, Attribution};
use crate::core::options::{CheckConfig, ProviderCategory};

#[derive(Debug, Deserialize)]
struct ProviderRanges {
    #[serde(default)]
    ipv4: Vec<String>,
    #[serde(default)]
    ipv6: Vec<String>,
}

/// Provider subnets per category, in dataset order.
#[derive(Debug, Clone, Default)]
pub struct IpRangeDataset {
    categories: HashMap<ProviderCategory, Vec<(String, Vec<IpNetwork>)>>,
}

impl IpRangeDataset {
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::configuration(format!("failed to read {}: {e}", path.display())))?;
        let dataset = Self::from_json(&content)
            .map_err(|e| EngineError::configuration(format!("failed to parse {}: {e}", path.display())))?;
        info!(path = %path.display(), providers = dataset.len(), "IP range dataset loaded");
        Ok(dataset)
    }

    /// Parses `{category: {provider: {"ipv4": [subnets]}}}`. Unknown
    /// categories and unparsable subnets are skipped.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, BTreeMap<String, ProviderRanges>> = serde_json::from_str(content)?;
        let mut categories = HashMap::new();

        for category in ProviderCategory::iter() {
            let Some(providers) = raw.get(&category.to_string()) else { continue };
            let parsed: Vec<(String, Vec<IpNetwork>)> = providers
                .iter()
                .map(|(provider, ranges)| {
                    let networks = ranges
                        .ipv4
                        .iter()
                        .chain(&ranges.ipv6)
                        .filter_map(|subnet| match subnet.parse::<IpNetwork>() {
                            Ok(net) => Some(net),
                            Err(e) => {
                                warn!(%provider, %subnet, error = %e, "skipping invalid subnet");
                                None
                            }
                        })
                        .collect();
                    (provider.clone(), networks)
                })
                .collect();
            categories.insert(category, parsed);
        }
        Ok(Self { categories })
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first provider of `category` whose subnets contain `ip`.
    pub fn classify(&self, ip: IpAddr, category: ProviderCategory) -> Option<Attribution> {
        let (provider, _) = self
            .categories
            .get(&category)?
            .iter()
            .find(|(_, networks)| networks.iter().any(|net| net.contains(ip)))?;
        Some(Attribution {
            provider: provider.clone(),
            attributes: vec![category.to_string()],
            address: ip.to_string(),
        })
    }
}

pub struct AttributionProbe {
    dns: Arc<dyn DnsLookup>,
    dataset: Arc<IpRangeDataset>,
}

impl AttributionProbe {
    pub fn new(dns: Arc<dyn DnsLookup>, dataset: Arc<IpRangeDataset>) -> Self {
        Self { dns, dataset }
    }

    /// Addresses to classify: the asset itself, or the A records of a name.
    async fn targets(&self, asset: &Asset) -> Vec<IpAddr> {
        match asset.datatype {
            AssetKind::Ip => asset.value.parse().into_iter().collect(),
            AssetKind::Domain | AssetKind::Fqdn => self
                .dns
                .lookup(&asset.value, RecordKind::A)
                .await
                .map(|records| records.values.iter().filter_map(|v| v.parse().ok()).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl Probe for AttributionProbe {
    async fn invoke(&self, asset: &Asset, check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        let CheckConfig::Attribution(category) = check else {
            return Err(failure(asset, check, "not an attribution check"));
        };
        let targets = self.targets(asset).await;
        debug!(asset = %asset.value, %category, targets = targets.len(), "classifying addresses");

        Ok(targets
            .into_iter()
            .find_map(|ip| self.dataset.classify(ip, *category))
            .map(|attribution| RawResult::Attribution { category: *category, attribution })
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::StaticDns;
    use super::*;

    const RANGES: &str = r#"{
        "cdn": {
            "cloudflare": {"ipv4": ["104.16.0.0/13", "not-a-subnet"]},
            "fastly": {"ipv4": ["151.101.0.0/16"]}
        },
        "waf": {"imperva": {"ipv4": ["45.60.0.0/16"]}},
        "parking": {"sedo": {"ipv4": ["91.195.240.0/23"]}}
    }"#;

    fn dataset() -> Arc<IpRangeDataset> {
        Arc::new(IpRangeDataset::from_json(RANGES).unwrap())
    }

    #[test]
    fn classifies_by_category() {
        let data = dataset();
        assert_eq!(data.len(), 3);
        let hit = data.classify("104.17.1.1".parse().unwrap(), ProviderCategory::Cdn).unwrap();
        assert_eq!(hit.provider, "cloudflare");
        assert_eq!(hit.attributes, vec!["cdn"]);
        assert!(data.classify("104.17.1.1".parse().unwrap(), ProviderCategory::Waf).is_none());
        assert!(data.classify("91.195.240.1".parse().unwrap(), ProviderCategory::Saas).is_none());
    }

    #[tokio::test]
    async fn domains_are_resolved_first() {
        let dns = StaticDns::default().with("www.example.com", RecordKind::A, &["198.51.100.1", "151.101.1.1"]);
        let probe = AttributionProbe::new(Arc::new(dns), dataset());

        let asset = Asset::new("www.example.com", AssetKind::Fqdn);
        let result = probe.invoke(&asset, &CheckConfig::Attribution(ProviderCategory::Cdn)).await.unwrap();
        let [RawResult::Attribution { attribution, .. }] = result.as_slice() else { panic!("unexpected {result:?}") };
        assert_eq!(attribution.provider, "fastly");
        assert_eq!(attribution.address, "151.101.1.1");

        let unresolved = Asset::new("nothing.example.com", AssetKind::Fqdn);
        let result = probe.invoke(&unresolved, &CheckConfig::Attribution(ProviderCategory::Cdn)).await.unwrap();
        assert!(result.is_empty());
    }
}
