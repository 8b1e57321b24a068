// src/core/scanner/lookalike.rs

//! Lookalike-domain search: permutations of the asset's first label (and
//! optionally its TLD), kept when they resolve.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use super::{failure, DnsLookup, Probe, RecordKind};
use crate::core::error::ProbeResult;
use crate::core::findings::RawResult;
use crate::core::models::{Asset, LookalikeDomain};
use crate::core::options::{CheckConfig, LookalikeOptions};

const LOOKUP_CONCURRENCY: usize = 20;
const VOWELS: &[char] = &['a', 'e', 'i', 'o', 'u', 'y'];

/// QWERTY neighbours of each key.
fn keyboard_neighbours(c: char) -> &'static str {
    match c {
        '1' => "2q", '2' => "3wq1", '3' => "4ew2", '4' => "5re3", '5' => "6tr4",
        '6' => "7yt5", '7' => "8uy6", '8' => "9iu7", '9' => "0oi8", '0' => "po9",
        'q' => "12wa", 'w' => "3esaq2", 'e' => "4rdsw3", 'r' => "5tfde4", 't' => "6ygfr5",
        'y' => "7uhgt6", 'u' => "8ijhy7", 'i' => "9okju8", 'o' => "0plki9", 'p' => "lo0",
        'a' => "qwsz", 's' => "edxzaw", 'd' => "rfcxse", 'f' => "tgvcdr", 'g' => "yhbvft",
        'h' => "ujnbgy", 'j' => "ikmnhu", 'k' => "olmji", 'l' => "kop",
        'z' => "asx", 'x' => "zsdc", 'c' => "xdfv", 'v' => "cfgb", 'b' => "vghn",
        'n' => "bhjm", 'm' => "njk",
        _ => "",
    }
}

/// Candidate names, each tagged with the fuzzer that produced it first.
pub fn permutations(domain: &str, tlds: &[String]) -> BTreeMap<String, &'static str> {
    let Some((label, tld)) = domain.split_once('.') else {
        return BTreeMap::new();
    };
    let chars: Vec<char> = label.chars().collect();
    let rebuild = |cs: &[char]| -> String { cs.iter().collect() };
    let mut labels: Vec<(&'static str, String)> = Vec::new();

    for c in ('a'..='z').chain('0'..='9') {
        labels.push(("addition", format!("{label}{c}")));
    }
    for i in 0..chars.len() {
        let mut omitted = chars.clone();
        omitted.remove(i);
        labels.push(("omission", rebuild(&omitted)));

        let mut repeated = chars.clone();
        repeated.insert(i, chars[i]);
        labels.push(("repetition", rebuild(&repeated)));

        for neighbour in keyboard_neighbours(chars[i]).chars() {
            let mut replaced = chars.clone();
            replaced[i] = neighbour;
            labels.push(("replacement", rebuild(&replaced)));
        }
        if VOWELS.contains(&chars[i]) {
            for vowel in VOWELS.iter().filter(|v| **v != chars[i]) {
                let mut swapped = chars.clone();
                swapped[i] = *vowel;
                labels.push(("vowel-swap", rebuild(&swapped)));
            }
        }
        if i + 1 < chars.len() {
            let mut transposed = chars.clone();
            transposed.swap(i, i + 1);
            labels.push(("transposition", rebuild(&transposed)));
        }
        if i > 0 && chars[i - 1] != '-' && chars[i] != '-' {
            labels.push(("hyphenation", format!("{}-{}", rebuild(&chars[..i]), rebuild(&chars[i..]))));
        }
    }

    let mut candidates = BTreeMap::new();
    for (fuzzer, candidate) in labels {
        let valid = !candidate.is_empty() && !candidate.starts_with('-') && !candidate.ends_with('-');
        if valid && candidate != label {
            candidates.entry(format!("{candidate}.{tld}")).or_insert(fuzzer);
        }
    }
    for other in tlds.iter().filter(|t| t.as_str() != tld) {
        candidates.entry(format!("{label}.{other}")).or_insert("tld-swap");
    }
    candidates
}

/// Resolves one candidate. `None` when it has no A record.
async fn check(dns: Arc<dyn DnsLookup>, domain: String, fuzzer: String, check_mx: bool) -> Option<LookalikeDomain> {
    let dns_a = dns.lookup(&domain, RecordKind::A).await?.values;
    let dns_mx = if check_mx {
        dns.lookup(&domain, RecordKind::Mx).await.map(|r| r.values).unwrap_or_default()
    } else {
        Vec::new()
    };
    Some(LookalikeDomain { fuzzer, domain, dns_a, dns_mx })
}

/// Searches registered lookalikes of a domain asset.
///
/// Candidates are resolved concurrently until the check's timeout elapses;
/// whatever resolved by then is kept.
pub struct LookalikeProbe {
    dns: Arc<dyn DnsLookup>,
}

impl LookalikeProbe {
    pub fn new(dns: Arc<dyn DnsLookup>) -> Self {
        Self { dns }
    }

    /// Resolves every permutation of `asset` and returns the registered ones.
    ///
    /// # Arguments
    ///
    /// * `asset` - The domain to permute.
    /// * `options` - TLDs to swap in, whether to fetch MX records and the search deadline.
    ///
    /// # Returns
    ///
    /// The candidates with at least one A record, sorted by domain.
    async fn search(&self, asset: &Asset, options: &LookalikeOptions) -> Vec<LookalikeDomain> {
        let candidates = permutations(&asset.value, &options.tlds);
        debug!(asset = %asset.value, candidates = candidates.len(), "lookalike candidates generated");

        let deadline = tokio::time::Instant::now().checked_add(options.timeout);
        let check_mx = options.check_mx;
        let mut queue: std::vec::IntoIter<(String, String)> = candidates
            .into_iter()
            .map(|(domain, fuzzer)| (domain, fuzzer.to_string()))
            .collect::<Vec<_>>()
            .into_iter();
        let mut lookups = FuturesUnordered::new();
        for (domain, fuzzer) in queue.by_ref().take(LOOKUP_CONCURRENCY) {
            lookups.push(check(Arc::clone(&self.dns), domain, fuzzer, check_mx));
        }

        let mut found = Vec::new();
        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, lookups.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(asset = %asset.value, found = found.len(), "lookalike search timed out, keeping partial results");
                        break;
                    }
                },
                None => lookups.next().await,
            };
            let Some(hit) = next else { break };
            if let Some(hit) = hit {
                found.push(hit);
            }
            if let Some((domain, fuzzer)) = queue.next() {
                lookups.push(check(Arc::clone(&self.dns), domain, fuzzer, check_mx));
            }
        }
        found.sort_by(|a, b| a.domain.cmp(&b.domain));
        found
    }
}

#[async_trait]
impl Probe for LookalikeProbe {
    async fn invoke(&self, asset: &Asset, check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        let CheckConfig::Lookalike(options) = check else {
            return Err(failure(asset, check, "not a lookalike check"));
        };
        let found = self.search(asset, options).await;
        if found.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![RawResult::Lookalikes(found)])
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::StaticDns;
    use super::*;
    use crate::core::models::AssetKind;
    use std::time::Duration;

    #[test]
    fn permutations_cover_the_fuzzers() {
        let candidates = permutations("abc.com", &["net".to_string(), "com".to_string()]);
        assert_eq!(candidates.get("abcd.com"), Some(&"addition"));
        assert_eq!(candidates.get("ac.com"), Some(&"omission"));
        assert_eq!(candidates.get("aabc.com"), Some(&"repetition"));
        assert_eq!(candidates.get("bac.com"), Some(&"transposition"));
        assert_eq!(candidates.get("a-bc.com"), Some(&"hyphenation"));
        assert_eq!(candidates.get("ebc.com"), Some(&"vowel-swap"));
        assert_eq!(candidates.get("sbc.com"), Some(&"replacement"));
        assert_eq!(candidates.get("abc.net"), Some(&"tld-swap"));
        assert!(!candidates.contains_key("abc.com"));
        assert!(permutations("localhost", &[]).is_empty());
    }

    #[tokio::test]
    async fn keeps_only_registered_candidates() {
        let dns = StaticDns::default()
            .with("exmple.com", RecordKind::A, &["203.0.113.5"])
            .with("exmple.com", RecordKind::Mx, &["10 mx.exmple.com."])
            .with("example.net", RecordKind::A, &["203.0.113.6"]);
        let probe = LookalikeProbe::new(Arc::new(dns));
        let check = CheckConfig::Lookalike(LookalikeOptions {
            tlds: vec!["net".into()],
            check_mx: true,
            timeout: Duration::from_secs(5),
        });

        let result = probe.invoke(&Asset::new("example.com", AssetKind::Domain), &check).await.unwrap();
        let [RawResult::Lookalikes(found)] = result.as_slice() else { panic!("unexpected {result:?}") };
        let names: Vec<(&str, &str)> = found.iter().map(|d| (d.domain.as_str(), d.fuzzer.as_str())).collect();
        assert_eq!(names, vec![("example.net", "tld-swap"), ("exmple.com", "omission")]);
        assert_eq!(found[1].dns_mx, vec!["10 mx.exmple.com."]);
    }

    #[tokio::test]
    async fn unbounded_timeout_searches_without_a_deadline() {
        let dns = StaticDns::default().with("exmple.com", RecordKind::A, &["203.0.113.5"]);
        let probe = LookalikeProbe::new(Arc::new(dns));
        let check = CheckConfig::Lookalike(LookalikeOptions {
            tlds: Vec::new(),
            check_mx: false,
            timeout: Duration::MAX,
        });

        let result = probe.invoke(&Asset::new("example.com", AssetKind::Domain), &check).await.unwrap();
        let [RawResult::Lookalikes(found)] = result.as_slice() else { panic!("unexpected {result:?}") };
        assert_eq!(found.len(), 1);
        assert!(found[0].dns_mx.is_empty());
    }

    #[tokio::test]
    async fn search_runs_on_a_worker_task() {
        let dns = StaticDns::default().with("exampel.com", RecordKind::A, &["203.0.113.7"]);
        let probe: Arc<dyn Probe> = Arc::new(LookalikeProbe::new(Arc::new(dns)));
        let check = CheckConfig::Lookalike(LookalikeOptions {
            tlds: Vec::new(),
            check_mx: false,
            timeout: Duration::from_secs(5),
        });
        let result = tokio::spawn(async move {
            probe.invoke(&Asset::new("example.com", AssetKind::Domain), &check).await
        })
        .await
        .unwrap()
        .unwrap();
        let [RawResult::Lookalikes(found)] = result.as_slice() else { panic!("unexpected {result:?}") };
        assert_eq!(found[0].fuzzer, "transposition");
    }
}
