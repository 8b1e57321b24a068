// tests/engine_lifecycle.rs

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use vanguard_recon::config::EngineConfig;
use vanguard_recon::core::engine::{EngineStatus, ScanRequest};
use vanguard_recon::core::error::{EngineError, ProbeFailure, ProbeResult};
use vanguard_recon::core::findings::RawResult;
use vanguard_recon::core::models::{Asset, ScanStatus, WhoisLookup};
use vanguard_recon::core::options::{CheckConfig, CheckKind};
use vanguard_recon::core::scanner::{Probe, ProbeSet};
use vanguard_recon::core::spf::analyze;
use vanguard_recon::Engine;

/// Holds probes until the test opens it.
#[derive(Default)]
struct Gate {
    open: AtomicBool,
    notify: Notify,
}

impl Gate {
    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.open.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

/// Waits on an optional gate, counts its calls, then answers with canned output.
struct FakeProbe {
    gate: Option<Arc<Gate>>,
    calls: AtomicUsize,
    answer: fn(&Asset) -> ProbeResult<Vec<RawResult>>,
}

impl FakeProbe {
    fn new(answer: fn(&Asset) -> ProbeResult<Vec<RawResult>>) -> Arc<Self> {
        Arc::new(Self { gate: None, calls: AtomicUsize::new(0), answer })
    }

    fn gated(gate: &Arc<Gate>, answer: fn(&Asset) -> ProbeResult<Vec<RawResult>>) -> Arc<Self> {
        Arc::new(Self { gate: Some(gate.clone()), calls: AtomicUsize::new(0), answer })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for FakeProbe {
    async fn invoke(&self, asset: &Asset, _check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        (self.answer)(asset)
    }
}

fn ptr(_asset: &Asset) -> ProbeResult<Vec<RawResult>> {
    Ok(vec![RawResult::ReverseDns(vec!["host.example.net.".into()])])
}

fn no_match(_asset: &Asset) -> ProbeResult<Vec<RawResult>> {
    Ok(vec![RawResult::Whois(WhoisLookup::NoMatch { details: "No match for domain".into() })])
}

fn permissive_spf(_asset: &Asset) -> ProbeResult<Vec<RawResult>> {
    Ok(vec![RawResult::Spf(analyze(&["\"v=spf1 ptr +all\""]))])
}

fn broken(asset: &Asset) -> ProbeResult<Vec<RawResult>> {
    Err(ProbeFailure::new("dns_resolve", asset.value.clone(), "resolver unreachable"))
}

fn engine(max_scans: usize, probes: ProbeSet) -> Engine {
    let config = EngineConfig { max_scans, pool_size: 2, ..EngineConfig::default() };
    Engine::new(config, probes).unwrap()
}

fn request(scan_id: &str, flags: &str, assets: &[&str]) -> ScanRequest {
    ScanRequest {
        scan_id: scan_id.to_string(),
        assets: assets.iter().map(|a| Asset::infer(a)).collect(),
        options: serde_json::from_str(flags).unwrap(),
        root_scan_id: None,
        position: None,
    }
}

async fn wait_for(engine: &Engine, scan_id: &str, wanted: ScanStatus) {
    for _ in 0..400 {
        if engine.status(scan_id).unwrap() == wanted {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("scan {scan_id} never reached {wanted}");
}

async fn wait_calls(probe: &FakeProbe, n: usize) {
    for _ in 0..400 {
        if probe.calls() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("probe was called {} times, expected {n}", probe.calls());
}

#[tokio::test]
async fn duplicate_start_schedules_nothing() {
    let gate = Arc::new(Gate::default());
    let probe = FakeProbe::gated(&gate, no_match);
    let engine = engine(5, ProbeSet::new().with(CheckKind::Whois, probe.clone()));

    let ack = engine.start(request("42", r#"{"do_whois": true}"#, &["example.com"])).unwrap();
    assert_eq!(ack.status, "accepted");
    assert_eq!(ack.scheduled, 1);

    for _ in 0..2 {
        let err = engine.start(request("42", r#"{"do_whois": true}"#, &["example.com", "example.org"])).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateScan { ref scan_id } if scan_id == "42"));
    }
    wait_calls(&probe, 1).await;
    gate.open();
    wait_for(&engine, "42", ScanStatus::Finished).await;
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn capacity_is_a_retryable_refusal() {
    let gate = Arc::new(Gate::default());
    let engine = engine(1, ProbeSet::new().with(CheckKind::ReverseDns, FakeProbe::gated(&gate, ptr)));

    engine.start(request("a", r#"{"do_reverse_dns": true}"#, &["192.0.2.1"])).unwrap();
    assert_eq!(engine.overview().status, EngineStatus::Busy);

    let err = engine.start(request("b", r#"{"do_reverse_dns": true}"#, &["192.0.2.2"])).unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded { max_scans: 1 }));
    assert!(err.is_retryable());

    gate.open();
    wait_for(&engine, "a", ScanStatus::Finished).await;
    engine.start(request("b", r#"{"do_reverse_dns": true}"#, &["192.0.2.2"])).unwrap();
    wait_for(&engine, "b", ScanStatus::Finished).await;
    assert_eq!(engine.overview().status, EngineStatus::Ready);
}

#[tokio::test]
async fn scan_without_checks_stays_started() {
    let engine = engine(5, ProbeSet::new());
    let ack = engine.start(request("idle", r#"{"do_nmap": true}"#, &["example.com"])).unwrap();
    assert_eq!(ack.scheduled, 0);

    for _ in 0..3 {
        assert_eq!(engine.status("idle").unwrap(), ScanStatus::Started);
    }
    let overview = engine.overview();
    assert_eq!(overview.scans["idle"].finished_at, None);
    assert_eq!(overview.scans["idle"].nb_assets, 1);
}

#[tokio::test]
async fn stop_halts_both_disciplines() {
    let gate = Arc::new(Gate::default());
    let pooled = FakeProbe::gated(&gate, ptr);
    let background = FakeProbe::gated(&gate, ptr);
    let probes = ProbeSet::new().with(CheckKind::ReverseDns, pooled.clone()).with(CheckKind::SpfCheck, background.clone());
    let engine = engine(5, probes);

    engine
        .start(request("s", r#"{"do_reverse_dns": true, "do_spf_check": true}"#, &["192.0.2.1", "example.com"]))
        .unwrap();
    assert_eq!(engine.status("s").unwrap(), ScanStatus::Scanning);
    wait_calls(&background, 1).await;

    assert_eq!(engine.stop("s").await.unwrap(), ScanStatus::Stopped);
    let err = engine.stop("s").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { status: ScanStatus::Stopped, .. }));

    gate.open();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(engine.status("s").unwrap(), ScanStatus::Stopped);
    assert!(engine.overview().scans["s"].finished_at.is_some());
    assert!(matches!(engine.get_findings("s"), Err(EngineError::ScanNotFinished { .. })));
}

#[tokio::test]
async fn stop_requires_a_running_scan() {
    let engine = engine(5, ProbeSet::new().with(CheckKind::ReverseDns, FakeProbe::new(ptr)));
    assert!(matches!(engine.stop("missing").await, Err(EngineError::ScanNotFound { .. })));

    engine.start(request("f", r#"{"do_reverse_dns": true}"#, &["192.0.2.1"])).unwrap();
    wait_for(&engine, "f", ScanStatus::Finished).await;
    let err = engine.stop("f").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { status: ScanStatus::Finished, .. }));
}

#[tokio::test]
async fn clean_mid_flight_drops_late_results() {
    let gate = Arc::new(Gate::default());
    let background = FakeProbe::gated(&gate, ptr);
    let engine = engine(5, ProbeSet::new().with(CheckKind::DmarcCheck, background.clone()));

    engine.start(request("c", r#"{"do_dmarc_check": true}"#, &["example.com"])).unwrap();
    wait_calls(&background, 1).await;
    engine.clean("c").unwrap();
    gate.open();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(engine.status("c"), Err(EngineError::ScanNotFound { .. })));
    assert!(matches!(engine.clean("c"), Err(EngineError::ScanNotFound { .. })));
    assert!(engine.overview().scans.is_empty());
}

#[tokio::test]
async fn findings_materialize_once_finished() {
    let probes = ProbeSet::new()
        .with(CheckKind::Whois, FakeProbe::new(no_match))
        .with(CheckKind::ReverseDns, FakeProbe::new(ptr));
    let engine = engine(5, probes);

    engine
        .start(request(
            "r",
            r#"{"do_whois": true, "do_reverse_dns": true}"#,
            &["example.com", "192.0.2.1", "acme"],
        ))
        .unwrap();
    wait_for(&engine, "r", ScanStatus::Finished).await;

    let report = engine.get_findings("r").unwrap();
    assert_eq!(report.scan_id, "r");
    // whois runs for the domain and the IP, reverse DNS only for the IP; the keyword is skipped.
    assert_eq!(report.summary.nb_issues, 3);
    assert_eq!(report.summary.nb_info, 3);
    let ids: Vec<u32> = report.issues.iter().map(|i| i.issue_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(report.issues.iter().all(|i| !i.target.addr.is_empty()));

    let again = engine.get_findings("r").unwrap();
    assert_eq!(again.summary, report.summary);
}

#[tokio::test]
async fn background_checks_merge_their_own_results() {
    let gate = Arc::new(Gate::default());
    let spf = FakeProbe::gated(&gate, permissive_spf);
    let engine = engine(5, ProbeSet::new().with(CheckKind::SpfCheck, spf.clone()));

    let ack = engine.start(request("mail", r#"{"do_spf_check": true}"#, &["example.com", "192.0.2.1"])).unwrap();
    assert_eq!(ack.scheduled, 1);
    wait_calls(&spf, 1).await;
    assert_eq!(engine.status("mail").unwrap(), ScanStatus::Scanning);

    gate.open();
    wait_for(&engine, "mail", ScanStatus::Finished).await;

    let report = engine.get_findings("mail").unwrap();
    assert_eq!(report.summary.nb_issues, 2);
    assert_eq!(report.summary.nb_low, 2);
    let titles: Vec<&str> = report.issues.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Mechanism PTR not recommended", "Permissive SPF record"]);
    assert!(report.issues.iter().all(|i| i.kind == "spf_check" && i.target.addr == vec!["example.com".to_string()]));
}

#[tokio::test]
async fn failed_probes_degrade_instead_of_aborting() {
    let probes = ProbeSet::new().with(CheckKind::DnsResolve, FakeProbe::new(broken));
    let engine = engine(5, probes);

    engine.start(request("x", r#"{"do_dns_resolve": true}"#, &["example.com"])).unwrap();
    wait_for(&engine, "x", ScanStatus::Finished).await;
    assert_eq!(engine.get_findings("x").unwrap().summary.nb_issues, 0);
}

#[tokio::test]
async fn report_is_written_as_json() {
    let engine = engine(5, ProbeSet::new().with(CheckKind::ReverseDns, FakeProbe::new(ptr)));
    engine.start(request("w", r#"{"do_reverse_dns": true}"#, &["192.0.2.1"])).unwrap();
    wait_for(&engine, "w", ScanStatus::Finished).await;

    let dir = tempfile::tempdir().unwrap();
    let path = engine.write_report("w", &dir.path().join("reports")).await.unwrap();
    assert_eq!(path.file_name().unwrap(), "findings_w.json");

    let written: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written["scan_id"], "w");
    assert_eq!(written["summary"]["nb_issues"], 1);
    assert_eq!(written["issues"][0]["type"], "reverse_dns");
}

#[tokio::test]
async fn stop_all_and_clean_all() {
    let gate = Arc::new(Gate::default());
    let engine = engine(5, ProbeSet::new().with(CheckKind::ReverseDns, FakeProbe::gated(&gate, ptr)));
    for id in ["1", "2"] {
        engine.start(request(id, r#"{"do_reverse_dns": true}"#, &["192.0.2.1"])).unwrap();
        assert_eq!(engine.status(id).unwrap(), ScanStatus::Scanning);
    }
    engine.start(request("3", "{}", &["192.0.2.1"])).unwrap();

    assert_eq!(engine.stop_all().await, 2);
    assert_eq!(engine.status("3").unwrap(), ScanStatus::Started);
    assert_eq!(engine.clean_all(), 3);
    gate.open();
}

#[tokio::test]
async fn shutdown_refuses_new_scans() {
    let engine = engine(5, ProbeSet::new());
    engine.shutdown();
    let err = engine.start(request("late", "{}", &["example.com"])).unwrap_err();
    assert!(matches!(err, EngineError::ShuttingDown));
}
