// src/core/engine/mod.rs

//! The scan registry and its dispatcher.
//!
//! Two lock levels: the registry map (`scan_id -> entry`) and one mutex per
//! scan guarding its status, findings and outstanding tasks. The map lock is
//! always taken before a scan lock, never the other way round.

mod task;

pub use task::{Collected, PendingTask, PoolClosed, ProbeOutcome, TaskHandle, WorkerPool};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::core::error::{EngineError, EngineResult};
use crate::core::findings::{materialize, FindingsStore, Section};
use crate::core::models::{Asset, FindingsReport, ScanStatus};
use crate::core::options::{CheckConfig, CheckKind, Discipline, OptionFlags, ScanOptions};
use crate::core::scanner::{Probe, ProbeSet};

/// A start request as the shell sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub scan_id: String,
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub options: OptionFlags,
    #[serde(default)]
    pub root_scan_id: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartAck {
    pub scan_id: String,
    pub status: String,
    /// `(check, asset)` pairs handed to a probe.
    pub scheduled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum EngineStatus {
    Ready,
    Busy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOverview {
    pub status: ScanStatus,
    pub nb_assets: usize,
    pub position: Option<u32>,
    pub root_scan_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineOverview {
    pub status: EngineStatus,
    pub max_scans: usize,
    pub scans: BTreeMap<String, ScanOverview>,
}

struct ScanState {
    status: ScanStatus,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    findings: FindingsStore,
    outstanding: Vec<(PendingTask, TaskHandle)>,
    /// Tasks ever handed out; zero means the scan never ran anything.
    scheduled: usize,
    /// Set while `start` is still fanning out; the scan cannot finish yet.
    dispatching: bool,
    /// Set by `clean`; nothing more is scheduled for a removed scan.
    discarded: bool,
}

impl ScanState {
    fn finish(&mut self, status: ScanStatus) {
        if self.status.can_advance_to(status) {
            self.status = status;
        }
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// Folds one probe outcome into the store, unless the scan was stopped.
    fn merge(&mut self, scan_id: &str, asset: &Asset, check: CheckKind, outcome: ProbeOutcome) {
        if matches!(self.status, ScanStatus::Stopped | ScanStatus::Error) {
            debug!(%scan_id, asset = %asset.value, %check, "dropping result of a halted scan");
            return;
        }
        match outcome {
            Ok(results) => {
                for raw in results {
                    self.findings.merge(&asset.value, raw);
                }
            }
            Err(failure) => {
                warn!(%scan_id, %failure, "probe failed");
                self.findings.record_failure(Section::for_check(check), failure);
            }
        }
    }

    /// Collects finished tasks and re-derives the status. Terminal scans are
    /// left as they are.
    fn collect(&mut self, scan_id: &str) -> ScanStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        let mut still_running = Vec::with_capacity(self.outstanding.len());
        for (task, handle) in std::mem::take(&mut self.outstanding) {
            if !handle.is_done() {
                still_running.push((task, handle));
                continue;
            }
            match handle.try_collect(&task) {
                Ok(Collected::Outcome(outcome)) => self.merge(scan_id, &task.asset, task.check, outcome),
                Ok(Collected::Merged) => {}
                Err(handle) => still_running.push((task, handle)),
            }
        }
        self.outstanding = still_running;

        if !self.outstanding.is_empty() {
            self.status = ScanStatus::Scanning;
        } else if self.scheduled > 0 && !self.dispatching {
            info!(%scan_id, findings = self.findings.len(), "scan finished");
            self.finish(ScanStatus::Finished);
        }
        self.status
    }
}

struct ScanEntry {
    id: String,
    assets: Vec<Asset>,
    options: ScanOptions,
    root_scan_id: Option<String>,
    position: Option<u32>,
    state: Mutex<ScanState>,
}

impl ScanEntry {
    fn refresh(&self) -> ScanStatus {
        self.state.lock().collect(&self.id)
    }

    fn overview(&self) -> ScanOverview {
        let state = self.state.lock();
        ScanOverview {
            status: state.status,
            nb_assets: self.assets.len(),
            position: self.position,
            root_scan_id: self.root_scan_id.clone(),
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    probes: ProbeSet,
    pool: WorkerPool,
    scans: RwLock<HashMap<String, Arc<ScanEntry>>>,
    shutting_down: AtomicBool,
}

/// Process-wide scan registry. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(config: EngineConfig, probes: ProbeSet) -> EngineResult<Self> {
        config.validate()?;
        info!(max_scans = config.max_scans, pool_size = config.pool_size, probes = probes.len(), "engine ready");
        let pool = WorkerPool::new(config.pool_size);
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                probes,
                pool,
                scans: RwLock::new(HashMap::new()),
                shutting_down: AtomicBool::new(false),
            }),
        })
    }

    /// An engine wired to the network-backed probes.
    pub fn standard(config: EngineConfig) -> EngineResult<Self> {
        let probes = ProbeSet::standard(&config)?;
        Self::new(config, probes)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    fn entry(&self, scan_id: &str) -> EngineResult<Arc<ScanEntry>> {
        self.inner.scans.read().get(scan_id).cloned().ok_or_else(|| EngineError::not_found(scan_id))
    }

    /// Registers the scan and fans out every enabled check over the assets it
    /// accepts. Returns as soon as the work is scheduled.
    ///
    /// # Arguments
    /// * `request` - The scan id, its assets and the wire-form option flags.
    ///
    /// # Returns
    /// An `accepted` acknowledgement with the number of `(check, asset)` pairs
    /// handed out. `DuplicateScan`, `InvalidOptions` and the retryable
    /// `CapacityExceeded` are returned before anything is scheduled.
    pub fn start(&self, request: ScanRequest) -> EngineResult<StartAck> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(EngineError::ShuttingDown);
        }

        let entry = {
            let mut scans = self.inner.scans.write();
            if scans.contains_key(&request.scan_id) {
                return Err(EngineError::DuplicateScan { scan_id: request.scan_id });
            }
            let options = ScanOptions::from_flags(&request.options, &self.inner.config)?;
            let active = scans.values().filter(|scan| scan.refresh().is_active()).count();
            if active >= self.inner.config.max_scans {
                warn!(scan_id = %request.scan_id, active, "scan refused, engine busy");
                return Err(EngineError::CapacityExceeded { max_scans: self.inner.config.max_scans });
            }

            let entry = Arc::new(ScanEntry {
                id: request.scan_id.clone(),
                assets: request.assets,
                options,
                root_scan_id: request.root_scan_id,
                position: request.position,
                state: Mutex::new(ScanState {
                    status: ScanStatus::Started,
                    started_at: Utc::now(),
                    finished_at: None,
                    findings: FindingsStore::default(),
                    outstanding: Vec::new(),
                    scheduled: 0,
                    dispatching: true,
                    discarded: false,
                }),
            });
            scans.insert(entry.id.clone(), entry.clone());
            entry
        };

        let scheduled = self.dispatch(&entry);
        entry.state.lock().dispatching = false;
        info!(scan_id = %entry.id, assets = entry.assets.len(), scheduled, "scan started");
        Ok(StartAck { scan_id: entry.id.clone(), status: "accepted".to_string(), scheduled })
    }

    fn dispatch(&self, entry: &Arc<ScanEntry>) -> usize {
        let mut scheduled = 0;
        for check in &entry.options.checks {
            let kind = check.kind();
            let Some(probe) = self.inner.probes.get(kind) else {
                warn!(scan_id = %entry.id, check = %kind, "no probe registered, check skipped");
                continue;
            };
            for asset in entry.assets.iter().filter(|a| check.accepts(a.datatype)) {
                let task = PendingTask { asset: asset.clone(), check: kind };
                // Held from the check to the push so a concurrent stop or clean
                // either sees this task in `outstanding` or stops the fan-out.
                let mut state = entry.state.lock();
                if state.status.is_terminal() || state.discarded {
                    info!(scan_id = %entry.id, status = %state.status, scheduled, "scan halted during dispatch");
                    return scheduled;
                }
                let handle = match kind.discipline() {
                    Discipline::Pooled => match self.submit_pooled(&task, probe.clone(), check.clone()) {
                        Ok(handle) => handle,
                        Err(PoolClosed) => {
                            error!(scan_id = %entry.id, check = %kind, "worker pool refused submission");
                            state.finish(ScanStatus::Error);
                            return scheduled;
                        }
                    },
                    Discipline::Background => spawn_background(entry, &task, probe.clone(), check.clone()),
                };
                debug!(scan_id = %entry.id, asset = %asset.value, check = %kind, "task scheduled");
                state.outstanding.push((task, handle));
                state.scheduled += 1;
                scheduled += 1;
            }
        }
        scheduled
    }

    fn submit_pooled(&self, task: &PendingTask, probe: Arc<dyn Probe>, check: CheckConfig) -> Result<TaskHandle, PoolClosed> {
        let asset = task.asset.clone();
        self.inner.pool.submit(task, async move { probe.invoke(&asset, &check).await })
    }

    /// Current status, after collecting whatever finished since the last poll.
    ///
    /// Finished pooled outcomes are merged here. A scan that never scheduled
    /// anything stays `STARTED`; `finished_at` is stamped on the first poll that
    /// sees no outstanding task.
    pub fn status(&self, scan_id: &str) -> EngineResult<ScanStatus> {
        Ok(self.entry(scan_id)?.refresh())
    }

    /// Stops a running scan. Background tasks are cancelled and joined before
    /// this returns; pooled tasks already submitted run on but their results
    /// are discarded.
    pub async fn stop(&self, scan_id: &str) -> EngineResult<ScanStatus> {
        let entry = self.entry(scan_id)?;
        let drained = {
            let mut state = entry.state.lock();
            let status = state.collect(&entry.id);
            if status != ScanStatus::Scanning {
                return Err(EngineError::InvalidTransition { scan_id: scan_id.to_string(), status });
            }
            state.finish(ScanStatus::Stopped);
            std::mem::take(&mut state.outstanding)
        };
        let mut joined = 0;
        for (_, handle) in drained {
            if handle.is_background() {
                handle.abort();
                handle.join().await;
                joined += 1;
            }
        }
        info!(%scan_id, joined, "scan stopped");
        Ok(ScanStatus::Stopped)
    }

    /// Stops every scan that is still running.
    pub async fn stop_all(&self) -> usize {
        let ids: Vec<String> = self.inner.scans.read().keys().cloned().collect();
        let mut stopped = 0;
        for id in ids {
            if self.stop(&id).await.is_ok() {
                stopped += 1;
            }
        }
        stopped
    }

    /// Removes a scan whatever its status. Tasks still in flight find no scan
    /// to write into.
    pub fn clean(&self, scan_id: &str) -> EngineResult<()> {
        let entry = self.inner.scans.write().remove(scan_id).ok_or_else(|| EngineError::not_found(scan_id))?;
        let drained = {
            let mut state = entry.state.lock();
            state.discarded = true;
            std::mem::take(&mut state.outstanding)
        };
        for (_, handle) in drained {
            if handle.is_background() {
                handle.abort();
            }
        }
        info!(%scan_id, "scan cleaned");
        Ok(())
    }

    pub fn clean_all(&self) -> usize {
        let ids: Vec<String> = self.inner.scans.read().keys().cloned().collect();
        ids.iter().filter(|id| self.clean(id).is_ok()).count()
    }

    /// Materializes the findings of a finished scan. Issue ids are assigned
    /// afresh on every call.
    ///
    /// # Arguments
    /// * `scan_id` - A scan in the `FINISHED` state.
    ///
    /// # Returns
    /// The ordered issues and their severity summary, or `ScanNotFinished`
    /// while the scan is in any other state.
    pub fn get_findings(&self, scan_id: &str) -> EngineResult<FindingsReport> {
        let entry = self.entry(scan_id)?;
        let status = entry.refresh();
        if status != ScanStatus::Finished {
            return Err(EngineError::ScanNotFinished { scan_id: scan_id.to_string(), status });
        }
        let snapshot = entry.state.lock().findings.clone();
        let (issues, summary) = materialize(&snapshot, &entry.options, Utc::now());
        debug!(%scan_id, issues = issues.len(), "findings materialized");
        Ok(FindingsReport { scan_id: scan_id.to_string(), summary, issues })
    }

    /// Writes the findings of a finished scan to `<dir>/findings_<scan_id>.json`.
    pub async fn write_report(&self, scan_id: &str, dir: &Path) -> EngineResult<PathBuf> {
        let report = self.get_findings(scan_id)?;
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("findings_{scan_id}.json"));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&report)?).await?;
        info!(%scan_id, path = %path.display(), "report written");
        Ok(path)
    }

    pub fn overview(&self) -> EngineOverview {
        let scans: BTreeMap<String, ScanOverview> = self
            .inner
            .scans
            .read()
            .iter()
            .map(|(id, entry)| {
                entry.refresh();
                (id.clone(), entry.overview())
            })
            .collect();
        let active = scans.values().filter(|s| s.status.is_active()).count();
        let status = if active >= self.inner.config.max_scans { EngineStatus::Busy } else { EngineStatus::Ready };
        EngineOverview { status, max_scans: self.inner.config.max_scans, scans }
    }

    /// Refuses new scans and closes the worker pool. Queued pooled work fails.
    pub fn shutdown(&self) {
        if !self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            info!(busy = self.inner.pool.busy(), "engine shutting down");
        }
        self.inner.pool.close();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }
}

/// Runs a multi-step check as its own task. It merges into the scan itself
/// and holds only a weak reference, so a cleaned scan is never written to.
fn spawn_background(entry: &Arc<ScanEntry>, task: &PendingTask, probe: Arc<dyn Probe>, check: CheckConfig) -> TaskHandle {
    let scan: Weak<ScanEntry> = Arc::downgrade(entry);
    let asset = task.asset.clone();
    TaskHandle::Background(tokio::spawn(async move {
        let outcome = probe.invoke(&asset, &check).await;
        match scan.upgrade() {
            Some(entry) => entry.state.lock().merge(&entry.id, &asset, check.kind(), outcome),
            None => debug!(asset = %asset.value, check = %check.kind(), "scan gone, result dropped"),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ProbeResult;
    use crate::core::findings::RawResult;
    use crate::core::models::AssetKind;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Instant(Vec<String>);

    #[async_trait]
    impl Probe for Instant {
        async fn invoke(&self, _asset: &Asset, _check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
            Ok(vec![RawResult::ReverseDns(self.0.clone())])
        }
    }

    /// Never answers; only cancellation ends it.
    struct Hang;

    #[async_trait]
    impl Probe for Hang {
        async fn invoke(&self, _asset: &Asset, _check: &CheckConfig) -> ProbeResult<Vec<RawResult>> {
            futures::future::pending().await
        }
    }

    fn engine(probes: ProbeSet) -> Engine {
        Engine::new(EngineConfig { max_scans: 2, pool_size: 2, ..EngineConfig::default() }, probes).unwrap()
    }

    fn request(id: &str, flags: &str, assets: &[&str]) -> ScanRequest {
        ScanRequest {
            scan_id: id.to_string(),
            assets: assets.iter().map(|a| Asset::infer(a)).collect(),
            options: serde_json::from_str(flags).unwrap(),
            root_scan_id: None,
            position: None,
        }
    }

    fn outstanding(engine: &Engine, id: &str) -> usize {
        engine.entry(id).unwrap().state.lock().outstanding.len()
    }

    fn many_domains(id: &str, flags: &str, n: usize) -> ScanRequest {
        ScanRequest {
            scan_id: id.to_string(),
            assets: (0..n).map(|i| Asset::new(format!("d{i}.example"), AssetKind::Domain)).collect(),
            options: serde_json::from_str(flags).unwrap(),
            root_scan_id: None,
            position: None,
        }
    }

    async fn settle(engine: &Engine, id: &str) -> ScanStatus {
        for _ in 0..200 {
            let status = engine.status(id).unwrap();
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("scan {id} never settled");
    }

    #[tokio::test]
    async fn unsupported_datatypes_are_skipped() {
        let probes = ProbeSet::new().with(CheckKind::ReverseDns, Arc::new(Instant(vec!["host.example.".into()])));
        let engine = engine(probes);

        let ack = engine.start(request("1", r#"{"do_reverse_dns": true}"#, &["192.0.2.1", "example.com"])).unwrap();
        assert_eq!(ack.scheduled, 1);
        assert_eq!(settle(&engine, "1").await, ScanStatus::Finished);

        let report = engine.get_findings("1").unwrap();
        assert_eq!(report.summary.nb_issues, 1);
        assert_eq!(report.issues[0].target.addr, vec!["192.0.2.1"]);
    }

    #[tokio::test]
    async fn missing_probe_leaves_scan_started() {
        let engine = engine(ProbeSet::new());
        let ack = engine.start(request("1", r#"{"do_whois": true}"#, &["example.com"])).unwrap();
        assert_eq!(ack.scheduled, 0);
        assert_eq!(engine.status("1").unwrap(), ScanStatus::Started);
        assert!(matches!(engine.get_findings("1"), Err(EngineError::ScanNotFinished { .. })));
    }

    #[tokio::test]
    async fn finished_at_is_stamped_once() {
        let probes = ProbeSet::new().with(CheckKind::ReverseDns, Arc::new(Instant(vec![])));
        let engine = engine(probes);
        engine.start(request("1", r#"{"do_reverse_dns": true}"#, &["192.0.2.1"])).unwrap();
        settle(&engine, "1").await;

        let first = engine.overview().scans["1"].finished_at;
        tokio::time::sleep(Duration::from_millis(10)).await;
        engine.status("1").unwrap();
        assert!(first.is_some());
        assert_eq!(engine.overview().scans["1"].finished_at, first);
    }

    #[tokio::test]
    async fn shutdown_refuses_new_scans() {
        let engine = engine(ProbeSet::new());
        engine.shutdown();
        assert!(engine.is_shutting_down());
        assert!(matches!(engine.start(request("1", "{}", &["example.com"])), Err(EngineError::ShuttingDown)));
    }

    #[tokio::test]
    async fn invalid_options_register_nothing() {
        let engine = engine(ProbeSet::new());
        let err = engine.start(request("1", r#"{"max_timeout": 0}"#, &["example.com"])).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOptions { .. }));
        assert!(matches!(engine.status("1"), Err(EngineError::ScanNotFound { .. })));
    }

    #[tokio::test]
    async fn duplicate_id_wins_over_bad_options() {
        let engine = engine(ProbeSet::new());
        engine.start(request("1", "{}", &["example.com"])).unwrap();
        let err = engine.start(request("1", r#"{"max_timeout": 0}"#, &["example.com"])).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateScan { .. }));
    }

    #[tokio::test]
    async fn stop_sees_tasks_that_finished_unpolled() {
        let probes = ProbeSet::new().with(CheckKind::ReverseDns, Arc::new(Instant(vec![])));
        let engine = engine(probes);
        engine.start(request("1", r#"{"do_reverse_dns": true}"#, &["192.0.2.1"])).unwrap();
        let entry = engine.entry("1").unwrap();
        for _ in 0..200 {
            if entry.state.lock().outstanding.iter().all(|(_, handle)| handle.is_done()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = engine.stop("1").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { status: ScanStatus::Finished, .. }));
        assert_eq!(engine.status("1").unwrap(), ScanStatus::Finished);
    }

    #[tokio::test]
    async fn outstanding_is_empty_only_once_finished_or_stopped() {
        let probes = ProbeSet::new()
            .with(CheckKind::ReverseDns, Arc::new(Instant(vec![])))
            .with(CheckKind::SpfCheck, Arc::new(Hang));
        let engine = engine(probes);

        engine.start(request("done", r#"{"do_reverse_dns": true}"#, &["192.0.2.1"])).unwrap();
        assert_eq!(settle(&engine, "done").await, ScanStatus::Finished);
        assert_eq!(outstanding(&engine, "done"), 0);

        engine.start(request("hung", r#"{"do_spf_check": true}"#, &["example.com", "example.org"])).unwrap();
        assert_eq!(engine.status("hung").unwrap(), ScanStatus::Scanning);
        assert_eq!(outstanding(&engine, "hung"), 2);

        assert_eq!(engine.stop("hung").await.unwrap(), ScanStatus::Stopped);
        assert_eq!(outstanding(&engine, "hung"), 0);
        assert_eq!(engine.status("hung").unwrap(), ScanStatus::Stopped);
        assert_eq!(outstanding(&engine, "hung"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_during_dispatch_leaves_nothing_behind() {
        let engine = engine(ProbeSet::new().with(CheckKind::DmarcCheck, Arc::new(Hang)));
        let starter = engine.clone();
        let start = tokio::task::spawn_blocking(move || {
            starter.start(many_domains("race", r#"{"do_dmarc_check": true}"#, 5_000))
        });

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            match engine.stop("race").await {
                Ok(status) => {
                    assert_eq!(status, ScanStatus::Stopped);
                    break;
                }
                Err(_) if std::time::Instant::now() < deadline => tokio::task::yield_now().await,
                Err(e) => panic!("scan never became stoppable: {e}"),
            }
        }
        let ack = start.await.unwrap().unwrap();

        assert!(ack.scheduled <= 5_000);
        assert_eq!(engine.status("race").unwrap(), ScanStatus::Stopped);
        assert_eq!(outstanding(&engine, "race"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn clean_during_dispatch_stops_the_fan_out() {
        let engine = engine(ProbeSet::new().with(CheckKind::DmarcCheck, Arc::new(Hang)));
        let starter = engine.clone();
        let start = tokio::task::spawn_blocking(move || {
            starter.start(many_domains("gone", r#"{"do_dmarc_check": true}"#, 5_000))
        });

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        let entry = loop {
            if let Ok(entry) = engine.entry("gone") {
                break entry;
            }
            assert!(std::time::Instant::now() < deadline, "scan was never registered");
            tokio::task::yield_now().await;
        };
        engine.clean("gone").unwrap();
        start.await.unwrap().unwrap();

        assert!(entry.state.lock().outstanding.is_empty());
        assert!(matches!(engine.status("gone"), Err(EngineError::ScanNotFound { .. })));
    }

    #[test]
    fn assets_keep_their_inferred_kind() {
        let req = request("1", "{}", &["192.0.2.1", "www.example.com"]);
        assert_eq!(req.assets[0].datatype, AssetKind::Ip);
        assert_eq!(req.assets[1].datatype, AssetKind::Fqdn);
    }
}
