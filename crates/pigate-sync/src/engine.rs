//! Reconciliation of the local credential store against an upstream source.
//!
//! # Protocol
//!
//! 1. Fetch the upstream set.
//! 2. Fetch the local set and split it into feed-owned (`auto_update`) and
//!    manually administered records.
//! 3. Delete feed-owned codes that are no longer upstream.
//! 4. Upsert every upstream record as feed-owned, except codes held by a
//!    manual record, which are left alone.
//!
//! Deletes run before upserts. Each record is applied on its own; failures
//! are collected and reported as [`SyncError::Partial`] while the rest stays
//! committed.
//!
//! # Triggers
//!
//! One pass runs at a time. [`SyncEngine::trigger`] additionally applies a
//! cooldown: a trigger within `cooldown` of the last started run, or one
//! arriving while a pass is running, does not run. The caller owns the retry;
//! [`SyncScheduler`](crate::SyncScheduler) runs one deferred pass at
//! [`SyncEngine::cooldown_ends`], so rapid triggers collapse without losing
//! the last one.

use crate::error::{Result, SyncError};
use crate::source::CredentialSource;
use pigate_core::Credential;
use pigate_core::constants::{
    DEFAULT_NETWORK_TIMEOUT_SECS, DEFAULT_STORE_TIMEOUT_SECS, DEFAULT_SYNC_COOLDOWN_SECS,
    DEFAULT_SYNC_INTERVAL_SECS,
};
use pigate_storage::{CredentialStore, with_timeout};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Sync timing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Period of the scheduled sync.
    pub interval: Duration,
    /// Window in which repeated triggers collapse into one pass.
    pub cooldown: Duration,
    /// Deadline for fetching the upstream set.
    pub fetch_timeout: Duration,
    /// Deadline for each store call, batches included.
    pub store_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            cooldown: Duration::from_secs(DEFAULT_SYNC_COOLDOWN_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_NETWORK_TIMEOUT_SECS),
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }
}

impl SyncConfig {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}

/// What a completed pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub deleted: usize,
    pub upserted: usize,
    /// Upstream codes left alone because a manual record holds them.
    pub skipped_manual: usize,
}

/// Why a pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTrigger {
    Startup,
    Interval,
    Notification,
    FileChange,
    Manual,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SyncTrigger::Startup => "startup",
            SyncTrigger::Interval => "interval",
            SyncTrigger::Notification => "notification",
            SyncTrigger::FileChange => "file_change",
            SyncTrigger::Manual => "manual",
        };
        f.write_str(text)
    }
}

/// Result of [`SyncEngine::trigger`].
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A pass ran.
    Ran(Result<SyncReport>),
    /// Not run: within the cooldown of the last run.
    Debounced,
    /// Not run: a pass was already running and may have fetched before the
    /// trigger's cause.
    Coalesced,
}

/// Keeps a credential store in line with one upstream source.
pub struct SyncEngine<S, C> {
    store: Arc<S>,
    source: C,
    config: SyncConfig,
    run_lock: tokio::sync::Mutex<()>,
    last_started: Mutex<Option<Instant>>,
}

impl<S, C: CredentialSource> fmt::Debug for SyncEngine<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .finish()
    }
}

impl<S: CredentialStore, C: CredentialSource> SyncEngine<S, C> {
    pub fn new(store: Arc<S>, source: C, config: SyncConfig) -> Self {
        Self {
            store,
            source,
            config,
            run_lock: tokio::sync::Mutex::new(()),
            last_started: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Claim the cooldown window at `now`.
    ///
    /// Returns false, leaving the window untouched, when a run started less
    /// than `cooldown` before `now`.
    pub fn try_begin(&self, now: Instant) -> bool {
        let mut last = self.last_started();
        match *last {
            Some(started) if now.saturating_duration_since(started) < self.config.cooldown => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// When the cooldown of the last started run ends, if a run started.
    pub fn cooldown_ends(&self) -> Option<Instant> {
        let started = *self.last_started();
        started.map(|started| started + self.config.cooldown)
    }

    /// Run a pass for `trigger`, subject to the cooldown and to any pass
    /// already running.
    pub async fn trigger(&self, trigger: SyncTrigger) -> TriggerOutcome {
        let Ok(_guard) = self.run_lock.try_lock() else {
            debug!(%trigger, "Sync already running");
            return TriggerOutcome::Coalesced;
        };

        if !self.try_begin(Instant::now()) {
            debug!(%trigger, "Sync trigger within cooldown");
            return TriggerOutcome::Debounced;
        }

        TriggerOutcome::Ran(self.run(trigger).await)
    }

    /// Run a pass now, waiting for a running pass to finish first.
    ///
    /// Ignores the cooldown but restarts its window.
    pub async fn sync(&self, trigger: SyncTrigger) -> Result<SyncReport> {
        let _guard = self.run_lock.lock().await;
        *self.last_started() = Some(Instant::now());
        self.run(trigger).await
    }

    async fn run(&self, trigger: SyncTrigger) -> Result<SyncReport> {
        info!(%trigger, source = self.source.name(), "Credential sync started");
        let result = self.reconcile().await;
        match &result {
            Ok(report) => info!(
                %trigger,
                deleted = report.deleted,
                upserted = report.upserted,
                skipped_manual = report.skipped_manual,
                "Credential sync completed"
            ),
            Err(SyncError::Partial {
                failed_codes,
                report,
            }) => warn!(
                %trigger,
                failed = failed_codes.len(),
                deleted = report.deleted,
                upserted = report.upserted,
                "Credential sync partially applied"
            ),
            Err(e) => error!(%trigger, error = %e, "Credential sync failed"),
        }
        result
    }

    async fn reconcile(&self) -> Result<SyncReport> {
        let upstream = tokio::time::timeout(self.config.fetch_timeout, self.source.fetch())
            .await
            .map_err(|_| SyncError::timeout("fetch upstream credentials", self.config.fetch_timeout))??;

        let local = with_timeout(
            "get_all_credentials",
            self.config.store_timeout,
            self.store.get_all_credentials(),
        )
        .await?;

        let plan = plan(upstream, local);
        debug!(
            delete = plan.to_delete.len(),
            upsert = plan.to_upsert.len(),
            skipped_manual = plan.skipped_manual,
            "Sync plan"
        );

        let deleted = if plan.to_delete.is_empty() {
            Default::default()
        } else {
            tokio::time::timeout(
                self.config.store_timeout,
                self.store.delete_credentials(&plan.to_delete),
            )
            .await
            .map_err(|_| SyncError::timeout("delete_credentials", self.config.store_timeout))?
        };

        let upserted = if plan.to_upsert.is_empty() {
            Default::default()
        } else {
            tokio::time::timeout(
                self.config.store_timeout,
                self.store.put_credentials(&plan.to_upsert),
            )
            .await
            .map_err(|_| SyncError::timeout("put_credentials", self.config.store_timeout))?
        };

        for failure in deleted.failed.iter().chain(upserted.failed.iter()) {
            warn!(code = %failure.code, error = %failure.error, "Credential not applied");
        }

        let report = SyncReport {
            deleted: deleted.succeeded.len(),
            upserted: upserted.succeeded.len(),
            skipped_manual: plan.skipped_manual,
        };

        let mut failed_codes = deleted.failed_codes();
        failed_codes.extend(upserted.failed_codes());
        if failed_codes.is_empty() {
            Ok(report)
        } else {
            Err(SyncError::Partial {
                failed_codes,
                report,
            })
        }
    }

    fn last_started(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct SyncPlan {
    to_delete: Vec<String>,
    to_upsert: Vec<Credential>,
    skipped_manual: usize,
}

/// Compute deletes and upserts. Duplicate upstream codes keep the first.
fn plan(upstream: Vec<Credential>, local: Vec<Credential>) -> SyncPlan {
    let ownership: HashMap<String, bool> = local
        .iter()
        .map(|c| (c.code.as_str().to_string(), c.auto_update))
        .collect();

    let mut upstream_codes = HashSet::new();
    let mut to_upsert = Vec::new();
    let mut skipped_manual = 0;

    for credential in upstream {
        if !upstream_codes.insert(credential.code.as_str().to_string()) {
            continue;
        }
        if ownership.get(credential.code.as_str()) == Some(&false) {
            skipped_manual += 1;
            continue;
        }
        to_upsert.push(credential.auto_update(true));
    }

    let mut to_delete: Vec<String> = local
        .iter()
        .filter(|c| c.auto_update && !upstream_codes.contains(c.code.as_str()))
        .map(|c| c.code.as_str().to_string())
        .collect();
    to_delete.sort();

    SyncPlan {
        to_delete,
        to_upsert,
        skipped_manual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use pigate_core::Code;
    use pigate_storage::MemoryCredentialStore;

    fn auto(code: &str) -> Credential {
        Credential::new(Code::new(code).unwrap(), format!("user {code}"), 1)
    }

    fn manual(code: &str) -> Credential {
        auto(code).auto_update(false)
    }

    fn engine(
        upstream: Vec<Credential>,
    ) -> (SyncEngine<MemoryCredentialStore, StaticSource>, MemoryCredentialStore, StaticSource) {
        let store = MemoryCredentialStore::new();
        let source = StaticSource::new(upstream);
        let engine = SyncEngine::new(Arc::new(store.clone()), source.clone(), SyncConfig::default());
        (engine, store, source)
    }

    async fn local_codes(store: &MemoryCredentialStore) -> Vec<String> {
        let mut codes: Vec<String> = store
            .get_all_credentials()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.code.as_str().to_string())
            .collect();
        codes.sort();
        codes
    }

    #[test]
    fn test_plan_flag_gated() {
        let upstream = vec![auto("A"), auto("B"), auto("M")];
        let local = vec![auto("A"), auto("C"), manual("M"), manual("N")];

        let plan = plan(upstream, local);

        assert_eq!(plan.to_delete, vec!["C".to_string()]);
        let upserts: Vec<&str> = plan.to_upsert.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(upserts, vec!["A", "B"]);
        assert_eq!(plan.skipped_manual, 1);
    }

    #[test]
    fn test_plan_forces_auto_update_and_dedupes() {
        let upstream = vec![manual("A"), auto("A").locked_out(true)];
        let plan = plan(upstream, Vec::new());

        assert_eq!(plan.to_upsert.len(), 1);
        assert!(plan.to_upsert[0].auto_update);
        assert!(!plan.to_upsert[0].locked_out);
    }

    #[tokio::test]
    async fn test_reconcile_ab_against_ac() {
        let (engine, store, _) = engine(vec![auto("A"), auto("B")]);
        store.put_credential(&auto("A")).await.unwrap();
        store.put_credential(&auto("C")).await.unwrap();
        store.put_credential(&manual("M")).await.unwrap();

        let report = engine.sync(SyncTrigger::Manual).await.unwrap();

        assert_eq!(
            report,
            SyncReport {
                deleted: 1,
                upserted: 2,
                skipped_manual: 0
            }
        );
        assert_eq!(local_codes(&store).await, vec!["A", "B", "M"]);
        assert!(!store.get_credential("M").await.unwrap().unwrap().auto_update);
    }

    #[tokio::test]
    async fn test_sync_twice_is_stable() {
        let (engine, store, _) = engine(vec![auto("A"), auto("B").locked_out(true)]);
        store.put_credential(&manual("M")).await.unwrap();

        engine.sync(SyncTrigger::Manual).await.unwrap();
        let first = store.get_all_credentials().await.unwrap();

        let report = engine.sync(SyncTrigger::Manual).await.unwrap();
        let second = store.get_all_credentials().await.unwrap();

        assert_eq!(report.deleted, 0);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_manual_record_wins_conflict() {
        let (engine, store, _) = engine(vec![auto("M").locked_out(true)]);
        store.put_credential(&manual("M")).await.unwrap();

        let report = engine.sync(SyncTrigger::Manual).await.unwrap();

        assert_eq!(report.skipped_manual, 1);
        let kept = store.get_credential("M").await.unwrap().unwrap();
        assert!(!kept.locked_out);
        assert!(!kept.auto_update);
    }

    #[tokio::test]
    async fn test_partial_failure_commits_the_rest() {
        let (engine, store, _) = engine(vec![auto("A"), auto("B"), auto("C")]);
        store.put_credential(&auto("OLD")).await.unwrap();
        store.fail_on("B");

        let result = engine.sync(SyncTrigger::Manual).await;

        match result {
            Err(SyncError::Partial {
                failed_codes,
                report,
            }) => {
                assert_eq!(failed_codes, vec!["B".to_string()]);
                assert_eq!(report.deleted, 1);
                assert_eq!(report.upserted, 2);
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
        assert_eq!(local_codes(&store).await, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_upstream_failure_changes_nothing() {
        let (engine, store, source) = engine(Vec::new());
        store.put_credential(&auto("A")).await.unwrap();
        source.set_failure(Some("bucket unreachable".to_string()));

        let result = engine.sync(SyncTrigger::Startup).await;

        assert!(matches!(result, Err(SyncError::Upstream { .. })));
        assert_eq!(local_codes(&store).await, vec!["A"]);
    }

    #[tokio::test]
    async fn test_empty_upstream_deletes_all_feed_records() {
        let (engine, store, _) = engine(Vec::new());
        store.put_credential(&auto("A")).await.unwrap();
        store.put_credential(&manual("M")).await.unwrap();

        let report = engine.sync(SyncTrigger::Manual).await.unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(local_codes(&store).await, vec!["M"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_begin_cooldown() {
        let (engine, _, _) = engine(Vec::new());
        let start = Instant::now();

        assert!(engine.try_begin(start));
        assert!(!engine.try_begin(start + Duration::from_secs(4)));
        assert!(engine.try_begin(start + Duration::from_secs(5)));
        assert!(!engine.try_begin(start + Duration::from_secs(6)));
        assert_eq!(
            engine.cooldown_ends(),
            Some(start + Duration::from_secs(10))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_debounces() {
        let (engine, _, _) = engine(vec![auto("A")]);

        assert!(matches!(
            engine.trigger(SyncTrigger::Notification).await,
            TriggerOutcome::Ran(Ok(_))
        ));
        assert!(matches!(
            engine.trigger(SyncTrigger::Notification).await,
            TriggerOutcome::Debounced
        ));

        let ends = engine.cooldown_ends().unwrap();
        tokio::time::sleep_until(ends).await;
        assert!(matches!(
            engine.trigger(SyncTrigger::FileChange).await,
            TriggerOutcome::Ran(Ok(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_coalesces_with_running_pass() {
        let store = MemoryCredentialStore::new();
        store.set_latency(Some(Duration::from_secs(2)));
        let engine = Arc::new(SyncEngine::new(
            Arc::new(store),
            StaticSource::new(vec![auto("A")]),
            SyncConfig::default().cooldown(Duration::ZERO),
        ));

        let running = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.sync(SyncTrigger::Interval).await })
        };
        tokio::task::yield_now().await;

        assert!(matches!(
            engine.trigger(SyncTrigger::Notification).await,
            TriggerOutcome::Coalesced
        ));
        running.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_trigger_keeps_cooldown_window() {
        let store = MemoryCredentialStore::new();
        store.set_latency(Some(Duration::from_secs(2)));
        let engine = Arc::new(SyncEngine::new(
            Arc::new(store),
            StaticSource::new(vec![auto("A")]),
            SyncConfig::default(),
        ));

        let running = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.sync(SyncTrigger::Interval).await })
        };
        tokio::task::yield_now().await;
        let ends = engine.cooldown_ends();

        assert!(matches!(
            engine.trigger(SyncTrigger::Notification).await,
            TriggerOutcome::Coalesced
        ));
        assert_eq!(engine.cooldown_ends(), ends);
        running.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout() {
        let store = MemoryCredentialStore::new();
        store.set_latency(Some(Duration::from_secs(60)));
        let engine = SyncEngine::new(
            Arc::new(store),
            StaticSource::new(vec![auto("A")]),
            SyncConfig::default(),
        );

        let result = engine.sync(SyncTrigger::Manual).await;
        assert!(matches!(result, Err(SyncError::Storage(_))));
    }
}
