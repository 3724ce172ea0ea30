//! Daily update coordination.
//!
//! The coordinator owns the freshness state and is the only place that
//! changes it. Both the hourly timer and manual triggers go through
//! [`UpdateCoordinator::run_cycle`], which refuses to start while another
//! cycle is ingesting.

use crate::core::error::{FetchError, ParseError};
use crate::core::rate::SymbolTable;
use crate::core::source::DocumentSource;
use crate::core::store::RateStore;
use crate::extract::pdf::read_pages;
use crate::extract::rates::{MalformedPolicy, extract};
use crate::extract::rows::flatten_pages;
use crate::providers::document::FetchOutcome;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Ingesting,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Timer tick; honours the daily gate.
    Automatic,
    /// Explicit request; bypasses the daily gate.
    Manual,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FreshnessState {
    pub last_known_document_modified_at: Option<DateTime<FixedOffset>>,
    pub updated_today: bool,
    /// Day the gate was last reopened by a midnight tick.
    pub last_reset_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyRunning,
    AlreadyUpdatedToday,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    Failed { error: String },
    Skipped { reason: SkipReason },
}

/// What a single call to [`UpdateCoordinator::run_cycle`] did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub trigger: Trigger,
    pub outcome: CycleOutcome,
    pub document: Option<FetchOutcome>,
    pub extracted: usize,
    pub malformed: usize,
    pub stored: usize,
    pub persist_failures: usize,
}

impl CycleReport {
    fn skipped(trigger: Trigger, reason: SkipReason) -> Self {
        Self {
            trigger,
            outcome: CycleOutcome::Skipped { reason },
            document: None,
            extracted: 0,
            malformed: 0,
            stored: 0,
            persist_failures: 0,
        }
    }
}

/// Snapshot of the coordinator's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorStatus {
    pub phase: Phase,
    pub freshness: FreshnessState,
}

#[derive(Debug, Error)]
enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

struct Batch {
    document: FetchOutcome,
    extracted: usize,
    malformed: usize,
    stored: usize,
    persist_failures: usize,
}

pub struct UpdateCoordinator {
    source: Arc<dyn DocumentSource>,
    store: Arc<dyn RateStore>,
    symbols: SymbolTable,
    policy: MalformedPolicy,
    state: Mutex<CoordinatorStatus>,
}

impl UpdateCoordinator {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        store: Arc<dyn RateStore>,
        symbols: SymbolTable,
        policy: MalformedPolicy,
    ) -> Self {
        Self {
            source,
            store,
            symbols,
            policy,
            state: Mutex::new(CoordinatorStatus {
                phase: Phase::Idle,
                freshness: FreshnessState::default(),
            }),
        }
    }

    pub async fn status(&self) -> CoordinatorStatus {
        self.state.lock().await.clone()
    }

    /// Runs one ingestion pass unless the gate or a running pass forbids it.
    ///
    /// The state lock is released while fetching, parsing and persisting.
    pub async fn run_cycle(&self, trigger: Trigger) -> CycleReport {
        let updated_today = {
            let mut state = self.state.lock().await;
            if state.phase == Phase::Ingesting {
                info!("Ingestion already running, ignoring {:?} trigger", trigger);
                return CycleReport::skipped(trigger, SkipReason::AlreadyRunning);
            }
            if trigger == Trigger::Automatic && state.freshness.updated_today {
                debug!("Rates already updated today, skipping automatic cycle");
                return CycleReport::skipped(trigger, SkipReason::AlreadyUpdatedToday);
            }
            state.phase = Phase::Ingesting;
            state.freshness.updated_today
        };

        info!("Starting {:?} rate update", trigger);
        let result = self.ingest(updated_today).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(batch) => {
                state.freshness.updated_today = true;
                if batch.document.last_modified.is_some() {
                    state.freshness.last_known_document_modified_at = batch.document.last_modified;
                }
                state.phase = Phase::Cooldown;
                info!(
                    "Rate update finished: {} extracted, {} stored, {} failed to persist",
                    batch.extracted, batch.stored, batch.persist_failures
                );

                CycleReport {
                    trigger,
                    outcome: CycleOutcome::Completed,
                    document: Some(batch.document),
                    extracted: batch.extracted,
                    malformed: batch.malformed,
                    stored: batch.stored,
                    persist_failures: batch.persist_failures,
                }
            }
            Err(e) => {
                error!("Rate update failed: {}", e);
                state.phase = if state.freshness.updated_today {
                    Phase::Cooldown
                } else {
                    Phase::Idle
                };

                CycleReport {
                    trigger,
                    outcome: CycleOutcome::Failed {
                        error: e.to_string(),
                    },
                    document: None,
                    extracted: 0,
                    malformed: 0,
                    stored: 0,
                    persist_failures: 0,
                }
            }
        }
    }

    /// Handles a timer tick observed at local time `now`.
    ///
    /// The first tick in hour 0 of a day reopens the daily gate; later ticks
    /// in the same hour leave it alone. The automatic cycle then runs if the
    /// gate is open.
    pub async fn tick(&self, now: NaiveDateTime) -> CycleReport {
        {
            let mut state = self.state.lock().await;
            let today = now.date();
            if now.hour() == 0 && state.freshness.last_reset_on != Some(today) {
                if state.freshness.updated_today {
                    info!("Midnight, reopening the daily update gate");
                }
                state.freshness.updated_today = false;
                state.freshness.last_reset_on = Some(today);
                if state.phase == Phase::Cooldown {
                    state.phase = Phase::Idle;
                }
            }
            debug!(
                "Tick at {}, updated today: {}",
                now, state.freshness.updated_today
            );
        }
        self.run_cycle(Trigger::Automatic).await
    }

    /// Ticks every `period`, starting one period from now.
    pub fn spawn_timer(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let report = self.tick(Local::now().naive_local()).await;
                debug!(?report, "Timer tick handled");
            }
        })
    }

    async fn ingest(&self, updated_today: bool) -> Result<Batch, IngestError> {
        let document = self.source.fetch(updated_today).await?;

        let bytes = tokio::fs::read(&document.path)
            .await
            .map_err(|source| ParseError::Read {
                path: document.path.display().to_string(),
                source,
            })?;
        let pages = tokio::task::spawn_blocking(move || read_pages(&bytes))
            .await
            .map_err(|e| ParseError::Worker(e.to_string()))??;

        let rows = flatten_pages(&pages);
        debug!("Document has {} pages, {} rows", pages.len(), rows.len());

        let extraction = extract(&rows, &self.symbols, self.policy, Local::now());
        if extraction.observations.is_empty() {
            warn!("No tracked currencies found in the rate document");
        }

        let extracted = extraction.observations.len();
        let mut stored = 0;
        let mut persist_failures = 0;
        for observation in extraction.observations {
            let code = observation.code.clone();
            match self.store.insert(observation).await {
                Ok(row) => {
                    debug!("Persisted {} as row {}", code, row.id);
                    stored += 1;
                }
                Err(e) => {
                    error!("Failed to persist rate for {}: {}", code, e);
                    persist_failures += 1;
                }
            }
        }

        Ok(Batch {
            document,
            extracted,
            malformed: extraction.malformed,
            stored,
            persist_failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StoreError;
    use crate::core::rate::{CurrencyObservation, StoredRate};
    use crate::extract::pdf::test_support::{build_pdf, page};
    use crate::store::memory::MemoryRateStore;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FakeSource {
        dir: TempDir,
        body: Vec<u8>,
        delay: Duration,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn serving(body: Vec<u8>) -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                body,
                delay: Duration::ZERO,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn path(&self) -> PathBuf {
            self.dir.path().join("rates.pdf")
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentSource for FakeSource {
        async fn fetch(&self, _updated_today: bool) -> Result<FetchOutcome, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(FetchError::Status {
                    url: "http://bank.test/rates.pdf".to_string(),
                    status: 502,
                });
            }
            tokio::fs::write(self.path(), &self.body).await.unwrap();
            Ok(FetchOutcome {
                path: self.path(),
                last_modified: None,
                is_new_for_today: false,
                bytes_written: self.body.len(),
            })
        }
    }

    /// Fails the nth insert (1-based), delegating the rest.
    struct FlakyStore {
        inner: MemoryRateStore,
        fail_on: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateStore for FlakyStore {
        async fn insert(&self, observation: CurrencyObservation) -> Result<StoredRate, StoreError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(StoreError::Unavailable("database is locked".to_string()));
            }
            self.inner.insert(observation).await
        }

        async fn latest(&self, code: &str) -> Result<StoredRate, StoreError> {
            self.inner.latest(code).await
        }

        async fn all(&self) -> Result<Vec<StoredRate>, StoreError> {
            self.inner.all().await
        }
    }

    fn symbols() -> SymbolTable {
        [
            ("United States Dollars", "USD"),
            ("Great Britain Pound", "GBP"),
            ("Euro", "EUR"),
        ]
        .into_iter()
        .collect()
    }

    fn rate_sheet() -> Vec<u8> {
        build_pdf(vec![page(&[
            (50, 760, "Daily Forex Rates "),
            (50, 740, "Currency Buying Selling"),
            (50, 720, "United States Dollars "),
            (250, 720, "12.10 12.95"),
            (50, 700, "Great Britain Pound 15.20 16.10"),
            (50, 680, "Euro 13.05 13.90"),
        ])])
    }

    fn coordinator(source: Arc<FakeSource>, store: Arc<dyn RateStore>) -> UpdateCoordinator {
        UpdateCoordinator::new(source, store, symbols(), MalformedPolicy::Skip)
    }

    #[tokio::test]
    async fn test_cycle_persists_every_observation() {
        let source = Arc::new(FakeSource::serving(rate_sheet()));
        let store = Arc::new(MemoryRateStore::new());
        let coordinator = coordinator(Arc::clone(&source), store.clone());

        let report = coordinator.run_cycle(Trigger::Automatic).await;

        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.extracted, 3);
        assert_eq!(report.stored, 3);
        assert_eq!(report.persist_failures, 0);

        let rows = store.all().await.unwrap();
        let codes: Vec<&str> = rows.iter().map(|r| r.currency.as_str()).collect();
        assert_eq!(codes, vec!["USD", "GBP", "EUR"]);
        assert_eq!(rows[0].buying, 12.10);
        assert_eq!(rows[0].selling, 12.95);

        let status = coordinator.status().await;
        assert_eq!(status.phase, Phase::Cooldown);
        assert!(status.freshness.updated_today);
    }

    #[tokio::test]
    async fn test_persist_failure_does_not_abort_batch() {
        let source = Arc::new(FakeSource::serving(rate_sheet()));
        let store = Arc::new(FlakyStore {
            inner: MemoryRateStore::new(),
            fail_on: 2,
            calls: AtomicUsize::new(0),
        });
        let coordinator = coordinator(source, store.clone());

        let report = coordinator.run_cycle(Trigger::Manual).await;

        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.extracted, 3);
        assert_eq!(report.stored, 2);
        assert_eq!(report.persist_failures, 1);

        let codes: Vec<String> = store
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.currency)
            .collect();
        assert_eq!(codes, vec!["USD", "EUR"]);
        assert!(coordinator.status().await.freshness.updated_today);
    }

    #[tokio::test]
    async fn test_automatic_gate_allows_one_batch_per_day() {
        let source = Arc::new(FakeSource::serving(rate_sheet()));
        let store = Arc::new(MemoryRateStore::new());
        let coordinator = coordinator(Arc::clone(&source), store.clone());

        let first = coordinator.run_cycle(Trigger::Automatic).await;
        let second = coordinator.run_cycle(Trigger::Automatic).await;

        assert_eq!(first.outcome, CycleOutcome::Completed);
        assert_eq!(
            second.outcome,
            CycleOutcome::Skipped {
                reason: SkipReason::AlreadyUpdatedToday
            }
        );
        assert_eq!(source.calls(), 1);
        assert_eq!(store.all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_do_not_interleave() {
        let mut fake = FakeSource::serving(rate_sheet());
        fake.delay = Duration::from_millis(50);
        let source = Arc::new(fake);
        let store = Arc::new(MemoryRateStore::new());
        let coordinator = coordinator(Arc::clone(&source), store.clone());

        let (first, second) = tokio::join!(
            coordinator.run_cycle(Trigger::Automatic),
            coordinator.run_cycle(Trigger::Manual)
        );

        assert_eq!(first.outcome, CycleOutcome::Completed);
        assert_eq!(
            second.outcome,
            CycleOutcome::Skipped {
                reason: SkipReason::AlreadyRunning
            }
        );
        assert_eq!(source.calls(), 1);
        assert_eq!(store.all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_manual_trigger_bypasses_gate() {
        let source = Arc::new(FakeSource::serving(rate_sheet()));
        let store = Arc::new(MemoryRateStore::new());
        let coordinator = coordinator(Arc::clone(&source), store.clone());

        coordinator.run_cycle(Trigger::Automatic).await;
        let manual = coordinator.run_cycle(Trigger::Manual).await;

        assert_eq!(manual.outcome, CycleOutcome::Completed);
        assert_eq!(source.calls(), 2);
        assert_eq!(store.all().await.unwrap().len(), 6);
        assert_eq!(coordinator.status().await.phase, Phase::Cooldown);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_gate_open() {
        let mut fake = FakeSource::serving(rate_sheet());
        fake.fail = true;
        let source = Arc::new(fake);
        let store = Arc::new(MemoryRateStore::new());
        let coordinator = coordinator(Arc::clone(&source), store.clone());

        let report = coordinator.run_cycle(Trigger::Automatic).await;
        assert!(matches!(report.outcome, CycleOutcome::Failed { .. }));
        assert_eq!(report.stored, 0);

        let status = coordinator.status().await;
        assert_eq!(status.phase, Phase::Idle);
        assert!(!status.freshness.updated_today);

        // next tick retries
        coordinator.tick(at(19, 9)).await;
        assert_eq!(source.calls(), 2);
        assert!(store.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unparsable_document_leaves_gate_open() {
        let source = Arc::new(FakeSource::serving(b"<html>maintenance</html>".to_vec()));
        let coordinator = coordinator(source, Arc::new(MemoryRateStore::new()));

        let report = coordinator.run_cycle(Trigger::Automatic).await;

        match report.outcome {
            CycleOutcome::Failed { error } => assert!(error.contains("unreadable document")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!coordinator.status().await.freshness.updated_today);
    }

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_midnight_tick_reopens_gate() {
        let source = Arc::new(FakeSource::serving(rate_sheet()));
        let coordinator = coordinator(Arc::clone(&source), Arc::new(MemoryRateStore::new()));

        let morning = coordinator.tick(at(19, 10)).await;
        let afternoon = coordinator.tick(at(19, 15)).await;
        assert_eq!(morning.outcome, CycleOutcome::Completed);
        assert_eq!(
            afternoon.outcome,
            CycleOutcome::Skipped {
                reason: SkipReason::AlreadyUpdatedToday
            }
        );

        let midnight = coordinator.tick(at(20, 0)).await;
        assert_eq!(midnight.outcome, CycleOutcome::Completed);
        assert_eq!(source.calls(), 2);

        let status = coordinator.status().await;
        assert_eq!(status.phase, Phase::Cooldown);
        assert_eq!(
            status.freshness.last_reset_on,
            NaiveDate::from_ymd_opt(2026, 10, 20)
        );
    }

    #[tokio::test]
    async fn test_repeated_midnight_ticks_reset_once_per_day() {
        let source = Arc::new(FakeSource::serving(rate_sheet()));
        let store = Arc::new(MemoryRateStore::new());
        let coordinator = coordinator(Arc::clone(&source), store.clone());

        let mut outcomes = Vec::new();
        for minute in [0, 15, 30, 45] {
            let now = at(20, 0) + chrono::Duration::minutes(minute);
            outcomes.push(coordinator.tick(now).await.outcome);
        }

        assert_eq!(outcomes[0], CycleOutcome::Completed);
        for outcome in &outcomes[1..] {
            assert_eq!(
                *outcome,
                CycleOutcome::Skipped {
                    reason: SkipReason::AlreadyUpdatedToday
                }
            );
        }
        assert_eq!(source.calls(), 1);
        assert_eq!(store.all().await.unwrap().len(), 3);

        // next midnight reopens the gate again
        let next_day = coordinator.tick(at(21, 0)).await;
        assert_eq!(next_day.outcome, CycleOutcome::Completed);
        assert_eq!(store.all().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_spawned_timer_runs_automatic_cycle() {
        let source = Arc::new(FakeSource::serving(rate_sheet()));
        let store = Arc::new(MemoryRateStore::new());
        let coordinator = Arc::new(coordinator(Arc::clone(&source), store.clone()));

        let handle = Arc::clone(&coordinator).spawn_timer(Duration::from_millis(20));
        for _ in 0..100 {
            if coordinator.status().await.freshness.updated_today {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert!(coordinator.status().await.freshness.updated_today);
        assert_eq!(store.all().await.unwrap().len(), 3);
    }
}
