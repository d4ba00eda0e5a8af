use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gavel_core::AuctionStatus;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::interval::{interval_from_env, parse_duration, tick_period};
use crate::store::AuctionStore;
use crate::types::{ExpiryFilter, SweepOutcome};

/// Timing knobs for the closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloserSettings {
    /// How long an auction stays active.
    pub interval: Duration,
    /// Bound on a single sweep's store call. `None` uses three quarters of
    /// the tick period.
    pub sweep_timeout: Option<Duration>,
}

impl CloserSettings {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            sweep_timeout: None,
        }
    }

    /// Interval from `AUCTION_INTERVAL`, default timeout.
    pub fn from_env() -> Self {
        Self::new(interval_from_env())
    }

    pub fn with_sweep_timeout(mut self, timeout: Duration) -> Self {
        self.sweep_timeout = Some(timeout);
        self
    }

    /// Apply a raw timeout setting. Malformed or out-of-range values are
    /// ignored and the default bound is kept.
    pub fn with_timeout_setting(self, raw: Option<&str>) -> Self {
        match raw.and_then(parse_duration) {
            Some(timeout) if !timeout.is_zero() && timeout < self.tick() => {
                self.with_sweep_timeout(timeout)
            }
            Some(_) | None => {
                if let Some(value) = raw {
                    warn!(
                        value,
                        "ignoring sweep timeout; must be non-zero and shorter than one tick"
                    );
                }
                self
            }
        }
    }

    pub fn tick(&self) -> Duration {
        tick_period(self.interval)
    }

    pub fn sweep_timeout(&self) -> Duration {
        self.sweep_timeout.unwrap_or_else(|| self.tick() * 3 / 4)
    }
}

impl Default for CloserSettings {
    fn default() -> Self {
        Self::new(crate::interval::DEFAULT_INTERVAL)
    }
}

/// Closes auctions whose active interval has elapsed.
///
/// Every sweep runs under `guard`, so the periodic engine and any manual
/// trigger sharing this closer never overlap their store round-trips.
pub struct AuctionCloser {
    store: Arc<dyn AuctionStore>,
    collection: String,
    settings: CloserSettings,
    guard: Mutex<()>,
}

impl AuctionCloser {
    pub fn new(
        store: Arc<dyn AuctionStore>,
        collection: impl Into<String>,
        settings: CloserSettings,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            settings,
            guard: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &CloserSettings {
        &self.settings
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Run one expiry sweep.
    ///
    /// Marks every active auction created at or before `now - interval` as
    /// completed with a single batch update. Store failures and timeouts are
    /// logged and reported in the outcome, never returned as errors.
    ///
    /// When the store call outlives the sweep timeout the closer asks the
    /// store to [`interrupt`](AuctionStore::interrupt) it, then keeps the
    /// guard until the call has actually returned. `TimedOut` therefore
    /// means no row was changed. A call that completes anyway is reported as
    /// `Closed` with its real count.
    pub async fn close_expired(&self) -> SweepOutcome {
        let _guard = self.guard.lock().await;
        let started = Instant::now();

        let interval =
            chrono::Duration::from_std(self.settings.interval).unwrap_or(chrono::Duration::MAX);
        let threshold = Utc::now()
            .checked_sub_signed(interval)
            .map(|t| t.timestamp())
            .unwrap_or(i64::MIN);
        let filter = ExpiryFilter::active_before(threshold);

        let timeout = self.settings.sweep_timeout();
        let mut update =
            self.store.update_many(&self.collection, &filter, AuctionStatus::Completed);
        let outcome = match tokio::time::timeout(timeout, &mut update).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!(
                        collection = %self.collection,
                        count,
                        threshold,
                        "closed {count} expired auction(s)"
                    );
                } else {
                    debug!(collection = %self.collection, threshold, "no expired auctions");
                }
                SweepOutcome::Closed { threshold, count }
            }
            Ok(Err(e)) => {
                error!(
                    collection = %self.collection,
                    threshold,
                    error = %e,
                    "failed to close expired auctions"
                );
                SweepOutcome::Failed
            }
            Err(_) => {
                self.store.interrupt();
                match update.await {
                    Ok(count) => {
                        warn!(
                            collection = %self.collection,
                            count,
                            threshold,
                            timeout_ms = timeout.as_millis() as u64,
                            "expiry sweep overran its timeout; closed {count} auction(s)"
                        );
                        SweepOutcome::Closed { threshold, count }
                    }
                    Err(e) => {
                        error!(
                            collection = %self.collection,
                            threshold,
                            timeout_ms = timeout.as_millis() as u64,
                            error = %e,
                            "closing expired auctions timed out"
                        );
                        SweepOutcome::TimedOut
                    }
                }
            }
        };

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "expiry sweep finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use gavel_core::{Auction, ProductCondition};
    use rusqlite::Connection;
    use tokio::sync::Notify;

    use super::*;
    use crate::db::{init_collection, SqliteAuctionStore};
    use crate::error::{Result, StoreError};
    use crate::types::AuctionRecord;

    const COLLECTION: &str = "auctions";

    fn aged(id: &str, age_secs: i64) -> AuctionRecord {
        let auction = Auction::new("Bike", "Sports", "Road bike", ProductCondition::Used)
            .with_id(id)
            .with_timestamp(Utc::now() - ChronoDuration::seconds(age_secs));
        AuctionRecord::from(&auction)
    }

    async fn seeded(records: &[AuctionRecord]) -> SqliteAuctionStore {
        let store = SqliteAuctionStore::open_in_memory().unwrap();
        for r in records {
            store.insert_one(COLLECTION, r).await.unwrap();
        }
        store
    }

    async fn status_of(store: &SqliteAuctionStore, id: &str) -> AuctionStatus {
        store
            .find_by_id(COLLECTION, id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    /// Store that tracks how many `update_many` calls run at once. Each call
    /// takes `delay` and ignores interrupts.
    struct OverlapTracker {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl OverlapTracker {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AuctionStore for OverlapTracker {
        async fn insert_one(&self, _: &str, _: &AuctionRecord) -> Result<()> {
            Ok(())
        }

        async fn update_many(&self, _: &str, _: &ExpiryFilter, _: AuctionStatus) -> Result<u64> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(4)
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl AuctionStore for BrokenStore {
        async fn insert_one(&self, _: &str, _: &AuctionRecord) -> Result<()> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn update_many(&self, _: &str, _: &ExpiryFilter, _: AuctionStatus) -> Result<u64> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    /// Never finishes an update on its own; returns only once interrupted.
    #[derive(Default)]
    struct HungStore {
        release: Notify,
        interrupts: AtomicUsize,
    }

    #[async_trait]
    impl AuctionStore for HungStore {
        async fn insert_one(&self, _: &str, _: &AuctionRecord) -> Result<()> {
            Ok(())
        }

        async fn update_many(&self, _: &str, _: &ExpiryFilter, _: AuctionStatus) -> Result<u64> {
            self.release.notified().await;
            Err(StoreError::Interrupted)
        }

        fn interrupt(&self) {
            self.interrupts.fetch_add(1, Ordering::SeqCst);
            self.release.notify_one();
        }
    }

    #[test]
    fn default_timeout_is_below_one_tick() {
        let settings = CloserSettings::new(Duration::from_secs(2));
        assert_eq!(settings.tick(), Duration::from_secs(1));
        assert_eq!(settings.sweep_timeout(), Duration::from_millis(750));

        let long = CloserSettings::new(Duration::from_secs(300));
        assert!(long.sweep_timeout() < long.tick());
    }

    #[test]
    fn timeout_setting_must_fit_in_a_tick() {
        let base = CloserSettings::new(Duration::from_secs(10));
        assert_eq!(
            base.with_timeout_setting(Some("2s")).sweep_timeout(),
            Duration::from_secs(2)
        );
        // Tick is 5s; 6s would let sweeps stack up.
        assert_eq!(base.with_timeout_setting(Some("6s")), base);
        assert_eq!(base.with_timeout_setting(Some("0s")), base);
        assert_eq!(base.with_timeout_setting(Some("later")), base);
        assert_eq!(base.with_timeout_setting(None), base);
    }

    #[tokio::test]
    async fn closes_only_expired_active_auctions() {
        let store = seeded(&[aged("old", 10), aged("fresh", 0)]).await;
        let closer = AuctionCloser::new(
            Arc::new(store.clone()),
            COLLECTION,
            CloserSettings::new(Duration::from_secs(5)),
        );

        let outcome = closer.close_expired().await;
        assert_eq!(outcome.closed(), 1);
        assert_eq!(status_of(&store, "old").await, AuctionStatus::Completed);
        assert_eq!(status_of(&store, "fresh").await, AuctionStatus::Active);
    }

    #[tokio::test]
    async fn second_sweep_is_a_no_op() {
        let store = seeded(&[aged("a", 60), aged("b", 61)]).await;
        let closer = AuctionCloser::new(
            Arc::new(store.clone()),
            COLLECTION,
            CloserSettings::new(Duration::from_secs(30)),
        );

        assert_eq!(closer.close_expired().await.closed(), 2);
        let second = closer.close_expired().await;
        assert!(second.is_success());
        assert_eq!(second.closed(), 0);
        assert_eq!(status_of(&store, "a").await, AuctionStatus::Completed);
    }

    #[tokio::test]
    async fn empty_collection_is_a_normal_outcome() {
        let store = seeded(&[]).await;
        let closer = AuctionCloser::new(Arc::new(store), COLLECTION, CloserSettings::default());
        assert!(matches!(
            closer.close_expired().await,
            SweepOutcome::Closed { count: 0, .. }
        ));
    }

    #[tokio::test]
    async fn threshold_is_now_minus_interval() {
        let store = seeded(&[]).await;
        let closer = AuctionCloser::new(
            Arc::new(store),
            COLLECTION,
            CloserSettings::new(Duration::from_secs(120)),
        );
        let before = Utc::now().timestamp() - 120;
        let SweepOutcome::Closed { threshold, .. } = closer.close_expired().await else {
            panic!("sweep against an in-memory store should succeed");
        };
        let after = Utc::now().timestamp() - 120;
        assert!(threshold >= before && threshold <= after);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sweeps_never_overlap() {
        let tracker = Arc::new(OverlapTracker::new(Duration::from_millis(30)));
        let closer = Arc::new(AuctionCloser::new(
            tracker.clone(),
            COLLECTION,
            CloserSettings::new(Duration::from_secs(60)),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let closer = Arc::clone(&closer);
                tokio::spawn(async move { closer.close_expired().await })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(tracker.calls.load(Ordering::SeqCst), 8);
        assert_eq!(tracker.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overrunning_store_call_keeps_the_guard() {
        let tracker = Arc::new(OverlapTracker::new(Duration::from_millis(60)));
        let closer = Arc::new(AuctionCloser::new(
            tracker.clone(),
            COLLECTION,
            CloserSettings::new(Duration::from_secs(60))
                .with_sweep_timeout(Duration::from_millis(5)),
        ));

        let started = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let closer = Arc::clone(&closer);
                tokio::spawn(async move { closer.close_expired().await })
            })
            .collect();
        for h in handles {
            // The store finished the update, so the real count is reported.
            assert_eq!(h.await.unwrap().closed(), 4);
        }

        assert_eq!(tracker.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_millis(240));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_triggers_close_each_auction_once() {
        let records: Vec<_> = (0..5).map(|i| aged(&format!("exp-{i}"), 100)).collect();
        let store = seeded(&records).await;
        let closer = Arc::new(AuctionCloser::new(
            Arc::new(store.clone()),
            COLLECTION,
            CloserSettings::new(Duration::from_secs(10)),
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let closer = Arc::clone(&closer);
                tokio::spawn(async move { closer.close_expired().await })
            })
            .collect();
        let mut total = 0;
        for h in handles {
            total += h.await.unwrap().closed();
        }

        assert_eq!(total, 5);
        assert_eq!(
            store
                .count_by_status(COLLECTION, AuctionStatus::Completed)
                .await
                .unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn store_error_is_reported_not_raised() {
        let closer =
            AuctionCloser::new(Arc::new(BrokenStore), COLLECTION, CloserSettings::default());
        assert_eq!(closer.close_expired().await, SweepOutcome::Failed);
        // Guard was released: a second sweep runs rather than deadlocking.
        assert_eq!(closer.close_expired().await, SweepOutcome::Failed);
    }

    #[tokio::test]
    async fn hung_store_times_out_and_releases_guard() {
        let store = Arc::new(HungStore::default());
        let closer = AuctionCloser::new(
            store.clone(),
            COLLECTION,
            CloserSettings::new(Duration::from_secs(2))
                .with_sweep_timeout(Duration::from_millis(50)),
        );

        let started = Instant::now();
        assert_eq!(closer.close_expired().await, SweepOutcome::TimedOut);
        assert_eq!(closer.close_expired().await, SweepOutcome::TimedOut);
        assert_eq!(store.interrupts.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timed_out_sweep_leaves_rows_untouched() {
        const BACKLOG: u64 = 200_000;

        let conn = Connection::open_in_memory().unwrap();
        init_collection(&conn, COLLECTION).unwrap();
        conn.execute_batch(&format!(
            "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < {BACKLOG})
             INSERT INTO {COLLECTION}
                 (id, product_name, category, description, condition, status, timestamp)
             SELECT 'lot-' || n, 'Bike', 'Sports', 'Road bike', 2, 0, 100 FROM seq;"
        ))
        .unwrap();
        let store = SqliteAuctionStore::new(conn);

        let closer = AuctionCloser::new(
            Arc::new(store.clone()),
            COLLECTION,
            CloserSettings::new(Duration::from_secs(60))
                .with_sweep_timeout(Duration::from_millis(1)),
        );
        let outcome = closer.close_expired().await;
        let completed = store
            .count_by_status(COLLECTION, AuctionStatus::Completed)
            .await
            .unwrap();
        match outcome {
            SweepOutcome::TimedOut => assert_eq!(completed, 0),
            SweepOutcome::Closed { count, .. } => assert_eq!(count, completed),
            SweepOutcome::Failed => panic!("in-memory update should not fail"),
        }

        // Nothing is still running once the sweep has returned.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(
            store
                .count_by_status(COLLECTION, AuctionStatus::Completed)
                .await
                .unwrap(),
            completed
        );

        // A sweep with room to finish picks up the remaining backlog.
        let patient = AuctionCloser::new(
            Arc::new(store.clone()),
            COLLECTION,
            CloserSettings::new(Duration::from_secs(60)),
        );
        assert_eq!(patient.close_expired().await.closed(), BACKLOG - completed);
        assert_eq!(
            store
                .count_by_status(COLLECTION, AuctionStatus::Active)
                .await
                .unwrap(),
            0
        );
    }
}
