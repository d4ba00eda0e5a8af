use std::sync::Arc;
use std::time::Duration;

use gavel_core::{Auction, GavelError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::closer::{AuctionCloser, CloserSettings};
use crate::engine::CloserEngine;
use crate::store::AuctionStore;
use crate::types::AuctionRecord;

/// Entry point for auction persistence.
///
/// Constructing a repository spawns its [`CloserEngine`] immediately; the
/// engine runs until the caller cancels the `shutdown` token passed in.
/// There is no separate stop call. Must be constructed inside a Tokio
/// runtime.
pub struct AuctionRepository {
    store: Arc<dyn AuctionStore>,
    collection: String,
    closer: Arc<AuctionCloser>,
    engine: JoinHandle<()>,
}

impl AuctionRepository {
    /// Build a repository whose interval comes from `AUCTION_INTERVAL`
    /// (five minutes when unset or malformed).
    pub fn new(
        shutdown: CancellationToken,
        store: Arc<dyn AuctionStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self::with_settings(shutdown, store, collection, CloserSettings::from_env())
    }

    /// Build a repository with explicit closer timing.
    pub fn with_settings(
        shutdown: CancellationToken,
        store: Arc<dyn AuctionStore>,
        collection: impl Into<String>,
        settings: CloserSettings,
    ) -> Self {
        let collection = collection.into();
        let closer = Arc::new(AuctionCloser::new(
            Arc::clone(&store),
            collection.clone(),
            settings,
        ));
        let engine = CloserEngine::new(Arc::clone(&closer)).spawn(shutdown);

        info!(
            %collection,
            interval_ms = settings.interval.as_millis() as u64,
            "auction repository ready"
        );

        Self {
            store,
            collection,
            closer,
            engine,
        }
    }

    /// Persist a new auction. Does not interact with the closer.
    #[instrument(
        skip(self, auction),
        fields(auction_id = %auction.id, collection = %self.collection)
    )]
    pub async fn create_auction(&self, auction: &Auction) -> gavel_core::Result<()> {
        let record = AuctionRecord::from(auction);
        if let Err(e) = self.store.insert_one(&self.collection, &record).await {
            error!(error = %e, "Error trying to insert auction");
            return Err(GavelError::Internal(
                "Error trying to insert auction".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        self.closer.settings().interval
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Shared closer, for administrative sweeps outside the tick schedule.
    /// Such sweeps serialize with the engine's own.
    pub fn closer(&self) -> &Arc<AuctionCloser> {
        &self.closer
    }

    /// Whether the background engine is still looping.
    pub fn is_closer_running(&self) -> bool {
        !self.engine.is_finished()
    }

    /// Wait for the engine to exit after the shutdown token is cancelled.
    pub async fn join_closer(self) {
        if let Err(e) = self.engine.await {
            error!(error = %e, "auction closer task failed");
        }
    }
}
