use async_trait::async_trait;
use gavel_core::AuctionStatus;

use crate::error::Result;
use crate::types::{AuctionRecord, ExpiryFilter};

/// Persistence operations the repository and the closer need.
///
/// `collection` names the table (or equivalent) holding auction rows, so one
/// store handle can serve several repositories.
#[async_trait]
pub trait AuctionStore: Send + Sync {
    /// Insert a single auction.
    async fn insert_one(&self, collection: &str, record: &AuctionRecord) -> Result<()>;

    /// Set `status` on every row matching `filter` in one round-trip.
    ///
    /// Returns the number of rows actually modified.
    async fn update_many(
        &self,
        collection: &str,
        filter: &ExpiryFilter,
        status: AuctionStatus,
    ) -> Result<u64>;

    /// Ask an in-flight `update_many` to stop early.
    ///
    /// A call stopped this way must return an error and leave every row as
    /// it was. Backends that cannot abort a running statement keep the
    /// default no-op, and the call runs to completion.
    fn interrupt(&self) {}
}
