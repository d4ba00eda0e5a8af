use gavel_core::{Auction, AuctionStatus, ProductCondition};

/// Persisted shape of an auction row.
///
/// Mirrors [`Auction`] but stores the creation instant as unix seconds,
/// which is what the expiry filter compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionRecord {
    pub id: String,
    pub product_name: String,
    pub category: String,
    pub description: String,
    pub condition: ProductCondition,
    pub status: AuctionStatus,
    /// Unix seconds.
    pub timestamp: i64,
}

impl From<&Auction> for AuctionRecord {
    fn from(auction: &Auction) -> Self {
        Self {
            id: auction.id.clone(),
            product_name: auction.product_name.clone(),
            category: auction.category.clone(),
            description: auction.description.clone(),
            condition: auction.condition,
            status: auction.status,
            timestamp: auction.timestamp.timestamp(),
        }
    }
}

/// Match condition for the batch transition: rows in `status` created at or
/// before `timestamp_lte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryFilter {
    pub status: AuctionStatus,
    pub timestamp_lte: i64,
}

impl ExpiryFilter {
    /// Active auctions whose creation is at or before `threshold`.
    pub fn active_before(threshold: i64) -> Self {
        Self {
            status: AuctionStatus::Active,
            timestamp_lte: threshold,
        }
    }
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The batch update ran; `count` rows moved to completed.
    Closed { threshold: i64, count: u64 },
    /// The store returned an error. Nothing was changed.
    Failed,
    /// The store call exceeded the sweep timeout and was interrupted.
    /// Nothing was changed.
    TimedOut,
}

impl SweepOutcome {
    /// Number of auctions this sweep closed (zero unless `Closed`).
    pub fn closed(&self) -> u64 {
        match self {
            SweepOutcome::Closed { count, .. } => *count,
            SweepOutcome::Failed | SweepOutcome::TimedOut => 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SweepOutcome::Closed { .. })
    }
}
