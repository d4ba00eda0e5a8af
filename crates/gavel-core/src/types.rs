use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of an auction.
///
/// Persisted as an integer (`0` = active, `1` = completed). The only legal
/// transition is `Active -> Completed`, performed by the auction closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum AuctionStatus {
    /// Open for bids.
    Active,
    /// Closed by the expiry sweep. Terminal.
    Completed,
}

impl AuctionStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            AuctionStatus::Active => 0,
            AuctionStatus::Completed => 1,
        }
    }
}

impl From<AuctionStatus> for i64 {
    fn from(status: AuctionStatus) -> Self {
        status.as_i64()
    }
}

impl TryFrom<i64> for AuctionStatus {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AuctionStatus::Active),
            1 => Ok(AuctionStatus::Completed),
            other => Err(format!("unknown auction status: {other}")),
        }
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuctionStatus::Active => "active",
            AuctionStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Physical condition of the product being auctioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum ProductCondition {
    New,
    Used,
    Refurbished,
}

impl ProductCondition {
    pub fn as_i64(self) -> i64 {
        match self {
            ProductCondition::New => 1,
            ProductCondition::Used => 2,
            ProductCondition::Refurbished => 3,
        }
    }
}

impl From<ProductCondition> for i64 {
    fn from(condition: ProductCondition) -> Self {
        condition.as_i64()
    }
}

impl TryFrom<i64> for ProductCondition {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProductCondition::New),
            2 => Ok(ProductCondition::Used),
            3 => Ok(ProductCondition::Refurbished),
            other => Err(format!("unknown product condition: {other}")),
        }
    }
}

/// An auction as seen by callers of the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    /// UUID v4 string, primary key.
    pub id: String,
    pub product_name: String,
    pub category: String,
    pub description: String,
    pub condition: ProductCondition,
    pub status: AuctionStatus,
    /// Creation instant. The closer measures the auction's age from here.
    pub timestamp: DateTime<Utc>,
}

impl Auction {
    /// Build a fresh, active auction stamped with the current time.
    pub fn new(
        product_name: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
        condition: ProductCondition,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            product_name: product_name.into(),
            category: category.into(),
            description: description.into(),
            condition,
            status: AuctionStatus::Active,
            timestamp: Utc::now(),
        }
    }

    /// Override the creation instant (backfills and tests).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}
