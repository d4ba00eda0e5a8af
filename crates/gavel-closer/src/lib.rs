//! `gavel-closer`: closes auctions once their active interval has elapsed.
//!
//! # Overview
//!
//! [`AuctionRepository`] is the entry point. Building one resolves the
//! auction interval, creates the shared [`AuctionCloser`] and spawns a
//! [`CloserEngine`] that sweeps the store until the caller's
//! `CancellationToken` is cancelled.
//!
//! | Piece                | Role                                              |
//! |----------------------|---------------------------------------------------|
//! | `interval`           | Parse `AUCTION_INTERVAL`, default 5 minutes       |
//! | `AuctionCloser`      | One guarded sweep: active and old → completed     |
//! | `CloserEngine`       | Tick every `max(interval / 2, 1s)` until cancelled |
//! | `AuctionStore`       | Insert one / batch update many                    |
//! | `SqliteAuctionStore` | rusqlite implementation, one table per collection |

pub mod closer;
pub mod db;
pub mod engine;
pub mod error;
pub mod interval;
pub mod repository;
pub mod store;
pub mod types;

pub use closer::{AuctionCloser, CloserSettings};
pub use db::SqliteAuctionStore;
pub use engine::CloserEngine;
pub use error::{Result, StoreError};
pub use repository::AuctionRepository;
pub use store::AuctionStore;
pub use types::{AuctionRecord, ExpiryFilter, SweepOutcome};
