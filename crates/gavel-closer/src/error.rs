use thiserror::Error;

/// Errors raised by an [`AuctionStore`](crate::store::AuctionStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The collection name is not a usable table identifier.
    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    /// A stored row could not be mapped back to an auction.
    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    /// Another thread panicked while holding the connection.
    #[error("Connection lock poisoned")]
    Poisoned,

    /// The blocking worker running the query failed to complete.
    #[error("Store task failed: {0}")]
    Task(String),

    /// The statement was aborted by [`AuctionStore::interrupt`] and rolled
    /// back.
    ///
    /// [`AuctionStore::interrupt`]: crate::store::AuctionStore::interrupt
    #[error("Store call interrupted")]
    Interrupted,

    /// Backend-specific failure from a non-SQLite store.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
