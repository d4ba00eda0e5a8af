//! `gavel-core`: configuration, error type and auction domain types shared
//! by the closer and the server binary.

pub mod config;
pub mod error;
pub mod types;

pub use config::GavelConfig;
pub use error::{GavelError, Result};
pub use types::{Auction, AuctionStatus, ProductCondition};
