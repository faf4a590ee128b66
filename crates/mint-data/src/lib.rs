//! mint-data crate
//!
//! Chain snapshot types and the I/O adapters the free-mint monitor talks to:
//! block source, contract ABI registry, persistent cache and notification sink.

pub mod blocks;
pub mod etherscan;
pub mod notify;
pub mod store;
pub mod types;

pub use blocks::{BlockFetcher, BlockSource};
pub use etherscan::{AbiLookup, AbiSource, EtherscanClient};
pub use notify::{Notifier, NotificationSink, TrendingEmbed, WebhookNotifier, WebhookPayload};
pub use store::{CacheStore, Namespace, Store};
pub use types::{Block, LogEntry, Transaction};
