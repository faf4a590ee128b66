//! mint-scan crate
//!
//! Per-transaction analysis for the free-mint monitor: transfer log
//! classification, contract interface resolution and mint-intent filtering.

pub mod classify;
pub mod config;
pub mod intent;
pub mod metadata;

pub use classify::{ClassifiedTransfer, TransactionMatch, TransferClassifier, TransferKind};
pub use config::{ConfigError, MonitorConfig, TokenStandard};
pub use intent::{IntentFilter, IntentVerdict};
pub use metadata::{
    CallDecoder, CallableInterface, ContractMetadata, DecodeError, DecodedCall,
    MetadataResolver, ResolutionState,
};
