//! Type definitions for the block snapshots scanned each cycle.

use alloy::primitives::{Address, Bytes, B256, U256};

/// Block snapshot fetched once per cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Block number.
    pub number: u64,
    /// Timestamp in unix seconds.
    pub timestamp: u64,
    /// Transactions in block order.
    pub transactions: Vec<Transaction>,
}

/// Transaction included in a block, with the logs from its receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Transaction hash.
    pub hash: B256,
    /// Sender address.
    pub from: Address,
    /// Recipient address (None for contract creation).
    pub to: Option<Address>,
    /// Native value transferred, in Wei.
    pub value: U256,
    /// Calldata.
    pub input: Bytes,
    /// Receipt logs in emission order.
    pub logs: Vec<LogEntry>,
}

impl Transaction {
    /// Whether the caller paid no native value.
    pub fn is_zero_value(&self) -> bool {
        self.value.is_zero()
    }
}

/// Receipt log entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Log index within the block.
    pub index: u64,
    /// Indexed topics; `topics[0]` is the event signature hash.
    pub topics: Vec<B256>,
    /// Non-indexed log data.
    pub data: Bytes,
}

impl LogEntry {
    /// Event signature topic, if present.
    pub fn signature(&self) -> Option<&B256> {
        self.topics.first()
    }
}
