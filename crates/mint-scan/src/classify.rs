//! Transfer log classification for free NFT mints.
//!
//! Three event shapes are recognized, keyed on `topics[0]`:
//!
//! | Kind | Event | Mint check |
//! |------|-------|------------|
//! | ERC-721 | `Transfer(from, to, id)` | `from == 0`, `to == tx.from`, no data |
//! | ERC-1155 single | `TransferSingle(op, from, to, id, n)` | `from == 0`, `op == to == tx.from` |
//! | ERC-1155 batch | `TransferBatch(op, from, to, ids, ns)` | same as single |
//!
//! All address parameters are indexed.
//!
//! A log whose shape matches counts as a transfer of the transaction. It is
//! additionally *mint-like* when its token ids sit below the configured
//! ceiling and, for ERC-1155, its quantities are 1. A transaction qualifies
//! when it paid no value, carries at least one mint-like transfer and its
//! transfer count stays within the per-transaction cap.
//!
//! The non-indexed ERC-1155 payloads have fixed ABI shapes, so they are
//! decoded with compile-time `sol!` event definitions.

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;
use mint_data::types::{LogEntry, Transaction};

use crate::config::{MonitorConfig, TokenStandard};

/// Compile-time definitions of the recognized transfer events.
pub mod events {
    use alloy::sol;

    sol! {
        /// ERC-721 transfer; the token id is the third indexed topic.
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        /// ERC-1155 single transfer.
        event TransferSingle(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256 id,
            uint256 value
        );

        /// ERC-1155 batch transfer.
        event TransferBatch(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256[] ids,
            uint256[] values
        );
    }
}

/// Shape of a matched transfer log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    Erc721,
    Erc1155Single,
    Erc1155Batch,
}

impl TransferKind {
    /// Standard family the kind belongs to.
    pub fn standard(&self) -> TokenStandard {
        match self {
            TransferKind::Erc721 => TokenStandard::Erc721,
            TransferKind::Erc1155Single | TransferKind::Erc1155Batch => TokenStandard::Erc1155,
        }
    }

    fn from_signature(signature: &B256) -> Option<Self> {
        if *signature == events::Transfer::SIGNATURE_HASH {
            Some(TransferKind::Erc721)
        } else if *signature == events::TransferSingle::SIGNATURE_HASH {
            Some(TransferKind::Erc1155Single)
        } else if *signature == events::TransferBatch::SIGNATURE_HASH {
            Some(TransferKind::Erc1155Batch)
        } else {
            None
        }
    }
}

/// One log recognized as a transfer to the transaction sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedTransfer {
    pub kind: TransferKind,
    pub token_ids: Vec<U256>,
    pub recipient: Address,
    /// Token ids (and ERC-1155 quantities) satisfy the early-mint predicates.
    pub is_mint_like: bool,
}

/// Classification outcome for a transaction that qualifies as a free mint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionMatch {
    /// Contract that was called.
    pub contract: Address,
    /// Shape-matched transfer logs, in log order.
    pub transfers: Vec<ClassifiedTransfer>,
}

impl TransactionMatch {
    pub fn transfer_count(&self) -> usize {
        self.transfers.len()
    }
}

/// Pattern matcher over receipt logs, parameterized by the enabled standards.
pub struct TransferClassifier<'a> {
    config: &'a MonitorConfig,
}

impl<'a> TransferClassifier<'a> {
    pub fn new(config: &'a MonitorConfig) -> Self {
        Self { config }
    }

    /// Classify a single log emitted in a transaction sent by `sender`.
    ///
    /// Returns `None` for unknown signatures, disabled standards, shape
    /// mismatches and undecodable data; never panics on malformed input.
    pub fn classify_log(&self, log: &LogEntry, sender: Address) -> Option<ClassifiedTransfer> {
        let kind = TransferKind::from_signature(log.signature()?)?;
        if !self.config.supports(kind.standard()) {
            return None;
        }

        if sender == self.config.burn_address {
            return None;
        }
        let sender_word = sender.into_word();

        match kind {
            TransferKind::Erc721 => self.classify_erc721(log, sender, sender_word),
            TransferKind::Erc1155Single | TransferKind::Erc1155Batch => {
                self.classify_erc1155(kind, log, sender, sender_word)
            }
        }
    }

    fn classify_erc721(
        &self,
        log: &LogEntry,
        sender: Address,
        sender_word: B256,
    ) -> Option<ClassifiedTransfer> {
        if log.topics.len() != 4 {
            tracing::debug!(
                log_index = log.index,
                topics = log.topics.len(),
                "erc721 topic count mismatch"
            );
            return None;
        }
        if log.topics[1] != B256::ZERO || !log.data.is_empty() || log.topics[2] != sender_word {
            return None;
        }

        let token_id = U256::from_be_bytes(log.topics[3].0);
        Some(ClassifiedTransfer {
            kind: TransferKind::Erc721,
            token_ids: vec![token_id],
            recipient: sender,
            is_mint_like: token_id < self.config.max_token_id,
        })
    }

    fn classify_erc1155(
        &self,
        kind: TransferKind,
        log: &LogEntry,
        sender: Address,
        sender_word: B256,
    ) -> Option<ClassifiedTransfer> {
        if log.topics.len() != 4 {
            tracing::debug!(
                log_index = log.index,
                topics = log.topics.len(),
                "erc1155 topic count mismatch"
            );
            return None;
        }
        if log.topics[2] != B256::ZERO
            || log.topics[1] != sender_word
            || log.topics[3] != sender_word
        {
            return None;
        }

        let ceiling = self.config.max_token_id;
        let (token_ids, is_mint_like) = if kind == TransferKind::Erc1155Single {
            let decoded = match events::TransferSingle::abi_decode_data(&log.data, true) {
                Ok(decoded) => decoded,
                Err(err) => {
                    tracing::debug!(
                        log_index = log.index,
                        error = %err,
                        "undecodable TransferSingle data"
                    );
                    return None;
                }
            };
            let (id, value) = decoded;
            (vec![id], id < ceiling && value == U256::from(1u8))
        } else {
            let decoded = match events::TransferBatch::abi_decode_data(&log.data, true) {
                Ok(decoded) => decoded,
                Err(err) => {
                    tracing::debug!(
                        log_index = log.index,
                        error = %err,
                        "undecodable TransferBatch data"
                    );
                    return None;
                }
            };
            let (ids, values) = decoded;
            let score = batch_score(&ids, &values, ceiling);
            (ids, score > 0 && score % 2 == 0)
        };

        Some(ClassifiedTransfer {
            kind,
            token_ids,
            recipient: sender,
            is_mint_like,
        })
    }

    /// Classify all logs of `tx` and decide whether it is a free-mint match.
    pub fn classify_transaction(&self, tx: &Transaction) -> Option<TransactionMatch> {
        if !tx.is_zero_value() {
            return None;
        }
        let contract = tx.to?;

        let transfers: Vec<ClassifiedTransfer> = tx
            .logs
            .iter()
            .filter_map(|log| self.classify_log(log, tx.from))
            .collect();

        if transfers.is_empty() || !transfers.iter().any(|t| t.is_mint_like) {
            return None;
        }
        if transfers.len() > self.config.max_transfers_per_transaction {
            tracing::debug!(
                tx_hash = %tx.hash,
                transfers = transfers.len(),
                cap = self.config.max_transfers_per_transaction,
                "transfer count over cap"
            );
            return None;
        }

        Some(TransactionMatch {
            contract,
            transfers,
        })
    }
}

/// Count of ids below the ceiling plus count of quantities equal to one.
///
/// An even, positive score stands in for "ids and quantities contributed
/// equally".
pub fn batch_score(ids: &[U256], values: &[U256], ceiling: U256) -> usize {
    let one = U256::from(1u8);
    ids.iter().filter(|id| **id < ceiling).count() + values.iter().filter(|v| **v == one).count()
}
