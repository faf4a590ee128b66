//! Alloy RPC provider integration for fetching the latest block.
//!
//! The monitor only needs two calls per cycle: a cheap height check and, when
//! the height moved, the full block at the target height. Receipts supply the
//! sender/recipient and the logs; the block body supplies value and calldata.

use alloy::consensus::Transaction as _;
use alloy::network::Ethereum;
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::eth::{BlockId, BlockNumberOrTag};
use eyre::{eyre, Context, Result};
use std::sync::Arc;

use crate::types::{Block, LogEntry, Transaction};

type ProviderType = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider<Ethereum>,
>;

/// Source of block snapshots.
///
/// Implemented by [`BlockFetcher`] against a live node and by scripted
/// doubles in tests.
#[allow(async_fn_in_trait)]
pub trait BlockSource {
    /// Current chain head height.
    async fn latest_block_number(&self) -> Result<u64>;

    /// Full block at `number`, or `Ok(None)` if the node does not have it.
    async fn fetch_block(&self, number: u64) -> Result<Option<Block>>;
}

/// Fetches blocks with transactions and receipt logs via an Alloy provider.
pub struct BlockFetcher {
    /// Alloy FillProvider with gas, nonce, chain_id, blob_gas fillers
    provider: Arc<ProviderType>,
}

impl BlockFetcher {
    /// Creates a new BlockFetcher and tests RPC connectivity.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or `eth_blockNumber` fails.
    #[tracing::instrument(skip_all, fields(rpc_url = %rpc_url))]
    pub async fn new(rpc_url: &str) -> Result<Self> {
        let provider =
            ProviderBuilder::new().on_http(rpc_url.parse().wrap_err("invalid RPC URL format")?);
        let provider = Arc::new(provider);

        let block_number = provider
            .get_block_number()
            .await
            .wrap_err("failed to test RPC connectivity with eth_blockNumber")?;

        tracing::info!(
            rpc_url = %rpc_url,
            latest_block = block_number,
            "RPC connection successful"
        );

        Ok(Self { provider })
    }
}

impl BlockSource for BlockFetcher {
    async fn latest_block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .wrap_err("failed to query eth_blockNumber")
    }

    #[tracing::instrument(skip(self), fields(block_number = number))]
    async fn fetch_block(&self, number: u64) -> Result<Option<Block>> {
        let id = BlockId::Number(BlockNumberOrTag::Number(number));

        let block = match self
            .provider
            .get_block(id)
            .full()
            .await
            .wrap_err_with(|| format!("failed to fetch block {}", number))?
        {
            Some(block) => block,
            None => {
                tracing::debug!(block_number = number, "block not found");
                return Ok(None);
            }
        };

        let receipts = self
            .provider
            .get_block_receipts(id)
            .await
            .wrap_err_with(|| format!("failed to fetch receipts for block {}", number))?
            .ok_or_else(|| eyre!("receipts not found for block {}", number))?;

        let txs = block
            .transactions
            .as_transactions()
            .ok_or_else(|| eyre!("block {} returned without full transactions", number))?;

        if txs.len() != receipts.len() {
            return Err(eyre!(
                "block {} has {} transactions but {} receipts",
                number,
                txs.len(),
                receipts.len()
            ));
        }

        let transactions = txs
            .iter()
            .zip(receipts.iter())
            .map(|(tx, receipt)| Transaction {
                hash: receipt.transaction_hash,
                from: receipt.from,
                to: receipt.to,
                value: tx.value(),
                input: tx.input().clone(),
                logs: receipt
                    .inner
                    .logs()
                    .iter()
                    .map(|log| LogEntry {
                        index: log.log_index.unwrap_or_default(),
                        topics: log.topics().to_vec(),
                        data: log.data().data.clone(),
                    })
                    .collect(),
            })
            .collect();

        Ok(Some(Block {
            number: block.header.number,
            timestamp: block.header.timestamp,
            transactions,
        }))
    }
}
