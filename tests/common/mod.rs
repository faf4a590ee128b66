//! Shared test helpers and doubles.
//!
//! Provides a scripted block source, a counting ABI registry and a recording
//! notifier, plus factories for free-mint transactions.

#![allow(dead_code)]

use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::json_abi::Function;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolEvent;
use chrono::{DateTime, Utc};
use eyre::Result;
use mint_data::blocks::BlockSource;
use mint_data::etherscan::{AbiLookup, AbiSource};
use mint_data::notify::{Notifier, WebhookPayload};
use mint_data::store::{CacheStore, Store};
use mint_data::types::{Block, LogEntry, Transaction};
use mint_scan::classify::events;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const MINTER: Address = alloy::primitives::address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
pub const NFT: Address = alloy::primitives::address!("70997970c51812e339d9b73b0245ad59e15ebbf9");

/// In-memory SQLite store behind the cache capability.
///
/// # Panics
/// Panics if the in-memory database cannot be created.
pub fn test_store() -> Arc<dyn CacheStore> {
    Arc::new(Store::new(":memory:").expect("in-memory store should always open"))
}

/// Fixed wall-clock origin for deterministic cycles.
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_708_617_600, 0).expect("valid timestamp")
}

/// Block source answering from a script of blocks; the head is movable.
pub struct ScriptedBlockSource {
    head: Mutex<u64>,
    blocks: HashMap<u64, Block>,
    fetched: Mutex<Vec<u64>>,
}

impl ScriptedBlockSource {
    pub fn new(head: u64, blocks: Vec<Block>) -> Self {
        Self {
            head: Mutex::new(head),
            blocks: blocks.into_iter().map(|b| (b.number, b)).collect(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = head;
    }

    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }
}

impl BlockSource for &ScriptedBlockSource {
    async fn latest_block_number(&self) -> Result<u64> {
        Ok(*self.head.lock().unwrap())
    }

    async fn fetch_block(&self, number: u64) -> Result<Option<Block>> {
        self.fetched.lock().unwrap().push(number);
        Ok(self.blocks.get(&number).cloned())
    }
}

/// ABI registry double that counts every lookup.
#[derive(Default)]
pub struct CountingAbiSource {
    abis: HashMap<Address, String>,
    calls: AtomicUsize,
}

impl CountingAbiSource {
    pub fn with_abi(mut self, address: Address, abi: impl Into<String>) -> Self {
        self.abis.insert(address, abi.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AbiSource for &CountingAbiSource {
    async fn fetch_abi(&self, address: Address) -> Result<AbiLookup> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.abis.get(&address) {
            Some(abi) => AbiLookup::Found(abi.clone()),
            None => AbiLookup::Unavailable("Contract source code not verified".to_string()),
        })
    }
}

/// Notifier double keeping every payload it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    payloads: Mutex<Vec<WebhookPayload>>,
}

impl RecordingNotifier {
    pub fn payloads(&self) -> Vec<WebhookPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

impl Notifier for &RecordingNotifier {
    async fn notify(&self, payload: &WebhookPayload) -> Result<()> {
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// 32-byte big-endian word holding `value`.
pub fn word(value: u64) -> B256 {
    B256::from(U256::from(value).to_be_bytes::<32>())
}

/// ERC-721 mint of `token_id` to `to`.
pub fn erc721_mint_log(to: Address, token_id: u64) -> LogEntry {
    LogEntry {
        index: 0,
        topics: vec![
            events::Transfer::SIGNATURE_HASH,
            B256::ZERO,
            to.into_word(),
            word(token_id),
        ],
        data: Bytes::new(),
    }
}

/// JSON ABI with a single nonpayable function taking `(name, type)` inputs.
pub fn function_abi(name: &str, inputs: &[(&str, &str)]) -> String {
    let inputs: Vec<String> = inputs
        .iter()
        .map(|(param, ty)| format!(r#"{{"name":"{param}","type":"{ty}"}}"#))
        .collect();
    format!(
        concat!(
            r#"[{{"type":"function","name":"{name}","stateMutability":"nonpayable","#,
            r#""inputs":[{inputs}],"outputs":[]}}]"#
        ),
        name = name,
        inputs = inputs.join(",")
    )
}

/// Calldata for `signature` with `args`.
pub fn calldata(signature: &str, args: &[DynSolValue]) -> Bytes {
    let function = Function::parse(signature).expect("valid function signature");
    Bytes::from(function.abi_encode_input(args).expect("arguments match signature"))
}

/// Zero-value call to `contract` from `from` that mints token `token_id`.
pub fn mint_transaction(
    from: Address,
    contract: Address,
    input: Bytes,
    token_id: u64,
) -> Transaction {
    Transaction {
        hash: word(token_id ^ u64::from(from.0[19])),
        from,
        to: Some(contract),
        value: U256::ZERO,
        input,
        logs: vec![erc721_mint_log(from, token_id)],
    }
}

pub fn block(number: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        timestamp: 1_708_617_600 + number * 12,
        transactions,
    }
}
