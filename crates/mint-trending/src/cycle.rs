//! One polling cycle: fetch → classify → filter → accumulate → maybe flush.
//!
//! All mutable accumulator state lives in [`CycleState`], which is moved into
//! [`CycleDriver::run_cycle`] and handed back with a [`CycleReport`]. The
//! driver itself only holds the injected adapters and configuration.
//!
//! No failure inside a cycle is fatal. Block and ABI fetch errors, decode
//! errors and persistence errors are logged and the cycle carries on with
//! whatever data it has.

use chrono::{DateTime, Utc};
use eyre::Result;
use mint_data::blocks::BlockSource;
use mint_data::etherscan::AbiSource;
use mint_data::notify::{Notifier, TrendingEmbed, WebhookPayload};
use mint_data::store::CacheStore;
use mint_data::types::Block;
use mint_scan::{IntentFilter, MetadataResolver, MonitorConfig, TransferClassifier};
use std::sync::Arc;

use crate::trending::{History, TrendingEntry, TrendingWindow};

/// Stage the driver is in. Back at `Idle` whenever a cycle returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CyclePhase {
    #[default]
    Idle,
    Fetching,
    Classifying,
    Filtering,
    Accumulating,
    Flushing,
}

/// Accumulator state threaded through consecutive cycles.
#[derive(Clone, Debug)]
pub struct CycleState {
    /// Highest block height processed so far.
    pub last_height: Option<u64>,
    /// Start of the current trending window.
    pub last_flush_at: DateTime<Utc>,
    pub window: TrendingWindow,
    pub history: History,
    pub phase: CyclePhase,
}

impl CycleState {
    pub fn new(history: History, now: DateTime<Utc>) -> Self {
        Self {
            last_height: None,
            last_flush_at: now,
            window: TrendingWindow::new(),
            history,
            phase: CyclePhase::Idle,
        }
    }

    fn enter(&mut self, phase: CyclePhase) {
        tracing::trace!(from = ?self.phase, to = ?phase, "cycle phase");
        self.phase = phase;
    }
}

/// What one cycle did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Height processed this cycle, if any.
    pub block_number: Option<u64>,
    pub transactions_scanned: usize,
    /// Transactions that passed the transfer classifier.
    pub matched: usize,
    /// Matched transactions that passed the intent filter.
    pub accepted: usize,
    /// Entries emitted by a flush, `None` if no flush was due.
    pub flushed: Option<Vec<TrendingEntry>>,
    pub notified: bool,
}

/// Notification payload for a flush result.
pub fn build_payload(entries: &[TrendingEntry], explorer_url: &str) -> WebhookPayload {
    WebhookPayload {
        embeds: entries
            .iter()
            .map(|entry| TrendingEmbed {
                title: entry.address.to_string(),
                description: entry.description(),
                url: format!("{}{}", explorer_url, entry.address),
            })
            .collect(),
    }
}

pub struct CycleDriver<B, A, N> {
    config: MonitorConfig,
    blocks: B,
    resolver: MetadataResolver<A>,
    notifier: N,
    store: Arc<dyn CacheStore>,
}

impl<B, A, N> CycleDriver<B, A, N>
where
    B: BlockSource,
    A: AbiSource,
    N: Notifier,
{
    /// `config` is expected to be validated already.
    pub fn new(
        config: MonitorConfig,
        blocks: B,
        abi_source: A,
        notifier: N,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        let resolver = MetadataResolver::new(abi_source, store.clone(), config.abi_fetch_limit);
        Self {
            config,
            blocks,
            resolver,
            notifier,
            store,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn resolver(&self) -> &MetadataResolver<A> {
        &self.resolver
    }

    /// Fresh state with history loaded from the store.
    pub fn initial_state(&self, now: DateTime<Utc>) -> CycleState {
        CycleState::new(History::load(self.store.as_ref()), now)
    }

    /// Run one cycle at wall-clock time `now`.
    #[tracing::instrument(skip_all, fields(last_height = ?state.last_height))]
    pub async fn run_cycle(
        &self,
        mut state: CycleState,
        now: DateTime<Utc>,
    ) -> (CycleState, CycleReport) {
        let mut report = CycleReport::default();
        self.resolver.begin_cycle();

        state.enter(CyclePhase::Fetching);
        if let Some(block) = self.fetch_next_block(&state).await {
            report.block_number = Some(block.number);
            state.last_height = Some(block.number);
            self.process_block(&block, &mut state, now, &mut report).await;
            tracing::info!(
                block_number = block.number,
                transactions = report.transactions_scanned,
                matched = report.matched,
                accepted = report.accepted,
                "scanned block"
            );
        }

        let elapsed = (now - state.last_flush_at).to_std().unwrap_or_default();
        if elapsed > self.config.process_interval {
            state.enter(CyclePhase::Flushing);
            self.flush(&mut state, now, &mut report).await;
        }

        state.enter(CyclePhase::Idle);
        (state, report)
    }

    async fn fetch_next_block(&self, state: &CycleState) -> Option<Block> {
        let latest = match self.blocks.latest_block_number().await {
            Ok(latest) => latest,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read chain head");
                return None;
            }
        };
        let target = latest.saturating_sub(self.config.confirmations);
        if state.last_height.is_some_and(|last| target <= last) {
            tracing::debug!(target, "no new block");
            return None;
        }

        match self.blocks.fetch_block(target).await {
            Ok(Some(block)) => Some(block),
            Ok(None) => {
                tracing::warn!(block_number = target, "block not available yet");
                None
            }
            Err(err) => {
                tracing::warn!(block_number = target, error = %err, "failed to fetch block");
                None
            }
        }
    }

    async fn process_block(
        &self,
        block: &Block,
        state: &mut CycleState,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let classifier = TransferClassifier::new(&self.config);
        let filter = IntentFilter::new(&self.config);
        report.transactions_scanned = block.transactions.len();

        for tx in &block.transactions {
            state.enter(CyclePhase::Classifying);
            let Some(matched) = classifier.classify_transaction(tx) else {
                continue;
            };
            report.matched += 1;

            state.enter(CyclePhase::Filtering);
            let metadata = self.resolver.resolve(matched.contract).await;
            let verdict = filter.check(&tx.input, metadata.interface.as_deref());
            if !verdict.is_accepted() {
                tracing::debug!(
                    tx_hash = %tx.hash,
                    contract = %matched.contract,
                    state = ?metadata.state,
                    verdict = %verdict,
                    "rejected by intent filter"
                );
                continue;
            }

            state.enter(CyclePhase::Accumulating);
            report.accepted += 1;
            state
                .window
                .record(matched.contract, matched.transfer_count(), now);
            tracing::info!(
                tx_hash = %tx.hash,
                contract = %matched.contract,
                transfers = matched.transfer_count(),
                verdict = %verdict,
                "free mint"
            );
        }
    }

    async fn flush(&self, state: &mut CycleState, now: DateTime<Utc>, report: &mut CycleReport) {
        let candidates = state.window.len();
        let entries = state
            .window
            .flush(&mut state.history, self.config.max_trending_results);
        state.last_flush_at = now;

        if candidates > 0 {
            if let Err(err) = state.history.persist(self.store.as_ref()) {
                tracing::warn!(error = %err, "history not persisted, keeping in-memory copy");
            }
        }

        if !entries.is_empty() {
            let payload = build_payload(&entries, &self.config.explorer_url);
            match self.notifier.notify(&payload).await {
                Ok(()) => report.notified = true,
                Err(err) => tracing::warn!(error = %err, "notification failed"),
            }
        }

        tracing::info!(
            candidates,
            announced = entries.len(),
            history = state.history.len(),
            "flushed trending window"
        );
        report.flushed = Some(entries);
    }

    /// Write the history to the store; used at shutdown.
    ///
    /// # Errors
    /// Returns error if the store write fails.
    pub fn persist_history(&self, state: &CycleState) -> Result<()> {
        state.history.persist(self.store.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, B256, U256};
    use alloy::sol_types::SolEvent;
    use chrono::TimeDelta;
    use mint_data::etherscan::AbiLookup;
    use mint_data::store::{Namespace, Store};
    use mint_data::types::{LogEntry, Transaction};
    use mint_scan::classify::events;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const PUBLIC_MINT_ABI: &str = r#"[
        {"type":"function","name":"publicMint","stateMutability":"nonpayable",
         "inputs":[{"name":"to","type":"address"}],"outputs":[]}
    ]"#;

    struct Chain {
        head: Mutex<u64>,
        blocks: HashMap<u64, Block>,
        fetched: Mutex<Vec<u64>>,
    }

    impl BlockSource for &Chain {
        async fn latest_block_number(&self) -> Result<u64> {
            Ok(*self.head.lock().unwrap())
        }

        async fn fetch_block(&self, number: u64) -> Result<Option<Block>> {
            self.fetched.lock().unwrap().push(number);
            Ok(self.blocks.get(&number).cloned())
        }
    }

    struct Registry {
        calls: Mutex<usize>,
    }

    impl AbiSource for &Registry {
        async fn fetch_abi(&self, _address: Address) -> Result<AbiLookup> {
            *self.calls.lock().unwrap() += 1;
            Ok(AbiLookup::Found(PUBLIC_MINT_ABI.to_string()))
        }
    }

    #[derive(Default)]
    struct Outbox(Mutex<Vec<WebhookPayload>>);

    impl Notifier for &Outbox {
        async fn notify(&self, payload: &WebhookPayload) -> Result<()> {
            self.0.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    fn minter(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn public_mint_tx(from: Address, contract: Address) -> Transaction {
        let mut input = alloy::primitives::keccak256("publicMint(address)")[..4].to_vec();
        input.extend_from_slice(from.into_word().as_slice());
        Transaction {
            hash: B256::repeat_byte(from.0[0]),
            from,
            to: Some(contract),
            value: U256::ZERO,
            input: Bytes::from(input),
            logs: vec![LogEntry {
                index: 0,
                topics: vec![
                    events::Transfer::SIGNATURE_HASH,
                    B256::ZERO,
                    from.into_word(),
                    B256::from(U256::from(5u64).to_be_bytes::<32>()),
                ],
                data: Bytes::new(),
            }],
        }
    }

    fn chain(head: u64, blocks: Vec<Block>) -> Chain {
        Chain {
            head: Mutex::new(head),
            blocks: blocks.into_iter().map(|b| (b.number, b)).collect(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn processes_head_minus_confirmations_once() {
        let contract = minter(0xcc);
        let block = Block {
            number: 99,
            timestamp: 0,
            transactions: vec![public_mint_tx(minter(1), contract)],
        };
        let chain = chain(100, vec![block]);
        let registry = Registry { calls: Mutex::new(0) };
        let outbox = Outbox::default();
        let store: Arc<dyn CacheStore> = Arc::new(Store::new(":memory:").unwrap());
        let driver = CycleDriver::new(MonitorConfig::default(), &chain, &registry, &outbox, store);

        let state = driver.initial_state(t0());
        let (state, report) = driver.run_cycle(state, t0()).await;
        assert_eq!(report.block_number, Some(99));
        assert_eq!(report.accepted, 1);
        assert_eq!(state.window.get(&contract).unwrap().transaction_count, 1);
        assert_eq!(state.phase, CyclePhase::Idle);

        let (state, report) = driver.run_cycle(state, t0()).await;
        assert_eq!(report.block_number, None);
        assert_eq!(*chain.fetched.lock().unwrap(), vec![99]);
        assert_eq!(state.window.get(&contract).unwrap().transaction_count, 1);
    }

    #[tokio::test]
    async fn flush_waits_for_strictly_elapsed_interval() {
        let contract = minter(0xcc);
        let block = Block {
            number: 10,
            timestamp: 0,
            transactions: vec![public_mint_tx(minter(1), contract)],
        };
        let chain = chain(11, vec![block]);
        let registry = Registry { calls: Mutex::new(0) };
        let outbox = Outbox::default();
        let store: Arc<dyn CacheStore> = Arc::new(Store::new(":memory:").unwrap());
        let config = MonitorConfig::default();
        let interval = TimeDelta::from_std(config.process_interval).unwrap();
        let driver = CycleDriver::new(config, &chain, &registry, &outbox, store.clone());

        let state = driver.initial_state(t0());
        let (state, report) = driver.run_cycle(state, t0() + interval).await;
        assert_eq!(report.flushed, None);

        let later = t0() + interval + TimeDelta::seconds(1);
        let (state, report) = driver.run_cycle(state, later).await;
        let flushed = report.flushed.unwrap();
        assert_eq!(flushed.len(), 1);
        assert!(report.notified);
        assert_eq!(state.last_flush_at, later);
        assert!(state.window.is_empty());
        assert!(state.history.contains(&contract));

        let sent = outbox.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].embeds[0].description, "transactions=1 / transfers=1");
        assert_eq!(
            sent[0].embeds[0].url,
            format!("https://etherscan.io/address/{contract}")
        );
        assert!(History::load(store.as_ref()).contains(&contract));
    }

    #[tokio::test]
    async fn head_errors_still_allow_flush() {
        struct Down;
        impl BlockSource for Down {
            async fn latest_block_number(&self) -> Result<u64> {
                Err(eyre::eyre!("connection refused"))
            }
            async fn fetch_block(&self, _number: u64) -> Result<Option<Block>> {
                Err(eyre::eyre!("connection refused"))
            }
        }

        let registry = Registry { calls: Mutex::new(0) };
        let outbox = Outbox::default();
        let store: Arc<dyn CacheStore> = Arc::new(Store::new(":memory:").unwrap());
        let driver = CycleDriver::new(MonitorConfig::default(), Down, &registry, &outbox, store);

        let mut state = driver.initial_state(t0());
        state.window.record(minter(0xcc), 1, t0());

        let later = t0() + TimeDelta::hours(1);
        let (state, report) = driver.run_cycle(state, later).await;
        assert_eq!(report.block_number, None);
        assert_eq!(report.flushed.map(|e| e.len()), Some(1));
        assert!(state.history.contains(&minter(0xcc)));
    }

    #[tokio::test]
    async fn broken_storage_and_registry_do_not_stop_the_cycle() {
        struct BrokenStore;
        impl CacheStore for BrokenStore {
            fn get(&self, _namespace: Namespace, _key: &str) -> Result<Option<String>> {
                Err(eyre::eyre!("disk I/O error"))
            }
            fn put(&self, _namespace: Namespace, _key: &str, _value: &str) -> Result<()> {
                Err(eyre::eyre!("disk I/O error"))
            }
        }

        struct Offline;
        impl AbiSource for Offline {
            async fn fetch_abi(&self, _address: Address) -> Result<AbiLookup> {
                Err(eyre::eyre!("connection refused"))
            }
        }

        let fresh = minter(0xcd);
        let block = Block {
            number: 10,
            timestamp: 0,
            transactions: vec![public_mint_tx(minter(1), fresh)],
        };
        let chain = chain(11, vec![block]);
        let outbox = Outbox::default();
        let store: Arc<dyn CacheStore> = Arc::new(BrokenStore);
        let driver = CycleDriver::new(MonitorConfig::default(), &chain, Offline, &outbox, store);

        let mut state = driver.initial_state(t0());
        assert!(state.history.is_empty());
        let earlier = minter(0xcc);
        state.window.record(earlier, 1, t0());

        let later = t0() + TimeDelta::hours(1);
        let (state, report) = driver.run_cycle(state, later).await;
        assert_eq!(report.block_number, Some(10));
        assert_eq!(report.matched, 1);
        assert_eq!(report.accepted, 0);
        assert_eq!(report.flushed.map(|e| e.len()), Some(1));
        assert!(report.notified);
        assert_eq!(outbox.0.lock().unwrap().len(), 1);
        assert!(state.history.contains(&earlier));
        assert!(!state.history.contains(&fresh));
        assert_eq!(state.phase, CyclePhase::Idle);

        let metadata = driver.resolver().resolve(fresh).await;
        assert_eq!(metadata.state, mint_scan::ResolutionState::Failed);
    }

    #[tokio::test]
    async fn fetch_quota_resets_every_cycle() {
        let txs: Vec<Transaction> = (1..=3)
            .map(|n| public_mint_tx(minter(n), minter(0x80 + n)))
            .collect();
        let chain = chain(
            6,
            vec![
                Block {
                    number: 5,
                    timestamp: 0,
                    transactions: txs.clone(),
                },
                Block {
                    number: 6,
                    timestamp: 0,
                    transactions: txs,
                },
            ],
        );
        let registry = Registry { calls: Mutex::new(0) };
        let outbox = Outbox::default();
        let store: Arc<dyn CacheStore> = Arc::new(Store::new(":memory:").unwrap());
        let config = MonitorConfig {
            abi_fetch_limit: 2,
            ..MonitorConfig::default()
        };
        let driver = CycleDriver::new(config, &chain, &registry, &outbox, store);

        let state = driver.initial_state(t0());
        let (state, report) = driver.run_cycle(state, t0()).await;
        assert_eq!(report.matched, 3);
        assert_eq!(report.accepted, 2);
        assert_eq!(*registry.calls.lock().unwrap(), 2);

        *chain.head.lock().unwrap() = 7;
        let (_state, report) = driver.run_cycle(state, t0()).await;
        assert_eq!(report.block_number, Some(6));
        assert_eq!(report.accepted, 3);
        assert_eq!(*registry.calls.lock().unwrap(), 3);
    }

    #[test]
    fn payload_links_to_explorer() {
        let entries = vec![TrendingEntry {
            rank: 1,
            address: minter(0x11),
            transaction_count: 2,
            transfer_count: 3,
        }];
        let payload = build_payload(&entries, "https://example.org/address/");
        assert_eq!(payload.embeds[0].title, minter(0x11).to_string());
        assert_eq!(
            payload.embeds[0].url,
            format!("https://example.org/address/{}", minter(0x11))
        );
    }
}
