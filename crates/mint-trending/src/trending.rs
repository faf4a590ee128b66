//! Per-window candidate accumulation, ranking and announcement history.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use mint_data::store::{CacheStore, Namespace};
use std::collections::{HashMap, HashSet};

/// Key of the history blob in the `history` namespace.
pub const HISTORY_KEY: &str = "contract-history";

/// Accumulated activity of one contract within the current window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateContract {
    pub address: Address,
    /// Accepted transactions that touched the contract.
    pub transaction_count: u64,
    /// Matched transfer logs across those transactions.
    pub transfer_count: u64,
    /// Time of the first accepted transaction in this window.
    pub first_observed_at: DateTime<Utc>,
}

/// Ranked contract emitted at flush.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrendingEntry {
    /// 1-based position in the truncated ranking, before deduplication.
    pub rank: usize,
    pub address: Address,
    pub transaction_count: u64,
    pub transfer_count: u64,
}

impl TrendingEntry {
    /// Embed body, e.g. `transactions=3 / transfers=4`.
    pub fn description(&self) -> String {
        format!(
            "transactions={} / transfers={}",
            self.transaction_count, self.transfer_count
        )
    }
}

/// Candidate set of the current processing window, kept in first-observed
/// order.
#[derive(Clone, Debug, Default)]
pub struct TrendingWindow {
    candidates: Vec<CandidateContract>,
    index: HashMap<Address, usize>,
}

impl TrendingWindow {
    /// Empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one accepted transaction carrying `transfers` matched logs.
    pub fn record(&mut self, address: Address, transfers: usize, observed_at: DateTime<Utc>) {
        let transfers = transfers as u64;
        match self.index.get(&address) {
            Some(&slot) => {
                let candidate = &mut self.candidates[slot];
                candidate.transaction_count += 1;
                candidate.transfer_count += transfers;
            }
            None => {
                self.index.insert(address, self.candidates.len());
                self.candidates.push(CandidateContract {
                    address,
                    transaction_count: 1,
                    transfer_count: transfers,
                    first_observed_at: observed_at,
                });
            }
        }
    }

    /// Candidate for `address`, if it was recorded in this window.
    pub fn get(&self, address: &Address) -> Option<&CandidateContract> {
        self.index.get(address).map(|&slot| &self.candidates[slot])
    }

    /// All candidates in first-observed order.
    pub fn candidates(&self) -> &[CandidateContract] {
        &self.candidates
    }

    /// Number of distinct contracts recorded.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// `true` when nothing has been recorded since the last flush.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Rank by transaction count, descending, and keep the top `max`.
    /// Equal counts keep first-observed order.
    pub fn rank(&self, max: usize) -> Vec<TrendingEntry> {
        let mut ranked: Vec<&CandidateContract> = self.candidates.iter().collect();
        ranked.sort_by(|a, b| b.transaction_count.cmp(&a.transaction_count));
        ranked
            .into_iter()
            .take(max)
            .enumerate()
            .map(|(i, c)| TrendingEntry {
                rank: i + 1,
                address: c.address,
                transaction_count: c.transaction_count,
                transfer_count: c.transfer_count,
            })
            .collect()
    }

    /// Rank, drop already-announced addresses, record the rest in `history`
    /// and clear the window.
    pub fn flush(&mut self, history: &mut History, max: usize) -> Vec<TrendingEntry> {
        if self.is_empty() {
            return Vec::new();
        }
        let ranked = self.rank(max);
        self.candidates.clear();
        self.index.clear();

        ranked
            .into_iter()
            .filter(|entry| history.insert(entry.address))
            .collect()
    }
}

/// Append-only set of announced contracts, in announcement order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History {
    announced: Vec<Address>,
    members: HashSet<Address>,
}

impl History {
    /// History with no announced contracts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `address`; returns `false` if it was already announced.
    pub fn insert(&mut self, address: Address) -> bool {
        if !self.members.insert(address) {
            return false;
        }
        self.announced.push(address);
        true
    }

    /// Whether `address` has already been announced.
    pub fn contains(&self, address: &Address) -> bool {
        self.members.contains(address)
    }

    /// Announced addresses, oldest first.
    pub fn addresses(&self) -> &[Address] {
        &self.announced
    }

    /// Number of announced contracts.
    pub fn len(&self) -> usize {
        self.announced.len()
    }

    /// `true` when nothing has been announced yet.
    pub fn is_empty(&self) -> bool {
        self.announced.is_empty()
    }

    /// Decode a JSON array of address strings. Entries that are not
    /// addresses are skipped.
    ///
    /// # Errors
    /// Returns error if the blob is not a JSON array of strings.
    pub fn from_json(raw: &str) -> Result<Self> {
        let entries: Vec<String> =
            serde_json::from_str(raw).wrap_err("history blob is not a JSON string array")?;
        let mut history = Self::new();
        for entry in entries {
            match entry.parse::<Address>() {
                Ok(address) => {
                    history.insert(address);
                }
                Err(err) => {
                    tracing::warn!(entry = %entry, error = %err, "skipping invalid history entry")
                }
            }
        }
        Ok(history)
    }

    /// Encode as a JSON array of lowercase `0x` addresses.
    pub fn to_json(&self) -> String {
        let entries: Vec<String> = self.announced.iter().map(|a| format!("{a:#x}")).collect();
        serde_json::Value::from(entries).to_string()
    }

    /// Load from the store. A missing, unreadable or malformed blob yields
    /// an empty history.
    pub fn load(store: &dyn CacheStore) -> Self {
        let raw = match store.get(Namespace::History, HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::new(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read history, starting empty");
                return Self::new();
            }
        };
        match Self::from_json(&raw) {
            Ok(history) => {
                tracing::debug!(announced = history.len(), "loaded history");
                history
            }
            Err(err) => {
                tracing::warn!(error = %err, "unparseable history, starting empty");
                Self::new()
            }
        }
    }

    /// # Errors
    /// Returns error if the store write fails.
    pub fn persist(&self, store: &dyn CacheStore) -> Result<()> {
        store
            .put(Namespace::History, HISTORY_KEY, &self.to_json())
            .wrap_err("failed to persist history")
    }
}
