//! Contract interface resolution with a memo, a persistent cache and a
//! per-cycle external fetch quota.
//!
//! Lookup order for [`MetadataResolver::resolve`]:
//! 1. in-process memo (successful resolutions, process lifetime)
//! 2. persistent cache (`contract-abi` namespace)
//! 3. external registry, only while the cycle's fetch quota lasts
//!
//! Failed and throttled lookups are remembered until the next
//! [`MetadataResolver::begin_cycle`] so a cycle never spends quota twice on
//! the same address, and the next cycle retries them. Only ABIs that parse
//! are written to the cache; an unparseable cached entry counts as a miss.

use alloy::dyn_abi::JsonAbiExt;
use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, Selector};
use dashmap::DashMap;
use mint_data::etherscan::{AbiLookup, AbiSource};
use mint_data::store::{CacheStore, Namespace};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Failure to turn raw bytes or text into a typed call description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("ABI parse error: {0}")]
    AbiParse(String),

    #[error("calldata is shorter than a function selector")]
    MissingSelector,

    #[error("no function with selector {0}")]
    UnknownSelector(Selector),

    #[error("input decode error: {0}")]
    InputDecode(String),
}

/// Function name and declared parameter names of a decoded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedCall {
    pub name: String,
    pub param_names: Vec<String>,
}

/// Capability to decode raw calldata against a contract interface.
pub trait CallDecoder {
    /// # Errors
    /// Returns [`DecodeError`] if the selector is unknown or the arguments
    /// do not decode against the declared input types.
    fn decode_call(&self, input: &[u8]) -> Result<DecodedCall, DecodeError>;
}

/// Parsed JSON ABI of a contract.
#[derive(Clone, Debug)]
pub struct CallableInterface {
    abi: JsonAbi,
}

impl CallableInterface {
    /// Parse a JSON ABI document. Pure; no I/O.
    ///
    /// # Errors
    /// Returns [`DecodeError::AbiParse`] for malformed JSON or ABI items.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let abi: JsonAbi =
            serde_json::from_str(raw).map_err(|err| DecodeError::AbiParse(err.to_string()))?;
        Ok(Self { abi })
    }

    /// Number of callable functions (overloads counted separately).
    pub fn function_count(&self) -> usize {
        self.abi.functions().count()
    }
}

impl CallDecoder for CallableInterface {
    fn decode_call(&self, input: &[u8]) -> Result<DecodedCall, DecodeError> {
        if input.len() < 4 {
            return Err(DecodeError::MissingSelector);
        }
        let selector = Selector::from_slice(&input[..4]);

        let function = self
            .abi
            .functions()
            .find(|f| f.selector() == selector)
            .ok_or(DecodeError::UnknownSelector(selector))?;

        function
            .abi_decode_input(&input[4..], false)
            .map_err(|err| DecodeError::InputDecode(err.to_string()))?;

        Ok(DecodedCall {
            name: function.name.clone(),
            param_names: function.inputs.iter().map(|p| p.name.clone()).collect(),
        })
    }
}

/// How a [`ContractMetadata`] was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionState {
    /// Loaded from the persistent cache.
    Cached,
    /// Fetched from the external registry this run.
    Fetched,
    /// Registry throttled us; retried next cycle.
    Pending,
    /// No usable interface; retried next cycle.
    Failed,
}

/// Resolved (or unresolved) interface of one contract.
#[derive(Clone, Debug)]
pub struct ContractMetadata {
    pub address: Address,
    pub abi_raw: Option<String>,
    pub interface: Option<Arc<CallableInterface>>,
    pub state: ResolutionState,
}

impl ContractMetadata {
    fn unresolved(address: Address, state: ResolutionState) -> Self {
        Self {
            address,
            abi_raw: None,
            interface: None,
            state,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.interface.is_some()
    }
}

/// Cache key of a contract ABI: lowercase `0x` address.
pub fn cache_key(address: Address) -> String {
    format!("{address:#x}")
}

pub struct MetadataResolver<A> {
    source: A,
    store: Arc<dyn CacheStore>,
    memo: DashMap<Address, ContractMetadata>,
    deferred: DashMap<Address, ResolutionState>,
    fetch_limit: u32,
    fetches_this_cycle: AtomicU32,
}

impl<A: AbiSource> MetadataResolver<A> {
    pub fn new(source: A, store: Arc<dyn CacheStore>, fetch_limit: u32) -> Self {
        Self {
            source,
            store,
            memo: DashMap::new(),
            deferred: DashMap::new(),
            fetch_limit,
            fetches_this_cycle: AtomicU32::new(0),
        }
    }

    /// Reset the fetch quota and forget this cycle's failures.
    pub fn begin_cycle(&self) {
        self.fetches_this_cycle.store(0, Ordering::SeqCst);
        self.deferred.clear();
    }

    /// External fetches attempted since the last [`Self::begin_cycle`].
    pub fn fetches_this_cycle(&self) -> u32 {
        self.fetches_this_cycle.load(Ordering::SeqCst)
    }

    /// Number of memoized interfaces.
    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }

    fn try_acquire_fetch(&self) -> bool {
        self.fetches_this_cycle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.fetch_limit).then_some(used + 1)
            })
            .is_ok()
    }

    /// Resolve the interface of `address`. Never fails; failures are
    /// reported through [`ContractMetadata::state`].
    #[tracing::instrument(skip(self), fields(address = %address))]
    pub async fn resolve(&self, address: Address) -> ContractMetadata {
        if let Some(hit) = self.memo.get(&address) {
            tracing::trace!("metadata memo hit");
            return hit.clone();
        }
        if let Some(state) = self.deferred.get(&address).map(|s| *s) {
            return ContractMetadata::unresolved(address, state);
        }

        let key = cache_key(address);
        match self.store.get(Namespace::ContractAbi, &key) {
            Ok(Some(raw)) => match CallableInterface::parse(&raw) {
                Ok(interface) => {
                    tracing::debug!("abi cache hit");
                    return self.remember(address, raw, interface, ResolutionState::Cached);
                }
                Err(err) => tracing::warn!(error = %err, "cached abi unparseable, refetching"),
            },
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "abi cache read failed"),
        }

        if !self.try_acquire_fetch() {
            tracing::debug!(limit = self.fetch_limit, "abi fetch quota exhausted");
            return self.defer(address, ResolutionState::Failed);
        }

        match self.source.fetch_abi(address).await {
            Ok(AbiLookup::Found(raw)) => match CallableInterface::parse(&raw) {
                Ok(interface) => {
                    if let Err(err) = self.store.put(Namespace::ContractAbi, &key, &raw) {
                        tracing::warn!(error = %err, "abi cache write failed");
                    }
                    self.remember(address, raw, interface, ResolutionState::Fetched)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "fetched abi unparseable");
                    self.deferred.insert(address, ResolutionState::Failed);
                    ContractMetadata {
                        address,
                        abi_raw: Some(raw),
                        interface: None,
                        state: ResolutionState::Failed,
                    }
                }
            },
            Ok(AbiLookup::Throttled) => {
                tracing::warn!("abi registry throttled the request");
                self.defer(address, ResolutionState::Pending)
            }
            Ok(AbiLookup::Unavailable(reason)) => {
                tracing::debug!(reason = %reason, "abi lookup failed");
                self.defer(address, ResolutionState::Failed)
            }
            Err(err) => {
                tracing::warn!(error = %err, "abi fetch failed");
                self.defer(address, ResolutionState::Failed)
            }
        }
    }

    fn remember(
        &self,
        address: Address,
        raw: String,
        interface: CallableInterface,
        state: ResolutionState,
    ) -> ContractMetadata {
        let metadata = ContractMetadata {
            address,
            abi_raw: Some(raw),
            interface: Some(Arc::new(interface)),
            state,
        };
        self.memo.insert(address, metadata.clone());
        metadata
    }

    fn defer(&self, address: Address, state: ResolutionState) -> ContractMetadata {
        self.deferred.insert(address, state);
        ContractMetadata::unresolved(address, state)
    }
}
