//! Swap query shapes and their translation into backend lookups.
//!
//! Translation functions validate the query against the backend before any
//! network call: malformed IDs and addresses of the wrong family fail with
//! [`SwapError::InvalidArgument`], lookups the backend can not serve fail
//! with [`SwapError::UnsupportedQuery`].

use std::{collections::HashSet, fmt::Display};

use alloy::{hex, primitives::B256};

use crate::{
    EvmChain, TendermintChain,
    error::SwapError,
    types::{Address, Hash, HeightRange, SwapData, SwapEvent, SwapId, SwapIdPrefix},
};

/// Selects the swaps to look up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwapQuery {
    ById(SwapId),
    BySender(Address),
    ByRecipient(Address),
    ByHash(Hash),
}

impl SwapQuery {
    /// Whether the offered swap is selected by the query.
    pub fn matches(&self, data: &SwapData) -> bool {
        match self {
            SwapQuery::ById(id) => data.id == *id,
            SwapQuery::BySender(sender) => data.sender == *sender,
            SwapQuery::ByRecipient(recipient) => data.recipient == *recipient,
            SwapQuery::ByHash(hash) => data.hash == *hash,
        }
    }

    /// Whether a settlement of the given swap can belong to a selected swap,
    /// judging by the ID alone.
    pub fn may_settle(&self, id: &SwapId) -> bool {
        match self {
            SwapQuery::ById(query_id) => query_id == id,
            SwapQuery::BySender(_) | SwapQuery::ByRecipient(_) | SwapQuery::ByHash(_) => true,
        }
    }
}

impl Display for SwapQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapQuery::ById(id) => write!(f, "id={}", id),
            SwapQuery::BySender(sender) => write!(f, "sender={}", sender),
            SwapQuery::ByRecipient(recipient) => write!(f, "recipient={}", recipient),
            SwapQuery::ByHash(hash) => write!(f, "hash={}", hash),
        }
    }
}

/// Narrows a superset of candidate events returned by a backend down to the
/// events of swaps selected by the query.
///
/// Offers are checked against the query directly. Settlements carry only the
/// swap ID, so they are kept unless the offer of the same swap was seen and
/// did not match; the reconciler holds settlements of unseen swaps pending.
///
/// An unselected swap is remembered until its settlement is dropped, after
/// which the swap produces no further events.
#[derive(Clone, Debug)]
pub struct EventFilter {
    query: SwapQuery,
    rejected: HashSet<SwapId>,
}

impl EventFilter {
    pub fn new(query: SwapQuery) -> Self { Self { query, rejected: HashSet::new() } }

    pub fn query(&self) -> &SwapQuery { &self.query }

    /// Returns `true` if the event belongs to a selected swap.
    pub fn accept(&mut self, event: &SwapEvent) -> bool {
        match event {
            SwapEvent::Offered(data) => {
                if self.query.matches(data) {
                    true
                } else {
                    self.rejected.insert(data.id.clone());
                    false
                }
            },
            SwapEvent::Claimed { id, .. } | SwapEvent::Aborted { id } => {
                self.query.may_settle(id) && !self.rejected.remove(id)
            },
        }
    }

    /// Forgets an unselected swap whose settlement was already seen.
    pub fn forget(&mut self, id: &SwapId) { self.rejected.remove(id); }

    /// Number of unselected swaps still waiting for their settlement.
    pub fn num_rejected(&self) -> usize { self.rejected.len() }
}

/// Bucket the swaps are stored in on the tag-indexed chain.
const SWAP_BUCKET: &str = "esc";
const HASH_ID_PREFIX: &[u8] = b"hash/sha256/";

/// Tag of the tag-indexed chain transaction index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryTag {
    /// Upper-case hex of the binary index key.
    pub key: String,
    /// `s` when the key was set, `d` when it was deleted.
    pub value: char,
}

impl QueryTag {
    fn new(key: &[u8], set: bool) -> Self {
        Self { key: hex::encode_upper(key), value: if set { 's' } else { 'd' } }
    }
}

impl Display for QueryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}='{}'", self.key, self.value)
    }
}

/// Binary index key selecting the swaps of the query on the tag-indexed chain.
fn tendermint_index_key(query: &SwapQuery, chain: &TendermintChain) -> Result<Vec<u8>, SwapError> {
    let (index, data): (Option<&str>, Vec<u8>) = match query {
        SwapQuery::ById(id) => {
            if id.prefix() != SwapIdPrefix::Native {
                return Err(SwapError::InvalidArgument(format!(
                    "swap id {} does not belong to the tag-indexed chain",
                    id
                )));
            }
            (None, id.data().to_vec())
        },
        SwapQuery::BySender(address) => (Some("sender"), chain.address_bytes(address)?.to_vec()),
        SwapQuery::ByRecipient(address) => {
            (Some("recipient"), chain.address_bytes(address)?.to_vec())
        },
        SwapQuery::ByHash(hash) => (Some("arbiter"), hash_identifier(hash)),
    };
    let mut key = match index {
        Some(index) => format!("_i.{SWAP_BUCKET}_{index}:").into_bytes(),
        None => format!("{SWAP_BUCKET}:").into_bytes(),
    };
    key.extend(data);
    Ok(key)
}

/// Index tags of the offering (`set`) and settling (`delete`) transactions of
/// the selected swaps.
///
/// Both have to be searched to get the full history: the swap key is set by
/// the offer and deleted by the claim or abort.
pub fn tendermint_tags(
    query: &SwapQuery,
    chain: &TendermintChain,
) -> Result<[QueryTag; 2], SwapError> {
    let key = tendermint_index_key(query, chain)?;
    Ok([QueryTag::new(&key, true), QueryTag::new(&key, false)])
}

/// `tx_search` query string for the tag within the height range.
pub fn tx_search_query(tag: &QueryTag, range: HeightRange) -> String {
    let mut components = vec![tag.to_string()];
    if let Some(min) = range.min {
        components.push(format!("tx.height>={}", min));
    }
    if let Some(max) = range.max {
        components.push(format!("tx.height<={}", max));
    }
    components.join(" AND ")
}

/// Application state path and data to read the open swaps of the query.
pub fn tendermint_state_query(
    query: &SwapQuery,
    chain: &TendermintChain,
) -> Result<(&'static str, Vec<u8>), SwapError> {
    Ok(match query {
        SwapQuery::ById(_) => {
            let key = tendermint_index_key(query, chain)?;
            ("/escrows", key[SWAP_BUCKET.len() + 1..].to_vec())
        },
        SwapQuery::BySender(address) => ("/escrows/sender", chain.address_bytes(address)?.to_vec()),
        SwapQuery::ByRecipient(address) => {
            ("/escrows/recipient", chain.address_bytes(address)?.to_vec())
        },
        SwapQuery::ByHash(hash) => ("/escrows/arbiter", hash_identifier(hash)),
    })
}

fn hash_identifier(hash: &Hash) -> Vec<u8> { [HASH_ID_PREFIX, hash.as_bytes()].concat() }

/// Swap contracts whose logs have to be scanned for the query.
pub fn evm_log_scan(
    query: &SwapQuery,
    chain: &EvmChain,
) -> Result<Vec<(SwapIdPrefix, alloy::primitives::Address)>, SwapError> {
    match query {
        SwapQuery::ById(id) => {
            let (prefix, contract, _) = evm_contract_of(id, chain)?;
            Ok(vec![(prefix, contract)])
        },
        SwapQuery::BySender(address) | SwapQuery::ByRecipient(address) => {
            if address.as_evm().is_none() {
                return Err(SwapError::InvalidArgument(format!(
                    "{} is not a log-indexed chain address",
                    address
                )));
            }
            Ok(chain.swap_contracts())
        },
        SwapQuery::ByHash(_) => Ok(chain.swap_contracts()),
    }
}

/// Swap contract and contract-side ID to read the current state of the
/// queried swap from. Only ID queries can be served from state.
pub fn evm_state_read(
    query: &SwapQuery,
    chain: &EvmChain,
) -> Result<(SwapIdPrefix, alloy::primitives::Address, B256), SwapError> {
    match query {
        SwapQuery::ById(id) => evm_contract_of(id, chain),
        SwapQuery::BySender(_) | SwapQuery::ByRecipient(_) | SwapQuery::ByHash(_) => {
            Err(SwapError::UnsupportedQuery(format!(
                "state of the log-indexed chain can only be queried by id, got {}",
                query
            )))
        },
    }
}

fn evm_contract_of(
    id: &SwapId,
    chain: &EvmChain,
) -> Result<(SwapIdPrefix, alloy::primitives::Address, B256), SwapError> {
    let contract = match id.prefix() {
        SwapIdPrefix::Ether => chain.ether_swap(),
        SwapIdPrefix::Erc20 => chain.erc20_swap().ok_or_else(|| {
            SwapError::UnsupportedQuery("ERC-20 swap contract is not configured".to_string())
        })?,
        SwapIdPrefix::Native => {
            return Err(SwapError::InvalidArgument(format!(
                "swap id {} does not belong to the log-indexed chain",
                id
            )));
        },
    };
    Ok((id.prefix(), contract, id.as_b256()?))
}
