//! Atomic swap tracking SDK.
//!
//! # Overview
//!
//! Tracks hash-time-locked swaps on two chain families through one interface:
//! tag-indexed chains searched via Tendermint `tx_search`, and log-indexed
//! (EVM) chains with swap contracts emitting `Opened`/`Claimed`/`Aborted`
//! logs.
//!
//! Use [`connection::AtomicSwapConnection`] to query the current state of swaps
//! ([`connection::AtomicSwapConnection::get_swaps`]) or to watch them
//! ([`connection::AtomicSwapConnection::watch_swaps`]): the watch emits the state of
//! every known swap first, then every state transition confirmed later.
//!
//! [`condition`] derives locking conditions and the addresses holding the
//! funds of swaps, escrows and multisig contracts.
//!
//! See `./tests` for examples.
//!
//! # Limitations/follow-ups
//!
//! * Live subscriptions rely on polling on both backends. Tendermint
//!   WebSocket subscriptions could reduce latency.
//!
//! * Height-ranged searches must include the offers of the swaps settled
//!   within the range, otherwise the search fails with
//!   [`error::SwapError::DanglingSettlement`].
//!
//! # Features
//!
//! | Feature | Default | Description |
//! | --- | --- | --- |
//! | `display` | yes | Enables [`std::fmt::Display`] and [`tabled::Tabled`] implementations for swaps. |
//! | `testing` | yes | Enables [`testing`] module. |
//!
//! # Testing
//!
//! [`testing`] module provides an in-memory chain with scripted swap history
//! and a background indexer driving a live view.

pub mod abi;
pub mod condition;
pub mod connection;
pub mod error;
pub mod query;
pub mod source;
pub mod state;
pub mod stream;
#[cfg(feature = "testing")]
pub mod testing;
pub mod types;

use std::collections::HashMap;

use alloy::primitives::Address;

use crate::{
    error::SwapError,
    types::{Bech32Prefix, SwapIdPrefix, WEAVE_ADDRESS_LENGTH},
};

/// Chain ID of the tag-indexed main network.
pub const IOV_MAINNET_CHAIN_ID: &str = "iov-mainnet";

/// Ticker and precision of a token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenInfo {
    ticker: String,
    fractional_digits: u8,
}

impl TokenInfo {
    pub fn new(ticker: impl Into<String>, fractional_digits: u8) -> Self {
        Self { ticker: ticker.into(), fractional_digits }
    }

    pub fn ticker(&self) -> &str { &self.ticker }

    pub fn fractional_digits(&self) -> u8 { self.fractional_digits }
}

#[derive(Clone, Debug)]
/// Log-indexed chain the swap contracts are deployed on.
pub struct EvmChain {
    chain_id: u64,
    ether_swap: Address,
    erc20_swap: Option<Address>,
    deployed_at_block: u64,
    native: TokenInfo,
    tokens: HashMap<Address, TokenInfo>,
}

impl EvmChain {
    pub fn custom(chain_id: u64, ether_swap: Address, deployed_at_block: u64) -> Self {
        Self {
            chain_id,
            ether_swap,
            erc20_swap: None,
            deployed_at_block,
            native: TokenInfo::new("ETH", 18),
            tokens: HashMap::new(),
        }
    }

    /// Enables the ERC-20 swap contract together with the tokens it may hold.
    pub fn with_erc20(
        mut self,
        erc20_swap: Address,
        tokens: impl IntoIterator<Item = (Address, TokenInfo)>,
    ) -> Self {
        self.erc20_swap = Some(erc20_swap);
        self.tokens.extend(tokens);
        self
    }

    pub fn with_native(mut self, native: TokenInfo) -> Self {
        self.native = native;
        self
    }

    pub fn chain_id(&self) -> u64 { self.chain_id }

    pub fn ether_swap(&self) -> Address { self.ether_swap }

    pub fn erc20_swap(&self) -> Option<Address> { self.erc20_swap }

    pub fn deployed_at_block(&self) -> u64 { self.deployed_at_block }

    pub fn native(&self) -> &TokenInfo { &self.native }

    pub fn token(&self, address: &Address) -> Option<&TokenInfo> { self.tokens.get(address) }

    /// All configured swap contracts with the prefix of the swap IDs they
    /// allocate.
    pub fn swap_contracts(&self) -> Vec<(SwapIdPrefix, Address)> {
        let mut contracts = vec![(SwapIdPrefix::Ether, self.ether_swap)];
        if let Some(erc20_swap) = self.erc20_swap {
            contracts.push((SwapIdPrefix::Erc20, erc20_swap));
        }
        contracts
    }

    /// Prefix of the swap IDs allocated by the contract, if it is one of the
    /// swap contracts.
    pub fn prefix_of(&self, contract: &Address) -> Option<SwapIdPrefix> {
        self.swap_contracts().into_iter().find(|(_, c)| c == contract).map(|(prefix, _)| prefix)
    }
}

#[derive(Clone, Debug)]
/// Tag-indexed chain the swaps are stored on natively.
pub struct TendermintChain {
    chain_id: String,
    prefix: Bech32Prefix,
}

impl TendermintChain {
    /// Chain with the address prefix derived from the chain ID.
    pub fn new(chain_id: impl Into<String>) -> Self {
        let chain_id = chain_id.into();
        let prefix = if chain_id == IOV_MAINNET_CHAIN_ID {
            Bech32Prefix::Main
        } else {
            Bech32Prefix::Test
        };
        Self { chain_id, prefix }
    }

    pub fn with_prefix(mut self, prefix: Bech32Prefix) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn chain_id(&self) -> &str { &self.chain_id }

    pub fn prefix(&self) -> Bech32Prefix { self.prefix }

    /// Raw bytes of an address of this chain.
    pub fn address_bytes(
        &self,
        address: &types::Address,
    ) -> Result<[u8; WEAVE_ADDRESS_LENGTH], SwapError> {
        match address {
            types::Address::Bech32 { prefix, data } if *prefix == self.prefix => Ok(*data),
            _ => Err(SwapError::InvalidArgument(format!(
                "{} is not an address of chain {}",
                address, self.chain_id
            ))),
        }
    }
}
