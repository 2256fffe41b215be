//! Builders of swaps and swap events with deterministic contents.

use alloy::primitives::U256;

use crate::types::{
    Address, Amount, Bech32Prefix, Hash, Preimage, SwapData, SwapEvent, SwapId, SwapIdPrefix,
    SwapTimeout, WEAVE_ADDRESS_LENGTH,
};

/// Native swap ID with the big-endian bytes of the number.
pub fn swap_id(n: u64) -> SwapId {
    SwapId::new(SwapIdPrefix::Native, n.to_be_bytes().to_vec())
        .unwrap_or_else(|_| unreachable!("8-byte swap ID"))
}

/// Test network address filled with the byte.
pub fn address(n: u8) -> Address { Address::bech32(Bech32Prefix::Test, [n; WEAVE_ADDRESS_LENGTH]) }

/// Preimage of the swap with the given number.
pub fn preimage(n: u64) -> Preimage { Preimage::new(format!("preimage-{n}").into_bytes()) }

/// Offer of a native swap, 100 IOV from address 1 to address 2 locked by the
/// hash of [`preimage`] by default.
#[derive(Clone, Debug)]
pub struct OfferBuilder {
    data: SwapData,
}

impl OfferBuilder {
    pub fn new(n: u64) -> Self {
        Self {
            data: SwapData {
                id: swap_id(n),
                sender: address(1),
                recipient: address(2),
                hash: Hash::of(&preimage(n)),
                amounts: vec![Amount::new(U256::from(100), 9, "IOV")],
                timeout: SwapTimeout::Height(1_000),
                memo: None,
            },
        }
    }

    pub fn sender(mut self, sender: Address) -> Self {
        self.data.sender = sender;
        self
    }

    pub fn recipient(mut self, recipient: Address) -> Self {
        self.data.recipient = recipient;
        self
    }

    pub fn hash(mut self, hash: Hash) -> Self {
        self.data.hash = hash;
        self
    }

    /// Replaces the amounts with a single IOV amount.
    pub fn amount(mut self, quantity: u64) -> Self {
        self.data.amounts = vec![Amount::new(U256::from(quantity), 9, "IOV")];
        self
    }

    pub fn timeout(mut self, timeout: SwapTimeout) -> Self {
        self.data.timeout = timeout;
        self
    }

    pub fn memo(mut self, memo: impl Into<String>) -> Self {
        self.data.memo = Some(memo.into());
        self
    }

    pub fn build(self) -> SwapData { self.data }

    pub fn event(self) -> SwapEvent { SwapEvent::Offered(self.data) }
}

pub fn offer(n: u64) -> SwapEvent { OfferBuilder::new(n).event() }

/// Claim of the swap with its default [`preimage`].
pub fn claim(n: u64) -> SwapEvent { SwapEvent::Claimed { id: swap_id(n), preimage: preimage(n) } }

pub fn abort(n: u64) -> SwapEvent { SwapEvent::Aborted { id: swap_id(n) } }
