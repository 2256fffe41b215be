//! Swap contract bindings.

use std::{collections::HashMap, sync::LazyLock};

use alloy::{primitives::B256, sol_types::SolEvent};

pub mod ether {
    alloy::sol! {
        /// Atomic swap contract holding native ether.
        #[sol(rpc)]
        #[derive(Debug, PartialEq, Eq)]
        contract AtomicSwapEther {
            event Opened(bytes32 id, address sender, address recipient, bytes32 hash, uint256 amount, uint256 timeout);
            event Claimed(bytes32 id, bytes32 preimage);
            event Aborted(bytes32 id);

            function open(bytes32 id, address recipient, bytes32 hash, uint256 timeout) external payable;
            function claim(bytes32 id, bytes32 preimage) external;
            function abort(bytes32 id) external;

            function get(bytes32 id) external view returns (
                address sender,
                address recipient,
                bytes32 hash,
                uint256 timeout,
                uint256 amount,
                bytes32 preimage,
                uint8 state
            );
        }
    }
}

pub mod erc20 {
    alloy::sol! {
        /// Atomic swap contract holding ERC-20 tokens.
        #[sol(rpc)]
        #[derive(Debug, PartialEq, Eq)]
        contract AtomicSwapErc20 {
            event Opened(bytes32 id, address sender, address recipient, bytes32 hash, uint256 amount, uint256 timeout, address erc20ContractAddress);
            event Claimed(bytes32 id, bytes32 preimage);
            event Aborted(bytes32 id);

            function open(bytes32 id, address recipient, bytes32 hash, uint256 timeout, address erc20ContractAddress, uint256 amount) external;
            function claim(bytes32 id, bytes32 preimage) external;
            function abort(bytes32 id) external;

            function get(bytes32 id) external view returns (
                address sender,
                address recipient,
                bytes32 hash,
                uint256 timeout,
                uint256 amount,
                bytes32 preimage,
                uint8 state,
                address erc20ContractAddress
            );
        }
    }
}

/// Contract-side swap state as returned by `get`. Zero means the swap does
/// not exist.
pub const STATE_OPEN: u8 = 1;
pub const STATE_CLAIMED: u8 = 2;
pub const STATE_ABORTED: u8 = 3;

/// Kind of a swap contract log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapLogKind {
    OpenedEther,
    OpenedErc20,
    Claimed,
    Aborted,
}

static EVENT_SIGNATURES: LazyLock<HashMap<B256, SwapLogKind>> = LazyLock::new(|| {
    HashMap::from([
        (ether::AtomicSwapEther::Opened::SIGNATURE_HASH, SwapLogKind::OpenedEther),
        (erc20::AtomicSwapErc20::Opened::SIGNATURE_HASH, SwapLogKind::OpenedErc20),
        (ether::AtomicSwapEther::Claimed::SIGNATURE_HASH, SwapLogKind::Claimed),
        (ether::AtomicSwapEther::Aborted::SIGNATURE_HASH, SwapLogKind::Aborted),
    ])
});

/// Classifies a log by its first topic. `None` for logs the swap contracts do
/// not emit.
pub fn swap_log_kind(topic0: &B256) -> Option<SwapLogKind> { EVENT_SIGNATURES.get(topic0).copied() }
