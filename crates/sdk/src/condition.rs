//! Locking conditions and the addresses derived from them.
//!
//! A condition is `"{extension}/{type}/" || data`, the address holding the
//! locked funds is the first 20 bytes of its SHA-256 digest. Every kind of
//! locking primitive uses its own extension/type pair, so conditions of
//! different kinds never collide.

use alloy::hex;
use sha2::{Digest, Sha256};

use crate::{
    error::SwapError,
    types::{Address, Bech32Prefix, Hash, SwapId, WEAVE_ADDRESS_LENGTH},
};

/// Byte string identifying a locking rule.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Condition(Vec<u8>);

impl Condition {
    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    pub fn into_bytes(self) -> Vec<u8> { self.0 }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Condition({})", hex::encode(&self.0))
    }
}

/// Builds a condition for the given extension, condition type and data.
///
/// Extension and type must be non-empty and must not contain `/`, otherwise
/// conditions of different kinds could share a prefix.
pub fn build_condition(extension: &str, kind: &str, data: &[u8]) -> Result<Condition, SwapError> {
    for (name, part) in [("extension", extension), ("type", kind)] {
        if part.is_empty() || part.contains('/') || !part.is_ascii() {
            return Err(SwapError::InvalidArgument(format!("invalid condition {name}: {part:?}")));
        }
    }
    let mut out = Vec::with_capacity(extension.len() + kind.len() + 2 + data.len());
    out.extend_from_slice(extension.as_bytes());
    out.push(b'/');
    out.extend_from_slice(kind.as_bytes());
    out.push(b'/');
    out.extend_from_slice(data);
    Ok(Condition(out))
}

/// Condition of the atomic swap with the given ID and hash.
pub fn build_swap_condition(id: &SwapId, hash: &Hash) -> Condition {
    let mut data = Vec::with_capacity(id.data().len() + 1 + 32);
    data.extend_from_slice(id.data());
    data.push(b'|');
    data.extend_from_slice(hash.as_bytes());
    fixed("aswap", "pre_hash", data)
}

pub fn build_multisig_condition(id: u64) -> Condition {
    fixed("multisig", "usage", id.to_be_bytes().to_vec())
}

pub fn build_escrow_condition(id: u64) -> Condition {
    fixed("escrow", "seq", id.to_be_bytes().to_vec())
}

pub fn build_election_rule_condition(id: u64) -> Condition {
    fixed("gov", "rule", id.to_be_bytes().to_vec())
}

fn fixed(extension: &'static str, kind: &'static str, data: Vec<u8>) -> Condition {
    let mut out = format!("{extension}/{kind}/").into_bytes();
    out.extend(data);
    Condition(out)
}

/// Raw address bytes controlled by the condition.
pub fn condition_to_weave_address(condition: &Condition) -> [u8; WEAVE_ADDRESS_LENGTH] {
    let digest = Sha256::digest(condition.as_bytes());
    let mut address = [0u8; WEAVE_ADDRESS_LENGTH];
    address.copy_from_slice(&digest[..WEAVE_ADDRESS_LENGTH]);
    address
}

/// Printable address controlled by the condition.
pub fn condition_to_address(prefix: Bech32Prefix, condition: &Condition) -> Address {
    Address::bech32(prefix, condition_to_weave_address(condition))
}

/// Address holding the funds of the given swap.
pub fn swap_to_address(prefix: Bech32Prefix, id: &SwapId, hash: &Hash) -> Address {
    condition_to_address(prefix, &build_swap_condition(id, hash))
}

pub fn multisig_id_to_address(prefix: Bech32Prefix, id: u64) -> Address {
    condition_to_address(prefix, &build_multisig_condition(id))
}

pub fn escrow_id_to_address(prefix: Bech32Prefix, id: u64) -> Address {
    condition_to_address(prefix, &build_escrow_condition(id))
}

pub fn election_rule_id_to_address(prefix: Bech32Prefix, id: u64) -> Address {
    condition_to_address(prefix, &build_election_rule_condition(id))
}
