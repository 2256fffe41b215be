use std::{fmt::Display, str::FromStr};

use bech32::{Bech32, Hrp};

use crate::error::SwapError;

/// Length of account addresses derived on tag-indexed chains.
pub const WEAVE_ADDRESS_LENGTH: usize = 20;

/// Account address on one of the supported chain families.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    /// Bech32 address of a tag-indexed chain, e.g. `tiov1...`.
    Bech32 { prefix: Bech32Prefix, data: [u8; WEAVE_ADDRESS_LENGTH] },
    /// 0x-prefixed address of a log-indexed chain.
    Evm(alloy::primitives::Address),
}

/// Human readable part of the addresses used by a tag-indexed chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bech32Prefix {
    /// Mainnet, `iov`.
    Main,
    /// Any other network, `tiov`.
    Test,
}

impl Bech32Prefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bech32Prefix::Main => "iov",
            Bech32Prefix::Test => "tiov",
        }
    }

    fn hrp(&self) -> Hrp { Hrp::parse_unchecked(self.as_str()) }
}

impl Display for Bech32Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Bech32Prefix {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iov" => Ok(Bech32Prefix::Main),
            "tiov" => Ok(Bech32Prefix::Test),
            _ => Err(SwapError::InvalidArgument(format!("unsupported address prefix: {s}"))),
        }
    }
}

impl Address {
    pub fn bech32(prefix: Bech32Prefix, data: [u8; WEAVE_ADDRESS_LENGTH]) -> Self {
        Address::Bech32 { prefix, data }
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Address::Bech32 { data, .. } => data,
            Address::Evm(address) => address.as_slice(),
        }
    }

    pub fn as_evm(&self) -> Option<alloy::primitives::Address> {
        match self {
            Address::Evm(address) => Some(*address),
            Address::Bech32 { .. } => None,
        }
    }
}

impl From<alloy::primitives::Address> for Address {
    fn from(value: alloy::primitives::Address) -> Self { Address::Evm(value) }
}

impl FromStr for Address {
    type Err = SwapError;

    /// Parses either a 0x-prefixed hex address or a bech32 address with a
    /// known prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("0x") || s.starts_with("0X") {
            return alloy::primitives::Address::from_str(s)
                .map(Address::Evm)
                .map_err(|err| SwapError::InvalidArgument(format!("invalid address {s}: {err}")));
        }
        let (hrp, data) = bech32::decode(s)
            .map_err(|err| SwapError::InvalidArgument(format!("invalid address {s}: {err}")))?;
        let prefix = hrp.as_str().parse()?;
        let data = <[u8; WEAVE_ADDRESS_LENGTH]>::try_from(data.as_slice()).map_err(|_| {
            SwapError::InvalidArgument(format!(
                "invalid address {s}: {} bytes, {WEAVE_ADDRESS_LENGTH} expected",
                data.len()
            ))
        })?;
        Ok(Address::Bech32 { prefix, data })
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Bech32 { prefix, data } => {
                let encoded =
                    bech32::encode::<Bech32>(prefix.hrp(), data).map_err(|_| std::fmt::Error)?;
                write!(f, "{}", encoded)
            },
            Address::Evm(address) => write!(f, "{}", address),
        }
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self) }
}

#[cfg(test)]
mod tests {
    use alloy::hex;

    use super::*;

    #[test]
    fn bech32_round_trip() {
        let raw: [u8; 20] = hex::decode("f6cade229408c93a2a8d181d62efce46ff60d210")
            .unwrap()
            .try_into()
            .unwrap();
        let address = Address::bech32(Bech32Prefix::Test, raw);
        assert_eq!(address.to_string(), "tiov17m9dug55pryn525drqwk9m7wgmlkp5ss4j2mky");
        assert_eq!(
            "tiov17m9dug55pryn525drqwk9m7wgmlkp5ss4j2mky".parse::<Address>().unwrap(),
            address
        );
    }

    #[test]
    fn evm_address() {
        let address: Address = "0x9a0B1dF0E5C8e39A3ab2D1e0E9b79e0bD6F3b8cD".parse().unwrap();
        assert!(matches!(address, Address::Evm(_)));
        assert_eq!(address.as_bytes().len(), 20);
        assert_eq!(
            address,
            "0x9a0b1df0e5c8e39a3ab2d1e0e9b79e0bd6f3b8cd".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn rejects_invalid() {
        for s in [
            "",
            "0x1234",
            "cosmos1k898u78hgs36uqw68dg7va5nfkgstu5z0fhz3f",
            "tiov17m9dug55pryn525drqwk9m7wgmlkp5ss4j2mkz",
        ] {
            assert!(matches!(s.parse::<Address>(), Err(SwapError::InvalidArgument(_))), "{s}");
        }
    }
}
