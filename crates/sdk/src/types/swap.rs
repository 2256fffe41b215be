use std::{fmt::Display, str::FromStr};

use alloy::{hex, primitives::B256};
use sha2::{Digest, Sha256};

use super::{Address, Amount, StateInstant};
use crate::error::SwapError;

/// Sub-ledger a swap ID belongs to.
///
/// A single connection may track swaps held by more than one locking primitive
/// (e.g. native ether and ERC-20 swap contracts), whose raw IDs are allocated
/// independently and can collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SwapIdPrefix {
    /// Swaps held natively by the tag-indexed chain.
    Native,
    /// Swaps held by the ether swap contract.
    Ether,
    /// Swaps held by the ERC-20 swap contract.
    Erc20,
}

impl Display for SwapIdPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapIdPrefix::Native => write!(f, "native"),
            SwapIdPrefix::Ether => write!(f, "ether"),
            SwapIdPrefix::Erc20 => write!(f, "erc20"),
        }
    }
}

impl FromStr for SwapIdPrefix {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(SwapIdPrefix::Native),
            "ether" => Ok(SwapIdPrefix::Ether),
            "erc20" => Ok(SwapIdPrefix::Erc20),
            _ => Err(SwapError::InvalidArgument(format!("unknown swap id prefix: {s}"))),
        }
    }
}

/// Identifier of a single swap, assigned by the chain at offer time.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwapId {
    prefix: SwapIdPrefix,
    data: Vec<u8>,
}

impl SwapId {
    pub fn new(prefix: SwapIdPrefix, data: impl Into<Vec<u8>>) -> Result<Self, SwapError> {
        let data = data.into();
        if data.is_empty() {
            return Err(SwapError::InvalidArgument("empty swap id".to_string()));
        }
        Ok(Self { prefix, data })
    }

    /// ID of a swap held by one of the swap contracts, which always use
    /// 32-byte IDs.
    pub fn contract(prefix: SwapIdPrefix, id: B256) -> Self { Self { prefix, data: id.to_vec() } }

    pub fn prefix(&self) -> SwapIdPrefix { self.prefix }

    pub fn data(&self) -> &[u8] { &self.data }

    /// Contract representation of the ID.
    pub fn as_b256(&self) -> Result<B256, SwapError> {
        B256::try_from(self.data.as_slice()).map_err(|_| {
            SwapError::InvalidArgument(format!(
                "swap id {} is {} bytes long, 32 expected",
                self,
                self.data.len()
            ))
        })
    }
}

impl std::fmt::Debug for SwapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self) }
}

impl Display for SwapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.prefix, hex::encode(&self.data))
    }
}

impl FromStr for SwapId {
    type Err = SwapError;

    /// Parses `<prefix>:<hex>` representation, e.g. `ether:0x00..01`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, data) = s
            .split_once(':')
            .ok_or_else(|| SwapError::InvalidArgument(format!("invalid swap id: {s}")))?;
        let data = hex::decode(data)
            .map_err(|err| SwapError::InvalidArgument(format!("invalid swap id {s}: {err}")))?;
        SwapId::new(prefix.parse()?, data)
    }
}

/// SHA-256 digest the swap is locked with.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const fn new(bytes: [u8; 32]) -> Self { Self(bytes) }

    /// Hash of the preimage, as verified by the chains on claim.
    pub fn of(preimage: &Preimage) -> Self { Self(Sha256::digest(preimage.as_bytes()).into()) }

    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }

    pub fn matches(&self, preimage: &Preimage) -> bool { Hash::of(preimage) == *self }
}

impl From<B256> for Hash {
    fn from(value: B256) -> Self { Self(value.0) }
}

impl From<Hash> for B256 {
    fn from(value: Hash) -> Self { B256::new(value.0) }
}

impl TryFrom<&[u8]> for Hash {
    type Error = SwapError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 32]>::try_from(value).map(Self).map_err(|_| {
            SwapError::InvalidArgument(format!("hash must be 32 bytes, got {}", value.len()))
        })
    }
}

impl FromStr for Hash {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|err| SwapError::InvalidArgument(format!("invalid hash {s}: {err}")))?;
        Hash::try_from(bytes.as_slice())
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self) }
}

impl Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Secret revealed by the recipient when claiming a swap.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Preimage(Vec<u8>);

impl Preimage {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self { Self(bytes.into()) }

    /// Fresh 32-byte secret to offer a swap with.
    pub fn random() -> Self { Self(rand::random::<[u8; 32]>().to_vec()) }

    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    pub fn hash(&self) -> Hash { Hash::of(self) }
}

impl std::fmt::Debug for Preimage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// The first point in chain history at which an offer is expired and can be
/// returned to the sender.
///
/// Each chain family uses exactly one representation: log-indexed chains
/// count block heights, tag-indexed chains use UNIX timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwapTimeout {
    /// Absolute block height.
    Height(u64),
    /// UNIX timestamp in seconds.
    Timestamp(i64),
}

impl SwapTimeout {
    /// Timestamp timeout the given number of seconds from now.
    pub fn from_now(seconds: i64) -> Self {
        SwapTimeout::Timestamp(chrono::Utc::now().timestamp() + seconds)
    }

    pub fn is_expired(&self, instant: &StateInstant) -> bool {
        match self {
            SwapTimeout::Height(height) => instant.block_number() >= *height,
            SwapTimeout::Timestamp(ts) => instant.block_timestamp() as i64 >= *ts,
        }
    }
}

impl Display for SwapTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapTimeout::Height(height) => write!(f, "#{}", height),
            SwapTimeout::Timestamp(ts) => match chrono::DateTime::from_timestamp(*ts, 0) {
                Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
                None => write!(f, "@{}", ts),
            },
        }
    }
}

/// Facts fixed at offer time.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SwapData {
    /// Chain-assigned swap ID.
    pub id: SwapId,

    /// Account the funds are returned to on abort.
    pub sender: Address,

    /// Account the funds are released to on claim.
    pub recipient: Address,

    /// Hash whose preimage releases the funds.
    pub hash: Hash,

    /// Locked funds, at least one entry.
    #[debug("{}", amounts.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    pub amounts: Vec<Amount>,

    /// Expiration point of the offer.
    #[debug("{timeout}")]
    pub timeout: SwapTimeout,

    /// Free-form note attached by the sender.
    pub memo: Option<String>,
}

/// Process state of a swap, see [`AtomicSwap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwapProcessState {
    Open,
    Claimed,
    Aborted,
}

impl SwapProcessState {
    pub fn is_terminal(&self) -> bool { !matches!(self, SwapProcessState::Open) }
}

impl Display for SwapProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapProcessState::Open => write!(f, "open"),
            SwapProcessState::Claimed => write!(f, "claimed"),
            SwapProcessState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Current state of a swap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AtomicSwap {
    /// Offer accepted on-chain, funds locked.
    Open { data: SwapData },
    /// Recipient revealed the preimage and withdrew the funds.
    Claimed { data: SwapData, preimage: Preimage },
    /// Funds returned to the sender.
    Aborted { data: SwapData },
}

impl AtomicSwap {
    pub fn data(&self) -> &SwapData {
        match self {
            AtomicSwap::Open { data }
            | AtomicSwap::Claimed { data, .. }
            | AtomicSwap::Aborted { data } => data,
        }
    }

    pub fn id(&self) -> &SwapId { &self.data().id }

    pub fn state(&self) -> SwapProcessState {
        match self {
            AtomicSwap::Open { .. } => SwapProcessState::Open,
            AtomicSwap::Claimed { .. } => SwapProcessState::Claimed,
            AtomicSwap::Aborted { .. } => SwapProcessState::Aborted,
        }
    }

    /// Preimage the swap was claimed with.
    pub fn preimage(&self) -> Option<&Preimage> {
        match self {
            AtomicSwap::Claimed { preimage, .. } => Some(preimage),
            AtomicSwap::Open { .. } | AtomicSwap::Aborted { .. } => None,
        }
    }

    pub fn is_settled(&self) -> bool { self.state().is_terminal() }
}

#[cfg(feature = "display")]
impl Display for SwapData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use itertools::Itertools;

        write!(
            f,
            "{} {} -> {} [{}] hash:{} timeout:{}",
            self.id,
            self.sender,
            self.recipient,
            self.amounts.iter().join(", "),
            self.hash,
            self.timeout
        )?;
        if let Some(memo) = &self.memo {
            write!(f, " memo:{:?}", memo)?;
        }
        Ok(())
    }
}

#[cfg(feature = "display")]
impl Display for AtomicSwap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use colored::Colorize;

        let state = match self.state() {
            SwapProcessState::Open => "OPEN".yellow(),
            SwapProcessState::Claimed => "CLAIMED".green(),
            SwapProcessState::Aborted => "ABORTED".bright_red(),
        };
        write!(f, "{} {}", state, self.data())?;
        if f.alternate()
            && let Some(preimage) = self.preimage()
        {
            write!(f, " preimage:{:?}", preimage)?;
        }
        Ok(())
    }
}

#[cfg(feature = "display")]
impl tabled::Tabled for AtomicSwap {
    const LENGTH: usize = 8;

    fn fields(&self) -> Vec<std::borrow::Cow<'_, str>> {
        use colored::Colorize;
        use itertools::Itertools;

        let data = self.data();
        vec![
            data.id.to_string().into(),
            match self.state() {
                SwapProcessState::Open => "open".yellow().to_string().into(),
                SwapProcessState::Claimed => "claimed".green().to_string().into(),
                SwapProcessState::Aborted => "aborted".bright_red().to_string().into(),
            },
            data.sender.to_string().into(),
            data.recipient.to_string().into(),
            data.amounts.iter().join(", ").into(),
            data.hash.to_string().into(),
            data.timeout.to_string().into(),
            if let Some(preimage) = self.preimage() {
                format!("{:?}", preimage).into()
            } else {
                "-".to_string().into()
            },
        ]
    }

    fn headers() -> Vec<std::borrow::Cow<'static, str>> {
        vec![
            "Swap ID".into(),
            "State".into(),
            "Sender".into(),
            "Recipient".into(),
            "Amounts".into(),
            "Hash".into(),
            "Timeout".into(),
            "Preimage".into(),
        ]
    }
}

/// Swap-related chain event, decoded from a confirmed transaction or
/// contract log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwapEvent {
    /// Offer created, funds locked.
    Offered(SwapData),
    /// Offer claimed with the preimage.
    Claimed { id: SwapId, preimage: Preimage },
    /// Offer returned to the sender.
    Aborted { id: SwapId },
}

impl SwapEvent {
    pub fn swap_id(&self) -> &SwapId {
        match self {
            SwapEvent::Offered(data) => &data.id,
            SwapEvent::Claimed { id, .. } | SwapEvent::Aborted { id } => id,
        }
    }

    pub fn is_settlement(&self) -> bool { !matches!(self, SwapEvent::Offered(_)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_id_text_representation() {
        let id: SwapId = "ether:0x00000000000000000000000000000000000000000000000000000000000000ff"
            .parse()
            .unwrap();
        assert_eq!(id.prefix(), SwapIdPrefix::Ether);
        assert_eq!(id.as_b256().unwrap(), B256::with_last_byte(0xff));
        assert_eq!(
            id.to_string(),
            "ether:00000000000000000000000000000000000000000000000000000000000000ff"
        );

        let native: SwapId = "native:aabbcc".parse().unwrap();
        assert!(native.as_b256().is_err());
        assert_ne!(native, SwapId::new(SwapIdPrefix::Erc20, vec![0xaa, 0xbb, 0xcc]).unwrap());

        assert!(matches!("ether".parse::<SwapId>(), Err(SwapError::InvalidArgument(_))));
        assert!(matches!("native:".parse::<SwapId>(), Err(SwapError::InvalidArgument(_))));
        assert!(matches!("bitcoin:aa".parse::<SwapId>(), Err(SwapError::InvalidArgument(_))));
    }

    #[test]
    fn preimage_hash() {
        // sha256("abc")
        let preimage = Preimage::new(b"abc".to_vec());
        let hash: Hash = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
            .parse()
            .unwrap();
        assert_eq!(preimage.hash(), hash);
        assert!(hash.matches(&preimage));
        assert!(!hash.matches(&Preimage::new(vec![1, 2, 3])));

        let random = Preimage::random();
        assert_eq!(random.as_bytes().len(), 32);
        assert_ne!(random, Preimage::random());
    }

    #[test]
    fn timeout_expiry() {
        let instant = StateInstant::new(100, 1_600_000_000);
        assert!(SwapTimeout::Height(100).is_expired(&instant));
        assert!(!SwapTimeout::Height(101).is_expired(&instant));
        assert!(SwapTimeout::Timestamp(1_599_999_999).is_expired(&instant));
        assert!(!SwapTimeout::Timestamp(1_600_000_001).is_expired(&instant));
        assert!(matches!(SwapTimeout::from_now(60), SwapTimeout::Timestamp(ts) if ts > 1_600_000_000));
    }

    #[test]
    fn hash_rejects_wrong_length() {
        assert!(matches!(Hash::try_from(&[0u8; 31][..]), Err(SwapError::InvalidArgument(_))));
        assert!(matches!("abcd".parse::<Hash>(), Err(SwapError::InvalidArgument(_))));
    }
}
