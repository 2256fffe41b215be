use alloy::primitives::TxHash;

use super::StateInstant;

/// Event together with its position in chain history.
///
/// Ordering of contexts follows confirmation order: block height, then
/// transaction index within the block, then log index within the transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext<E> {
    height: u64,
    tx_hash: TxHash,
    tx_index: u64,
    log_index: u64,
    event: E,
}

impl<E> EventContext<E> {
    pub fn new(height: u64, tx_hash: TxHash, tx_index: u64, log_index: u64, event: E) -> Self {
        Self { height, tx_hash, tx_index, log_index, event }
    }

    /// Height of the block the event was confirmed in.
    pub fn height(&self) -> u64 { self.height }

    /// Hash of the transaction emitted the event.
    pub fn tx_hash(&self) -> TxHash { self.tx_hash }

    /// Index of the transaction within the block.
    pub fn tx_index(&self) -> u64 { self.tx_index }

    /// Index of the event within the block (log-indexed chains) or within
    /// the transaction (tag-indexed chains).
    pub fn log_index(&self) -> u64 { self.log_index }

    pub fn event(&self) -> &E { &self.event }

    pub fn into_event(self) -> E { self.event }

    /// Confirmation-order key of the event.
    pub fn position(&self) -> (u64, u64, u64) { (self.height, self.tx_index, self.log_index) }

    /// Wraps another event into the same context, e.g. a state transition
    /// produced from this event.
    pub fn pass<T>(&self, event: T) -> EventContext<T> {
        EventContext {
            height: self.height,
            tx_hash: self.tx_hash,
            tx_index: self.tx_index,
            log_index: self.log_index,
            event,
        }
    }
}

/// Events confirmed within a single block.
#[derive(Clone, Debug)]
pub struct BlockEvents<E> {
    instant: StateInstant,
    events: Vec<E>,
}

impl<E> BlockEvents<E> {
    pub fn new(instant: StateInstant, events: Vec<E>) -> Self { Self { instant, events } }

    pub fn instant(&self) -> StateInstant { self.instant }

    pub fn events(&self) -> &[E] { &self.events }

    pub fn into_events(self) -> Vec<E> { self.events }
}
