use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::{
    error::SwapError,
    query::EventFilter,
    types::{AtomicSwap, EventContext, SwapData, SwapEvent, SwapId, SwapProcessState},
};

/// Settlement waiting for the offer of its swap.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Settlement {
    Claim(crate::types::Preimage),
    Abort,
}

/// Folds swap events into the current state of every swap.
///
/// Pure, synchronous state machine: events are applied in arrival order, each
/// state transition is reported once. Duplicate offers and repeated
/// settlements are ignored, a settled swap never changes again. Settlements
/// arriving before the offer of their swap are held pending and applied as
/// soon as the offer arrives.
#[derive(Clone, Debug, Default)]
pub struct SwapReconciler {
    open: HashMap<SwapId, SwapData>,
    settled: HashMap<SwapId, AtomicSwap>,
    pending: HashMap<SwapId, Settlement>,
    /// Known swaps in the order they were first resolved.
    order: Vec<SwapId>,
}

impl SwapReconciler {
    pub fn new() -> Self { Self::default() }

    /// Applies a single event, returning the new state of the swap if the
    /// event changed it.
    pub fn apply(&mut self, event: &SwapEvent) -> Option<AtomicSwap> {
        match event {
            SwapEvent::Offered(data) => self.offer(data),
            SwapEvent::Claimed { id, preimage } => {
                self.settle(id, Settlement::Claim(preimage.clone()))
            },
            SwapEvent::Aborted { id } => self.settle(id, Settlement::Abort),
        }
    }

    /// Applies the event, passing its chain position to the resulting state
    /// transition.
    pub fn apply_event(
        &mut self,
        event: &EventContext<SwapEvent>,
    ) -> Option<EventContext<AtomicSwap>> {
        self.apply(event.event()).map(|swap| event.pass(swap))
    }

    /// Applies a batch of events, returning the state transitions in the
    /// order they happened.
    pub fn apply_events<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a SwapEvent>,
    ) -> Vec<AtomicSwap> {
        events.into_iter().filter_map(|event| self.apply(event)).collect()
    }

    /// Applies the event if the filter selects it. An unselected offer drops
    /// the settlement held pending for its swap.
    pub fn apply_filtered(
        &mut self,
        filter: &mut EventFilter,
        event: &SwapEvent,
    ) -> Option<AtomicSwap> {
        if filter.accept(event) {
            return self.apply(event);
        }
        if let SwapEvent::Offered(data) = event
            && self.discard_pending(&data.id)
        {
            debug!(id = %data.id, "settlement of an unselected swap dropped");
            filter.forget(&data.id);
        }
        None
    }

    /// Drops the settlement held pending for the swap. Returns `false` if
    /// there was none.
    pub fn discard_pending(&mut self, id: &SwapId) -> bool { self.pending.remove(id).is_some() }

    fn offer(&mut self, data: &SwapData) -> Option<AtomicSwap> {
        if self.open.contains_key(&data.id) || self.settled.contains_key(&data.id) {
            debug!(id = %data.id, "duplicate offer ignored");
            return None;
        }
        self.order.push(data.id.clone());
        match self.pending.remove(&data.id) {
            Some(settlement) => {
                debug!(id = %data.id, "pending settlement resolved");
                let swap = settled_swap(data.clone(), settlement);
                self.settled.insert(data.id.clone(), swap.clone());
                Some(swap)
            },
            None => {
                self.open.insert(data.id.clone(), data.clone());
                Some(AtomicSwap::Open { data: data.clone() })
            },
        }
    }

    fn settle(&mut self, id: &SwapId, settlement: Settlement) -> Option<AtomicSwap> {
        if let Some(settled) = self.settled.get(id) {
            if settled.state() != settlement.state() {
                warn!(%id, state = %settled.state(), "conflicting settlement of a settled swap ignored");
            } else {
                debug!(%id, "duplicate settlement ignored");
            }
            return None;
        }
        if let Some(data) = self.open.remove(id) {
            let swap = settled_swap(data, settlement);
            self.settled.insert(id.clone(), swap.clone());
            return Some(swap);
        }
        match self.pending.get(id) {
            Some(pending) if *pending != settlement => {
                warn!(%id, "conflicting pending settlement ignored");
            },
            Some(_) => debug!(%id, "duplicate pending settlement ignored"),
            None => {
                debug!(%id, "settlement of unknown swap held pending");
                self.pending.insert(id.clone(), settlement);
            },
        }
        None
    }

    /// Fails with [`SwapError::DanglingSettlement`] if any settlement is still
    /// waiting for its offer.
    pub fn finish(&self) -> Result<(), SwapError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        Err(SwapError::DanglingSettlement(self.pending_ids()))
    }

    /// Swaps with a settlement waiting for the offer, sorted.
    pub fn pending_ids(&self) -> Vec<SwapId> {
        let mut ids: Vec<_> = self.pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether a settlement of the swap is waiting for the offer.
    pub fn is_pending(&self, id: &SwapId) -> bool { self.pending.contains_key(id) }

    /// Current state of the swap.
    pub fn get(&self, id: &SwapId) -> Option<AtomicSwap> {
        if let Some(data) = self.open.get(id) {
            return Some(AtomicSwap::Open { data: data.clone() });
        }
        self.settled.get(id).cloned()
    }

    /// Current state of every known swap, in the order the swaps were first
    /// resolved.
    pub fn swaps(&self) -> Vec<AtomicSwap> { self.order.iter().filter_map(|id| self.get(id)).collect() }

    /// Current state of every known swap keyed by ID.
    pub fn snapshot(&self) -> BTreeMap<SwapId, AtomicSwap> {
        self.order.iter().filter_map(|id| Some((id.clone(), self.get(id)?))).collect()
    }

    pub fn len(&self) -> usize { self.order.len() }

    pub fn is_empty(&self) -> bool { self.order.is_empty() }
}

impl Settlement {
    fn state(&self) -> SwapProcessState {
        match self {
            Settlement::Claim(_) => SwapProcessState::Claimed,
            Settlement::Abort => SwapProcessState::Aborted,
        }
    }
}

fn settled_swap(data: SwapData, settlement: Settlement) -> AtomicSwap {
    match settlement {
        Settlement::Claim(preimage) => AtomicSwap::Claimed { data, preimage },
        Settlement::Abort => AtomicSwap::Aborted { data },
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::U256;

    use super::*;
    use crate::types::{
        Address, Amount, Bech32Prefix, Hash, Preimage, SwapIdPrefix, SwapTimeout,
    };

    fn id(n: u8) -> SwapId { SwapId::new(SwapIdPrefix::Native, vec![n]).unwrap() }

    fn offer(n: u8) -> SwapEvent {
        SwapEvent::Offered(SwapData {
            id: id(n),
            sender: Address::bech32(Bech32Prefix::Test, [1; 20]),
            recipient: Address::bech32(Bech32Prefix::Test, [2; 20]),
            hash: Hash::of(&Preimage::new(vec![n])),
            amounts: vec![Amount::new(U256::from(100), 9, "IOV")],
            timeout: SwapTimeout::Timestamp(1_000),
            memo: None,
        })
    }

    fn claim(n: u8) -> SwapEvent { SwapEvent::Claimed { id: id(n), preimage: Preimage::new(vec![n]) } }

    fn abort(n: u8) -> SwapEvent { SwapEvent::Aborted { id: id(n) } }

    #[test]
    fn offer_then_claim() {
        let mut reconciler = SwapReconciler::new();
        assert!(matches!(reconciler.apply(&offer(1)), Some(AtomicSwap::Open { .. })));
        assert_eq!(reconciler.apply(&offer(1)), None);

        let claimed = reconciler.apply(&claim(1)).unwrap();
        assert_eq!(claimed.state(), SwapProcessState::Claimed);
        assert_eq!(claimed.preimage(), Some(&Preimage::new(vec![1])));

        assert_eq!(reconciler.apply(&claim(1)), None);
        assert_eq!(reconciler.apply(&abort(1)), None);
        assert_eq!(reconciler.get(&id(1)), Some(claimed));
        assert!(reconciler.finish().is_ok());
    }

    #[test]
    fn settlement_before_offer() {
        let mut reconciler = SwapReconciler::new();
        assert_eq!(reconciler.apply(&abort(3)), None);
        assert!(matches!(
            reconciler.finish(),
            Err(SwapError::DanglingSettlement(ids)) if ids == vec![id(3)]
        ));
        // conflicting settlement, the first one wins
        assert_eq!(reconciler.apply(&claim(3)), None);

        let swap = reconciler.apply(&offer(3)).unwrap();
        assert_eq!(swap.state(), SwapProcessState::Aborted);
        assert!(reconciler.finish().is_ok());
        assert_eq!(reconciler.swaps(), vec![swap]);
    }

    #[test]
    fn swaps_in_resolution_order() {
        let mut reconciler = SwapReconciler::new();
        let transitions =
            reconciler.apply_events(&[offer(5), offer(2), claim(5), offer(9), abort(2)]);
        assert_eq!(transitions.len(), 5);
        let ids: Vec<_> = reconciler.swaps().iter().map(|s| s.id().clone()).collect();
        assert_eq!(ids, vec![id(5), id(2), id(9)]);
        let states: Vec<_> = reconciler.swaps().iter().map(|s| s.state()).collect();
        assert_eq!(states, vec![
            SwapProcessState::Claimed,
            SwapProcessState::Aborted,
            SwapProcessState::Open
        ]);
        assert_eq!(reconciler.snapshot().len(), 3);
    }

    #[test]
    fn passes_event_context() {
        let mut reconciler = SwapReconciler::new();
        let event = EventContext::new(7, Default::default(), 2, 1, offer(1));
        let transition = reconciler.apply_event(&event).unwrap();
        assert_eq!(transition.position(), (7, 2, 1));
        assert!(reconciler.apply_event(&event).is_none());
    }

    #[test]
    fn unselected_offer_drops_pending_settlement() {
        let recipient = Address::bech32(Bech32Prefix::Test, [2; 20]);
        let mut filter = EventFilter::new(crate::query::SwapQuery::ByRecipient(recipient));
        let mut reconciler = SwapReconciler::new();

        let SwapEvent::Offered(mut other) = offer(4) else { unreachable!() };
        other.recipient = Address::bech32(Bech32Prefix::Test, [5; 20]);

        let opened = reconciler.apply_filtered(&mut filter, &offer(1));
        assert_eq!(opened.map(|s| s.state()), Some(SwapProcessState::Open));
        assert_eq!(reconciler.apply_filtered(&mut filter, &claim(4)), None);
        assert!(reconciler.is_pending(&id(4)));

        assert_eq!(reconciler.apply_filtered(&mut filter, &SwapEvent::Offered(other)), None);
        assert!(!reconciler.is_pending(&id(4)));
        assert_eq!(filter.num_rejected(), 0);
        assert!(reconciler.finish().is_ok());
        assert_eq!(reconciler.len(), 1);
    }
}
