use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use alloy::primitives::{TxHash, U256};
use dashmap::DashMap;
use futures::{
    StreamExt,
    channel::mpsc::{self, UnboundedSender},
    stream,
};
use tracing::debug;

use crate::{
    connection::{ConnectionConfig, reconcile_events},
    error::SwapError,
    query::SwapQuery,
    source::{EventSource, Sleeper, SwapEventContext, SwapEventStream},
    types::{AtomicSwap, HeightRange, SwapEvent, SwapIdPrefix},
};

/// In-memory chain of native swaps serving as an [`EventSource`].
///
/// Events pushed to the chain are confirmed by [`MemoryChain::mine`], one
/// transaction per event, and delivered to the live subscriptions at once.
/// Like the log-indexed backend, searches return a superset of the selected
/// events: offers matching the query and every settlement the query may
/// select.
#[derive(Clone, derive_more::Debug)]
pub struct MemoryChain {
    #[debug(skip)]
    state: Arc<Mutex<ChainState>>,
    #[debug(skip)]
    subscribers: Arc<DashMap<u64, Subscriber>>,
    next_subscriber: Arc<AtomicU64>,
    requests: Arc<AtomicU64>,
    config: ConnectionConfig,
    sleeper: Sleeper,
}

#[derive(Default)]
struct ChainState {
    height: u64,
    history: Vec<SwapEventContext>,
    unconfirmed: Vec<SwapEvent>,
    failures: VecDeque<SwapError>,
}

struct Subscriber {
    query: SwapQuery,
    tx: UnboundedSender<Result<SwapEventContext, SwapError>>,
}

impl MemoryChain {
    pub fn new(sleeper: Sleeper) -> Self { Self::with_config(ConnectionConfig::default(), sleeper) }

    pub fn with_config(config: ConnectionConfig, sleeper: Sleeper) -> Self {
        Self {
            state: Default::default(),
            subscribers: Default::default(),
            next_subscriber: Default::default(),
            requests: Default::default(),
            config,
            sleeper,
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds the event to the next block.
    pub fn push(&self, event: SwapEvent) { self.state().unconfirmed.push(event); }

    /// Confirms the pushed events in a new block, returning its height.
    pub fn mine(&self) -> u64 {
        let mut state = self.state();
        state.height += 1;
        let height = state.height;
        let events: Vec<_> = std::mem::take(&mut state.unconfirmed)
            .into_iter()
            .enumerate()
            .map(|(index, event)| {
                let index = index as u64;
                SwapEventContext::new(height, tx_hash(height, index), index, 0, event)
            })
            .collect();
        debug!(height, events = events.len(), "mined block");

        self.subscribers.retain(|_, subscriber| !subscriber.tx.is_closed());
        for subscriber in self.subscribers.iter() {
            for event in events.iter().filter(|e| selects(&subscriber.query, e.event())) {
                _ = subscriber.tx.unbounded_send(Ok(event.clone()));
            }
        }
        state.history.extend(events);
        height
    }

    /// Pushes the events and confirms them in a new block.
    pub fn confirm(&self, events: impl IntoIterator<Item = SwapEvent>) -> u64 {
        self.state().unconfirmed.extend(events);
        self.mine()
    }

    pub fn height(&self) -> u64 { self.state().height }

    /// Confirmed events, in confirmation order.
    pub fn history(&self) -> Vec<SwapEventContext> { self.state().history.clone() }

    /// Fails the next request with the error. Queued failures are consumed in
    /// order, one per request.
    pub fn fail_next(&self, err: SwapError) { self.state().failures.push_back(err); }

    /// Ends every live subscription with the error.
    pub fn fail_subscriptions(&self, err: impl Fn() -> SwapError) {
        for subscriber in self.subscribers.iter() {
            _ = subscriber.tx.unbounded_send(Err(err()));
        }
        self.close();
    }

    /// Ends every live subscription.
    pub fn close(&self) {
        for subscriber in self.subscribers.iter() {
            subscriber.tx.close_channel();
        }
        self.subscribers.clear();
    }

    /// Number of live subscriptions.
    pub fn num_subscribers(&self) -> usize {
        self.subscribers.retain(|_, subscriber| !subscriber.tx.is_closed());
        self.subscribers.len()
    }

    /// Number of requests served so far, including failed ones.
    pub fn num_requests(&self) -> u64 { self.requests.load(Ordering::SeqCst) }

    fn request(&self) -> Result<MutexGuard<'_, ChainState>, SwapError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        match state.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

impl EventSource for MemoryChain {
    fn config(&self) -> &ConnectionConfig { &self.config }

    fn sleeper(&self) -> &Sleeper { &self.sleeper }

    fn validate(&self, query: &SwapQuery) -> Result<(), SwapError> {
        match query {
            SwapQuery::ById(id) if id.prefix() != SwapIdPrefix::Native => Err(
                SwapError::InvalidArgument(format!("{id} is not a swap of the memory chain")),
            ),
            SwapQuery::BySender(address) | SwapQuery::ByRecipient(address)
                if address.as_evm().is_some() =>
            {
                Err(SwapError::InvalidArgument(format!(
                    "{address} is not an address of the memory chain"
                )))
            },
            _ => Ok(()),
        }
    }

    async fn latest_height(&self) -> Result<u64, SwapError> { Ok(self.request()?.height) }

    async fn search(
        &self,
        query: &SwapQuery,
        range: HeightRange,
    ) -> Result<Vec<SwapEventContext>, SwapError> {
        self.validate(query)?;
        Ok(self
            .request()?
            .history
            .iter()
            .filter(|e| range.contains(e.height()) && selects(query, e.event()))
            .cloned()
            .collect())
    }

    async fn subscribe(&self, query: &SwapQuery, from: u64) -> Result<SwapEventStream, SwapError> {
        self.validate(query)?;
        let state = self.request()?;
        let replay: Vec<_> = state
            .history
            .iter()
            .filter(|e| e.height() >= from && selects(query, e.event()))
            .cloned()
            .map(Ok)
            .collect();
        let (tx, rx) = mpsc::unbounded();
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        // registered under the state lock so no block is missed or repeated
        self.subscribers.insert(id, Subscriber { query: query.clone(), tx });
        drop(state);
        Ok(stream::iter(replay).chain(rx).boxed())
    }

    /// Reads the swap state from the reconciled history; only queries by ID
    /// are supported.
    async fn swaps_from_state(&self, query: &SwapQuery) -> Result<Vec<AtomicSwap>, SwapError> {
        self.validate(query)?;
        let SwapQuery::ById(_) = query else {
            return Err(SwapError::UnsupportedQuery(format!(
                "state reads of the memory chain need a swap ID, got {query}"
            )));
        };
        let history = self.request()?.history.clone();
        let (reconciler, _) = reconcile_events(query, &history);
        Ok(reconciler.swaps())
    }
}

/// Candidate events of the query, the way a log scan of a swap contract
/// returns them: every event unless the query names the swap ID.
fn selects(query: &SwapQuery, event: &SwapEvent) -> bool { query.may_settle(event.swap_id()) }

fn tx_hash(height: u64, index: u64) -> TxHash { TxHash::from(U256::from((height << 32) | index)) }
