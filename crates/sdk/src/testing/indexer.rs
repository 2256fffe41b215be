use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard},
};

use futures::{
    SinkExt, StreamExt,
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use tokio_util::sync::CancellationToken;

use crate::{
    connection::AtomicSwapConnection,
    error::SwapError,
    query::SwapQuery,
    source::EventSource,
    stream::SwapStream,
    types::{AtomicSwap, SwapId, SwapProcessState},
};

/// Drives a live view of swaps, keeping the latest state of every swap.
pub struct Indexer {
    swaps: SwapStream,
    snapshot: Arc<RwLock<BTreeMap<SwapId, AtomicSwap>>>,
    swaps_tx: UnboundedSender<AtomicSwap>,
}

/// Swaps indexed by an [`Indexer`].
pub struct IndexedSwaps {
    snapshot: Arc<RwLock<BTreeMap<SwapId, AtomicSwap>>>,
    swaps_rx: UnboundedReceiver<AtomicSwap>,
    cancel: CancellationToken,
}

impl Indexer {
    pub fn new<S: EventSource + 'static>(
        connection: &AtomicSwapConnection<S>,
        query: SwapQuery,
    ) -> Result<(Self, IndexedSwaps), SwapError> {
        let cancel = CancellationToken::new();
        let swaps = connection.watch_swaps_with(query, cancel.clone())?;
        let snapshot = Arc::new(RwLock::new(BTreeMap::new()));
        let (swaps_tx, swaps_rx) = mpsc::unbounded();
        Ok((
            Self { swaps, snapshot: snapshot.clone(), swaps_tx },
            IndexedSwaps { snapshot, swaps_rx, cancel },
        ))
    }

    /// Consumes the view until it ends, returning its terminal error.
    pub async fn run(mut self) -> Option<SwapError> {
        while let Some(swap) = self.swaps.next().await {
            let swap = match swap {
                Ok(swap) => swap,
                Err(err) => return Some(err),
            };
            self.snapshot
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(swap.id().clone(), swap.clone());
            if self.swaps_tx.send(swap).await.is_err() {
                break;
            }
        }
        None
    }
}

impl<'a> IndexedSwaps {
    /// Latest state of every swap seen so far
    pub fn snapshot(&'a self) -> RwLockReadGuard<'a, BTreeMap<SwapId, AtomicSwap>> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next swap state emitted by the view
    pub async fn next_swap(&mut self) -> Option<AtomicSwap> { self.swaps_rx.next().await }

    /// Waits for the swap reaching the state, skipping all other emissions
    pub async fn wait_for(&mut self, id: &SwapId, state: SwapProcessState) -> bool {
        while let Some(swap) = self.swaps_rx.next().await {
            if swap.id() == id && swap.state() == state {
                return true;
            }
        }
        false
    }

    /// Cancels the view, ending the indexer
    pub fn cancel(&self) { self.cancel.cancel(); }
}
