//! Facade over an [`EventSource`] answering swap queries.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::SwapError,
    query::{EventFilter, SwapQuery},
    source::{EventSource, RetryPolicy, SwapEventContext},
    state::SwapReconciler,
    stream::{self, SwapStream},
    types::{AtomicSwap, HeightRange},
};

/// Timeouts, retries and polling settings of a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Timeout of a single RPC request.
    pub request_timeout: Duration,
    /// Retries of failed live polling steps.
    pub retry: RetryPolicy,
    /// Number of times a historical pass is repeated while it ends with
    /// settlements of unseen swaps.
    pub dangling_retries: u32,
    pub dangling_retry_delay: Duration,
    /// Delay between live polls when no new block is available.
    pub poll_interval: Duration,
    /// Page size of tag-indexed transaction searches.
    pub page_size: u32,
    /// Maximum number of blocks per log request.
    pub log_block_range: u64,
    /// Recent blocks a tag-indexed poll searches again. The node indexes the
    /// transactions of a block after reporting it as the head.
    pub index_lag: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            dangling_retries: 1,
            dangling_retry_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(4),
            page_size: 100,
            log_block_range: 5_000,
            index_lag: 2,
        }
    }
}

/// Swap tracking connection to one chain.
///
/// Every call rederives the state of swaps from the chain; no state is shared
/// between calls or between watches.
#[derive(derive_more::Debug)]
pub struct AtomicSwapConnection<S> {
    #[debug(skip)]
    source: Arc<S>,
}

impl<S> Clone for AtomicSwapConnection<S> {
    fn clone(&self) -> Self { Self { source: self.source.clone() } }
}

impl<S: EventSource + 'static> AtomicSwapConnection<S> {
    pub fn new(source: S) -> Self { Self { source: Arc::new(source) } }

    pub fn source(&self) -> &S { &self.source }

    pub fn config(&self) -> &ConnectionConfig { self.source.config() }

    /// Current state of the swaps selected by the query, reconciled from the
    /// full swap history.
    ///
    /// Fails with [`SwapError::DanglingSettlement`] if settlements with no
    /// matching offer remain after the configured retries.
    pub async fn get_swaps(&self, query: &SwapQuery) -> Result<Vec<AtomicSwap>, SwapError> {
        self.get_swaps_in_range(query, HeightRange::full()).await
    }

    /// Same as [`Self::get_swaps`], limited to the events within the height
    /// range. The range must include the offers of the swaps settled within it.
    pub async fn get_swaps_in_range(
        &self,
        query: &SwapQuery,
        range: HeightRange,
    ) -> Result<Vec<AtomicSwap>, SwapError> {
        self.source.validate(query)?;
        let config = self.source.config();
        let mut attempt = 0;
        loop {
            let events = self.source.search(query, range).await?;
            let (reconciler, _) = reconcile_events(query, &events);
            match reconciler.finish() {
                Ok(()) => {
                    debug!(%query, events = events.len(), swaps = reconciler.len(), "reconciled swaps");
                    return Ok(reconciler.swaps());
                },
                Err(SwapError::DanglingSettlement(ids)) if attempt < config.dangling_retries => {
                    attempt += 1;
                    warn!(%query, ?ids, attempt, "settlements without offers, repeating search");
                    self.source.sleeper().sleep(config.dangling_retry_delay).await;
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Current state of the selected swaps read from the chain state, without
    /// replaying history.
    ///
    /// Only supported where the chain offers such a read, see
    /// [`crate::query::evm_state_read`] and
    /// [`crate::query::tendermint_state_query`].
    pub async fn get_swaps_from_state(
        &self,
        query: &SwapQuery,
    ) -> Result<Vec<AtomicSwap>, SwapError> {
        self.source.validate(query)?;
        self.source.swaps_from_state(query).await
    }

    /// Watches the swaps selected by the query: the state of every known swap
    /// first, then every state transition confirmed later.
    ///
    /// The stream ends only on an unrecoverable error, which is delivered as
    /// its last item.
    pub fn watch_swaps(&self, query: SwapQuery) -> Result<SwapStream, SwapError> {
        self.watch_swaps_with(query, CancellationToken::new())
    }

    /// Same as [`Self::watch_swaps`], ending the stream without further items
    /// once the token is cancelled.
    pub fn watch_swaps_with(
        &self,
        query: SwapQuery,
        cancel: CancellationToken,
    ) -> Result<SwapStream, SwapError> {
        stream::watch(self.source.clone(), query, cancel)
    }
}

/// Folds historical events through a fresh filter and reconciler.
pub(crate) fn reconcile_events(
    query: &SwapQuery,
    events: &[SwapEventContext],
) -> (SwapReconciler, EventFilter) {
    let mut filter = EventFilter::new(query.clone());
    let mut reconciler = SwapReconciler::new();
    for event in events {
        reconciler.apply_filtered(&mut filter, event.event());
    }
    (reconciler, filter)
}
