//! Event sources of the supported chain families.
//!
//! A source turns chain-specific lookups into decoded [`SwapEvent`]s in
//! confirmation order. Sources may return a superset of the events selected
//! by the query; narrowing is done with [`crate::query::EventFilter`].

pub mod evm;
pub mod tendermint;

use std::{collections::HashSet, pin::pin, sync::Arc, time::Duration};

use alloy::primitives::TxHash;
use futures::{
    FutureExt,
    future::{self, BoxFuture, Either},
    stream::BoxStream,
};

use crate::{
    connection::ConnectionConfig,
    error::{SwapError, TransportError},
    query::SwapQuery,
    types::{AtomicSwap, EventContext, HeightRange, SwapEvent},
};

pub type SwapEventContext = EventContext<SwapEvent>;

/// Live events of a subscription, in confirmation order.
pub type SwapEventStream = BoxStream<'static, Result<SwapEventContext, SwapError>>;

/// Confirmed swap events of one chain.
pub trait EventSource: Send + Sync {
    /// Timeouts, retries and polling settings of the source.
    fn config(&self) -> &ConnectionConfig;

    fn sleeper(&self) -> &Sleeper;

    /// Number of blocks below the head whose events may not be searchable
    /// yet. A live view subscribes that many blocks before the end of its
    /// history and drops the events delivered twice.
    fn index_lag(&self) -> u64 { 0 }

    /// Checks that the query is well-formed and can be served, without any
    /// network calls.
    fn validate(&self, query: &SwapQuery) -> Result<(), SwapError>;

    /// Height of the latest confirmed block.
    fn latest_height(&self) -> impl Future<Output = Result<u64, SwapError>> + Send;

    /// Confirmed events of the swaps selected by the query within the height
    /// range, in confirmation order.
    fn search(
        &self,
        query: &SwapQuery,
        range: HeightRange,
    ) -> impl Future<Output = Result<Vec<SwapEventContext>, SwapError>> + Send;

    /// Live events of the swaps selected by the query, confirmed at `from`
    /// height or later.
    ///
    /// Every confirmation is delivered once. Transport failures are retried
    /// inside the stream; the stream ends with an error when retries are
    /// exhausted, and does not end otherwise.
    fn subscribe(
        &self,
        query: &SwapQuery,
        from: u64,
    ) -> impl Future<Output = Result<SwapEventStream, SwapError>> + Send;

    /// Current state of the selected swaps read from the chain state, without
    /// replaying history.
    fn swaps_from_state(
        &self,
        query: &SwapQuery,
    ) -> impl Future<Output = Result<Vec<AtomicSwap>, SwapError>> + Send;
}

/// Async sleep primitive of the caller's runtime, e.g. `tokio::time::sleep`.
#[derive(Clone, derive_more::Debug)]
#[debug("Sleeper")]
pub struct Sleeper(Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>);

impl Sleeper {
    pub fn new<F, Fut>(sleep: F) -> Self
    where
        F: Fn(Duration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move |duration| sleep(duration).boxed()))
    }

    pub fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> { (self.0)(duration) }

    /// Fails the operation with [`TransportError::Timeout`] if it does not
    /// complete within the duration.
    pub async fn timeout<T>(
        &self,
        duration: Duration,
        operation: impl Future<Output = Result<T, SwapError>>,
    ) -> Result<T, SwapError> {
        match future::select(pin!(operation), self.sleep(duration)).await {
            Either::Left((result, _)) => result,
            Either::Right(_) => Err(TransportError::Timeout(duration).into()),
        }
    }
}

/// Retry schedule for live polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry, starting from 0.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Tracks retries of a failing polling step.
#[derive(Debug)]
pub(crate) struct Retries {
    policy: RetryPolicy,
    attempt: u32,
}

impl Retries {
    pub(crate) fn new(policy: RetryPolicy) -> Self { Self { policy, attempt: 0 } }

    /// Delay before the next attempt if the error can be retried, `None` if
    /// the error is permanent or the retries are exhausted.
    pub(crate) fn next_delay(&mut self, err: &SwapError) -> Option<Duration> {
        if !err.is_retryable() || self.attempt >= self.policy.max_retries {
            return None;
        }
        let delay = self.policy.backoff(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    pub(crate) fn reset(&mut self) { self.attempt = 0; }
}

/// Drops events delivered more than once, e.g. after a polling step was
/// repeated.
#[derive(Debug, Default)]
pub(crate) struct Deduplicator {
    seen: HashSet<(u64, TxHash, u64)>,
}

impl Deduplicator {
    /// Returns `true` the first time the event position is seen.
    pub(crate) fn first_seen(&mut self, event: &SwapEventContext) -> bool {
        self.seen.insert((event.height(), event.tx_hash(), event.log_index()))
    }

    /// Forgets the events below the height, which can not be delivered again.
    pub(crate) fn prune_below(&mut self, height: u64) {
        self.seen.retain(|(h, _, _)| *h >= height);
    }
}

/// Sorts events into confirmation order.
pub(crate) fn sort_events(events: &mut [SwapEventContext]) { events.sort_by_key(|e| e.position()); }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SwapId, SwapIdPrefix};

    #[test]
    fn backoff_doubles_up_to_max() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(4), Duration::from_secs(4));
        assert_eq!(policy.backoff(5), Duration::from_secs(8));
        assert_eq!(policy.backoff(40), Duration::from_secs(8));
    }

    #[test]
    fn retries_exhaust() {
        let mut retries =
            Retries::new(RetryPolicy { max_retries: 2, ..RetryPolicy::default() });
        let err = SwapError::from(TransportError::Closed);
        assert!(retries.next_delay(&err).is_some());
        assert!(retries.next_delay(&err).is_some());
        assert!(retries.next_delay(&err).is_none());
        retries.reset();
        assert!(retries.next_delay(&err).is_some());
        assert!(retries.next_delay(&SwapError::InvalidArgument("x".to_string())).is_none());
    }

    #[test]
    fn deduplicates_by_position() {
        let id = SwapId::new(SwapIdPrefix::Native, vec![1]).unwrap();
        let event = EventContext::new(3, TxHash::ZERO, 0, 0, SwapEvent::Aborted { id });
        let mut dedup = Deduplicator::default();
        assert!(dedup.first_seen(&event));
        assert!(!dedup.first_seen(&event));
        dedup.prune_below(4);
        assert!(dedup.first_seen(&event));
    }

    #[tokio::test]
    async fn timeout_fires() {
        let sleeper = Sleeper::new(tokio::time::sleep);
        let result = sleeper
            .timeout(Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(SwapError::Transport(TransportError::Timeout(d))) if d == Duration::from_millis(10)
        ));
        assert_eq!(sleeper.timeout(Duration::from_secs(1), async { Ok(7) }).await.unwrap(), 7);
    }
}
