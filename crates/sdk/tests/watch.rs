use std::time::Duration;

use futures::StreamExt;
use swaptrack_sdk::{
    connection::AtomicSwapConnection,
    error::{SwapError, TransportError},
    query::SwapQuery,
    source::Sleeper,
    testing::{
        Indexer, MemoryChain,
        fixtures::{OfferBuilder, abort, address, claim, offer, swap_id},
    },
    types::{AtomicSwap, SwapProcessState},
};
use tokio_util::sync::CancellationToken;

fn chain() -> MemoryChain { MemoryChain::new(Sleeper::new(tokio::time::sleep)) }

fn state(swap: Option<Result<AtomicSwap, SwapError>>) -> (u64, SwapProcessState) {
    let swap = swap.expect("stream ended").expect("stream failed");
    let id = u64::from_be_bytes(swap.id().data().try_into().unwrap());
    (id, swap.state())
}

/// Known swaps first, in resolution order, then live transitions.
#[tokio::test]
async fn test_watch_swaps() {
    let chain = chain();
    chain.confirm([offer(1), offer(2)]);
    chain.confirm([claim(1)]);
    let connection = AtomicSwapConnection::new(chain.clone());
    let mut swaps = connection.watch_swaps(SwapQuery::ByRecipient(address(2))).unwrap();

    assert_eq!(state(swaps.next().await), (1, SwapProcessState::Claimed));
    assert_eq!(state(swaps.next().await), (2, SwapProcessState::Open));

    chain.confirm([abort(2), offer(3)]);
    assert_eq!(state(swaps.next().await), (2, SwapProcessState::Aborted));
    assert_eq!(state(swaps.next().await), (3, SwapProcessState::Open));

    // repeated settlements and offers to another recipient are not emitted
    chain.confirm([claim(1), abort(2), OfferBuilder::new(4).recipient(address(5)).event()]);
    chain.confirm([claim(4), claim(3)]);
    assert_eq!(state(swaps.next().await), (3, SwapProcessState::Claimed));
}

/// Live settlement of a swap offered later resolves to its final state.
#[tokio::test]
async fn test_watch_pending_settlement() {
    let chain = chain();
    let connection = AtomicSwapConnection::new(chain.clone());
    let mut swaps = connection.watch_swaps(SwapQuery::ById(swap_id(7))).unwrap();
    let next = tokio::spawn(async move { swaps.next().await });

    // wait for the subscription to be set up
    while chain.num_subscribers() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    chain.confirm([claim(7)]);
    chain.confirm([offer(7), offer(8)]);
    assert_eq!(state(next.await.unwrap()), (7, SwapProcessState::Claimed));
}

#[tokio::test]
async fn test_watch_cancel() {
    let chain = chain();
    chain.confirm([offer(1)]);
    let connection = AtomicSwapConnection::new(chain.clone());
    let cancel = CancellationToken::new();
    let mut swaps = connection
        .watch_swaps_with(SwapQuery::ByRecipient(address(2)), cancel.clone())
        .unwrap();

    assert_eq!(state(swaps.next().await), (1, SwapProcessState::Open));
    assert_eq!(chain.num_subscribers(), 1);
    cancel.cancel();
    chain.confirm([claim(1)]);
    assert!(swaps.next().await.is_none());

    // the subscription is released while the stream is still held
    assert_eq!(chain.num_subscribers(), 0);
    assert!(swaps.next().await.is_none());
}

/// Cancelling before the first item also cancels the initial search.
#[tokio::test]
async fn test_watch_cancel_before_setup() {
    let chain = chain();
    chain.confirm([offer(1)]);
    let connection = AtomicSwapConnection::new(chain.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut swaps =
        connection.watch_swaps_with(SwapQuery::ById(swap_id(1)), cancel).unwrap();
    assert!(swaps.next().await.is_none());
    assert_eq!(chain.num_subscribers(), 0);
}

#[tokio::test]
async fn test_watch_transport_error() {
    let chain = chain();
    chain.confirm([offer(1)]);
    let connection = AtomicSwapConnection::new(chain.clone());
    let mut swaps = connection.watch_swaps(SwapQuery::ById(swap_id(1))).unwrap();
    assert_eq!(state(swaps.next().await), (1, SwapProcessState::Open));

    chain.fail_subscriptions(|| {
        TransportError::Node { code: -32603, message: "internal error".to_string() }.into()
    });
    assert!(matches!(
        swaps.next().await,
        Some(Err(SwapError::Transport(TransportError::Node { code: -32603, .. })))
    ));
    assert!(swaps.next().await.is_none());
}

#[tokio::test]
async fn test_watch_closed_subscription() {
    let chain = chain();
    let connection = AtomicSwapConnection::new(chain.clone());
    let mut swaps = connection.watch_swaps(SwapQuery::ById(swap_id(1))).unwrap();
    let next = tokio::spawn(async move {
        let first = swaps.next().await;
        (first, swaps.next().await)
    });
    while chain.num_subscribers() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    chain.close();
    let (first, second) = next.await.unwrap();
    assert!(matches!(first, Some(Err(SwapError::Transport(TransportError::Closed)))));
    assert!(second.is_none());
}

#[tokio::test]
async fn test_watch_setup_error() {
    let chain = chain();
    chain.fail_next(TransportError::Closed.into());
    let connection = AtomicSwapConnection::new(chain);
    let mut swaps = connection.watch_swaps(SwapQuery::ById(swap_id(1))).unwrap();
    assert!(matches!(swaps.next().await, Some(Err(SwapError::Transport(TransportError::Closed)))));
    assert!(swaps.next().await.is_none());
}

/// Tests the live view driven by a background indexer.
#[tokio::test]
async fn test_indexer() {
    let chain = chain();
    chain.confirm([offer(1), offer(2), offer(3)]);
    let connection = AtomicSwapConnection::new(chain.clone());
    let (indexer, mut swaps) = Indexer::new(&connection, SwapQuery::BySender(address(1))).unwrap();
    let handle = tokio::spawn(indexer.run());

    assert!(swaps.wait_for(&swap_id(3), SwapProcessState::Open).await);
    assert_eq!(swaps.snapshot().len(), 3);

    chain.confirm([claim(2)]);
    chain.confirm([abort(3)]);
    assert!(swaps.wait_for(&swap_id(3), SwapProcessState::Aborted).await);
    {
        let snapshot = swaps.snapshot();
        assert_eq!(snapshot[&swap_id(1)].state(), SwapProcessState::Open);
        assert_eq!(snapshot[&swap_id(2)].state(), SwapProcessState::Claimed);
        assert_eq!(snapshot[&swap_id(3)].state(), SwapProcessState::Aborted);
    }

    swaps.cancel();
    assert!(handle.await.unwrap().is_none());
    assert!(swaps.next_swap().await.is_none());
}
