use std::sync::Arc;

use futures::{
    FutureExt, Stream, StreamExt,
    future::{self, Either},
    stream::{self, BoxStream},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    connection::reconcile_events,
    error::{SwapError, TransportError},
    query::{EventFilter, SwapQuery},
    source::{Deduplicator, EventSource, SwapEventStream},
    state::SwapReconciler,
    types::{AtomicSwap, HeightRange},
};

/// Swap states of a live view.
pub type SwapStream = BoxStream<'static, Result<AtomicSwap, SwapError>>;

/// Returns a live view of the swaps selected by the query.
///
/// The view searches the history up to the current head while subscribing to
/// the events confirmed after it, so no confirmation falls between the two.
/// It emits the state of every swap known from the history in the order the
/// swaps were resolved, then the new state of a swap for every later event
/// changing it. Both parts are folded through one reconciler, so for every
/// swap its `Open` state precedes its terminal state.
///
/// The stream ends after its first error, or without further items once the
/// token is cancelled, which also cancels the initial search if it is still
/// in flight. An initial search ending with settlements of unseen swaps is
/// repeated per [`crate::connection::ConnectionConfig::dangling_retries`],
/// then the stream ends with [`SwapError::DanglingSettlement`].
///
/// Invalid queries fail before any network call.
pub fn watch<S>(
    source: Arc<S>,
    query: SwapQuery,
    cancel: CancellationToken,
) -> Result<SwapStream, SwapError>
where
    S: EventSource + 'static,
{
    source.validate(&query)?;
    let stream = stream::once(initial_view(source, query))
        .flat_map(|result| match result {
            Ok((burst, view)) => {
                stream::iter(burst.into_iter().map(Ok)).chain(view.into_stream()).left_stream()
            },
            Err(err) => stream::iter([Err(err)]).right_stream(),
        })
        .boxed();
    let stream = until_cancelled(stream, cancel).fuse().scan(false, |failed, item| {
        if *failed {
            return future::ready(None);
        }
        *failed = item.is_err();
        future::ready(Some(item))
    });
    Ok(stream.boxed())
}

/// Ends the stream once the token is cancelled, dropping it together with
/// its subscription.
fn until_cancelled(
    stream: SwapStream,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<AtomicSwap, SwapError>> + Send + 'static {
    let cancelled = cancel.cancelled_owned().boxed();
    stream::unfold((stream, cancelled), |(mut stream, mut cancelled)| async move {
        let item = match future::select(&mut cancelled, stream.next()).await {
            Either::Left(_) => None,
            Either::Right((item, _)) => item,
        };
        item.map(|item| (item, (stream, cancelled)))
    })
}

/// Reconciled history and the subscription continuing it.
struct LiveView {
    query: SwapQuery,
    filter: EventFilter,
    reconciler: SwapReconciler,
    events: SwapEventStream,
    /// Last height covered by the history.
    head: u64,
    /// History events the subscription may deliver again.
    replayed: Deduplicator,
}

async fn initial_view<S: EventSource>(
    source: Arc<S>,
    query: SwapQuery,
) -> Result<(Vec<AtomicSwap>, LiveView), SwapError> {
    let config = source.config();
    let mut attempt = 0;
    loop {
        let height = source.latest_height().await?;
        let live_from = (height + 1).saturating_sub(source.index_lag());
        let (history, events) = futures::try_join!(
            source.search(&query, HeightRange::new(None, Some(height))),
            source.subscribe(&query, live_from)
        )?;
        let (reconciler, filter) = reconcile_events(&query, &history);
        match reconciler.finish() {
            Ok(()) => {
                let burst = reconciler.swaps();
                info!(%query, height, swaps = burst.len(), "initial swaps loaded, watching live");
                let mut replayed = Deduplicator::default();
                for event in history.iter().filter(|event| event.height() >= live_from) {
                    replayed.first_seen(event);
                }
                let view = LiveView { query, filter, reconciler, events, head: height, replayed };
                return Ok((burst, view));
            },
            Err(SwapError::DanglingSettlement(ids)) if attempt < config.dangling_retries => {
                attempt += 1;
                warn!(%query, ?ids, attempt, "settlements without offers, repeating initial search");
                drop(events);
                source.sleeper().sleep(config.dangling_retry_delay).await;
            },
            Err(err) => return Err(err),
        }
    }
}

impl LiveView {
    fn into_stream(self) -> impl Stream<Item = Result<AtomicSwap, SwapError>> + Send + 'static {
        let LiveView { query, mut filter, mut reconciler, events, head, mut replayed } = self;
        events
            .filter_map(move |item| {
                let update = match item {
                    Ok(event) if event.height() <= head && !replayed.first_seen(&event) => None,
                    Ok(event) => {
                        let event = event.event();
                        let id = event.swap_id();
                        let was_pending = reconciler.is_pending(id);
                        let update = reconciler.apply_filtered(&mut filter, event);
                        if !was_pending && reconciler.is_pending(id) {
                            warn!(%query, %id, "live settlement of an unseen swap held pending");
                        }
                        if let Some(swap) = &update {
                            debug!(%id, state = %swap.state(), "swap state changed");
                        }
                        update.map(Ok)
                    },
                    Err(err) => Some(Err(err)),
                };
                future::ready(update)
            })
            .chain(stream::once(future::ready(Err(TransportError::Closed.into()))))
    }
}
