use std::collections::VecDeque;

use alloy::{hex, primitives::TxHash, rpc::client::RpcClient};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use futures::{StreamExt, stream};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use super::{
    Deduplicator, EventSource, Retries, Sleeper, SwapEventContext, SwapEventStream, sort_events,
};
use crate::{
    TendermintChain,
    connection::ConnectionConfig,
    error::{SwapError, TransportError},
    query::{self, QueryTag, SwapQuery},
    types::{
        Address, Amount, AtomicSwap, EventContext, Hash, HeightRange, Preimage, SwapData,
        SwapEvent, SwapId, SwapIdPrefix, SwapTimeout,
    },
};

/// Transaction found by `tx_search`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxResponse {
    pub hash: TxHash,
    pub height: u64,
    pub index: u64,
    pub tx: Vec<u8>,
    pub result: TxResult,
}

/// Result of transaction execution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxResult {
    /// Zero for successful transactions.
    pub code: u32,
    pub data: Vec<u8>,
    pub log: String,
}

/// One page of `tx_search` results.
#[derive(Clone, Debug, Default)]
pub struct TxSearchPage {
    pub txs: Vec<TxResponse>,
    pub total_count: u64,
}

/// Application state entry returned by `abci_query`.
#[derive(Clone, Debug, Default)]
pub struct AbciQueryResponse {
    pub code: u32,
    pub log: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Tendermint RPC calls used by [`TendermintSource`].
pub trait TendermintRpc: Send + Sync {
    /// Page (starting from 1) of transactions matching the query, in
    /// ascending height order.
    fn tx_search(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> impl Future<Output = Result<TxSearchPage, SwapError>> + Send;

    /// Height of the latest committed block.
    fn latest_height(&self) -> impl Future<Output = Result<u64, SwapError>> + Send;

    fn abci_query(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl Future<Output = Result<AbciQueryResponse, SwapError>> + Send;
}

/// Swap offer transaction, without the swap ID which is allocated by the
/// chain and returned in the transaction result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapOffer {
    pub sender: Address,
    pub recipient: Address,
    pub hash: Hash,
    pub amounts: Vec<Amount>,
    pub timeout: SwapTimeout,
    pub memo: Option<String>,
}

/// Transaction decoded by a [`TxCodec`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedTx {
    SwapOffer(SwapOffer),
    SwapClaim { swap_id: Vec<u8>, preimage: Preimage },
    SwapAbort { swap_id: Vec<u8> },
    /// Any transaction not related to swaps.
    Other,
}

/// Native transaction codec of the tag-indexed chain.
pub trait TxCodec: Send + Sync {
    fn decode_transaction(&self, tx: &[u8]) -> Result<DecodedTx, SwapError>;

    /// Decodes the swaps stored in the application state, as returned by
    /// `abci_query` on the swap bucket.
    fn decode_swap_states(&self, key: &[u8], value: &[u8]) -> Result<Vec<SwapData>, SwapError>;
}

/// Event source of a tag-indexed chain.
#[derive(Clone, derive_more::Debug)]
pub struct TendermintSource<R, C> {
    chain: TendermintChain,
    #[debug(skip)]
    rpc: R,
    #[debug(skip)]
    codec: C,
    config: ConnectionConfig,
    sleeper: Sleeper,
}

impl<R, C> TendermintSource<R, C>
where
    R: TendermintRpc + Clone + 'static,
    C: TxCodec + Clone + 'static,
{
    pub fn new(
        chain: TendermintChain,
        rpc: R,
        codec: C,
        config: ConnectionConfig,
        sleeper: Sleeper,
    ) -> Self {
        Self { chain, rpc, codec, config, sleeper }
    }

    pub fn chain(&self) -> &TendermintChain { &self.chain }

    /// All transactions matching the tag within the height range.
    async fn search_tag(
        &self,
        tag: &QueryTag,
        range: HeightRange,
    ) -> Result<Vec<TxResponse>, SwapError> {
        let query = query::tx_search_query(tag, range);
        let per_page = self.config.page_size.max(1);
        let mut txs = Vec::new();
        let mut page_num = 1;
        loop {
            let page = self
                .sleeper
                .timeout(
                    self.config.request_timeout,
                    self.rpc.tx_search(&query, page_num, per_page),
                )
                .await?;
            debug!(
                %query,
                page_num,
                txs = page.txs.len(),
                total = page.total_count,
                "searched txs"
            );
            let empty = page.txs.is_empty();
            txs.extend(page.txs);
            if empty || txs.len() as u64 >= page.total_count {
                return Ok(txs);
            }
            page_num += 1;
        }
    }

    /// Swap events of the transactions matching either of the tags.
    async fn search_events(
        &self,
        tags: &[QueryTag; 2],
        range: HeightRange,
        dedup: &mut Deduplicator,
    ) -> Result<Vec<SwapEventContext>, SwapError> {
        let (set, delete) = futures::try_join!(
            self.search_tag(&tags[0], range),
            self.search_tag(&tags[1], range)
        )?;
        let mut events = Vec::new();
        for tx in set.iter().chain(delete.iter()) {
            if let Some(event) = self.decode_event(tx)?
                && dedup.first_seen(&event)
            {
                events.push(event);
            }
        }
        sort_events(&mut events);
        Ok(events)
    }

    /// Swap event of the transaction, `None` for failed or unrelated
    /// transactions.
    fn decode_event(&self, tx: &TxResponse) -> Result<Option<SwapEventContext>, SwapError> {
        if tx.result.code != 0 {
            return Ok(None);
        }
        let native_id = |data: Vec<u8>| {
            SwapId::new(SwapIdPrefix::Native, data)
                .map_err(|_| SwapError::Decode(format!("swap tx {} without swap id", tx.hash)))
        };
        let event = match self.codec.decode_transaction(&tx.tx)? {
            DecodedTx::SwapOffer(offer) => {
                let id = native_id(tx.result.data.clone())?;
                SwapEvent::Offered(SwapData {
                    timeout: timestamp_timeout(&id, offer.timeout)?,
                    id,
                    sender: offer.sender,
                    recipient: offer.recipient,
                    hash: offer.hash,
                    amounts: offer.amounts,
                    memo: offer.memo,
                })
            },
            DecodedTx::SwapClaim { swap_id, preimage } => {
                SwapEvent::Claimed { id: native_id(swap_id)?, preimage }
            },
            DecodedTx::SwapAbort { swap_id } => SwapEvent::Aborted { id: native_id(swap_id)? },
            DecodedTx::Other => return Ok(None),
        };
        Ok(Some(EventContext::new(tx.height, tx.hash, tx.index, 0, event)))
    }
}

impl<R, C> EventSource for TendermintSource<R, C>
where
    R: TendermintRpc + Clone + 'static,
    C: TxCodec + Clone + 'static,
{
    fn config(&self) -> &ConnectionConfig { &self.config }

    fn sleeper(&self) -> &Sleeper { &self.sleeper }

    fn index_lag(&self) -> u64 { self.config.index_lag }

    fn validate(&self, query: &SwapQuery) -> Result<(), SwapError> {
        query::tendermint_tags(query, &self.chain).map(|_| ())
    }

    async fn latest_height(&self) -> Result<u64, SwapError> {
        self.sleeper.timeout(self.config.request_timeout, self.rpc.latest_height()).await
    }

    async fn search(
        &self,
        query: &SwapQuery,
        range: HeightRange,
    ) -> Result<Vec<SwapEventContext>, SwapError> {
        let tags = query::tendermint_tags(query, &self.chain)?;
        self.search_events(&tags, range, &mut Deduplicator::default()).await
    }

    async fn subscribe(&self, query: &SwapQuery, from: u64) -> Result<SwapEventStream, SwapError> {
        let tags = query::tendermint_tags(query, &self.chain)?;
        let state = PollState {
            source: self.clone(),
            tags,
            from,
            next_height: from,
            dedup: Deduplicator::default(),
            buffer: VecDeque::new(),
            retries: Retries::new(self.config.retry),
            done: false,
        };
        Ok(stream::unfold(state, |mut state| async move {
            loop {
                if state.done {
                    return None;
                }
                if let Some(event) = state.buffer.pop_front() {
                    return Some((Ok(event), state));
                }
                match state.poll().await {
                    Ok(true) => state.retries.reset(),
                    Ok(false) => {
                        state.source.sleeper.sleep(state.source.config.poll_interval).await;
                    },
                    Err(err) => match state.retries.next_delay(&err) {
                        Some(delay) => {
                            warn!(
                                next_height = state.next_height,
                                ?delay,
                                "tx polling failed, retrying: {err}"
                            );
                            state.source.sleeper.sleep(delay).await;
                        },
                        None => {
                            state.done = true;
                            return Some((Err(err), state));
                        },
                    },
                }
            }
        })
        .boxed())
    }

    async fn swaps_from_state(&self, query: &SwapQuery) -> Result<Vec<AtomicSwap>, SwapError> {
        let (path, data) = query::tendermint_state_query(query, &self.chain)?;
        let response = self
            .sleeper
            .timeout(self.config.request_timeout, self.rpc.abci_query(path, &data))
            .await?;
        debug!(path, data = hex::encode(&data), code = response.code, "queried swap state");
        if response.code != 0 {
            return Err(TransportError::Node {
                code: response.code as i64,
                message: response.log,
            }
            .into());
        }
        if response.value.is_empty() {
            return Ok(vec![]);
        }
        self.codec
            .decode_swap_states(&response.key, &response.value)?
            .into_iter()
            .filter(|data| query.matches(data))
            .map(|data| {
                timestamp_timeout(&data.id, data.timeout)?;
                Ok(AtomicSwap::Open { data })
            })
            .collect()
    }
}

struct PollState<R, C> {
    source: TendermintSource<R, C>,
    tags: [QueryTag; 2],
    /// First height of the subscription.
    from: u64,
    next_height: u64,
    dedup: Deduplicator,
    buffer: VecDeque<SwapEventContext>,
    retries: Retries,
    done: bool,
}

impl<R, C> PollState<R, C>
where
    R: TendermintRpc + Clone + 'static,
    C: TxCodec + Clone + 'static,
{
    /// Fetches the events of the blocks committed since the last poll,
    /// searching the last `index_lag` polled blocks again for transactions
    /// indexed late. Returns `false` if there are no new blocks.
    async fn poll(&mut self) -> Result<bool, SwapError> {
        let head = self.source.latest_height().await?;
        if head < self.next_height {
            return Ok(false);
        }
        let from = self.window_start();
        let range = HeightRange::new(Some(from), Some(head));
        let events = self.source.search_events(&self.tags, range, &mut self.dedup).await?;
        debug!(from, to = head, events = events.len(), "polled txs");
        self.buffer.extend(events);
        self.next_height = head + 1;
        self.dedup.prune_below(self.window_start());
        Ok(true)
    }

    fn window_start(&self) -> u64 {
        self.next_height.saturating_sub(self.source.config.index_lag).max(self.from)
    }
}

/// [`TendermintRpc`] over the node's JSON-RPC endpoint.
#[derive(Clone, derive_more::Debug)]
pub struct HttpTendermintRpc {
    #[debug(skip)]
    client: RpcClient,
}

impl HttpTendermintRpc {
    pub fn new(client: RpcClient) -> Self { Self { client } }
}

impl TendermintRpc for HttpTendermintRpc {
    async fn tx_search(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<TxSearchPage, SwapError> {
        let params = serde_json::json!({
            "query": query,
            "prove": false,
            "page": page.to_string(),
            "per_page": per_page.to_string(),
            "order_by": "asc",
        });
        let response: RpcTxSearch = self.client.request("tx_search", params).await?;
        response.try_into()
    }

    async fn latest_height(&self) -> Result<u64, SwapError> {
        let status: RpcStatus =
            self.client.request("status", serde_json::json!({})).await?;
        Ok(status.sync_info.latest_block_height)
    }

    async fn abci_query(&self, path: &str, data: &[u8]) -> Result<AbciQueryResponse, SwapError> {
        let params = serde_json::json!({
            "path": path,
            "data": hex::encode(data),
            "prove": false,
        });
        let response: RpcAbciQuery = self.client.request("abci_query", params).await?;
        let response = response.response;
        Ok(AbciQueryResponse {
            code: response.code,
            log: response.log,
            key: decode_base64(response.key.as_deref())?,
            value: decode_base64(response.value.as_deref())?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcTxSearch {
    txs: Vec<RpcTx>,
    #[serde(deserialize_with = "string_u64")]
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct RpcTx {
    hash: String,
    #[serde(deserialize_with = "string_u64")]
    height: u64,
    #[serde(default)]
    index: u64,
    tx: String,
    tx_result: RpcTxResult,
}

#[derive(Debug, Deserialize)]
struct RpcTxResult {
    #[serde(default)]
    code: u32,
    data: Option<String>,
    #[serde(default)]
    log: String,
}

#[derive(Debug, Deserialize)]
struct RpcStatus {
    sync_info: RpcSyncInfo,
}

#[derive(Debug, Deserialize)]
struct RpcSyncInfo {
    #[serde(deserialize_with = "string_u64")]
    latest_block_height: u64,
}

#[derive(Debug, Deserialize)]
struct RpcAbciQuery {
    response: RpcAbciResponse,
}

#[derive(Debug, Deserialize)]
struct RpcAbciResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
    key: Option<String>,
    value: Option<String>,
}

impl TryFrom<RpcTxSearch> for TxSearchPage {
    type Error = SwapError;

    fn try_from(value: RpcTxSearch) -> Result<Self, Self::Error> {
        let txs = value
            .txs
            .into_iter()
            .map(|tx| {
                let hash = tx
                    .hash
                    .parse::<TxHash>()
                    .map_err(|err| SwapError::Decode(format!("invalid tx hash {}: {err}", tx.hash)))?;
                Ok(TxResponse {
                    hash,
                    height: tx.height,
                    index: tx.index,
                    tx: decode_base64(Some(&tx.tx))?,
                    result: TxResult {
                        code: tx.tx_result.code,
                        data: decode_base64(tx.tx_result.data.as_deref())?,
                        log: tx.tx_result.log,
                    },
                })
            })
            .collect::<Result<_, SwapError>>()?;
        Ok(TxSearchPage { txs, total_count: value.total_count })
    }
}

/// Tag-indexed chains express swap timeouts as UNIX timestamps.
fn timestamp_timeout(id: &SwapId, timeout: SwapTimeout) -> Result<SwapTimeout, SwapError> {
    match timeout {
        SwapTimeout::Timestamp(_) => Ok(timeout),
        SwapTimeout::Height(height) => Err(SwapError::Decode(format!(
            "swap {id} has a block height timeout #{height}, expected a timestamp"
        ))),
    }
}

fn decode_base64(value: Option<&str>) -> Result<Vec<u8>, SwapError> {
    match value {
        None | Some("") => Ok(vec![]),
        Some(value) => {
            BASE64.decode(value).map_err(|err| SwapError::Decode(format!("invalid base64: {err}")))
        },
    }
}

/// Tendermint encodes 64-bit integers as JSON strings.
fn string_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(u64),
    }
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use alloy::primitives::U256;

    use super::*;
    use crate::{
        connection::AtomicSwapConnection,
        source::RetryPolicy,
        types::{Bech32Prefix, SwapProcessState},
    };

    /// Transactions are encoded as `kind || swap id`, with offers carrying
    /// the recipient byte and the result carrying the allocated ID.
    #[derive(Clone)]
    struct TestCodec;

    impl TxCodec for TestCodec {
        fn decode_transaction(&self, tx: &[u8]) -> Result<DecodedTx, SwapError> {
            match tx {
                [b'o', recipient] => Ok(DecodedTx::SwapOffer(SwapOffer {
                    sender: Address::bech32(Bech32Prefix::Test, [0; 20]),
                    recipient: Address::bech32(Bech32Prefix::Test, [*recipient; 20]),
                    hash: Hash::default(),
                    amounts: vec![Amount::new(U256::from(100), 9, "IOV")],
                    timeout: SwapTimeout::Timestamp(1_000),
                    memo: None,
                })),
                [b'h', recipient] => Ok(DecodedTx::SwapOffer(SwapOffer {
                    sender: Address::bech32(Bech32Prefix::Test, [0; 20]),
                    recipient: Address::bech32(Bech32Prefix::Test, [*recipient; 20]),
                    hash: Hash::default(),
                    amounts: vec![],
                    timeout: SwapTimeout::Height(10),
                    memo: None,
                })),
                [b'c', id @ ..] => Ok(DecodedTx::SwapClaim {
                    swap_id: id.to_vec(),
                    preimage: Preimage::new(vec![1]),
                }),
                [b'a', id @ ..] => Ok(DecodedTx::SwapAbort { swap_id: id.to_vec() }),
                [b'x', ..] => Ok(DecodedTx::Other),
                _ => Err(SwapError::Decode("unknown tx".to_string())),
            }
        }

        fn decode_swap_states(&self, _: &[u8], value: &[u8]) -> Result<Vec<SwapData>, SwapError> {
            Ok(value
                .iter()
                .map(|id| SwapData {
                    id: SwapId::new(SwapIdPrefix::Native, vec![*id]).unwrap(),
                    sender: Address::bech32(Bech32Prefix::Test, [0; 20]),
                    recipient: Address::bech32(Bech32Prefix::Test, [*id; 20]),
                    hash: Hash::default(),
                    amounts: vec![],
                    timeout: SwapTimeout::Timestamp(0),
                    memo: None,
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct Node {
        head: u64,
        /// Transactions indexed under the set and delete tags.
        set: Vec<TxResponse>,
        delete: Vec<TxResponse>,
        failures: u32,
        searches: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct TestRpc(Arc<Mutex<Node>>);

    impl TendermintRpc for TestRpc {
        async fn tx_search(
            &self,
            query: &str,
            page: u32,
            per_page: u32,
        ) -> Result<TxSearchPage, SwapError> {
            let mut node = self.0.lock().unwrap();
            node.searches.push(query.to_string());
            let (min, max) = heights(query);
            let txs: Vec<_> = if query.contains("='s'") { &node.set } else { &node.delete }
                .iter()
                .filter(|tx| tx.height >= min && tx.height <= max)
                .cloned()
                .collect();
            let start = ((page - 1) * per_page) as usize;
            Ok(TxSearchPage {
                total_count: txs.len() as u64,
                txs: txs.into_iter().skip(start).take(per_page as usize).collect(),
            })
        }

        async fn latest_height(&self) -> Result<u64, SwapError> {
            let mut node = self.0.lock().unwrap();
            if node.failures > 0 {
                node.failures -= 1;
                return Err(TransportError::Closed.into());
            }
            Ok(node.head)
        }

        async fn abci_query(&self, path: &str, data: &[u8]) -> Result<AbciQueryResponse, SwapError> {
            assert_eq!(path, "/escrows/recipient");
            Ok(AbciQueryResponse {
                code: 0,
                log: String::new(),
                key: data.to_vec(),
                value: vec![data[0], 8],
            })
        }
    }

    fn heights(query: &str) -> (u64, u64) {
        let mut min = 0;
        let mut max = u64::MAX;
        for part in query.split(" AND ") {
            if let Some(h) = part.strip_prefix("tx.height>=") {
                min = h.parse().unwrap();
            }
            if let Some(h) = part.strip_prefix("tx.height<=") {
                max = h.parse().unwrap();
            }
        }
        (min, max)
    }

    fn tx(height: u64, index: u64, body: &[u8], code: u32, data: &[u8]) -> TxResponse {
        TxResponse {
            hash: TxHash::with_last_byte((height * 10 + index) as u8),
            height,
            index,
            tx: body.to_vec(),
            result: TxResult { code, data: data.to_vec(), log: String::new() },
        }
    }

    fn source(rpc: TestRpc, page_size: u32) -> TendermintSource<TestRpc, TestCodec> {
        let config = ConnectionConfig {
            page_size,
            poll_interval: Duration::from_millis(1),
            retry: RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
            },
            ..ConnectionConfig::default()
        };
        TendermintSource::new(
            TendermintChain::new("test-chain"),
            rpc,
            TestCodec,
            config,
            Sleeper::new(tokio::time::sleep),
        )
    }

    fn recipient(byte: u8) -> SwapQuery {
        SwapQuery::ByRecipient(Address::bech32(Bech32Prefix::Test, [byte; 20]))
    }

    #[tokio::test]
    async fn search_merges_both_indices() {
        let rpc = TestRpc::default();
        {
            let mut node = rpc.0.lock().unwrap();
            node.head = 10;
            node.set = vec![
                tx(2, 0, b"o\x07", 0, &[1]),
                tx(3, 0, b"o\x07", 0, &[2]),
                tx(4, 0, b"o\x07", 5, &[3]),
                tx(5, 1, b"x", 0, &[]),
            ];
            // abort of swap 1 is indexed under both tags
            node.delete = vec![tx(6, 0, b"a\x01", 0, &[]), tx(9, 0, b"c\x02", 0, &[])];
            node.set.push(tx(6, 0, b"a\x01", 0, &[]));
        }
        let source = source(rpc.clone(), 2);
        let events = source.search(&recipient(7), HeightRange::full()).await.unwrap();

        let native = |id: u8| SwapId::new(SwapIdPrefix::Native, vec![id]).unwrap();
        let kinds: Vec<_> = events
            .iter()
            .map(|e| match e.event() {
                SwapEvent::Offered(data) => ('o', data.id.clone()),
                SwapEvent::Claimed { id, .. } => ('c', id.clone()),
                SwapEvent::Aborted { id } => ('a', id.clone()),
            })
            .collect();
        assert_eq!(kinds, vec![
            ('o', native(1)),
            ('o', native(2)),
            ('a', native(1)),
            ('c', native(2))
        ]);
        // set index spans 3 pages of 2
        let searches = rpc.0.lock().unwrap().searches.clone();
        assert_eq!(searches.iter().filter(|q| q.ends_with("='s'")).count(), 3);
    }

    #[tokio::test]
    async fn search_rejects_foreign_query_before_io() {
        let rpc = TestRpc::default();
        let source = source(rpc.clone(), 100);
        let ether = SwapId::contract(SwapIdPrefix::Ether, Default::default());
        assert!(matches!(
            source.search(&SwapQuery::ById(ether), HeightRange::full()).await,
            Err(SwapError::InvalidArgument(_))
        ));
        assert!(rpc.0.lock().unwrap().searches.is_empty());
    }

    #[tokio::test]
    async fn subscription_polls_new_blocks() {
        let rpc = TestRpc::default();
        {
            let mut node = rpc.0.lock().unwrap();
            node.head = 3;
            node.set = vec![tx(2, 0, b"o\x07", 0, &[1]), tx(4, 0, b"o\x07", 0, &[2])];
            node.failures = 1;
        }
        let source = source(rpc.clone(), 100);
        let mut live = source.subscribe(&recipient(7), 3).await.unwrap();

        let feeder = rpc.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            feeder.0.lock().unwrap().head = 5;
        });
        let event = live.next().await.unwrap().unwrap();
        assert_eq!(event.height(), 4);
        assert_eq!(*event.event().swap_id(), SwapId::new(SwapIdPrefix::Native, vec![2]).unwrap());
    }

    /// Transactions indexed after their block was reported as the head are
    /// picked up by the next poll.
    #[tokio::test]
    async fn subscription_searches_late_indexed_blocks() {
        let rpc = TestRpc::default();
        {
            let mut node = rpc.0.lock().unwrap();
            node.head = 5;
            node.set = vec![tx(4, 0, b"o\x07", 0, &[1])];
        }
        let source = source(rpc.clone(), 100);
        let mut live = source.subscribe(&recipient(7), 3).await.unwrap();
        assert_eq!(live.next().await.unwrap().unwrap().height(), 4);

        let feeder = rpc.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut node = feeder.0.lock().unwrap();
            node.delete.push(tx(5, 0, b"a\x01", 0, &[]));
            node.head = 6;
        });
        let event = live.next().await.unwrap().unwrap();
        assert_eq!(event.height(), 5);
        assert!(matches!(event.event(), SwapEvent::Aborted { .. }));

        // the window never reaches below the first height
        let searches = rpc.0.lock().unwrap().searches.clone();
        assert!(searches.iter().all(|q| !q.contains("tx.height>=2")));
    }

    /// A watch subscribes behind the head of its history, so a settlement
    /// indexed late in the last historical block is still delivered.
    #[tokio::test]
    async fn watch_covers_late_indexed_head() {
        let rpc = TestRpc::default();
        {
            let mut node = rpc.0.lock().unwrap();
            node.head = 5;
            node.set = vec![tx(2, 0, b"o\x07", 0, &[1]), tx(4, 0, b"o\x07", 0, &[2])];
        }
        let connection = AtomicSwapConnection::new(source(rpc.clone(), 100));
        let mut swaps = connection.watch_swaps(recipient(7)).unwrap();

        let state = |swap: Option<Result<AtomicSwap, SwapError>>| {
            let swap = swap.unwrap().unwrap();
            (swap.id().data().to_vec(), swap.state())
        };
        assert_eq!(state(swaps.next().await), (vec![1], SwapProcessState::Open));
        assert_eq!(state(swaps.next().await), (vec![2], SwapProcessState::Open));

        {
            let mut node = rpc.0.lock().unwrap();
            node.delete.push(tx(5, 0, b"c\x01", 0, &[]));
            node.set.push(tx(7, 0, b"o\x07", 0, &[3]));
            node.head = 7;
        }
        assert_eq!(state(swaps.next().await), (vec![1], SwapProcessState::Claimed));
        assert_eq!(state(swaps.next().await), (vec![3], SwapProcessState::Open));
    }

    #[tokio::test]
    async fn height_timeout_is_rejected() {
        let rpc = TestRpc::default();
        {
            let mut node = rpc.0.lock().unwrap();
            node.head = 3;
            node.set = vec![tx(2, 0, b"h\x07", 0, &[1])];
        }
        let source = source(rpc, 100);
        assert!(matches!(
            source.search(&recipient(7), HeightRange::full()).await,
            Err(SwapError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn subscription_ends_when_retries_exhausted() {
        let rpc = TestRpc::default();
        rpc.0.lock().unwrap().failures = 10;
        let source = source(rpc, 100);
        let mut live = source.subscribe(&recipient(7), 1).await.unwrap();
        assert!(matches!(
            live.next().await,
            Some(Err(SwapError::Transport(TransportError::Closed)))
        ));
        assert!(live.next().await.is_none());
    }

    #[tokio::test]
    async fn state_read_returns_open_swaps() {
        let source = source(TestRpc::default(), 100);
        let swaps = source.swaps_from_state(&recipient(7)).await.unwrap();
        assert_eq!(swaps.len(), 1);
        assert!(matches!(&swaps[0], AtomicSwap::Open { data } if data.id.data() == [7]));
    }

    #[test]
    fn parses_rpc_responses() {
        let response: RpcTxSearch = serde_json::from_value(serde_json::json!({
            "txs": [{
                "hash": "D2C6A2C1A4F1CDCBD0BBE1A8BF70E93F3E5B1B53E7F5B7E0B8C9C6BFA0E2D1F3",
                "height": "12",
                "index": 1,
                "tx": "b2s=",
                "tx_result": { "code": 0, "data": "AQI=", "log": "" }
            }],
            "total_count": "1"
        }))
        .unwrap();
        let page = TxSearchPage::try_from(response).unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.txs[0].height, 12);
        assert_eq!(page.txs[0].tx, b"ok");
        assert_eq!(page.txs[0].result.data, vec![1, 2]);

        let status: RpcStatus =
            serde_json::from_str(r#"{"sync_info":{"latest_block_height":"77"}}"#).unwrap();
        assert_eq!(status.sync_info.latest_block_height, 77);
    }
}
