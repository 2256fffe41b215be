use std::collections::VecDeque;

use alloy::{
    eips::BlockId,
    primitives::B256,
    providers::Provider,
    rpc::types::{Filter, Log},
    sol_types::SolEvent,
};
use futures::{StreamExt, stream};
use tracing::{debug, warn};

use super::{EventSource, Retries, Sleeper, SwapEventContext, SwapEventStream, sort_events};
use crate::{
    EvmChain,
    abi::{self, SwapLogKind, erc20::AtomicSwapErc20, ether::AtomicSwapEther},
    connection::ConnectionConfig,
    error::SwapError,
    query::{self, SwapQuery},
    types::{
        Amount, AtomicSwap, BlockEvents, EventContext, Hash, HeightRange, Preimage, StateInstant,
        SwapData, SwapEvent, SwapId, SwapIdPrefix, SwapTimeout,
    },
};

pub type EvmBlockEvents = BlockEvents<SwapEventContext>;

/// Event source of a log-indexed chain, reading the logs of the swap
/// contracts via the given [`Provider`].
///
/// It is recommended to setup provider with
/// [`alloy::transports::layers::RetryBackoffLayer`] for historical searches;
/// live subscriptions retry on their own per [`ConnectionConfig::retry`].
#[derive(Clone, derive_more::Debug)]
pub struct EvmSource<P> {
    chain: EvmChain,
    #[debug(skip)]
    provider: P,
    config: ConnectionConfig,
    sleeper: Sleeper,
}

impl<P: Provider + Clone + 'static> EvmSource<P> {
    pub fn new(chain: EvmChain, provider: P, config: ConnectionConfig, sleeper: Sleeper) -> Self {
        Self { chain, provider, config, sleeper }
    }

    pub fn chain(&self) -> &EvmChain { &self.chain }

    async fn fetch_logs(
        &self,
        contracts: &[alloy::primitives::Address],
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, SwapError> {
        let filter = Filter::new().address(contracts.to_vec()).from_block(from).to_block(to);
        let logs = self
            .sleeper
            .timeout(self.config.request_timeout, async {
                self.provider.get_logs(&filter).await.map_err(SwapError::from)
            })
            .await?;
        debug!(from, to, logs = logs.len(), "fetched swap contract logs");
        Ok(logs)
    }

    /// Events of the block, `None` if the block does not exist yet.
    async fn fetch_block(
        &self,
        contracts: &[alloy::primitives::Address],
        block_num: u64,
    ) -> Result<Option<EvmBlockEvents>, SwapError> {
        let filter =
            Filter::new().address(contracts.to_vec()).from_block(block_num).to_block(block_num);
        // Some nodes produce empty response instead of error in case the block
        // in the filter does not exist yet, so checking the block presence
        // explicitly
        let (block, logs) = self
            .sleeper
            .timeout(self.config.request_timeout, async {
                futures::try_join!(
                    self.provider.get_block(BlockId::number(block_num)).into_future(),
                    self.provider.get_logs(&filter)
                )
                .map_err(SwapError::from)
            })
            .await?;
        let Some(block) = block else {
            return Ok(None);
        };
        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            if let Some(event) = decode_log(&self.chain, log)? {
                events.push(event);
            }
        }
        sort_events(&mut events);
        debug!(block_num, events = events.len(), "polled block");
        Ok(Some(EvmBlockEvents::new(StateInstant::new(block_num, block.header.timestamp), events)))
    }
}

impl<P: Provider + Clone + 'static> EventSource for EvmSource<P> {
    fn config(&self) -> &ConnectionConfig { &self.config }

    fn sleeper(&self) -> &Sleeper { &self.sleeper }

    fn validate(&self, query: &SwapQuery) -> Result<(), SwapError> {
        query::evm_log_scan(query, &self.chain).map(|_| ())
    }

    async fn latest_height(&self) -> Result<u64, SwapError> {
        self.sleeper
            .timeout(self.config.request_timeout, async {
                self.provider.get_block_number().await.map_err(SwapError::from)
            })
            .await
    }

    async fn search(
        &self,
        query: &SwapQuery,
        range: HeightRange,
    ) -> Result<Vec<SwapEventContext>, SwapError> {
        let contracts: Vec<_> =
            query::evm_log_scan(query, &self.chain)?.into_iter().map(|(_, c)| c).collect();
        let from = range.min.unwrap_or_default().max(self.chain.deployed_at_block());
        let to = match range.max {
            Some(max) => max,
            None => self.latest_height().await?,
        };

        let mut events = Vec::new();
        let mut chunk_from = from;
        while chunk_from <= to {
            let chunk_to =
                chunk_from.saturating_add(self.config.log_block_range.max(1) - 1).min(to);
            for log in self.fetch_logs(&contracts, chunk_from, chunk_to).await? {
                if let Some(event) = decode_log(&self.chain, &log)? {
                    events.push(event);
                }
            }
            if chunk_to == u64::MAX {
                break;
            }
            chunk_from = chunk_to + 1;
        }
        sort_events(&mut events);
        Ok(events)
    }

    async fn subscribe(&self, query: &SwapQuery, from: u64) -> Result<SwapEventStream, SwapError> {
        let contracts: Vec<_> =
            query::evm_log_scan(query, &self.chain)?.into_iter().map(|(_, c)| c).collect();
        let state = PollState {
            source: self.clone(),
            contracts,
            block_num: from,
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
                match state.source.fetch_block(&state.contracts, state.block_num).await {
                    Ok(Some(block)) => {
                        state.block_num += 1;
                        state.retries.reset();
                        state.buffer.extend(block.into_events());
                    },
                    Ok(None) => {
                        // Block is not available yet
                        state.source.sleeper.sleep(state.source.config.poll_interval).await;
                    },
                    Err(err) => match state.retries.next_delay(&err) {
                        Some(delay) => {
                            warn!(
                                block_num = state.block_num,
                                ?delay,
                                "polling failed, retrying: {err}"
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
        let (prefix, contract, id) = query::evm_state_read(query, &self.chain)?;
        let swap = self
            .sleeper
            .timeout(self.config.request_timeout, async {
                match prefix {
                    SwapIdPrefix::Erc20 => {
                        let swap =
                            AtomicSwapErc20::new(contract, &self.provider).get(id).call().await?;
                        let amount =
                            token_amount(&self.chain, &swap.erc20ContractAddress, swap.amount)?;
                        Ok::<_, SwapError>(ContractSwap {
                            sender: swap.sender,
                            recipient: swap.recipient,
                            hash: swap.hash,
                            timeout: swap.timeout,
                            amount,
                            preimage: swap.preimage,
                            state: swap.state,
                        })
                    },
                    SwapIdPrefix::Ether | SwapIdPrefix::Native => {
                        let swap =
                            AtomicSwapEther::new(contract, &self.provider).get(id).call().await?;
                        Ok::<_, SwapError>(ContractSwap {
                            sender: swap.sender,
                            recipient: swap.recipient,
                            hash: swap.hash,
                            timeout: swap.timeout,
                            amount: native_amount(&self.chain, swap.amount),
                            preimage: swap.preimage,
                            state: swap.state,
                        })
                    },
                }
            })
            .await?;
        debug!(%contract, %id, state = swap.state, "read swap state");
        swap.into_atomic_swap(SwapId::contract(prefix, id))
    }
}

struct PollState<P> {
    source: EvmSource<P>,
    contracts: Vec<alloy::primitives::Address>,
    block_num: u64,
    buffer: VecDeque<SwapEventContext>,
    retries: Retries,
    done: bool,
}

/// Swap as stored by a swap contract.
struct ContractSwap {
    sender: alloy::primitives::Address,
    recipient: alloy::primitives::Address,
    hash: B256,
    timeout: alloy::primitives::U256,
    amount: Amount,
    preimage: B256,
    state: u8,
}

impl ContractSwap {
    fn into_atomic_swap(self, id: SwapId) -> Result<Vec<AtomicSwap>, SwapError> {
        let data = SwapData {
            id,
            sender: self.sender.into(),
            recipient: self.recipient.into(),
            hash: self.hash.into(),
            amounts: vec![self.amount],
            timeout: height_timeout(self.timeout)?,
            memo: None,
        };
        Ok(match self.state {
            0 => vec![],
            abi::STATE_OPEN => vec![AtomicSwap::Open { data }],
            abi::STATE_CLAIMED => {
                vec![AtomicSwap::Claimed { data, preimage: Preimage::new(self.preimage.to_vec()) }]
            },
            abi::STATE_ABORTED => vec![AtomicSwap::Aborted { data }],
            state => {
                return Err(SwapError::Decode(format!("unknown swap process state {state}")));
            },
        })
    }
}

fn native_amount(chain: &EvmChain, quantity: alloy::primitives::U256) -> Amount {
    Amount::new(quantity, chain.native().fractional_digits(), chain.native().ticker())
}

fn token_amount(
    chain: &EvmChain,
    token: &alloy::primitives::Address,
    quantity: alloy::primitives::U256,
) -> Result<Amount, SwapError> {
    let info = chain
        .token(token)
        .ok_or_else(|| SwapError::Decode(format!("swap of unknown ERC-20 token {token}")))?;
    Ok(Amount::new(quantity, info.fractional_digits(), info.ticker()))
}

fn height_timeout(timeout: alloy::primitives::U256) -> Result<SwapTimeout, SwapError> {
    u64::try_from(timeout)
        .map(SwapTimeout::Height)
        .map_err(|_| SwapError::Decode(format!("swap timeout {timeout} exceeds block height range")))
}

/// Decodes a swap contract log, `None` for logs of other contracts or events.
pub fn decode_log(chain: &EvmChain, log: &Log) -> Result<Option<SwapEventContext>, SwapError> {
    let Some(prefix) = chain.prefix_of(&log.inner.address) else {
        return Ok(None);
    };
    let Some(kind) = log.inner.data.topics().first().and_then(abi::swap_log_kind) else {
        return Ok(None);
    };
    let event = match kind {
        SwapLogKind::OpenedEther => {
            let e = AtomicSwapEther::Opened::decode_log(&log.inner)?.data;
            SwapEvent::Offered(SwapData {
                id: SwapId::contract(prefix, e.id),
                sender: e.sender.into(),
                recipient: e.recipient.into(),
                hash: Hash::from(e.hash),
                amounts: vec![native_amount(chain, e.amount)],
                timeout: height_timeout(e.timeout)?,
                memo: None,
            })
        },
        SwapLogKind::OpenedErc20 => {
            let e = AtomicSwapErc20::Opened::decode_log(&log.inner)?.data;
            SwapEvent::Offered(SwapData {
                id: SwapId::contract(prefix, e.id),
                sender: e.sender.into(),
                recipient: e.recipient.into(),
                hash: Hash::from(e.hash),
                amounts: vec![token_amount(chain, &e.erc20ContractAddress, e.amount)?],
                timeout: height_timeout(e.timeout)?,
                memo: None,
            })
        },
        SwapLogKind::Claimed => {
            let e = AtomicSwapEther::Claimed::decode_log(&log.inner)?.data;
            SwapEvent::Claimed {
                id: SwapId::contract(prefix, e.id),
                preimage: Preimage::new(e.preimage.to_vec()),
            }
        },
        SwapLogKind::Aborted => {
            let e = AtomicSwapEther::Aborted::decode_log(&log.inner)?.data;
            SwapEvent::Aborted { id: SwapId::contract(prefix, e.id) }
        },
    };
    let height = log
        .block_number
        .ok_or_else(|| SwapError::Decode("log of a pending block".to_string()))?;
    Ok(Some(EventContext::new(
        height,
        log.transaction_hash.unwrap_or_default(),
        log.transaction_index.unwrap_or_default(),
        log.log_index.unwrap_or_default(),
        event,
    )))
}
