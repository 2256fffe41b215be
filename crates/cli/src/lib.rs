mod address;
pub mod args;
mod swaps;
mod watch;

use std::time::Duration;

use alloy::{
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::client::RpcClient,
    transports::layers::RetryBackoffLayer,
};
use anyhow::Context;
use args::Cli;
use swaptrack_sdk::{
    EvmChain,
    connection::{AtomicSwapConnection, ConnectionConfig},
    source::{Sleeper, evm::EvmSource},
    types::HeightRange,
};
use tokio_util::sync::CancellationToken;

use crate::args::Commands;

pub(crate) type Connection = AtomicSwapConnection<EvmSource<DynProvider>>;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Address { prefix, command } = &cli.command {
        address::render(*prefix, command);
        return Ok(());
    }

    let connection = connect(&cli).await?;

    let cancellation_signal = CancellationToken::new();
    let cancellation_token = cancellation_signal.child_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancellation_signal.cancel();
        }
    });

    match &cli.command {
        Commands::Swaps { query, from, to, compact } => {
            swaps::render(&connection, &query.query()?, HeightRange::new(*from, *to), *compact)
                .await?
        },
        Commands::State { query } => swaps::render_state(&connection, &query.query()?).await?,
        Commands::Watch { query, num_events, table } => {
            watch::render(&connection, query.query()?, *num_events, *table, cancellation_token)
                .await?
        },
        Commands::Address { .. } => (),
    }

    Ok(())
}

async fn connect(cli: &Cli) -> anyhow::Result<Connection> {
    let ether_swap = cli.ether_swap.context("`--ether-swap` is required")?;

    let client = RpcClient::builder()
        .layer(RetryBackoffLayer::new(10, 100, 200))
        .connect(&cli.rpc)
        .await
        .context("connecting to RPC")?;
    let provider = ProviderBuilder::new().connect_client(client).erased();

    let mut chain = EvmChain::custom(
        provider.get_chain_id().await.context("fetching chain ID")?,
        ether_swap,
        cli.deployed_at,
    );
    if let Some(erc20_swap) = cli.erc20_swap {
        chain = chain.with_erc20(erc20_swap, cli.erc20_token.iter().cloned());
    } else if !cli.erc20_token.is_empty() {
        return Err(anyhow::anyhow!("`--erc20-token` requires `--erc20-swap`"));
    }

    let config = ConnectionConfig {
        request_timeout: Duration::from_secs(cli.timeout),
        ..Default::default()
    };
    Ok(AtomicSwapConnection::new(EvmSource::new(
        chain,
        provider,
        config,
        Sleeper::new(tokio::time::sleep),
    )))
}
