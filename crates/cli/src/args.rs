use alloy::primitives::Address as EvmAddress;
use clap::{Args, Parser, Subcommand};
use swaptrack_sdk::{
    TokenInfo,
    query::SwapQuery,
    types::{Address, Bech32Prefix, Hash, SwapId},
};

pub(crate) const DEFAULT_RPC_PROVIDER: &str = "http://localhost:8545";

#[derive(Parser, Debug)]
#[command(name = "swaptrack-cli", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// RPC endpoint to connect to
    #[arg(long, global = true, default_value_t = DEFAULT_RPC_PROVIDER.to_string())]
    pub rpc: String,

    /// Ether swap contract address [required for `swaps`/`state`/`watch`]
    #[arg(long, global = true)]
    pub ether_swap: Option<EvmAddress>,

    /// ERC-20 swap contract address
    #[arg(long, global = true)]
    pub erc20_swap: Option<EvmAddress>,

    /// ERC-20 token held by the swap contract, as `ADDRESS:TICKER:DIGITS`
    #[arg(long, global = true, value_parser = parse_token)]
    pub erc20_token: Vec<(EvmAddress, TokenInfo)>,

    /// Block the swap contracts were deployed at, searches start from it
    #[arg(long, global = true, default_value_t = 0)]
    pub deployed_at: u64,

    /// RPC request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout: u64,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show current state of swaps reconciled from their history
    Swaps {
        #[command(flatten)]
        query: QueryArgs,

        /// Block number to search from [default: contract deployment block]
        #[arg(long)]
        from: Option<u64>,

        /// Block number to search to [default: latest block]
        #[arg(long)]
        to: Option<u64>,

        /// Skip hashes and preimages, show counts per state
        #[arg(long, default_value_t = false)]
        compact: bool,
    },
    /// Show current state of a swap read from the contract state
    State {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Show known swaps, then every state change confirmed later
    Watch {
        #[command(flatten)]
        query: QueryArgs,

        /// Number of state changes to show [default: unlimited, until
        /// terminated by (Ctrl+C)]
        #[arg(long)]
        num_events: Option<u64>,

        /// Redraw the table of all swaps on every change instead of printing
        /// changes one by one
        #[arg(long, default_value_t = false)]
        table: bool,
    },
    /// Derive the address holding the funds of a swap, escrow, multisig
    /// contract or election rule
    Address {
        /// Address prefix of the chain
        #[arg(long, default_value_t = Bech32Prefix::Test)]
        prefix: Bech32Prefix,

        #[command(subcommand)]
        command: AddressCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum AddressCommands {
    /// Swap address, from swap ID and hash
    Swap {
        #[arg(long)]
        id: SwapId,

        #[arg(long)]
        hash: Hash,
    },
    /// Escrow address
    Escrow { id: u64 },
    /// Multisig contract address
    Multisig { id: u64 },
    /// Election rule address
    ElectionRule { id: u64 },
}

/// Swaps to look up, exactly one selector is required.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct QueryArgs {
    /// Swap ID, as `PREFIX:HEX` (e.g. `ether:00..01`)
    #[arg(long)]
    pub id: Option<SwapId>,

    /// Sender address
    #[arg(long)]
    pub sender: Option<Address>,

    /// Recipient address
    #[arg(long)]
    pub recipient: Option<Address>,

    /// Hash locking the swaps, hex encoded
    #[arg(long)]
    pub hash: Option<Hash>,
}

impl QueryArgs {
    pub fn query(&self) -> anyhow::Result<SwapQuery> {
        match (&self.id, self.sender, self.recipient, self.hash) {
            (Some(id), ..) => Ok(SwapQuery::ById(id.clone())),
            (_, Some(sender), ..) => Ok(SwapQuery::BySender(sender)),
            (_, _, Some(recipient), _) => Ok(SwapQuery::ByRecipient(recipient)),
            (.., Some(hash)) => Ok(SwapQuery::ByHash(hash)),
            _ => Err(anyhow::anyhow!(
                "one of `--id`, `--sender`, `--recipient`, `--hash` is required"
            )),
        }
    }
}

fn parse_token(s: &str) -> anyhow::Result<(EvmAddress, TokenInfo)> {
    let mut parts = s.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(address), Some(ticker), Some(digits)) => Ok((
            address.parse()?,
            TokenInfo::new(ticker, digits.parse()?),
        )),
        _ => Err(anyhow::anyhow!("expected `ADDRESS:TICKER:DIGITS`, got `{s}`")),
    }
}
