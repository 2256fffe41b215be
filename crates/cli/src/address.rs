use swaptrack_sdk::{condition, types::Bech32Prefix};

use crate::args::AddressCommands;

pub(crate) fn render(prefix: Bech32Prefix, command: &AddressCommands) {
    let address = match command {
        AddressCommands::Swap { id, hash } => condition::swap_to_address(prefix, id, hash),
        AddressCommands::Escrow { id } => condition::escrow_id_to_address(prefix, *id),
        AddressCommands::Multisig { id } => condition::multisig_id_to_address(prefix, *id),
        AddressCommands::ElectionRule { id } => {
            condition::election_rule_id_to_address(prefix, *id)
        },
    };
    println!("{}", address);
}
