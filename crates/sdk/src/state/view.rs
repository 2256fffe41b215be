use colored::Colorize;
use tabled::{
    Table,
    settings::{Alignment, Panel, Style, Width, object::Rows},
};

use crate::types::{AtomicSwap, SwapProcessState};

/// View of a list of swaps.
///
/// Rendered as a full table by default, the alternate representation skips
/// hashes and preimages and shows the counts of swaps per state in the header.
pub struct SwapsView<'a> {
    swaps: &'a [AtomicSwap],
}

impl<'a> SwapsView<'a> {
    pub fn new(swaps: &'a [AtomicSwap]) -> Self { Self { swaps } }
}

impl<'a> std::fmt::Display for SwapsView<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.swaps.is_empty() {
            return writeln!(f, "{}", "No swaps".dimmed());
        }

        if f.alternate() {
            let count = |state| self.swaps.iter().filter(|s| s.state() == state).count();
            let mut table = Table::from_iter(
                std::iter::once(vec![
                    "Swap ID".to_string(),
                    "State".to_string(),
                    "Sender".to_string(),
                    "Recipient".to_string(),
                    "Amounts".to_string(),
                ])
                .chain(self.swaps.iter().map(|swap| {
                    let data = swap.data();
                    vec![
                        swap.id().to_string(),
                        state_cell(swap.state()),
                        data.sender.to_string(),
                        data.recipient.to_string(),
                        data.amounts.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"),
                    ]
                })),
            );
            table.with(Panel::header(format!(
                "Total swaps: {} :: open: {}, claimed: {}, aborted: {}",
                self.swaps.len(),
                count(SwapProcessState::Open),
                count(SwapProcessState::Claimed),
                count(SwapProcessState::Aborted),
            )));
            table.modify(Rows::first(), Alignment::right());
            if let Some(max_width) = f.width() {
                table.with(Width::wrap(max_width));
            }
            table.with(Style::modern());
            writeln!(f, "{}", table)
        } else {
            let mut table = Table::new(self.swaps);
            table.with(Style::sharp());
            writeln!(f, "{}", table)
        }
    }
}

fn state_cell(state: SwapProcessState) -> String {
    match state {
        SwapProcessState::Open => state.to_string().yellow().to_string(),
        SwapProcessState::Claimed => state.to_string().green().to_string(),
        SwapProcessState::Aborted => state.to_string().red().to_string(),
    }
}
