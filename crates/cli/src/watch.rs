use std::{collections::HashMap, io::Write};

use colored::Colorize;
use crossterm::{
    QueueableCommand,
    cursor::MoveTo,
    execute,
    style::Print,
    terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use swaptrack_sdk::{query::SwapQuery, state::SwapsView, types::AtomicSwap};
use tokio_util::sync::CancellationToken;

use crate::Connection;

pub(crate) async fn render(
    connection: &Connection,
    query: SwapQuery,
    num_events: Option<u64>,
    table: bool,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let title = format!("Swaps with {}:", query);
    let mut stream = connection.watch_swaps_with(query, cancellation_token)?;

    let mut events_left = num_events;

    if !table {
        println!("{}", title.bold().purple());
        while let Some(swap) = stream.next().await {
            if events_left.is_some_and(|count| count == 0) {
                break;
            }
            println!("{:#}", swap?);
            if let Some(ref mut count) = events_left {
                *count -= 1;
            }
        }
        return Ok(());
    }

    let mut swaps: Vec<AtomicSwap> = Vec::new();
    let mut positions = HashMap::new();
    let mut stdout = std::io::stdout();

    execute!(stdout, EnterAlternateScreen, Clear(ClearType::All), MoveTo(0, 0))?;

    let result = async {
        while let Some(swap) = stream.next().await {
            if events_left.is_some_and(|count| count == 0) {
                break;
            }
            let swap = swap?;
            match positions.get(swap.id()) {
                Some(&position) => swaps[position] = swap,
                None => {
                    positions.insert(swap.id().clone(), swaps.len());
                    swaps.push(swap);
                },
            }

            stdout.queue(Clear(ClearType::All))?;
            stdout.queue(MoveTo(0, 0))?;
            stdout.queue(Print(format!("{}\n", title.bold().purple())))?;
            stdout.queue(Print(format!("{:#}", SwapsView::new(&swaps))))?;
            stdout.flush()?;

            if let Some(ref mut count) = events_left {
                *count -= 1;
            }
        }
        anyhow::Ok(())
    }
    .await;

    execute!(std::io::stdout(), LeaveAlternateScreen)?;

    result
}
