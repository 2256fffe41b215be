use colored::Colorize;
use swaptrack_sdk::{query::SwapQuery, state::SwapsView, types::HeightRange};

use crate::Connection;

pub(crate) async fn render(
    connection: &Connection,
    query: &SwapQuery,
    range: HeightRange,
    compact: bool,
) -> anyhow::Result<()> {
    let swaps = connection.get_swaps_in_range(query, range).await?;

    println!("{}", format!("Swaps with {}:", query).bold().purple());
    if compact {
        print!("{:#}", SwapsView::new(&swaps));
    } else {
        print!("{}", SwapsView::new(&swaps));
    }
    Ok(())
}

pub(crate) async fn render_state(connection: &Connection, query: &SwapQuery) -> anyhow::Result<()> {
    let swaps = connection.get_swaps_from_state(query).await?;

    match swaps.as_slice() {
        [] => println!("{}", format!("No swap with {}", query).dimmed()),
        swaps => {
            for swap in swaps {
                println!("{:#}", swap);
            }
        },
    }
    Ok(())
}
