use super::ui;
use crate::core::updater::{ListingRefresh, QuoteUpdater};
use anyhow::Result;
use comfy_table::{Cell, Color};

pub fn display_outcomes(outcomes: &[ListingRefresh]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Security"),
        ui::header_cell("Ticker"),
        ui::header_cell("Quote"),
        ui::header_cell("Quote Time"),
    ]);

    for outcome in outcomes {
        let (quote, time) = match &outcome.result {
            Ok(listing) => (
                listing
                    .latest_quote
                    .as_ref()
                    .map_or_else(|| ui::number_cell("N/A"), |q| ui::number_cell(q)),
                Cell::new(
                    listing
                        .latest_quote_timestamp
                        .map_or("N/A".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string()),
                ),
            ),
            Err(e) => (
                Cell::new("failed").fg(Color::Red),
                Cell::new(format!("{e:#}")).fg(Color::Red),
            ),
        };
        table.add_row(vec![
            Cell::new(&outcome.security_id),
            Cell::new(&outcome.ticker),
            quote,
            time,
        ]);
    }

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    let summary = format!("{} updated, {} failed", outcomes.len() - failed, failed);
    let style = if failed > 0 {
        ui::StyleType::Error
    } else {
        ui::StyleType::TotalValue
    };

    format!("{table}\n\n{}", ui::style_text(&summary, style))
}

/// Refreshes the quotes of `security_ids` (all securities if empty) and
/// prints the outcome per listing.
pub async fn update_quotes(updater: &QuoteUpdater, security_ids: &[String]) -> Result<()> {
    let refresh = updater.update_quotes(security_ids).await?;
    if refresh.is_empty() {
        println!("No listings with a quote provider to update.");
        return Ok(());
    }

    let pb = ui::new_progress_bar(refresh.len() as u64);
    let outcomes = refresh.wait_with(&|| pb.inc(1)).await;
    pb.finish_and_clear();

    println!("{}", display_outcomes(&outcomes));
    Ok(())
}
