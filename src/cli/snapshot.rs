use super::ui;
use crate::core::config::{AppConfig, PortfolioConfig};
use crate::core::snapshot::{PortfolioSnapshot, SnapshotBuilder};
use crate::core::store::{EventProvider, SecurityProvider};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use comfy_table::Cell;

impl PortfolioSnapshot {
    pub fn display_as_table(&self, name: &str) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Security"),
            ui::header_cell("Amount"),
            ui::header_cell("Purchase Price"),
            ui::header_cell("Purchase Value"),
            ui::header_cell("Market Price"),
            ui::header_cell("Market Value"),
            ui::header_cell("Profit/Loss"),
            ui::header_cell("Gains"),
        ]);

        for position in self.sorted_positions() {
            let name = position
                .security
                .as_ref()
                .map_or(position.security_id.as_str(), |s| s.display_name.as_str());

            table.add_row(vec![
                Cell::new(name),
                ui::number_cell(format!("{:.2}", position.amount)),
                ui::number_cell(&position.purchase_price),
                ui::number_cell(&position.purchase_value),
                ui::number_cell(&position.market_price),
                ui::number_cell(&position.market_value),
                ui::number_cell(&position.profit_or_loss),
                ui::gains_cell(position.gains),
            ]);
        }

        let since = self
            .first_transaction_time
            .map_or("no transactions".to_string(), |t| {
                format!("since {}", t.format("%Y-%m-%d"))
            });

        let mut output = format!(
            "Portfolio: {} {}\n",
            ui::style_text(name, ui::StyleType::Title),
            ui::style_text(
                &format!("({} as of {})", since, self.time.format("%Y-%m-%d %H:%M:%S UTC")),
                ui::StyleType::Subtle
            ),
        );
        output.push('\n');
        output.push_str(&table.to_string());
        output.push('\n');

        let total_gains = format!("{:.2}%", self.total_gains * 100.0);
        for (label, value, style) in [
            ("Purchase Value", self.total_purchase_value.to_string(), ui::StyleType::TotalLabel),
            ("Market Value", self.total_market_value.to_string(), ui::StyleType::TotalLabel),
            ("Profit/Loss", self.total_profit_or_loss.to_string(), gains_style(self.total_gains)),
            ("Gains", total_gains, gains_style(self.total_gains)),
            ("Cash", self.cash.to_string(), ui::StyleType::TotalLabel),
            ("Total Value", self.total_portfolio_value.to_string(), ui::StyleType::TotalValue),
        ] {
            output.push_str(&format!(
                "\n{}{}",
                ui::style_text(&format!("{label:<16}"), ui::StyleType::TotalLabel),
                ui::style_text(&value, style)
            ));
        }

        output
    }
}

fn gains_style(gains: f64) -> ui::StyleType {
    if gains < 0.0 {
        ui::StyleType::Error
    } else {
        ui::StyleType::TotalValue
    }
}

/// Builds and renders snapshots of the selected portfolios, or all of them.
pub async fn render_snapshots<S>(
    config: &AppConfig,
    store: &S,
    portfolio_id: Option<&str>,
    at: Option<DateTime<Utc>>,
) -> Result<Vec<String>>
where
    S: EventProvider + SecurityProvider,
{
    let portfolios: Vec<&PortfolioConfig> = match portfolio_id {
        Some(id) => match config.portfolio(id) {
            Some(p) => vec![p],
            None => bail!("Unknown portfolio: {id}"),
        },
        None => config.portfolios.iter().collect(),
    };

    let cutoff = at.unwrap_or_else(Utc::now);
    let builder = SnapshotBuilder::new(store, store, &config.currency);

    let mut rendered = Vec::with_capacity(portfolios.len());
    for portfolio in portfolios {
        let snapshot = builder.build(&portfolio.id, cutoff).await?;
        rendered.push(snapshot.display_as_table(portfolio.name()));
    }
    Ok(rendered)
}

pub async fn print_snapshots<S>(
    config: &AppConfig,
    store: &S,
    portfolio_id: Option<&str>,
    at: Option<DateTime<Utc>>,
) -> Result<()>
where
    S: EventProvider + SecurityProvider,
{
    let rendered = render_snapshots(config, store, portfolio_id, at).await?;
    if rendered.is_empty() {
        println!("No portfolios configured.");
    }
    for (i, output) in rendered.iter().enumerate() {
        if i > 0 {
            ui::print_separator();
        }
        println!("{output}");
    }
    Ok(())
}
