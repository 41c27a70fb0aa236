use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use mpt_frontier::ErrorKind;
use mpt_frontier::portfolio::FrontierEngine;
use mpt_frontier::portfolio::FrontierEngineConfig;
use mpt_frontier::portfolio::FrontierReport;
use mpt_frontier::portfolio::PriceFormat;
use mpt_frontier::portfolio::PriceTable;
use mpt_frontier::portfolio::annualize_return;
use mpt_frontier::portfolio::annualize_volatility;
use mpt_frontier::visualization::write_frontier_html;
use prettytable::Table;
use prettytable::row;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Efficient frontier of a set of assets from their closing prices.
#[derive(Parser, Debug)]
#[command(name = "mpt-frontier", version, about)]
struct Cli {
  /// Query date (YYYY-MM-DD); defaults to the last selectable date
  #[arg(long)]
  date: Option<NaiveDate>,

  /// Annualized return floor for the second optimum, e.g. 0.1 for 10%
  #[arg(long, default_value_t = 0.0)]
  required_return: f64,

  /// Rolling window in rows
  #[arg(long, default_value_t = 10)]
  window: usize,

  /// Number of random portfolios
  #[arg(long, default_value_t = 2000)]
  samples: usize,

  /// Trading days per year used for annualization
  #[arg(long, default_value_t = 360.0)]
  trading_days: f64,

  /// Seed for the random portfolios
  #[arg(long)]
  seed: Option<u64>,

  /// Input layout
  #[arg(long, value_enum, default_value_t = PriceFormat::Csv)]
  format: PriceFormat,

  /// Write the chart to this HTML file
  #[arg(long)]
  output: Option<PathBuf>,

  /// Price files, one or more assets each
  #[arg(required = true)]
  files: Vec<PathBuf>,
}

fn load_tables(files: &[PathBuf], format: PriceFormat) -> Vec<PriceTable> {
  files
    .iter()
    .filter_map(|path| match PriceTable::from_path(path, format) {
      Ok(table) => {
        info!(
          source = table.source(),
          rows = table.len(),
          tickers = ?table.tickers(),
          "loaded price table"
        );
        Some(table)
      }
      Err(e) => {
        error!("{e}; skipping file");
        None
      }
    })
    .collect()
}

fn print_report(report: &FrontierReport) {
  let periods = report.periods_per_year;
  let constrained = Some(&report.constrained_minimum).filter(|r| r.converged);

  let mut table = Table::new();
  let mut header = row!["ticker", "return (ann.)", "risk (ann.)", "least risky"];
  if constrained.is_some() {
    header.add_cell(prettytable::Cell::new("with return floor"));
  }
  table.set_titles(header);

  for (i, ticker) in report.tickers.iter().enumerate() {
    let mean = annualize_return(report.estimate.mean[i], periods);
    let risk = annualize_volatility(report.estimate.covariance[[i, i]].max(0.0).sqrt(), periods);
    let global = if report.global_minimum.converged {
      format!("{:.4}", report.global_minimum.weights[i])
    } else {
      "-".to_string()
    };
    let mut line = row![ticker, format!("{mean:.4}"), format!("{risk:.4}"), global];
    if let Some(result) = constrained {
      line.add_cell(prettytable::Cell::new(&format!("{:.4}", result.weights[i])));
    }
    table.add_row(line);
  }
  table.printstd();

  if let Some(point) = report.global_point {
    println!(
      "least risky: risk {:.4}, return {:.4}",
      point.volatility, point.expected_return
    );
  }
  if let Some(point) = report.constrained_point {
    println!(
      "least risky with return >= {:.2}: risk {:.4}, return {:.4}",
      report.required_return, point.volatility, point.expected_return
    );
  }
}

fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer())
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();
  let config = FrontierEngineConfig {
    window_size: cli.window,
    n_samples: cli.samples,
    trading_days_per_year: cli.trading_days,
    seed: cli.seed,
    ..Default::default()
  };
  let engine = FrontierEngine::new(config)?;

  let tables = load_tables(&cli.files, cli.format);

  let range = match engine.query_range(&tables) {
    Ok(range) => range,
    Err(e) if e.kind() == ErrorKind::Range => {
      warn!("{e}");
      return Ok(());
    }
    Err(e) => return Err(e.into()),
  };
  info!(start = %range.start, end = %range.end, "selectable dates");

  let date = cli.date.unwrap_or(range.end);
  let report = match engine.query(&tables, date, Some(cli.required_return)) {
    Ok(report) => report,
    Err(e) if e.kind() == ErrorKind::Range => {
      warn!("{e}");
      return Ok(());
    }
    Err(e) => return Err(e.into()),
  };

  print_report(&report);

  if let Some(path) = cli.output {
    write_frontier_html(&report, &path)?;
    info!(path = %path.display(), "chart written");
  }

  Ok(())
}
