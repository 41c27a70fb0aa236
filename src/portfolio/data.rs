//! # Portfolio Data Utilities
//!
//! $$
//! r_t^{(i)} = \frac{P_t^{(i)}}{P_{t-1}^{(i)}} - 1
//! $$
//!
//! Daily simple returns, aligned across assets by date.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use ndarray::Array2;
use ndarray::ArrayView2;
use tracing::debug;
use tracing::warn;

use super::prices::PriceTable;
use crate::error::FrontierError;
use crate::error::Result;

/// Convert close prices to simple-return series, skipping non-finite values.
pub fn simple_returns(closes: &[f64]) -> Vec<f64> {
  closes
    .windows(2)
    .map(|w| w[1] / w[0] - 1.0)
    .filter(|r| r.is_finite())
    .collect()
}

/// Date-indexed returns, one column per ticker, no gaps.
#[derive(Clone, Debug)]
pub struct ReturnMatrix {
  dates: Vec<NaiveDate>,
  tickers: Vec<String>,
  values: Array2<f64>,
}

impl ReturnMatrix {
  /// Build from already aligned data. Rows must be in ascending date order.
  pub fn new(dates: Vec<NaiveDate>, tickers: Vec<String>, values: Array2<f64>) -> Result<Self> {
    if values.dim() != (dates.len(), tickers.len()) {
      return Err(FrontierError::Numerical(format!(
        "return matrix shape {:?} does not match {} dates x {} tickers",
        values.dim(),
        dates.len(),
        tickers.len()
      )));
    }
    if dates.windows(2).any(|w| w[0] >= w[1]) {
      return Err(FrontierError::Numerical(
        "return matrix dates must be strictly increasing".into(),
      ));
    }

    Ok(Self {
      dates,
      tickers,
      values,
    })
  }

  /// Concatenate the tables, compute per-ticker returns and inner-join them by date.
  pub fn from_price_tables(tables: &[PriceTable]) -> Result<Self> {
    let mut closes: BTreeMap<&str, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for table in tables {
      for p in table.points() {
        let series = closes.entry(p.ticker.as_str()).or_default();
        if series.insert(p.date, p.close).is_some() {
          return Err(FrontierError::DuplicateObservation {
            ticker: p.ticker.clone(),
            date: p.date,
          });
        }
      }
    }

    let mut returns: BTreeMap<&str, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    let mut dropped = 0usize;
    for (&ticker, series) in &closes {
      let points: Vec<(&NaiveDate, &f64)> = series.iter().collect();
      let mut by_date = BTreeMap::new();
      for pair in points.windows(2) {
        let (_, prev) = pair[0];
        let (date, close) = pair[1];
        let r = close / prev - 1.0;
        if r.is_finite() {
          by_date.insert(*date, r);
        } else {
          dropped += 1;
        }
      }
      returns.insert(ticker, by_date);
    }
    if dropped > 0 {
      warn!(dropped, "skipped non-finite returns");
    }

    let mut common: Option<BTreeSet<NaiveDate>> = None;
    for series in returns.values() {
      let dates: BTreeSet<NaiveDate> = series.keys().copied().collect();
      common = Some(match common {
        Some(acc) => acc.intersection(&dates).copied().collect(),
        None => dates,
      });
    }
    let dates: Vec<NaiveDate> = common.unwrap_or_default().into_iter().collect();
    let tickers: Vec<String> = returns.keys().map(|t| t.to_string()).collect();

    let columns: Vec<&BTreeMap<NaiveDate, f64>> = returns.values().collect();
    let values = Array2::from_shape_fn((dates.len(), tickers.len()), |(i, j)| {
      columns[j].get(&dates[i]).copied().unwrap_or(f64::NAN)
    });

    debug!(
      n_dates = dates.len(),
      n_tickers = tickers.len(),
      "built aligned return matrix"
    );

    Self::new(dates, tickers, values)
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  /// Column labels, sorted by name.
  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  /// `n_periods x n_assets` view.
  pub fn values(&self) -> ArrayView2<'_, f64> {
    self.values.view()
  }

  pub fn n_assets(&self) -> usize {
    self.tickers.len()
  }

  pub fn n_periods(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  /// Row index of `date`, if it is a row of the matrix.
  pub fn row_of(&self, date: NaiveDate) -> Option<usize> {
    self.dates.binary_search(&date).ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::portfolio::prices::PricePoint;

  fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
  }

  fn table(ticker: &str, rows: &[(u32, f64)]) -> PriceTable {
    PriceTable::new(
      ticker,
      rows
        .iter()
        .map(|&(d, c)| PricePoint::new(ticker, date(d), c))
        .collect(),
    )
    .unwrap()
  }

  #[test]
  fn simple_returns_drop_first_observation() {
    let r = simple_returns(&[100.0, 110.0, 99.0]);
    assert_eq!(r.len(), 2);
    assert!((r[0] - 0.1).abs() < 1e-12);
    assert!((r[1] + 0.1).abs() < 1e-12);
  }

  #[test]
  fn returns_span_gaps_and_inner_join() {
    // BBB skips the 3rd, so its return on the 4th spans the gap and the 3rd is dropped
    let a = table("AAA", &[(2, 100.0), (3, 101.0), (4, 102.01), (5, 100.0)]);
    let b = table("BBB", &[(2, 50.0), (4, 55.0), (5, 44.0)]);
    let m = ReturnMatrix::from_price_tables(&[b, a]).unwrap();

    assert_eq!(m.tickers(), &["AAA".to_string(), "BBB".to_string()]);
    assert_eq!(m.dates(), &[date(4), date(5)]);
    assert_eq!(m.values().dim(), (2, 2));
    assert!((m.values()[[0, 0]] - 0.01).abs() < 1e-12);
    assert!((m.values()[[0, 1]] - 0.1).abs() < 1e-12);
    assert!((m.values()[[1, 1]] + 0.2).abs() < 1e-12);
    assert!(m.values().iter().all(|v| v.is_finite()));
  }

  #[test]
  fn rows_are_sorted_by_date() {
    let a = table("AAA", &[(9, 1.0), (3, 1.1), (6, 1.2), (1, 1.3)]);
    let b = table("BBB", &[(1, 2.0), (3, 2.1), (6, 2.2), (9, 2.3)]);
    let m = ReturnMatrix::from_price_tables(&[a, b]).unwrap();

    assert_eq!(m.dates(), &[date(3), date(6), date(9)]);
    assert_eq!(m.row_of(date(6)), Some(1));
    assert_eq!(m.row_of(date(5)), None);
    assert_eq!(m.tickers(), &["AAA".to_string(), "BBB".to_string()]);
  }

  #[test]
  fn duplicate_rows_across_tables_are_rejected() {
    let a = table("AAA", &[(1, 1.0), (2, 1.1)]);
    let again = table("AAA", &[(2, 1.2), (3, 1.3)]);
    let err = ReturnMatrix::from_price_tables(&[a, again]).unwrap_err();
    assert!(matches!(err, FrontierError::DuplicateObservation { .. }));
  }

  #[test]
  fn disjoint_dates_give_empty_matrix() {
    let a = table("AAA", &[(1, 1.0), (2, 1.1)]);
    let b = table("BBB", &[(5, 1.0), (6, 1.1)]);
    let m = ReturnMatrix::from_price_tables(&[a, b]).unwrap();
    assert!(m.is_empty());
    assert_eq!(m.n_assets(), 2);
  }
}
