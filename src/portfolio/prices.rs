//! # Price Tables
//!
//! $$
//! \mathcal{P} = \{(\text{ticker}, t, P_t)\}, \quad [t_0, t_1] = \bigcap_k [t_0^{(k)}, t_1^{(k)}]
//! $$
//!
//! Closing-price input files and their calendar coverage.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::Days;
use chrono::NaiveDate;
use clap::ValueEnum;

use crate::error::FrontierError;
use crate::error::Result;

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%d.%m.%Y", "%m/%d/%Y"];

/// Layout of a price file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum PriceFormat {
  /// Comma-delimited `TICKER,DATE,CLOSE` with one header row.
  #[default]
  Csv,
  /// Semicolon-delimited market-data export (`<TICKER>;<PER>;<DATE>;<TIME>;<CLOSE>;<VOL>`).
  #[value(alias = "finam", alias = "semicolon")]
  Mfd,
}

/// One closing price.
#[derive(Clone, Debug, PartialEq)]
pub struct PricePoint {
  pub ticker: String,
  pub date: NaiveDate,
  pub close: f64,
}

impl PricePoint {
  pub fn new(ticker: impl Into<String>, date: NaiveDate, close: f64) -> Self {
    Self {
      ticker: ticker.into(),
      date,
      close,
    }
  }
}

/// Inclusive calendar range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
  pub start: NaiveDate,
  pub end: NaiveDate,
}

impl DateRange {
  /// `None` when `start > end`.
  pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
    (start <= end).then_some(Self { start, end })
  }

  pub fn contains(&self, date: NaiveDate) -> bool {
    self.start <= date && date <= self.end
  }

  /// Overlap of two ranges, if any.
  pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
    DateRange::new(self.start.max(other.start), self.end.min(other.end))
  }

  /// Calendar days between `start` and `end`.
  pub fn span_days(&self) -> i64 {
    (self.end - self.start).num_days()
  }

  /// Drop the first `days` calendar days, `None` if nothing is left.
  pub fn skip_days(&self, days: u64) -> Option<DateRange> {
    let start = self.start.checked_add_days(Days::new(days))?;
    DateRange::new(start, self.end)
  }
}

/// Parsed content of one price file.
#[derive(Clone, Debug)]
pub struct PriceTable {
  source: String,
  points: Vec<PricePoint>,
}

impl PriceTable {
  /// Validate and sort a set of points.
  ///
  /// Rejects empty input, non-positive or non-finite closes and repeated
  /// `(ticker, date)` pairs.
  pub fn new(source: impl Into<String>, mut points: Vec<PricePoint>) -> Result<Self> {
    let source = source.into();
    if points.is_empty() {
      return Err(FrontierError::parse(&source, "no price rows"));
    }

    for p in &points {
      if !p.close.is_finite() || p.close <= 0.0 {
        return Err(FrontierError::parse(
          &source,
          format!("close {} for {} on {} is not a positive number", p.close, p.ticker, p.date),
        ));
      }
    }

    points.sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date)));
    for pair in points.windows(2) {
      if pair[0].ticker == pair[1].ticker && pair[0].date == pair[1].date {
        return Err(FrontierError::parse(
          &source,
          format!("{} has more than one row for {}", pair[0].ticker, pair[0].date),
        ));
      }
    }

    Ok(Self { source, points })
  }

  /// Read a table from any reader.
  pub fn from_reader<R: Read>(source: &str, reader: R, format: PriceFormat) -> Result<Self> {
    let points = match format {
      PriceFormat::Csv => read_csv(source, reader)?,
      PriceFormat::Mfd => read_mfd(source, reader)?,
    };
    Self::new(source, points)
  }

  /// Read a table from disk; the file name becomes the source label.
  pub fn from_path<P: AsRef<Path>>(path: P, format: PriceFormat) -> Result<Self> {
    let path = path.as_ref();
    let source = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string());
    let file = File::open(path).map_err(|e| FrontierError::parse(&source, e.to_string()))?;
    Self::from_reader(&source, file, format)
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  /// Points sorted by ticker, then date.
  pub fn points(&self) -> &[PricePoint] {
    &self.points
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// Distinct tickers in order of appearance.
  pub fn tickers(&self) -> Vec<&str> {
    let mut seen = HashSet::new();
    self
      .points
      .iter()
      .filter(|p| seen.insert(p.ticker.as_str()))
      .map(|p| p.ticker.as_str())
      .collect()
  }

  /// First and last date of each ticker, in ticker order.
  pub fn ticker_ranges(&self) -> Vec<(&str, DateRange)> {
    self
      .points
      .chunk_by(|a, b| a.ticker == b.ticker)
      .filter_map(|run| {
        let first = run.first()?;
        let last = run.last()?;
        Some((
          first.ticker.as_str(),
          DateRange {
            start: first.date,
            end: last.date,
          },
        ))
      })
      .collect()
  }

  /// First and last date in the table.
  pub fn date_range(&self) -> DateRange {
    let start = self.points.iter().map(|p| p.date).min();
    let end = self.points.iter().map(|p| p.date).max();
    match (start, end) {
      (Some(start), Some(end)) => DateRange { start, end },
      // `new` never builds an empty table
      _ => unreachable!("price table without rows"),
    }
  }

  /// Restrict the table to `range`, `None` if no rows remain.
  pub fn clip(&self, range: &DateRange) -> Option<Self> {
    let points: Vec<PricePoint> = self
      .points
      .iter()
      .filter(|p| range.contains(p.date))
      .cloned()
      .collect();

    (!points.is_empty()).then(|| Self {
      source: self.source.clone(),
      points,
    })
  }
}

/// Intersection of the date ranges of every ticker in every table.
///
/// `None` for no tables or disjoint coverage.
pub fn common_date_range(tables: &[PriceTable]) -> Option<DateRange> {
  let mut ranges = tables
    .iter()
    .flat_map(|t| t.ticker_ranges())
    .map(|(_, range)| range);
  let first = ranges.next()?;
  ranges.try_fold(first, |acc, range| acc.intersect(&range))
}

/// Parse a calendar date in any of the accepted layouts, ignoring a time part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
  let day = raw
    .trim()
    .split(|c: char| c.is_whitespace() || c == 'T')
    .next()
    .unwrap_or_default();

  DATE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDate::parse_from_str(day, fmt).ok())
}

fn parse_close(source: &str, row: usize, raw: &str) -> Result<f64> {
  raw
    .trim()
    .parse::<f64>()
    .map_err(|_| FrontierError::parse(source, format!("row {row}: close {raw:?} is not a number")))
}

fn parse_row_date(source: &str, row: usize, raw: &str) -> Result<NaiveDate> {
  parse_date(raw)
    .ok_or_else(|| FrontierError::parse(source, format!("row {row}: unrecognized date {raw:?}")))
}

fn read_csv<R: Read>(source: &str, reader: R) -> Result<Vec<PricePoint>> {
  let mut rdr = csv::ReaderBuilder::new()
    .delimiter(b',')
    .has_headers(true)
    .flexible(true)
    .trim(csv::Trim::All)
    .from_reader(reader);

  let n_headers = rdr
    .headers()
    .map_err(|e| FrontierError::parse(source, e.to_string()))?
    .len();
  if n_headers != 3 {
    return Err(FrontierError::parse(
      source,
      format!("expected 3 columns (ticker, date, close), found {n_headers}"),
    ));
  }

  let mut points = Vec::new();
  for (idx, record) in rdr.records().enumerate() {
    // header is row 1
    let row = idx + 2;
    let record = record.map_err(|e| FrontierError::parse(source, e.to_string()))?;
    if record.len() != 3 {
      return Err(FrontierError::parse(
        source,
        format!("row {row}: expected 3 columns, found {}", record.len()),
      ));
    }

    let ticker = record[0].to_string();
    if ticker.is_empty() {
      return Err(FrontierError::parse(source, format!("row {row}: empty ticker")));
    }
    let date = parse_row_date(source, row, &record[1])?;
    let close = parse_close(source, row, &record[2])?;
    points.push(PricePoint::new(ticker, date, close));
  }

  Ok(points)
}

fn read_mfd<R: Read>(source: &str, reader: R) -> Result<Vec<PricePoint>> {
  let mut rdr = csv::ReaderBuilder::new()
    .delimiter(b';')
    .has_headers(true)
    .flexible(true)
    .trim(csv::Trim::All)
    .from_reader(reader);

  let headers = rdr
    .headers()
    .map_err(|e| FrontierError::parse(source, e.to_string()))?
    .clone();
  let column = |name: &str| {
    headers
      .iter()
      .position(|h| h.eq_ignore_ascii_case(name))
      .ok_or_else(|| FrontierError::parse(source, format!("missing {name} column")))
  };
  let ticker_col = column("<TICKER>")?;
  let date_col = column("<DATE>")?;
  let close_col = column("<CLOSE>")?;

  let mut points = Vec::new();
  for (idx, record) in rdr.records().enumerate() {
    let row = idx + 2;
    let record = record.map_err(|e| FrontierError::parse(source, e.to_string()))?;
    if record.len() != headers.len() {
      return Err(FrontierError::parse(
        source,
        format!("row {row}: expected {} columns, found {}", headers.len(), record.len()),
      ));
    }

    let date = parse_row_date(source, row, &record[date_col])?;
    let close = parse_close(source, row, &record[close_col])?;
    points.push(PricePoint::new(&record[ticker_col], date, close));
  }

  Ok(points)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn reads_three_column_csv() {
    let raw = "TICKER,DATE,CLOSE\nAAA,2024-01-03,101.5\nAAA,2024-01-02,100\n";
    let table = PriceTable::from_reader("aaa.csv", raw.as_bytes(), PriceFormat::Csv).unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.points()[0].date, date(2024, 1, 2));
    assert_eq!(table.tickers(), vec!["AAA"]);
    assert_eq!(
      table.date_range(),
      DateRange {
        start: date(2024, 1, 2),
        end: date(2024, 1, 3)
      }
    );
  }

  #[test]
  fn header_names_are_ignored() {
    let raw = "sym,day,px\nBBB,03.01.2024,10\n";
    let table = PriceTable::from_reader("b.csv", raw.as_bytes(), PriceFormat::Csv).unwrap();
    assert_eq!(table.points()[0].date, date(2024, 1, 3));
  }

  #[test]
  fn rejects_wrong_column_count() {
    let raw = "TICKER;DATE;CLOSE\nAAA;2024-01-02;1\n";
    let err = PriceTable::from_reader("semi.csv", raw.as_bytes(), PriceFormat::Csv).unwrap_err();
    assert!(matches!(err, FrontierError::Parse { .. }));
    assert!(err.to_string().contains("semi.csv"));
  }

  #[test]
  fn rejects_bad_dates_and_prices() {
    let bad_date = "T,D,C\nAAA,yesterday,1\n";
    let bad_close = "T,D,C\nAAA,2024-01-02,-3\n";
    let nan_close = "T,D,C\nAAA,2024-01-02,abc\n";

    for raw in [bad_date, bad_close, nan_close] {
      let res = PriceTable::from_reader("x.csv", raw.as_bytes(), PriceFormat::Csv);
      assert!(matches!(res, Err(FrontierError::Parse { .. })), "{raw}");
    }
  }

  #[test]
  fn rejects_empty_and_duplicate_rows() {
    let empty = "T,D,C\n";
    let dup = "T,D,C\nAAA,2024-01-02,1\nAAA,2024-01-02,2\n";

    assert!(PriceTable::from_reader("e.csv", empty.as_bytes(), PriceFormat::Csv).is_err());
    assert!(PriceTable::from_reader("d.csv", dup.as_bytes(), PriceFormat::Csv).is_err());
  }

  #[test]
  fn reads_mfd_export() {
    let raw = "<TICKER>;<PER>;<DATE>;<TIME>;<CLOSE>;<VOL>\n\
               LKOH;D;20240102;000000;7000.5;1200\n\
               LKOH;D;20240103;000000;7010;900\n";
    let table = PriceTable::from_reader("lkoh.csv", raw.as_bytes(), PriceFormat::Mfd).unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.points()[1].close, 7010.0);
    assert_eq!(table.points()[0].ticker, "LKOH");
  }

  #[test]
  fn mfd_without_close_column_fails() {
    let raw = "<TICKER>;<DATE>\nLKOH;20240102\n";
    assert!(PriceTable::from_reader("l.csv", raw.as_bytes(), PriceFormat::Mfd).is_err());
  }

  #[test]
  fn parse_date_ignores_time_part() {
    assert_eq!(parse_date("2024-02-29 00:00:00"), Some(date(2024, 2, 29)));
    assert_eq!(parse_date("2024-02-29T10:00:00"), Some(date(2024, 2, 29)));
    assert_eq!(parse_date("02/29/2024"), Some(date(2024, 2, 29)));
    assert_eq!(parse_date("not a date"), None);
  }

  #[test]
  fn common_range_is_an_explicit_fold() {
    let a = PriceTable::new(
      "a",
      vec![
        PricePoint::new("A", date(2024, 1, 1), 1.0),
        PricePoint::new("A", date(2024, 3, 1), 1.0),
      ],
    )
    .unwrap();
    let b = PriceTable::new(
      "b",
      vec![
        PricePoint::new("B", date(2024, 2, 1), 1.0),
        PricePoint::new("B", date(2024, 4, 1), 1.0),
      ],
    )
    .unwrap();
    let c = PriceTable::new("c", vec![PricePoint::new("C", date(2025, 1, 1), 1.0)]).unwrap();

    assert_eq!(common_date_range(&[]), None);
    assert_eq!(
      common_date_range(&[a.clone(), b.clone()]),
      Some(DateRange {
        start: date(2024, 2, 1),
        end: date(2024, 3, 1)
      })
    );
    assert_eq!(common_date_range(&[a, b, c]), None);
  }

  #[test]
  fn common_range_folds_over_tickers_within_a_file() {
    let mut points: Vec<PricePoint> = (1..=31)
      .map(|d| PricePoint::new("AAA", date(2024, 1, d), 1.0))
      .collect();
    points.extend((20..=31).map(|d| PricePoint::new("BBB", date(2024, 1, d), 1.0)));
    let ab = PriceTable::new("ab", points).unwrap();
    let c = PriceTable::new(
      "c",
      (1..=31)
        .map(|d| PricePoint::new("CCC", date(2024, 1, d), 1.0))
        .collect(),
    )
    .unwrap();

    let ranges = ab.ticker_ranges();
    assert_eq!(ranges.len(), 2);
    assert_eq!(ranges[1].0, "BBB");
    assert_eq!(ranges[1].1.start, date(2024, 1, 20));
    assert_eq!(
      common_date_range(&[ab, c]),
      Some(DateRange {
        start: date(2024, 1, 20),
        end: date(2024, 1, 31)
      })
    );
  }

  #[test]
  fn format_names_are_strict() {
    assert_eq!(PriceFormat::from_str("csv", true), Ok(PriceFormat::Csv));
    assert_eq!(PriceFormat::from_str("MFD", true), Ok(PriceFormat::Mfd));
    assert_eq!(PriceFormat::from_str("finam", true), Ok(PriceFormat::Mfd));
    assert!(PriceFormat::from_str("xml", true).is_err());
  }

  #[test]
  fn clip_keeps_rows_inside_range() {
    let table = PriceTable::new(
      "a",
      (1..=5)
        .map(|d| PricePoint::new("A", date(2024, 1, d), d as f64))
        .collect(),
    )
    .unwrap();
    let range = DateRange::new(date(2024, 1, 2), date(2024, 1, 4)).unwrap();

    assert_eq!(table.clip(&range).unwrap().len(), 3);
    let outside = DateRange::new(date(2023, 1, 1), date(2023, 1, 2)).unwrap();
    assert!(table.clip(&outside).is_none());
  }

  #[test]
  fn skip_days_shrinks_range() {
    let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 20)).unwrap();
    assert_eq!(range.skip_days(10).unwrap().start, date(2024, 1, 11));
    assert!(range.skip_days(19).is_some());
    assert!(range.skip_days(20).is_none());
    assert_eq!(range.span_days(), 19);
  }
}
