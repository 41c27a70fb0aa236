//! # Errors
//!
//! $$
//! \text{query} \mapsto \text{Ok}(\text{report}) \mid \text{Parse} \mid \text{Range} \mid \text{Convergence} \mid \text{Engine}
//! $$
//!
//! Failure taxonomy for the frontier pipeline.

use std::fmt::Display;

use chrono::NaiveDate;
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, FrontierError>;

/// Coarse classification of a [`FrontierError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
  /// A single input file could not be read; the rest of the batch proceeds.
  Parse,
  /// Not enough input, no usable common timeframe, or a date outside the lookup window.
  Range,
  /// An optimization problem did not converge.
  Convergence,
  /// Anything else raised inside the pipeline.
  Engine,
}

impl Display for ErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ErrorKind::Parse => write!(f, "parse error"),
      ErrorKind::Range => write!(f, "range error"),
      ErrorKind::Convergence => write!(f, "convergence failure"),
      ErrorKind::Engine => write!(f, "engine failure"),
    }
  }
}

/// Errors produced while loading prices or answering a frontier query.
#[derive(Debug, Error)]
pub enum FrontierError {
  /// Malformed price file.
  #[error("could not parse {source_name}: {reason}")]
  Parse {
    /// File name or other label of the offending input
    source_name: String,
    /// What was wrong with it
    reason: String,
  },

  /// Fewer than two asset tables survived parsing.
  #[error("at least 2 asset tables are required, got {0}")]
  InsufficientInput(usize),

  /// The assets do not share enough calendar days.
  #[error("no common timeframe of at least {required_days} days across all assets")]
  NoCommonTimeframe {
    /// Minimum overlap in calendar days
    required_days: i64,
  },

  /// Query date outside the selectable range.
  #[error("date {date} is outside the selectable range {start} to {end}")]
  DateOutOfRange {
    /// Requested date
    date: NaiveDate,
    /// Earliest selectable date
    start: NaiveDate,
    /// Latest selectable date
    end: NaiveDate,
  },

  /// No rolling estimate exists for the date.
  #[error("no rolling estimate at {date}: {reason}")]
  Lookup {
    /// Requested date
    date: NaiveDate,
    /// Why the estimate is missing
    reason: String,
  },

  /// An optimization problem failed to converge.
  #[error("{problem} did not converge: {reason}")]
  Convergence {
    /// Which problem failed
    problem: String,
    /// Solver exit message
    reason: String,
  },

  /// Two input tables disagree on the same observation.
  #[error("duplicate observation for {ticker} on {date}")]
  DuplicateObservation {
    /// Ticker of the duplicated row
    ticker: String,
    /// Date of the duplicated row
    date: NaiveDate,
  },

  /// Engine configuration rejected.
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  /// Failure inside the numerical routines.
  #[error("numerical failure: {0}")]
  Numerical(String),

  /// Writing an output file failed.
  #[error("could not write {path}: {source}")]
  Io {
    /// Destination path
    path: String,
    /// Underlying I/O error
    source: std::io::Error,
  },
}

impl FrontierError {
  pub(crate) fn parse(source_name: &str, reason: impl Into<String>) -> Self {
    Self::Parse {
      source_name: source_name.to_string(),
      reason: reason.into(),
    }
  }

  /// Classify the error.
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Parse { .. } => ErrorKind::Parse,
      Self::InsufficientInput(_)
      | Self::NoCommonTimeframe { .. }
      | Self::DateOutOfRange { .. }
      | Self::Lookup { .. } => ErrorKind::Range,
      Self::Convergence { .. } => ErrorKind::Convergence,
      Self::DuplicateObservation { .. }
      | Self::InvalidConfig(_)
      | Self::Numerical(_)
      | Self::Io { .. } => ErrorKind::Engine,
    }
  }
}

impl From<anyhow::Error> for FrontierError {
  fn from(err: anyhow::Error) -> Self {
    Self::Numerical(err.to_string())
  }
}
