//! # mpt-frontier
//!
//! $$
//! \min_{\mathbf{w}\ge 0,\ \mathbf{1}^\top\mathbf{w}=1} \mathbf{w}^\top\hat\Sigma_t\mathbf{w}
//! $$
//!
//! Modern-Portfolio-Theory efficient frontiers from historical closing prices.
//!
//! ```ignore
//! use mpt_frontier::portfolio::FrontierEngine;
//! use mpt_frontier::portfolio::FrontierEngineConfig;
//! use mpt_frontier::portfolio::PriceFormat;
//! use mpt_frontier::portfolio::PriceTable;
//!
//! let tables = vec![
//!   PriceTable::from_path("AAA.csv", PriceFormat::Csv)?,
//!   PriceTable::from_path("BBB.csv", PriceFormat::Csv)?,
//! ];
//! let engine = FrontierEngine::new(FrontierEngineConfig::default())?;
//! let range = engine.query_range(&tables)?;
//! let report = engine.query(&tables, range.end, Some(0.1))?;
//! mpt_frontier::visualization::write_frontier_html(&report, "frontier.html")?;
//! ```

pub mod error;
pub mod optimize;
pub mod portfolio;
pub mod visualization;

pub use error::ErrorKind;
pub use error::FrontierError;
pub use error::Result;
