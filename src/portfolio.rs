//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Price input, rolling estimation and the efficient-frontier engine.

pub mod data;
pub mod engine;
pub mod estimator;
pub mod model;
pub mod optimizers;
pub mod prices;
pub mod types;

pub use data::ReturnMatrix;
pub use data::simple_returns;
pub use engine::FrontierEngine;
pub use engine::FrontierEngineConfig;
pub use engine::FrontierReport;
pub use estimator::RollingEstimate;
pub use estimator::RollingEstimator;
pub use model::PortfolioModel;
pub use model::TRADING_DAYS_PER_YEAR;
pub use model::annualize_return;
pub use model::annualize_volatility;
pub use model::deannualize_return;
pub use model::periods_per_year;
pub use optimizers::MinimumVariance;
pub use optimizers::constrained_minimum_variance;
pub use optimizers::global_minimum_variance;
pub use optimizers::random_simplex_weights;
pub use optimizers::sample_frontier;
pub use prices::DateRange;
pub use prices::PriceFormat;
pub use prices::PricePoint;
pub use prices::PriceTable;
pub use prices::common_date_range;
pub use types::FrontierPoint;
pub use types::FrontierSample;
pub use types::OptimizationResult;
pub use types::is_valid_weight_vector;
