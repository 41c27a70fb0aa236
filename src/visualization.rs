//! # Visualization
//!
//! $$
//! \{\mathbf{w}_s\}_{s\le S} \cup \{\mathbf{w}_{\min}, \mathbf{w}_{r^\*}\} \mapsto
//! \big(\sigma^{\text{ann}}(\mathbf{w}), \mu^{\text{ann}}(\mathbf{w})\big) \text{ scatter}
//! $$
//!
//! Risk/return scatter of the random portfolios and both optima, rendered with plotly.

use std::path::Path;

use plotly::Layout;
use plotly::Plot;
use plotly::Scatter;
use plotly::common::Marker;
use plotly::common::Mode;
use plotly::common::Title;
use plotly::layout::Axis;
use plotly::layout::Margin;
use tracing::info;

use crate::error::FrontierError;
use crate::error::Result;
use crate::portfolio::engine::FrontierReport;
use crate::portfolio::types::FrontierPoint;
use crate::portfolio::types::OptimizationResult;

pub const SAMPLE_LABEL: &str = "possible portfolio";
pub const GLOBAL_LABEL: &str = "least risky";

/// Legend label of the return-constrained optimum.
pub fn constrained_label(required_return: f64) -> String {
  format!("least risky with return >= {required_return:.2}")
}

/// Builder for the risk/return chart of one [`FrontierReport`].
pub struct FrontierPlotter {
  title: Option<String>,
  sample_marker_size: usize,
  optimum_marker_size: usize,
  width: usize,
  height: usize,
  show_legend: bool,
}

impl Default for FrontierPlotter {
  fn default() -> Self {
    Self::new()
  }
}

impl FrontierPlotter {
  pub fn new() -> Self {
    Self {
      title: None,
      sample_marker_size: 4,
      optimum_marker_size: 12,
      width: 960,
      height: 640,
      show_legend: true,
    }
  }

  /// Replace the default `Efficient frontier at {date}` title.
  pub fn title(mut self, title: &str) -> Self {
    self.title = Some(title.into());
    self
  }

  pub fn sample_marker_size(mut self, size: usize) -> Self {
    self.sample_marker_size = size;
    self
  }

  pub fn optimum_marker_size(mut self, size: usize) -> Self {
    self.optimum_marker_size = size;
    self
  }

  pub fn width(mut self, width: usize) -> Self {
    self.width = width;
    self
  }

  pub fn height(mut self, height: usize) -> Self {
    self.height = height;
    self
  }

  pub fn show_legend(mut self, show: bool) -> Self {
    self.show_legend = show;
    self
  }

  fn optimum_trace(&self, point: FrontierPoint, label: &str, color: &'static str) -> Box<Scatter<f64, f64>> {
    Scatter::new(vec![point.volatility], vec![point.expected_return])
      .mode(Mode::Markers)
      .name(label)
      .show_legend(self.show_legend)
      .marker(Marker::new().size(self.optimum_marker_size).color(color))
  }

  pub fn plot(self, report: &FrontierReport) -> Plot {
    let title = self
      .title
      .clone()
      .unwrap_or_else(|| format!("Efficient frontier at {}", report.date));

    let mut plot = Plot::new();
    plot.set_layout(
      Layout::new()
        .title(Title::from(title.as_str()))
        .width(self.width)
        .height(self.height)
        .show_legend(self.show_legend)
        .margin(Margin::new().left(64).right(24).top(72).bottom(56))
        .x_axis(Axis::new().title(Title::from("Risk (annualized)")))
        .y_axis(Axis::new().title(Title::from("Return (annualized)"))),
    );

    plot.add_trace(
      Scatter::new(report.sample.volatility.to_vec(), report.sample.expected_return.to_vec())
        .mode(Mode::Markers)
        .name(SAMPLE_LABEL)
        .show_legend(self.show_legend)
        .marker(Marker::new().size(self.sample_marker_size)),
    );

    match report.global_point {
      Some(point) => plot.add_trace(self.optimum_trace(point, GLOBAL_LABEL, "red")),
      None => log_omitted(GLOBAL_LABEL, &report.global_minimum),
    }

    let label = constrained_label(report.required_return);
    match report.constrained_point {
      Some(point) => plot.add_trace(self.optimum_trace(point, &label, "green")),
      None => log_omitted(&label, &report.constrained_minimum),
    }

    plot
  }
}

fn log_omitted(label: &str, result: &OptimizationResult) {
  info!(
    portfolio = label,
    iterations = result.iterations,
    "optimization did not converge ({}), omitting it from the chart",
    result.message
  );
}

/// Chart with the default styling.
pub fn frontier_chart(report: &FrontierReport) -> Plot {
  FrontierPlotter::new().plot(report)
}

/// Render the default chart to a standalone HTML file.
pub fn write_frontier_html<P: AsRef<Path>>(report: &FrontierReport, path: P) -> Result<()> {
  let html = frontier_chart(report).to_html();
  std::fs::write(path.as_ref(), html).map_err(|e| FrontierError::Io {
    path: path.as_ref().display().to_string(),
    source: e,
  })
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use ndarray::array;
  use tracing_test::traced_test;

  use super::*;
  use crate::portfolio::engine::FrontierEngine;
  use crate::portfolio::engine::FrontierEngineConfig;
  use crate::portfolio::estimator::RollingEstimate;

  fn report(required_return: Option<f64>) -> FrontierReport {
    let engine = FrontierEngine::new(FrontierEngineConfig {
      n_samples: 50,
      seed: Some(3),
      ..Default::default()
    })
    .unwrap();
    let estimate = RollingEstimate {
      date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
      covariance: array![[0.0004, 0.00005], [0.00005, 0.0009]],
      mean: array![0.001, 0.002],
    };
    engine
      .optimize(vec!["AAA".into(), "BBB".into()], estimate, required_return)
      .unwrap()
  }

  #[test]
  fn chart_has_cloud_and_both_optima() {
    let json = frontier_chart(&report(Some(0.05))).to_json();

    assert!(json.contains(SAMPLE_LABEL));
    assert!(json.contains("least risky with return >= 0.05"));
    assert!(json.contains("Risk (annualized)"));
    assert!(json.contains("Return (annualized)"));
    assert!(json.contains("Efficient frontier at 2024-03-01"));
  }

  #[test]
  fn missing_required_return_plots_the_zero_floor() {
    let r = report(None);
    assert!(r.constrained_point.is_some());

    let json = frontier_chart(&r).to_json();
    assert!(json.contains(GLOBAL_LABEL));
    assert!(json.contains("least risky with return >= 0.00"));
  }

  #[traced_test]
  #[test]
  fn unreachable_return_is_omitted_and_logged() {
    let r = report(Some(5.0));
    assert!(r.constrained_point.is_none());

    let json = frontier_chart(&r).to_json();
    assert!(json.contains(SAMPLE_LABEL));
    assert!(json.contains(GLOBAL_LABEL));
    assert!(!json.contains("with return"));
    assert!(logs_contain("omitting it from the chart"));
  }

  #[test]
  fn custom_title_overrides_default() {
    let json = FrontierPlotter::new()
      .title("My frontier")
      .width(400)
      .plot(&report(None))
      .to_json();
    assert!(json.contains("My frontier"));
    assert!(!json.contains("Efficient frontier at"));
  }

  #[test]
  fn writes_html_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frontier.html");
    write_frontier_html(&report(None), &path).unwrap();

    let html = std::fs::read_to_string(&path).unwrap();
    assert!(html.contains("<html"));
    assert!(html.contains(SAMPLE_LABEL));
  }
}
