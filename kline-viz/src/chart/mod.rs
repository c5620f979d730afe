//! Declarative chart configuration (ECharts option objects) built from transformed series.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

mod demo;
mod option;
mod view;

pub use demo::{DEMO_MA_WINDOWS, demo_chart_option, demo_records};
pub use option::{
    ChartOptionBuilder, DEFAULT_ZOOM_END, DEFAULT_ZOOM_START, MaOverlay, PLACEHOLDER_TITLE,
    build_chart_option, format_tooltip,
};
pub use view::ChartView;

/// How a price series is drawn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    #[default]
    #[display("candlestick")]
    Candlestick,
    #[display("line")]
    Line,
}

impl ChartKind {
    /// The other kind; the chart-type toggle only ever flips between the two.
    pub fn toggled(self) -> Self {
        match self {
            ChartKind::Candlestick => ChartKind::Line,
            ChartKind::Line => ChartKind::Candlestick,
        }
    }

    /// Title suffix shown next to the instrument.
    pub fn label(&self) -> &'static str {
        match self {
            ChartKind::Candlestick => "Candlestick",
            ChartKind::Line => "Line",
        }
    }
}

impl FromStr for ChartKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "candlestick" | "candle" | "kline" => Ok(ChartKind::Candlestick),
            "line" => Ok(ChartKind::Line),
            other => Err(format!("unknown chart kind: {other}")),
        }
    }
}
