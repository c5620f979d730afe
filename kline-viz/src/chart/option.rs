use super::ChartKind;
use crate::{
    error::TransformError,
    model::OhlcvRecord,
    transform::{
        ChartRow, MaPoint, moving_average, to_candlestick_series, to_chart_rows, to_line_series,
    },
};
use chrono::{DateTime, FixedOffset, Local, Utc};
use serde_json::{Value, json};

/// Title rendered instead of a chart when there is nothing to draw.
pub const PLACEHOLDER_TITLE: &str = "No data";

/// Zoom window as percentages of the full time range: the most recent half is visible.
pub const DEFAULT_ZOOM_START: f64 = 50.0;
pub const DEFAULT_ZOOM_END: f64 = 100.0;

const RISING_COLOR: &str = "#ef4444";
const FALLING_COLOR: &str = "#10b981";
const LINE_COLOR: &str = "#3b82f6";
const MA_COLORS: [&str; 3] = ["#3b82f6", "#f59e0b", "#8b5cf6"];

/// Moving-average line drawn on top of the price series.
#[derive(Debug, Clone, PartialEq)]
pub struct MaOverlay {
    pub window: usize,
    /// Aligned index-for-index with the records the chart is built from.
    pub points: Vec<MaPoint>,
}

impl MaOverlay {
    pub fn compute(records: &[OhlcvRecord], window: usize) -> Result<Self, TransformError> {
        Ok(Self {
            window,
            points: moving_average(records, window)?,
        })
    }

    pub fn name(&self) -> String {
        format!("MA{}", self.window)
    }
}

/// Render the tooltip for one point: localized time plus the OHLCV fields (candlestick) or
/// the close price (line), one per line.
pub fn format_tooltip(kind: ChartKind, row: &ChartRow, offset: &FixedOffset) -> String {
    let time = DateTime::<Utc>::from_timestamp_millis(row.time)
        .map(|time| {
            time.with_timezone(offset)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| row.time.to_string());

    match kind {
        ChartKind::Candlestick => [
            format!("Time: {time}"),
            format!("Open: {}", row.open),
            format!("Close: {}", row.close),
            format!("Low: {}", row.low),
            format!("High: {}", row.high),
            format!("Volume: {}", row.volume),
        ]
        .join("\n"),
        ChartKind::Line => [format!("Time: {time}"), format!("Price: {}", row.close)].join("\n"),
    }
}

/// Builder for a price chart option.
#[derive(Debug, Clone)]
pub struct ChartOptionBuilder {
    kind: ChartKind,
    title: Option<String>,
    overlays: Vec<MaOverlay>,
    tooltip_offset: FixedOffset,
    zoom_start: f64,
}

impl ChartOptionBuilder {
    pub fn new(kind: ChartKind) -> Self {
        Self {
            kind,
            title: None,
            overlays: Vec::new(),
            tooltip_offset: *Local::now().offset(),
            zoom_start: DEFAULT_ZOOM_START,
        }
    }

    /// Instrument shown in the chart title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn overlay(mut self, overlay: MaOverlay) -> Self {
        self.overlays.push(overlay);
        self
    }

    pub fn overlays(mut self, overlays: impl IntoIterator<Item = MaOverlay>) -> Self {
        self.overlays.extend(overlays);
        self
    }

    /// Timezone tooltips are rendered in; defaults to the local one.
    pub fn tooltip_offset(mut self, offset: FixedOffset) -> Self {
        self.tooltip_offset = offset;
        self
    }

    /// Start of the initially visible window in percent of the range.
    pub fn zoom_start(mut self, percent: f64) -> Self {
        self.zoom_start = percent.clamp(0.0, DEFAULT_ZOOM_END);
        self
    }

    pub fn build(&self, records: &[OhlcvRecord]) -> Value {
        if records.is_empty() {
            return placeholder_option();
        }

        let rows = to_chart_rows(records);
        let tooltips = rows
            .iter()
            .map(|row| format_tooltip(self.kind, row, &self.tooltip_offset))
            .collect::<Vec<_>>();

        let (series_name, price_series) = match self.kind {
            ChartKind::Candlestick => {
                let data = to_candlestick_series(records)
                    .into_iter()
                    .zip(&tooltips)
                    .map(|(point, tooltip)| json!({ "name": tooltip, "value": point }))
                    .collect::<Vec<_>>();
                (
                    "Kline",
                    json!({
                        "name": "Kline",
                        "type": "candlestick",
                        "data": data,
                        "itemStyle": {
                            "color": RISING_COLOR,
                            "color0": FALLING_COLOR,
                            "borderColor": RISING_COLOR,
                            "borderColor0": FALLING_COLOR
                        }
                    }),
                )
            }
            ChartKind::Line => {
                let data = to_line_series(records)
                    .into_iter()
                    .zip(&tooltips)
                    .map(|(point, tooltip)| json!({ "name": tooltip, "value": point }))
                    .collect::<Vec<_>>();
                (
                    "Close",
                    json!({
                        "name": "Close",
                        "type": "line",
                        "data": data,
                        "smooth": true,
                        "lineStyle": { "color": LINE_COLOR }
                    }),
                )
            }
        };

        let overlays = self
            .overlays
            .iter()
            .zip(MA_COLORS.iter().cycle())
            .map(|(overlay, color)| overlay_series(overlay, &rows, color));

        let series = std::iter::once(price_series)
            .chain(overlays)
            .collect::<Vec<_>>();

        let legend = std::iter::once(series_name.to_string())
            .chain(self.overlays.iter().map(MaOverlay::name))
            .collect::<Vec<_>>();

        let title = match &self.title {
            Some(title) => format!("{title} - {}", self.kind.label()),
            None => self.kind.label().to_string(),
        };

        json!({
            "title": { "text": title, "left": "left" },
            "legend": { "data": legend, "top": 30 },
            "tooltip": {
                "trigger": "item",
                "formatter": "{b}",
                "axisPointer": { "type": "cross" },
                "extraCssText": "white-space: pre-line;"
            },
            "xAxis": {
                "type": "time",
                "scale": true,
                "boundaryGap": false,
                "axisLine": { "onZero": false },
                "splitLine": { "show": false },
                "splitNumber": 20,
                "min": "dataMin",
                "max": "dataMax"
            },
            "yAxis": {
                "scale": true,
                "splitArea": { "show": true }
            },
            "dataZoom": zoom_controls(self.zoom_start),
            "grid": { "left": "10%", "right": "10%", "bottom": "15%" },
            "series": series
        })
    }
}

fn overlay_series(overlay: &MaOverlay, rows: &[ChartRow], color: &str) -> Value {
    let data = rows
        .iter()
        .zip(&overlay.points)
        .map(|(row, point)| json!([row.time, point]))
        .collect::<Vec<_>>();

    json!({
        "name": overlay.name(),
        "type": "line",
        "data": data,
        "smooth": true,
        "showSymbol": false,
        "lineStyle": { "opacity": 0.8, "width": 1 },
        "itemStyle": { "color": color }
    })
}

pub(super) fn zoom_controls(start: f64) -> Value {
    json!([
        { "type": "inside", "start": start, "end": DEFAULT_ZOOM_END },
        { "show": true, "type": "slider", "top": "90%", "start": start, "end": DEFAULT_ZOOM_END }
    ])
}

pub(super) fn placeholder_option() -> Value {
    json!({
        "title": { "text": PLACEHOLDER_TITLE, "left": "center", "top": "center" },
        "series": []
    })
}

/// Build the option for `records` drawn as `kind`, with optional moving-average overlays.
///
/// Never fails: an empty input yields a placeholder title and no series data.
pub fn build_chart_option(
    kind: ChartKind,
    records: &[OhlcvRecord],
    ma_series: Option<&[MaOverlay]>,
) -> Value {
    ChartOptionBuilder::new(kind)
        .overlays(ma_series.unwrap_or_default().iter().cloned())
        .build(records)
}
