use super::{ChartKind, ChartOptionBuilder, MaOverlay};
use crate::model::OhlcvRecord;
use chrono::FixedOffset;
use serde_json::Value;
use tracing::{debug, warn};

/// Chart-type state machine plus render settings.
///
/// Two states, [`ChartKind::Candlestick`] and [`ChartKind::Line`], switched only by explicit
/// user action. Switching never touches the data source; the next [`Self::option`] call
/// re-renders the same records.
#[derive(Debug, Clone)]
pub struct ChartView {
    kind: ChartKind,
    title: Option<String>,
    ma_windows: Vec<usize>,
    tooltip_offset: Option<FixedOffset>,
}

impl Default for ChartView {
    fn default() -> Self {
        Self::new(ChartKind::default())
    }
}

impl ChartView {
    pub fn new(kind: ChartKind) -> Self {
        Self {
            kind,
            title: None,
            ma_windows: Vec::new(),
            tooltip_offset: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Moving averages overlaid on every render, one per window.
    pub fn with_ma_windows(mut self, windows: impl IntoIterator<Item = usize>) -> Self {
        self.ma_windows = windows.into_iter().collect();
        self
    }

    pub fn with_tooltip_offset(mut self, offset: FixedOffset) -> Self {
        self.tooltip_offset = Some(offset);
        self
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn kind(&self) -> ChartKind {
        self.kind
    }

    /// Returns whether the kind changed.
    pub fn set_kind(&mut self, kind: ChartKind) -> bool {
        let changed = self.kind != kind;
        if changed {
            debug!(from = %self.kind, to = %kind, "chart kind changed");
            self.kind = kind;
        }
        changed
    }

    pub fn toggle(&mut self) -> ChartKind {
        self.set_kind(self.kind.toggled());
        self.kind
    }

    /// Render `records` in the current state; transforms are recomputed on every call.
    pub fn option(&self, records: &[OhlcvRecord]) -> Value {
        let overlays = self
            .ma_windows
            .iter()
            .filter_map(|window| match MaOverlay::compute(records, *window) {
                Ok(overlay) => Some(overlay),
                Err(error) => {
                    warn!(window, %error, "skipping moving average overlay");
                    None
                }
            })
            .collect::<Vec<_>>();

        let mut builder = ChartOptionBuilder::new(self.kind).overlays(overlays);
        if let Some(title) = &self.title {
            builder = builder.title(title.clone());
        }
        if let Some(offset) = self.tooltip_offset {
            builder = builder.tooltip_offset(offset);
        }

        builder.build(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::PLACEHOLDER_TITLE;
    use chrono::{TimeZone, Utc};

    fn records() -> Vec<OhlcvRecord> {
        (0..3)
            .map(|day| OhlcvRecord {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1 + day, 0, 0, 0).unwrap(),
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5 + day as f64,
                volume: 10.0,
            })
            .collect()
    }

    #[test]
    fn test_toggle_flips_between_two_states() {
        let mut view = ChartView::default();
        assert_eq!(view.kind(), ChartKind::Candlestick);
        assert_eq!(view.toggle(), ChartKind::Line);
        assert_eq!(view.toggle(), ChartKind::Candlestick);
        assert!(!view.set_kind(ChartKind::Candlestick));
        assert!(view.set_kind(ChartKind::Line));
    }

    #[test]
    fn test_toggle_re_renders_same_records() {
        let records = records();
        let mut view = ChartView::new(ChartKind::Candlestick).with_title("IF2403");

        let candles = view.option(&records);
        view.toggle();
        let line = view.option(&records);

        assert_eq!(candles["series"][0]["type"], "candlestick");
        assert_eq!(line["series"][0]["type"], "line");
        assert_eq!(line["title"]["text"], "IF2403 - Line");
        assert_eq!(
            candles["series"][0]["data"].as_array().unwrap().len(),
            line["series"][0]["data"].as_array().unwrap().len()
        );
    }

    #[test]
    fn test_invalid_ma_window_is_skipped_not_fatal() {
        let view = ChartView::default().with_ma_windows([0, 2]);
        let option = view.option(&records());

        let series = option["series"].as_array().unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[1]["name"], "MA2");
    }

    #[test]
    fn test_empty_records_render_placeholder() {
        let option = ChartView::default().with_ma_windows([5]).option(&[]);
        assert_eq!(option["title"]["text"], PLACEHOLDER_TITLE);
    }
}
