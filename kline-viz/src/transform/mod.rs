//! Pure transforms from [`OhlcvRecord`]s into renderable chart series.
//!
//! Every function here is recomputed from scratch on each render: same input, same output, no
//! shared state. Numeric fields are never validated, so a `NaN` in the input surfaces as a
//! `NaN` in the output.

use crate::{error::TransformError, model::OhlcvRecord};
use serde::{Serialize, Serializer, ser::SerializeTuple};

/// Candlestick point in ECharts order: `[time, open, close, low, high]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandlePoint {
    pub time: i64,
    pub open: f64,
    pub close: f64,
    pub low: f64,
    pub high: f64,
}

/// Line point: `[time, close]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinePoint {
    pub time: i64,
    pub close: f64,
}

/// Full positional row `[time, open, close, low, high, volume]`, the wire layout of
/// `/futures/chart-data`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartRow {
    pub time: i64,
    pub open: f64,
    pub close: f64,
    pub low: f64,
    pub high: f64,
    pub volume: f64,
}

/// One position of a moving-average series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaPoint {
    /// Fewer than `window` records are available at this index.
    Unavailable,
    Value(f64),
}

impl MaPoint {
    pub fn value(&self) -> Option<f64> {
        match self {
            MaPoint::Unavailable => None,
            MaPoint::Value(value) => Some(*value),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, MaPoint::Value(_))
    }
}

/// ECharts renders `"-"` as a gap in a line series.
pub const UNAVAILABLE_MARKER: &str = "-";

impl Serialize for MaPoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            MaPoint::Unavailable => serializer.serialize_str(UNAVAILABLE_MARKER),
            MaPoint::Value(value) => serializer.serialize_f64(*value),
        }
    }
}

// serde_json writes non-finite floats as null, which ECharts also treats as a gap
fn serialize_tuple<S: Serializer>(
    serializer: S,
    time: i64,
    values: &[f64],
) -> Result<S::Ok, S::Error> {
    let mut tuple = serializer.serialize_tuple(values.len() + 1)?;
    tuple.serialize_element(&time)?;
    for value in values {
        tuple.serialize_element(value)?;
    }
    tuple.end()
}

impl Serialize for CandlePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_tuple(
            serializer,
            self.time,
            &[self.open, self.close, self.low, self.high],
        )
    }
}

impl Serialize for LinePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_tuple(serializer, self.time, &[self.close])
    }
}

impl Serialize for ChartRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_tuple(
            serializer,
            self.time,
            &[self.open, self.close, self.low, self.high, self.volume],
        )
    }
}

/// Map records into candlestick points, preserving length and order.
pub fn to_candlestick_series(records: &[OhlcvRecord]) -> Vec<CandlePoint> {
    records
        .iter()
        .map(|record| CandlePoint {
            time: record.timestamp_millis(),
            open: record.open,
            close: record.close,
            low: record.low,
            high: record.high,
        })
        .collect()
}

/// Project records onto `(time, close)`, preserving length and order.
pub fn to_line_series(records: &[OhlcvRecord]) -> Vec<LinePoint> {
    records
        .iter()
        .map(|record| LinePoint {
            time: record.timestamp_millis(),
            close: record.close,
        })
        .collect()
}

/// Map records into full six-field rows, preserving length and order.
pub fn to_chart_rows(records: &[OhlcvRecord]) -> Vec<ChartRow> {
    records
        .iter()
        .map(|record| ChartRow {
            time: record.timestamp_millis(),
            open: record.open,
            close: record.close,
            low: record.low,
            high: record.high,
            volume: record.volume,
        })
        .collect()
}

/// Simple moving average of closes over the trailing `window` records (current index
/// included), rounded to 2 decimal places.
///
/// The output is aligned index-for-index with `records`; the first `window - 1` positions
/// are [`MaPoint::Unavailable`].
pub fn moving_average(
    records: &[OhlcvRecord],
    window: usize,
) -> Result<Vec<MaPoint>, TransformError> {
    if window == 0 {
        return Err(TransformError::InvalidWindow);
    }

    let closes = records.iter().map(|record| record.close).collect::<Vec<_>>();

    Ok((0..closes.len())
        .map(|index| {
            if index + 1 < window {
                MaPoint::Unavailable
            } else {
                let trailing = &closes[index + 1 - window..=index];
                let mean = trailing.iter().sum::<f64>() / window as f64;
                MaPoint::Value(round_to(mean, 2))
            }
        })
        .collect())
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn record(day: i64, open: f64, close: f64, low: f64, high: f64) -> OhlcvRecord {
        OhlcvRecord {
            timestamp: DateTime::<Utc>::from_timestamp(day * 86_400, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 100.0 * day as f64,
        }
    }

    fn closes(values: &[f64]) -> Vec<OhlcvRecord> {
        values
            .iter()
            .enumerate()
            .map(|(day, close)| record(day as i64, *close, *close, *close, *close))
            .collect()
    }

    #[test]
    fn test_series_preserve_length_and_order() {
        let records = vec![
            record(1, 10.0, 11.0, 9.0, 12.0),
            record(2, 11.0, 10.5, 10.0, 11.5),
            record(3, 10.5, 13.0, 10.5, 13.5),
        ];

        let candles = to_candlestick_series(&records);
        let lines = to_line_series(&records);
        let rows = to_chart_rows(&records);

        assert_eq!(candles.len(), records.len());
        assert_eq!(lines.len(), records.len());
        assert_eq!(rows.len(), records.len());

        for (index, record) in records.iter().enumerate() {
            assert_eq!(candles[index].time, record.timestamp_millis());
            assert_eq!(candles[index].open, record.open);
            assert_eq!(candles[index].close, record.close);
            assert_eq!(candles[index].low, record.low);
            assert_eq!(candles[index].high, record.high);
            assert_eq!(lines[index].time, record.timestamp_millis());
            assert_eq!(lines[index].close, record.close);
            assert_eq!(rows[index].volume, record.volume);
        }
    }

    #[test]
    fn test_series_empty_input() {
        assert!(to_candlestick_series(&[]).is_empty());
        assert!(to_line_series(&[]).is_empty());
        assert!(moving_average(&[], 5).unwrap().is_empty());
    }

    #[test]
    fn test_candle_point_serializes_in_echarts_order() {
        let point = to_candlestick_series(&[record(1, 1.0, 2.0, 0.5, 3.0)])[0];
        let json = serde_json::to_value(point).unwrap();
        assert_eq!(json, serde_json::json!([86_400_000, 1.0, 2.0, 0.5, 3.0]));
    }

    #[test]
    fn test_moving_average() {
        struct TestCase {
            closes: Vec<f64>,
            window: usize,
            expected: Vec<MaPoint>,
        }

        let tests = vec![
            TestCase {
                // TC0: window 2 over [10, 20, 30, 40]
                closes: vec![10.0, 20.0, 30.0, 40.0],
                window: 2,
                expected: vec![
                    MaPoint::Unavailable,
                    MaPoint::Value(15.0),
                    MaPoint::Value(25.0),
                    MaPoint::Value(35.0),
                ],
            },
            TestCase {
                // TC1: window 1 is the identity on closes
                closes: vec![1.5, 2.5],
                window: 1,
                expected: vec![MaPoint::Value(1.5), MaPoint::Value(2.5)],
            },
            TestCase {
                // TC2: window longer than input is all unavailable
                closes: vec![1.0, 2.0, 3.0],
                window: 5,
                expected: vec![MaPoint::Unavailable; 3],
            },
            TestCase {
                // TC3: window equal to input yields one value at the last index
                closes: vec![1.0, 2.0, 4.0],
                window: 3,
                expected: vec![
                    MaPoint::Unavailable,
                    MaPoint::Unavailable,
                    MaPoint::Value(2.33),
                ],
            },
            TestCase {
                // TC4: rounded to 2 decimals
                closes: vec![2320.26, 2291.3, 2346.5],
                window: 3,
                expected: vec![
                    MaPoint::Unavailable,
                    MaPoint::Unavailable,
                    MaPoint::Value(2319.35),
                ],
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = moving_average(&closes(&test.closes), test.window).unwrap();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_moving_average_zero_window_is_rejected() {
        assert_eq!(
            moving_average(&closes(&[1.0]), 0),
            Err(TransformError::InvalidWindow)
        );
    }

    #[test]
    fn test_moving_average_nan_passes_through_window() {
        let actual = moving_average(&closes(&[1.0, f64::NAN, 3.0, 5.0]), 2).unwrap();

        assert_eq!(actual[0], MaPoint::Unavailable);
        assert!(actual[1].value().unwrap().is_nan());
        assert!(actual[2].value().unwrap().is_nan());
        assert_eq!(actual[3], MaPoint::Value(4.0));
    }

    #[test]
    fn test_ma_point_serializes_unavailable_as_gap_marker() {
        let json = serde_json::to_value([MaPoint::Unavailable, MaPoint::Value(15.0)]).unwrap();
        assert_eq!(json, serde_json::json!(["-", 15.0]));
    }
}
