//! Static demo chart shown before any data is uploaded.

use super::option::{placeholder_option, zoom_controls};
use crate::{
    model::{OhlcvRecord, parse_timestamp},
    transform::moving_average,
};
use serde_json::{Value, json};
use tracing::warn;

/// Moving-average windows drawn on the demo chart.
pub const DEMO_MA_WINDOWS: [usize; 3] = [5, 10, 20];

const DEMO_COLORS: [&str; 3] = ["#3b82f6", "#f59e0b", "#8b5cf6"];

// (date, open, close, low, high)
const DEMO_ROWS: [(&str, f64, f64, f64, f64); 30] = [
    ("2024-01-01", 2320.26, 2320.26, 2287.3, 2362.94),
    ("2024-01-02", 2300.0, 2291.3, 2288.26, 2308.38),
    ("2024-01-03", 2295.35, 2346.5, 2295.35, 2346.92),
    ("2024-01-04", 2347.22, 2358.98, 2337.35, 2363.8),
    ("2024-01-05", 2360.75, 2382.48, 2347.89, 2383.76),
    ("2024-01-08", 2383.43, 2385.42, 2371.23, 2391.82),
    ("2024-01-09", 2377.41, 2419.02, 2369.57, 2421.15),
    ("2024-01-10", 2425.92, 2428.15, 2417.58, 2440.38),
    ("2024-01-11", 2411.0, 2433.13, 2403.3, 2437.42),
    ("2024-01-12", 2432.68, 2434.48, 2427.7, 2441.73),
    ("2024-01-15", 2430.69, 2418.53, 2394.22, 2433.89),
    ("2024-01-16", 2416.62, 2432.4, 2414.4, 2443.03),
    ("2024-01-17", 2441.91, 2421.56, 2415.43, 2444.8),
    ("2024-01-18", 2420.26, 2382.91, 2373.53, 2427.07),
    ("2024-01-19", 2383.49, 2397.18, 2370.61, 2397.94),
    ("2024-01-22", 2378.82, 2325.95, 2309.17, 2378.82),
    ("2024-01-23", 2322.94, 2314.16, 2308.76, 2330.88),
    ("2024-01-24", 2320.62, 2325.82, 2315.01, 2338.78),
    ("2024-01-25", 2313.74, 2293.34, 2289.89, 2340.71),
    ("2024-01-26", 2297.77, 2313.22, 2292.03, 2324.63),
    ("2024-01-29", 2322.32, 2365.59, 2308.92, 2366.16),
    ("2024-01-30", 2364.54, 2359.51, 2330.86, 2369.65),
    ("2024-01-31", 2332.08, 2273.4, 2259.25, 2333.54),
    ("2024-02-01", 2274.81, 2326.31, 2270.1, 2328.14),
    ("2024-02-02", 2333.61, 2347.18, 2321.6, 2351.44),
    ("2024-02-05", 2340.44, 2324.29, 2304.27, 2352.02),
    ("2024-02-06", 2326.42, 2318.61, 2314.59, 2333.67),
    ("2024-02-07", 2314.68, 2310.59, 2296.58, 2320.96),
    ("2024-02-08", 2309.16, 2286.6, 2264.83, 2333.29),
    ("2024-02-09", 2282.17, 2263.97, 2253.25, 2286.33),
];

/// Demo daily candles for a CSI 300 index future. They carry no volume (`NaN`).
pub fn demo_records() -> Vec<OhlcvRecord> {
    DEMO_ROWS
        .iter()
        .filter_map(|(date, open, close, low, high)| {
            let timestamp = parse_timestamp(date)?;
            Some(OhlcvRecord {
                timestamp,
                open: *open,
                high: *high,
                low: *low,
                close: *close,
                volume: f64::NAN,
            })
        })
        .collect()
}

/// Demo chart on a category (trading-day) axis with MA5/MA10/MA20 and max/min mark points.
pub fn demo_chart_option() -> Value {
    let records = demo_records();
    if records.is_empty() {
        return placeholder_option();
    }

    let dates = records
        .iter()
        .map(|record| record.timestamp.format("%Y-%m-%d").to_string())
        .collect::<Vec<_>>();

    let candles = records
        .iter()
        .map(|record| json!([record.open, record.close, record.low, record.high]))
        .collect::<Vec<_>>();

    let averages = DEMO_MA_WINDOWS
        .iter()
        .zip(DEMO_COLORS)
        .filter_map(|(window, color)| match moving_average(&records, *window) {
            Ok(points) => Some(json!({
                "name": format!("MA{window}"),
                "type": "line",
                "data": points,
                "smooth": true,
                "lineStyle": { "opacity": 0.8, "width": 1 },
                "itemStyle": { "color": color }
            })),
            Err(error) => {
                warn!(window, %error, "skipping demo moving average");
                None
            }
        });

    let series = std::iter::once(json!({
        "name": "Kline",
        "type": "candlestick",
        "data": candles,
        "itemStyle": {
            "color": "#ef4444",
            "color0": "#22c55e",
            "borderColor": "#ef4444",
            "borderColor0": "#22c55e"
        },
        "markPoint": {
            "data": [
                { "name": "Highest", "type": "max", "valueDim": "highest" },
                { "name": "Lowest", "type": "min", "valueDim": "lowest" }
            ]
        }
    }))
    .chain(averages)
    .collect::<Vec<_>>();

    let legend = std::iter::once("Kline".to_string())
        .chain(DEMO_MA_WINDOWS.iter().map(|window| format!("MA{window}")))
        .collect::<Vec<_>>();

    json!({
        "title": {
            "text": "Futures contract - CSI 300 index",
            "left": 0,
            "textStyle": { "fontSize": 16, "fontWeight": "bold" }
        },
        "tooltip": {
            "trigger": "axis",
            "axisPointer": { "type": "cross" },
            "backgroundColor": "rgba(245, 245, 245, 0.8)",
            "borderWidth": 1,
            "borderColor": "#ccc",
            "textStyle": { "color": "#000" }
        },
        "legend": { "data": legend, "top": 30 },
        "grid": { "left": "10%", "right": "10%", "bottom": "15%" },
        "xAxis": {
            "type": "category",
            "data": dates,
            "boundaryGap": false,
            "axisLine": { "onZero": false },
            "splitLine": { "show": false },
            "min": "dataMin",
            "max": "dataMax"
        },
        "yAxis": { "scale": true, "splitArea": { "show": true } },
        "dataZoom": zoom_controls(super::DEFAULT_ZOOM_START),
        "series": series
    })
}
