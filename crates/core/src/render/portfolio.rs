use crate::domain::portfolio::OptimizationResult;
use serde::Serialize;

/// Slice colors, assigned by position and cycling when there are more holdings than colors.
pub const PALETTE: [&str; 8] = [
    "#0088FE", "#00C49F", "#FFBB28", "#FF8042", "#A28FD0", "#FF6699", "#33CCFF", "#66FF66",
];

pub fn color_for(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    /// As the service returned them.
    #[default]
    Insertion,
    /// Largest weight first; ties keep service order.
    WeightDesc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightRow {
    pub ticker: String,
    /// Percentage points.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightTable {
    pub rows: Vec<WeightRow>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub name: String,
    pub value: f64,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub expected_return: Option<String>,
    pub expected_volatility: Option<String>,
    pub cluster: Option<String>,
}

pub fn weight_table(result: &OptimizationResult, order: RowOrder) -> WeightTable {
    let mut rows: Vec<WeightRow> = result
        .holdings
        .iter()
        .map(|h| WeightRow {
            ticker: h.ticker.clone(),
            weight: h.weight,
        })
        .collect();

    if order == RowOrder::WeightDesc {
        // Stable sort so equal weights stay in service order.
        rows.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    let total = rows.iter().map(|r| r.weight).sum();
    WeightTable { rows, total }
}

/// One slice per holding, in service order. Colors follow the slice index.
pub fn pie_slices(result: &OptimizationResult) -> Vec<PieSlice> {
    result
        .holdings
        .iter()
        .enumerate()
        .map(|(i, h)| PieSlice {
            name: h.ticker.clone(),
            value: h.weight,
            color: color_for(i),
        })
        .collect()
}

/// Return and volatility arrive as fractions and are shown as percentages.
pub fn metrics(result: &OptimizationResult) -> Metrics {
    Metrics {
        expected_return: result.expected_return.map(format_fraction_pct),
        expected_volatility: result.expected_volatility.map(format_fraction_pct),
        cluster: result.closest_cluster.clone(),
    }
}

pub fn format_fraction_pct(v: f64) -> String {
    format!("{:.2}%", v * 100.0)
}

pub fn format_pct(v: f64) -> String {
    format!("{v:.2}%")
}
