use comfy_table::{Cell, CellAlignment, Table};
use finoptima_core::domain::forecast::{ForecastResult, PointKind, PricePoint};
use finoptima_core::form::OptimizationForm;
use finoptima_core::render::portfolio::{format_pct, Metrics, PieSlice, WeightTable};
use std::fmt::Write as _;

const BAR_WIDTH: usize = 40;

fn right(text: impl ToString) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

/// The factor levels that will be submitted; unset fields show as `-`.
pub fn selections_table(form: &OptimizationForm) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Factor", "Level"]);
    for factor in form.set().factors() {
        let level = form.get(*factor).map_or("-", |l| l.as_str());
        table.add_row(vec![Cell::new(factor.label()), Cell::new(level)]);
    }
    table
}

pub fn weight_table(weights: &WeightTable) -> Table {
    let mut table = Table::new();
    table.set_header(vec![Cell::new("Company"), right("Weight")]);
    for row in &weights.rows {
        table.add_row(vec![Cell::new(&row.ticker), right(format_pct(row.weight))]);
    }
    table.add_row(vec![Cell::new("Total"), right(format_pct(weights.total))]);
    table
}

/// Text stand-in for the pie: one proportional bar per slice, tagged with its color.
pub fn pie_legend(slices: &[PieSlice]) -> Table {
    let total: f64 = slices.iter().map(|s| s.value).sum();
    let mut table = Table::new();
    table.set_header(vec![Cell::new("Color"), Cell::new("Company"), right("Share"), Cell::new("")]);
    for s in slices {
        let share = if total > 0.0 { s.value / total } else { 0.0 };
        let filled = ((share * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
        table.add_row(vec![
            Cell::new(s.color),
            Cell::new(&s.name),
            right(format_pct(share * 100.0)),
            Cell::new("*".repeat(filled)),
        ]);
    }
    table
}

/// `None` when the service reported none of the optional metrics.
pub fn metrics(m: &Metrics) -> Option<Table> {
    let rows: Vec<(&str, &String)> = [
        ("Expected Return", m.expected_return.as_ref()),
        ("Expected Volatility", m.expected_volatility.as_ref()),
        ("Cluster", m.cluster.as_ref()),
    ]
    .into_iter()
    .filter_map(|(name, v)| v.map(|v| (name, v)))
    .collect();
    if rows.is_empty() {
        return None;
    }

    let mut table = Table::new();
    table.set_header(vec![Cell::new("Metric"), right("Value")]);
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), right(value)]);
    }
    Some(table)
}

/// `(min, max)` price of the whole series, fixed before the reveal starts.
pub fn chart_domain(result: &ForecastResult) -> Option<(f64, f64)> {
    result.points.iter().map(|p| p.price).fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// One chart line per point: solid bar for actual prices, dashed for forecast.
pub fn chart_row(point: &PricePoint, domain: (f64, f64)) -> String {
    let (lo, hi) = domain;
    let span = hi - lo;
    let pos = if span > 0.0 {
        (((point.price - lo) / span) * (BAR_WIDTH - 1) as f64).round() as usize
    } else {
        BAR_WIDTH / 2
    };
    let (fill, tag) = match point.kind {
        PointKind::Actual => ("=", "actual  "),
        PointKind::Forecast => ("- ", "forecast"),
    };
    let bar: String = fill.repeat(pos + 1).chars().take(pos + 1).collect();

    let mut line = format!("{} {tag} {:>10.2} |{bar}", point.date, point.price);
    if let Some(rsi) = point.indicators.rsi {
        let _ = write!(line, "  rsi {rsi:.1}");
    }
    line
}

/// Forecast start, support/resistance levels and volume spikes; `None` when there are none.
pub fn forecast_footer(result: &ForecastResult) -> Option<Table> {
    let join_prices = |levels: &[finoptima_core::domain::forecast::PriceLevel]| {
        levels
            .iter()
            .map(|l| format!("{:.2}", l.price))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut rows = Vec::new();
    if let Some(start) = result.forecast_start {
        rows.push(("Forecast starts", start.to_string()));
    }
    if !result.support.is_empty() {
        rows.push(("Support", join_prices(&result.support)));
    }
    if !result.resistance.is_empty() {
        rows.push(("Resistance", join_prices(&result.resistance)));
    }
    if !result.volume_spikes.is_empty() {
        let dates: Vec<_> = result.volume_spikes.iter().map(|v| v.date.to_string()).collect();
        rows.push(("Volume spikes", dates.join(", ")));
    }
    if rows.is_empty() {
        return None;
    }

    let mut table = Table::new();
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    Some(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use finoptima_core::domain::forecast::{Indicators, PriceLevel};
    use finoptima_core::domain::portfolio::{Factor, FactorSet, Level};
    use finoptima_core::form::FormAction;
    use finoptima_core::render::portfolio::{WeightRow, PALETTE};

    fn point(price: f64, kind: PointKind) -> PricePoint {
        PricePoint {
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            price,
            kind,
            indicators: Indicators::default(),
        }
    }

    fn cells(table: &Table) -> Vec<Vec<String>> {
        table
            .row_iter()
            .map(|row| row.cell_iter().map(|c| c.content()).collect())
            .collect()
    }

    #[test]
    fn table_lists_rows_and_total() {
        let weights = WeightTable {
            rows: vec![
                WeightRow {
                    ticker: "AAPL".into(),
                    weight: 40.0,
                },
                WeightRow {
                    ticker: "MSFT".into(),
                    weight: 60.0,
                },
            ],
            total: 100.0,
        };
        let table = weight_table(&weights);
        assert_eq!(
            cells(&table),
            [
                vec!["AAPL".to_string(), "40.00%".to_string()],
                vec!["MSFT".to_string(), "60.00%".to_string()],
                vec!["Total".to_string(), "100.00%".to_string()],
            ]
        );
        let rendered = table.to_string();
        assert!(rendered.contains("Company"));
        assert!(rendered.contains("100.00%"));
    }

    #[test]
    fn legend_bars_are_proportional() {
        let slices = vec![
            PieSlice {
                name: "A".into(),
                value: 75.0,
                color: PALETTE[0],
            },
            PieSlice {
                name: "B".into(),
                value: 25.0,
                color: PALETTE[1],
            },
        ];
        let rows = cells(&pie_legend(&slices));
        assert_eq!(rows[0][0], "#0088FE");
        assert_eq!(rows[0][1], "A");
        assert_eq!(rows[0][2], "75.00%");
        assert_eq!(rows[0][3].matches('*').count(), 30);
        assert_eq!(rows[1][3].matches('*').count(), 10);
    }

    #[test]
    fn metrics_skip_missing_values() {
        let m = Metrics {
            expected_return: Some("12.00%".into()),
            expected_volatility: None,
            cluster: Some("2".into()),
        };
        let rows = cells(&metrics(&m).unwrap());
        assert_eq!(
            rows,
            [
                vec!["Expected Return".to_string(), "12.00%".to_string()],
                vec!["Cluster".to_string(), "2".to_string()],
            ]
        );

        let empty = Metrics {
            expected_return: None,
            expected_volatility: None,
            cluster: None,
        };
        assert!(metrics(&empty).is_none());
    }

    #[test]
    fn selections_use_factor_labels() {
        let form = OptimizationForm::blank(FactorSet::Classic).apply(FormAction::Set {
            factor: Factor::DividendYield,
            level: Level::High,
        });
        let rows = cells(&selections_table(&form));
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0], ["PER", "-"]);
        assert_eq!(rows[1], ["Dividend Yield", "high"]);
    }

    #[test]
    fn footer_lists_levels() {
        let result = ForecastResult {
            ticker: "SPY".into(),
            points: vec![],
            support: vec![PriceLevel {
                date: None,
                price: 95.0,
            }],
            resistance: vec![],
            volume_spikes: vec![],
            forecast_start: None,
        };
        let rows = cells(&forecast_footer(&result).unwrap());
        assert_eq!(rows, [vec!["Support".to_string(), "95.00".to_string()]]);

        let bare = ForecastResult {
            support: vec![],
            ..result
        };
        assert!(forecast_footer(&bare).is_none());
    }

    #[test]
    fn chart_rows_span_the_domain() {
        let low = chart_row(&point(10.0, PointKind::Actual), (10.0, 20.0));
        let high = chart_row(&point(20.0, PointKind::Forecast), (10.0, 20.0));
        assert!(low.ends_with("|="));
        assert!(low.contains("actual"));
        assert!(high.contains("forecast"));
        assert_eq!(high.split('|').nth(1).unwrap().chars().count(), BAR_WIDTH);
    }

    #[test]
    fn flat_series_draws_midline() {
        let row = chart_row(&point(5.0, PointKind::Actual), (5.0, 5.0));
        assert_eq!(row.split('|').nth(1).unwrap().len(), BAR_WIDTH / 2 + 1);
    }
}
