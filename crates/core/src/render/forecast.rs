use crate::domain::forecast::{PointKind, PricePoint};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// One row on the shared time axis. A side with no point on this date is `None`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedPoint {
    pub date: NaiveDate,
    pub actual: Option<f64>,
    pub forecast: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub kind: PointKind,
    pub points: Vec<(NaiveDate, f64)>,
}

/// Merges actual and forecast points into a date-ordered series.
///
/// Both sides are populated only where the two series share a date. Within one side a
/// repeated date keeps the later point.
pub fn merge_series<'a>(points: impl IntoIterator<Item = &'a PricePoint>) -> Vec<MergedPoint> {
    let mut by_date: BTreeMap<NaiveDate, MergedPoint> = BTreeMap::new();
    for p in points {
        let row = by_date.entry(p.date).or_insert(MergedPoint {
            date: p.date,
            actual: None,
            forecast: None,
        });
        match p.kind {
            PointKind::Actual => row.actual = Some(p.price),
            PointKind::Forecast => row.forecast = Some(p.price),
        }
    }
    by_date.into_values().collect()
}

/// The solid (actual) and dashed (forecast) lines, each in received order.
pub fn split_series<'a>(points: impl IntoIterator<Item = &'a PricePoint>) -> (Line, Line) {
    let mut actual = Line {
        kind: PointKind::Actual,
        points: Vec::new(),
    };
    let mut forecast = Line {
        kind: PointKind::Forecast,
        points: Vec::new(),
    };
    for p in points {
        match p.kind {
            PointKind::Actual => actual.points.push((p.date, p.price)),
            PointKind::Forecast => forecast.points.push((p.date, p.price)),
        }
    }
    (actual, forecast)
}

/// `(min, max)` over both lines, the y-axis domain.
pub fn price_range(merged: &[MergedPoint]) -> Option<(f64, f64)> {
    merged
        .iter()
        .flat_map(|m| [m.actual, m.forecast])
        .flatten()
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
