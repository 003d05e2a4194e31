//! Adapter from the forecast deployments' payloads to [`ForecastResult`].
//!
//! Two shapes are in the wild:
//!
//! * flat: `[{"date", "price", "type": "actual"|"forecast"}]`, bare or wrapped as
//!   `{"forecast": [...]}`, kept in received order;
//! * structured: `{"real": [{"ds", "close", "sma20", ...}], "predicted": [{"ds", "yhat", ...}],
//!   "support", "resistance", "volumeSpikes", "forecastStart"}`, with the two series
//!   interleaved by date.
//!
//! Nothing past this module sees either of them.

use crate::domain::forecast::{
    ForecastResult, Indicators, PointKind, PriceLevel, PricePoint, VolumeSpike,
};
use crate::remote::optimize_json::{json_kind, number, service_error};
use crate::remote::ClientError;
use crate::time::dates::date_from_json;
use serde_json::{Map, Value};

const DATE_KEYS: [&str; 2] = ["date", "ds"];
const ACTUAL_PRICE_KEYS: [&str; 3] = ["price", "close", "y"];
const FORECAST_PRICE_KEYS: [&str; 3] = ["price", "yhat", "close"];
const LEVEL_PRICE_KEYS: [&str; 3] = ["price", "value", "level"];

pub fn parse_forecast_response(ticker: &str, value: Value) -> Result<ForecastResult, ClientError> {
    match value {
        Value::Array(items) => parse_flat(ticker, &items),
        Value::Object(obj) => {
            if let Some(message) = service_error(&obj) {
                return Err(ClientError::Service(message));
            }
            if obj.contains_key("real") || obj.contains_key("predicted") {
                return parse_structured(ticker, &obj);
            }
            match obj.get("forecast") {
                Some(Value::Array(items)) => parse_flat(ticker, items),
                Some(other) => Err(ClientError::MalformedResponse(format!(
                    "`forecast` must be an array, got {}",
                    json_kind(other)
                ))),
                None => Err(ClientError::MalformedResponse(
                    "missing `forecast` (or `real`/`predicted`)".to_string(),
                )),
            }
        }
        other => Err(ClientError::MalformedResponse(format!(
            "expected a JSON array or object, got {}",
            json_kind(&other)
        ))),
    }
}

fn parse_flat(ticker: &str, items: &[Value]) -> Result<ForecastResult, ClientError> {
    let mut points = Vec::with_capacity(items.len());
    let mut skipped: usize = 0;

    for (idx, item) in items.iter().enumerate() {
        let obj = as_object(item, "forecast", idx)?;
        let kind = match obj.get("type").and_then(Value::as_str) {
            Some(t) if t.eq_ignore_ascii_case("actual") || t.eq_ignore_ascii_case("real") => {
                PointKind::Actual
            }
            Some(t) if t.eq_ignore_ascii_case("forecast") || t.eq_ignore_ascii_case("predicted") => {
                PointKind::Forecast
            }
            other => {
                return Err(ClientError::MalformedResponse(format!(
                    "forecast[{idx}].type must be \"actual\" or \"forecast\", got {other:?}"
                )))
            }
        };

        let keys = match kind {
            PointKind::Actual => &ACTUAL_PRICE_KEYS,
            PointKind::Forecast => &FORECAST_PRICE_KEYS,
        };
        match point(obj, kind, keys, "forecast", idx)? {
            Some(p) => points.push(p),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(%ticker, skipped, "dropped forecast points without a price");
    }

    let forecast_start = points
        .iter()
        .find(|p| p.kind == PointKind::Forecast)
        .map(|p| p.date);
    Ok(ForecastResult {
        ticker: ticker.to_string(),
        points,
        support: Vec::new(),
        resistance: Vec::new(),
        volume_spikes: Vec::new(),
        forecast_start,
    })
}

fn parse_structured(ticker: &str, obj: &Map<String, Value>) -> Result<ForecastResult, ClientError> {
    let real = array_field(obj, "real")?;
    let predicted = array_field(obj, "predicted")?;

    let mut actual = Vec::with_capacity(real.len());
    let mut forecast = Vec::with_capacity(predicted.len());
    let mut skipped: usize = 0;
    for (idx, item) in real.iter().enumerate() {
        let o = as_object(item, "real", idx)?;
        match point(o, PointKind::Actual, &ACTUAL_PRICE_KEYS, "real", idx)? {
            Some(p) => actual.push(p),
            None => skipped += 1,
        }
    }
    for (idx, item) in predicted.iter().enumerate() {
        let o = as_object(item, "predicted", idx)?;
        match point(o, PointKind::Forecast, &FORECAST_PRICE_KEYS, "predicted", idx)? {
            Some(p) => forecast.push(p),
            None => skipped += 1,
        }
    }
    let first_forecast = forecast.first().map(|p| p.date);
    let points = merge_by_date(actual, forecast);

    if skipped > 0 {
        tracing::warn!(%ticker, skipped, "dropped forecast points without a price");
    }

    let forecast_start = match obj.get("forecastStart") {
        Some(Value::Null) | None => first_forecast,
        Some(v) => Some(date_from_json(v).ok_or_else(|| {
            ClientError::MalformedResponse(format!("`forecastStart` is not a date: {v}"))
        })?),
    };

    Ok(ForecastResult {
        ticker: ticker.to_string(),
        points,
        support: levels(obj, "support")?,
        resistance: levels(obj, "resistance")?,
        volume_spikes: volume_spikes(obj)?,
        forecast_start,
    })
}

/// Interleaves the two series by date, actual first on equal dates. Each side keeps its
/// received order, so date-sorted inputs give a date-sorted result.
fn merge_by_date(actual: Vec<PricePoint>, forecast: Vec<PricePoint>) -> Vec<PricePoint> {
    let mut out = Vec::with_capacity(actual.len() + forecast.len());
    let mut actual = actual.into_iter().peekable();
    let mut forecast = forecast.into_iter().peekable();
    loop {
        let take_actual = match (actual.peek(), forecast.peek()) {
            (Some(a), Some(f)) => a.date <= f.date,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_actual { actual.next() } else { forecast.next() };
        out.extend(next);
    }
    out
}

/// `None` when the price is null (Prophet emits NaN as null at the series edges).
fn point(
    obj: &Map<String, Value>,
    kind: PointKind,
    price_keys: &[&str],
    field: &str,
    idx: usize,
) -> Result<Option<PricePoint>, ClientError> {
    let date_value = first_present(obj, &DATE_KEYS).ok_or_else(|| {
        ClientError::MalformedResponse(format!("{field}[{idx}] has no `date`/`ds`"))
    })?;
    let date = date_from_json(date_value).ok_or_else(|| {
        ClientError::MalformedResponse(format!("{field}[{idx}] has an invalid date: {date_value}"))
    })?;

    let price = match first_present(obj, price_keys) {
        Some(Value::Null) | None => return Ok(None),
        Some(v) => number(v).ok_or_else(|| {
            ClientError::MalformedResponse(format!("{field}[{idx}] has a non-numeric or non-finite price: {v}"))
        })?,
    };

    Ok(Some(PricePoint {
        date,
        price,
        kind,
        indicators: Indicators {
            sma20: obj.get("sma20").and_then(number),
            sma50: obj.get("sma50").and_then(number),
            sma200: obj.get("sma200").and_then(number),
            rsi: obj.get("rsi").and_then(number),
        },
    }))
}

fn levels(obj: &Map<String, Value>, field: &str) -> Result<Vec<PriceLevel>, ClientError> {
    let items = array_field(obj, field)?;
    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let level = match item {
            Value::Object(o) => {
                let price = first_present(o, &LEVEL_PRICE_KEYS)
                    .and_then(number)
                    .ok_or_else(|| {
                        ClientError::MalformedResponse(format!("{field}[{idx}] has no price"))
                    })?;
                PriceLevel {
                    date: first_present(o, &DATE_KEYS).and_then(date_from_json),
                    price,
                }
            }
            other => PriceLevel {
                date: None,
                price: number(other).ok_or_else(|| {
                    ClientError::MalformedResponse(format!(
                        "{field}[{idx}] must be a number or object, got {}",
                        json_kind(other)
                    ))
                })?,
            },
        };
        out.push(level);
    }
    Ok(out)
}

fn volume_spikes(obj: &Map<String, Value>) -> Result<Vec<VolumeSpike>, ClientError> {
    let items = array_field(obj, "volumeSpikes")?;
    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let (date_value, volume) = match item {
            Value::Object(o) => (
                first_present(o, &DATE_KEYS),
                o.get("volume").and_then(number),
            ),
            other => (Some(other), None),
        };
        let date = date_value.and_then(date_from_json).ok_or_else(|| {
            ClientError::MalformedResponse(format!("volumeSpikes[{idx}] has no valid date"))
        })?;
        out.push(VolumeSpike { date, volume });
    }
    Ok(out)
}

fn array_field<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a [Value], ClientError> {
    match obj.get(field) {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) | None => Ok(&[]),
        Some(other) => Err(ClientError::MalformedResponse(format!(
            "`{field}` must be an array, got {}",
            json_kind(other)
        ))),
    }
}

fn as_object<'a>(
    item: &'a Value,
    field: &str,
    idx: usize,
) -> Result<&'a Map<String, Value>, ClientError> {
    item.as_object().ok_or_else(|| {
        ClientError::MalformedResponse(format!(
            "{field}[{idx}] must be an object, got {}",
            json_kind(item)
        ))
    })
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_wrapped_flat_shape() {
        let v = json!({
            "forecast": [
                {"date": "2024-01-01", "price": 100.0, "type": "actual"},
                {"date": "2024-01-03", "price": 103.5, "type": "forecast"},
                {"date": "2024-01-02", "price": 101.0, "type": "actual"},
            ]
        });
        let r = parse_forecast_response("AAPL", v).unwrap();
        assert_eq!(r.ticker, "AAPL");
        assert_eq!(r.len(), 3);
        let kinds: Vec<_> = r.points.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, [PointKind::Actual, PointKind::Forecast, PointKind::Actual]);
        assert_eq!(r.points[2].date, ymd(2024, 1, 2));
        assert_eq!(r.actual().count(), 2);
        assert_eq!(r.forecast_start, Some(ymd(2024, 1, 3)));
    }

    #[test]
    fn sorted_flat_input_with_overlapping_series_stays_sorted() {
        let v = json!([
            {"date": "2024-01-01", "price": 10.0, "type": "actual"},
            {"date": "2024-01-01", "price": 10.2, "type": "forecast"},
            {"date": "2024-01-02", "price": 11.0, "type": "actual"},
            {"date": "2024-01-02", "price": 11.1, "type": "forecast"},
            {"date": "2024-01-03", "price": 12.0, "type": "forecast"},
        ]);
        let r = parse_forecast_response("QQQ", v).unwrap();
        assert_eq!(r.len(), 5);
        assert!(r.points.windows(2).all(|w| w[0].date <= w[1].date));
        assert_eq!(r.points[1].kind, PointKind::Forecast);
        assert_eq!(r.forecast_start, Some(ymd(2024, 1, 1)));
    }

    #[test]
    fn structured_series_overlapping_history_are_merged_by_date() {
        let v = json!({
            "real": [
                {"ds": "2024-01-01", "close": 10.0},
                {"ds": "2024-01-02", "close": 11.0},
                {"ds": "2024-01-03", "close": 12.0},
            ],
            "predicted": [
                {"ds": "2024-01-02", "yhat": 11.2},
                {"ds": "2024-01-04", "yhat": 12.5},
            ],
        });
        let r = parse_forecast_response("SPY", v).unwrap();
        let order: Vec<_> = r.points.iter().map(|p| (p.date.to_string(), p.kind)).collect();
        assert_eq!(
            order,
            [
                ("2024-01-01".to_string(), PointKind::Actual),
                ("2024-01-02".to_string(), PointKind::Actual),
                ("2024-01-02".to_string(), PointKind::Forecast),
                ("2024-01-03".to_string(), PointKind::Actual),
                ("2024-01-04".to_string(), PointKind::Forecast),
            ]
        );
        assert_eq!(r.forecast_start, Some(ymd(2024, 1, 2)));
    }

    #[test]
    fn non_finite_prices_are_malformed() {
        for price in ["NaN", "inf", "-infinity"] {
            let v = json!([{"date": "2024-01-01", "price": price, "type": "actual"}]);
            assert!(matches!(
                parse_forecast_response("SPY", v),
                Err(ClientError::MalformedResponse(_))
            ));
        }
    }

    #[test]
    fn parses_bare_array() {
        let v = json!([{"date": "2024-01-01", "price": 1, "type": "actual"}]);
        let r = parse_forecast_response("SPY", v).unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r.forecast_start, None);
    }

    #[test]
    fn parses_structured_shape_with_indicators() {
        let v = json!({
            "real": [
                {"ds": "2024-01-01", "close": 100.0, "sma20": 98.0, "sma50": null, "sma200": null, "rsi": 55.5},
                {"ds": "2024-01-02", "close": 101.0, "sma20": 98.5, "rsi": 57.0},
            ],
            "predicted": [
                {"ds": "2024-01-03", "yhat": 102.0},
            ],
            "support": [95.0, {"price": 96.5, "date": "2024-01-01"}],
            "resistance": [{"value": 110.0}],
            "volumeSpikes": ["2024-01-02", {"ds": "2024-01-01", "volume": 1.5e7}],
            "forecastStart": "2024-01-03",
        });
        let r = parse_forecast_response("QQQ", v).unwrap();
        assert_eq!(r.len(), 3);
        assert_eq!(r.actual().count(), 2);
        assert_eq!(r.forecast().count(), 1);
        assert_eq!(r.points[0].indicators.sma20, Some(98.0));
        assert_eq!(r.points[0].indicators.sma50, None);
        assert_eq!(r.points[0].indicators.rsi, Some(55.5));
        assert_eq!(r.points[2].price, 102.0);
        assert_eq!(r.support.len(), 2);
        assert_eq!(r.support[1].date, Some(ymd(2024, 1, 1)));
        assert_eq!(r.resistance[0].price, 110.0);
        assert_eq!(r.volume_spikes[0].date, ymd(2024, 1, 2));
        assert_eq!(r.volume_spikes[1].volume, Some(1.5e7));
        assert_eq!(r.forecast_start, Some(ymd(2024, 1, 3)));
    }

    #[test]
    fn structured_forecast_start_defaults_to_first_prediction() {
        let v = json!({
            "real": [{"ds": "2024-01-01", "close": 1.0}],
            "predicted": [{"ds": "2024-01-05", "yhat": 2.0}],
        });
        let r = parse_forecast_response("DIA", v).unwrap();
        assert_eq!(r.forecast_start, Some(ymd(2024, 1, 5)));
    }

    #[test]
    fn null_prices_are_skipped() {
        let v = json!({
            "real": [{"ds": "2024-01-01", "close": null}, {"ds": "2024-01-02", "close": 5.0}],
        });
        let r = parse_forecast_response("SOXX", v).unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r.points[0].date, ymd(2024, 1, 2));
    }

    #[test]
    fn reports_missing_or_wrong_forecast_field() {
        let cases = [
            json!({}),
            json!({"forecast": {"date": "2024-01-01"}}),
            json!({"forecast": [{"date": "2024-01-01", "price": 1.0}]}),
            json!({"forecast": [{"price": 1.0, "type": "actual"}]}),
            json!({"forecast": [{"date": "soon", "price": 1.0, "type": "actual"}]}),
            json!({"forecast": [{"date": "2024-01-01", "price": "high", "type": "actual"}]}),
            json!({"forecast": [42]}),
            json!({"real": "nope"}),
            json!("text"),
        ];
        for v in cases {
            let res = parse_forecast_response("AAPL", v.clone());
            assert!(
                matches!(res, Err(ClientError::MalformedResponse(_))),
                "expected malformed for {v}, got {res:?}"
            );
        }
    }

    #[test]
    fn error_body_is_a_service_error() {
        let v = json!({"error": "unknown ticker"});
        assert_eq!(
            parse_forecast_response("ZZZZ", v),
            Err(ClientError::Service("unknown ticker".to_string()))
        );
    }
}
