use crate::domain::portfolio::{Holding, OptimizationResult, WeightUnit};
use crate::remote::ClientError;
use serde_json::{Map, Value};

/// Adapts an `/optimize` response body into [`OptimizationResult`].
///
/// Weights are converted to percentage points according to `unit`. A body carrying an
/// `error` key is reported as [`ClientError::Service`].
pub fn parse_optimization_response(
    value: Value,
    unit: WeightUnit,
) -> Result<OptimizationResult, ClientError> {
    let Value::Object(obj) = value else {
        return Err(ClientError::MalformedResponse(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    };

    if let Some(message) = service_error(&obj) {
        return Err(ClientError::Service(message));
    }

    let portfolio = match obj.get("optimal_portfolio") {
        Some(Value::Object(p)) => p,
        Some(other) => {
            return Err(ClientError::MalformedResponse(format!(
                "`optimal_portfolio` must be an object, got {}",
                json_kind(other)
            )))
        }
        None => {
            return Err(ClientError::MalformedResponse(
                "missing `optimal_portfolio`".to_string(),
            ))
        }
    };

    let mut holdings = Vec::with_capacity(portfolio.len());
    for (ticker, weight) in portfolio {
        let weight = number(weight).ok_or_else(|| {
            ClientError::MalformedResponse(format!(
                "weight for {ticker} is not a finite number: {weight}"
            ))
        })?;
        holdings.push(Holding {
            ticker: ticker.clone(),
            weight: unit.to_percent(weight),
        });
    }

    let optimized_companies = match obj.get("optimized_companies") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                other => Err(ClientError::MalformedResponse(format!(
                    "`optimized_companies` entries must be strings, got {}",
                    json_kind(other)
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::Null) | None => holdings.iter().map(|h| h.ticker.clone()).collect(),
        Some(other) => {
            return Err(ClientError::MalformedResponse(format!(
                "`optimized_companies` must be an array, got {}",
                json_kind(other)
            )))
        }
    };

    let closest_cluster = match obj.get("closest_cluster") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Ok(OptimizationResult {
        holdings,
        optimized_companies,
        expected_return: obj.get("expected_return").and_then(number),
        expected_volatility: obj.get("expected_volatility").and_then(number),
        closest_cluster,
    })
}

/// Message of an `{"error": ...}` body, if present.
pub(crate) fn service_error(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Numbers, and numeric strings some deployments emit for numpy floats.
/// Finite numbers only; numeric strings are accepted, `"NaN"` and `"inf"` are not.
pub(crate) fn number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

pub(crate) fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
