use crate::error::ApiError;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use finoptima_core::domain::forecast::{ForecastRequest, Indicators, PriceLevel, VolumeSpike};
use finoptima_core::domain::portfolio::{Factor, FactorSet, Level};
use finoptima_core::form::{FormAction, OptimizationForm, ValidationError};
use finoptima_core::remote::{ClientError, FinanceService};
use finoptima_core::render::forecast::{merge_series, price_range, split_series, Line, MergedPoint};
use finoptima_core::render::portfolio::{self, Metrics, PieSlice, RowOrder, WeightTable};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn FinanceService>,
    pub symbols: Arc<Vec<String>>,
    pub reveal_duration: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/healthz", get(healthz))
        .route("/portfolio", post(optimize_portfolio))
        .route("/forecast", get(list_symbols))
        .route("/forecast/:ticker", get(get_forecast))
        .route("/forecast/:ticker/chart.png", get(get_forecast_chart))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn landing() -> Json<Value> {
    Json(json!({
        "name": "FinOptima",
        "links": {
            "portfolio": "/portfolio",
            "forecast": "/forecast",
        }
    }))
}

#[derive(Debug, Deserialize)]
struct PortfolioBody {
    #[serde(default = "default_set")]
    set: FactorSet,
    #[serde(default)]
    strict: bool,
    #[serde(default)]
    sort_by_weight: bool,
    #[serde(default)]
    factors: BTreeMap<String, String>,
}

fn default_set() -> FactorSet {
    FactorSet::Classic
}

impl PortfolioBody {
    fn to_form(&self) -> Result<OptimizationForm, ValidationError> {
        let mut form = if self.strict {
            OptimizationForm::blank(self.set)
        } else {
            OptimizationForm::new(self.set)
        };
        for (name, value) in &self.factors {
            let factor = Factor::from_wire(name)
                .filter(|f| self.set.contains(*f))
                .ok_or_else(|| ValidationError::UnknownFactor(name.clone()))?;
            // Blank values leave the field unselected, like an untouched dropdown.
            if value.trim().is_empty() {
                form = form.apply(FormAction::Clear { factor });
                continue;
            }
            let level = value
                .parse::<Level>()
                .map_err(|_| ValidationError::InvalidLevel {
                    factor,
                    value: value.clone(),
                })?;
            form = form.apply(FormAction::Set { factor, level });
        }
        Ok(form)
    }
}

#[derive(Debug, Serialize)]
struct PortfolioResponse {
    request_id: Uuid,
    table: WeightTable,
    pie: Vec<PieSlice>,
    metrics: Metrics,
    optimized_companies: Vec<String>,
}

async fn optimize_portfolio(
    State(state): State<AppState>,
    Json(body): Json<PortfolioBody>,
) -> Result<Json<PortfolioResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let req = body.to_form()?.to_request()?;
    tracing::info!(%request_id, set = ?req.set(), "optimization requested");

    let result = state.service.optimize(&req).await?;
    let order = if body.sort_by_weight {
        RowOrder::WeightDesc
    } else {
        RowOrder::Insertion
    };

    Ok(Json(PortfolioResponse {
        request_id,
        table: portfolio::weight_table(&result, order),
        pie: portfolio::pie_slices(&result),
        metrics: portfolio::metrics(&result),
        optimized_companies: result.optimized_companies,
    }))
}

async fn list_symbols(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "symbols": state.symbols.as_slice() }))
}

#[derive(Debug, Serialize)]
struct DatedIndicators {
    date: NaiveDate,
    #[serde(flatten)]
    indicators: Indicators,
}

#[derive(Debug, Serialize)]
struct ForecastResponse {
    request_id: Uuid,
    ticker: String,
    series: Vec<MergedPoint>,
    actual: Line,
    forecast: Line,
    price_range: Option<(f64, f64)>,
    indicators: Vec<DatedIndicators>,
    support: Vec<PriceLevel>,
    resistance: Vec<PriceLevel>,
    volume_spikes: Vec<VolumeSpike>,
    forecast_start: Option<NaiveDate>,
    /// Clients reveal `series` one point per `reveal_duration_ms / len` milliseconds.
    reveal_duration_ms: u128,
}

async fn get_forecast(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let req = ForecastRequest::new(&ticker)?;
    tracing::info!(%request_id, ticker = %req.ticker, "forecast requested");

    let result = state.service.forecast(&req).await?;
    let series = merge_series(&result.points);
    let (actual, forecast) = split_series(&result.points);
    let indicators = result
        .points
        .iter()
        .filter(|p| !p.indicators.is_empty())
        .map(|p| DatedIndicators {
            date: p.date,
            indicators: p.indicators.clone(),
        })
        .collect();

    Ok(Json(ForecastResponse {
        request_id,
        price_range: price_range(&series),
        ticker: result.ticker,
        series,
        actual,
        forecast,
        indicators,
        support: result.support,
        resistance: result.resistance,
        volume_spikes: result.volume_spikes,
        forecast_start: result.forecast_start,
        reveal_duration_ms: state.reveal_duration.as_millis(),
    }))
}

async fn get_forecast_chart(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Response, ApiError> {
    let req = ForecastRequest::new(&ticker)?;
    let image = state.service.forecast_image(&req).await?;
    if !image.is_png() {
        return Err(ClientError::MalformedResponse(format!(
            "expected a PNG chart, got {}",
            image.content_type.as_deref().unwrap_or("unknown content")
        ))
        .into());
    }

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/png")],
        image.bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use finoptima_core::domain::forecast::{ForecastImage, ForecastResult, PointKind, PricePoint};
    use finoptima_core::domain::portfolio::{Holding, OptimizationRequest, OptimizationResult};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeService {
        seen: Mutex<Vec<Vec<(Factor, Level)>>>,
        fail_with: Option<ClientError>,
    }

    #[async_trait::async_trait]
    impl FinanceService for FakeService {
        async fn optimize(
            &self,
            req: &OptimizationRequest,
        ) -> Result<OptimizationResult, ClientError> {
            self.seen.lock().unwrap().push(req.iter().collect());
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            Ok(OptimizationResult {
                holdings: [("AAPL", 40.0), ("MSFT", 35.0), ("GOOG", 25.0)]
                    .into_iter()
                    .map(|(t, w)| Holding {
                        ticker: t.into(),
                        weight: w,
                    })
                    .collect(),
                optimized_companies: vec!["AAPL".into(), "MSFT".into(), "GOOG".into()],
                expected_return: Some(0.12),
                expected_volatility: Some(0.2),
                closest_cluster: Some("2".into()),
            })
        }

        async fn forecast(&self, req: &ForecastRequest) -> Result<ForecastResult, ClientError> {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            let point = |day, price, kind| PricePoint {
                date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
                price,
                kind,
                indicators: Indicators {
                    rsi: (kind == PointKind::Actual).then_some(55.0),
                    ..Indicators::default()
                },
            };
            Ok(ForecastResult {
                ticker: req.ticker.clone(),
                points: vec![
                    point(1, 10.0, PointKind::Actual),
                    point(2, 11.0, PointKind::Actual),
                    point(3, 12.0, PointKind::Actual),
                    point(3, 12.5, PointKind::Forecast),
                    point(4, 13.0, PointKind::Forecast),
                ],
                support: vec![],
                resistance: vec![],
                volume_spikes: vec![],
                forecast_start: NaiveDate::from_ymd_opt(2024, 1, 3),
            })
        }

        async fn forecast_image(&self, req: &ForecastRequest) -> Result<ForecastImage, ClientError> {
            Ok(ForecastImage {
                ticker: req.ticker.clone(),
                content_type: Some("image/png".into()),
                bytes: b"\x89PNG\r\n\x1a\nrest".to_vec(),
            })
        }
    }

    async fn spawn(service: FakeService) -> (String, Arc<FakeService>) {
        let service = Arc::new(service);
        let state = AppState {
            service: service.clone(),
            symbols: Arc::new(vec!["QQQ".into(), "SPY".into()]),
            reveal_duration: Duration::from_millis(1000),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        (format!("http://{addr}"), service)
    }

    #[tokio::test]
    async fn portfolio_renders_table_pie_and_metrics() {
        let (base, service) = spawn(FakeService::default()).await;
        let res = reqwest::Client::new()
            .post(format!("{base}/portfolio"))
            .json(&json!({ "factors": { "PER": "high", "Beta": "low" } }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();

        assert_eq!(body["table"]["rows"][0]["ticker"], "AAPL");
        assert_eq!(body["table"]["total"], 100.0);
        assert_eq!(body["pie"][2]["color"], "#FFBB28");
        assert_eq!(body["metrics"]["expected_return"], "12.00%");

        let seen = service.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len(), 6);
        assert!(seen[0].contains(&(Factor::Per, Level::High)));
        assert!(seen[0].contains(&(Factor::Volume, Level::Medium)));
    }

    #[tokio::test]
    async fn strict_portfolio_with_missing_fields_is_rejected_before_upstream() {
        let (base, service) = spawn(FakeService::default()).await;
        let res = reqwest::Client::new()
            .post(format!("{base}/portfolio"))
            .json(&json!({ "strict": true, "factors": { "PER": "high" } }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let body: Value = res.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("all fields must be selected"));
        assert!(service.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn factor_outside_the_set_is_rejected() {
        let (base, _) = spawn(FakeService::default()).await;
        let res = reqwest::Client::new()
            .post(format!("{base}/portfolio"))
            .json(&json!({ "set": "risk", "factors": { "PER": "high" } }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn upstream_timeout_maps_to_gateway_timeout() {
        let (base, _) = spawn(FakeService {
            fail_with: Some(ClientError::Timeout(Duration::from_secs(120))),
            ..FakeService::default()
        })
        .await;
        let res = reqwest::Client::new()
            .post(format!("{base}/portfolio"))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 504);
    }

    #[tokio::test]
    async fn forecast_merges_series_by_date() {
        let (base, _) = spawn(FakeService::default()).await;
        let body: Value = reqwest::get(format!("{base}/forecast/qqq"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["ticker"], "QQQ");
        let series = body["series"].as_array().unwrap();
        assert_eq!(series.len(), 4);
        assert_eq!(series[0]["forecast"], Value::Null);
        assert_eq!(series[2]["actual"], 12.0);
        assert_eq!(series[2]["forecast"], 12.5);
        assert_eq!(series[3]["actual"], Value::Null);
        assert_eq!(body["price_range"], json!([10.0, 13.0]));
        assert_eq!(body["indicators"].as_array().unwrap().len(), 3);
        assert_eq!(body["forecast_start"], "2024-01-03");
    }

    #[tokio::test]
    async fn invalid_ticker_is_a_bad_request() {
        let (base, _) = spawn(FakeService::default()).await;
        let res = reqwest::get(format!("{base}/forecast/AB%20CD")).await.unwrap();
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn symbols_and_chart() {
        let (base, _) = spawn(FakeService::default()).await;
        let body: Value = reqwest::get(format!("{base}/forecast"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["symbols"], json!(["QQQ", "SPY"]));

        let res = reqwest::get(format!("{base}/forecast/SPY/chart.png"))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
        assert!(res.bytes().await.unwrap().starts_with(b"\x89PNG"));
    }
}
