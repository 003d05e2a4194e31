use crate::config::Settings;
use crate::domain::forecast::{ForecastImage, ForecastRequest, ForecastResult};
use crate::domain::portfolio::{OptimizationRequest, OptimizationResult, WeightUnit};
use crate::remote::optimize_json::{parse_optimization_response, service_error};
use crate::remote::{forecast_json, ClientError, FinanceService, ForecastMethod};
use anyhow::Context;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

const OPTIMIZE_PATH: &str = "/optimize";
const FORECAST_PATH: &str = "/forecast";

/// reqwest-backed client for the optimizer and forecast deployments.
#[derive(Debug, Clone)]
pub struct HttpServiceClient {
    http: reqwest::Client,
    optimizer_base_url: Option<String>,
    forecast_base_url: Option<String>,
    forecast_method: ForecastMethod,
    timeout: Duration,
    attempts: u32,
    weight_unit: WeightUnit,
}

impl HttpServiceClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build service http client")?;

        Ok(Self {
            http,
            optimizer_base_url: settings.optimizer_base_url.clone(),
            forecast_base_url: settings.forecast_base_url.clone(),
            forecast_method: settings.forecast_method,
            timeout: settings.request_timeout,
            attempts: settings.request_attempts.max(1),
            weight_unit: settings.weight_unit,
        })
    }

    fn optimizer_url(&self) -> Result<String, ClientError> {
        let base = self
            .optimizer_base_url
            .as_deref()
            .ok_or(ClientError::NotConfigured("OPTIMIZER_BASE_URL"))?;
        Ok(join_url(base, OPTIMIZE_PATH))
    }

    fn forecast_request(&self, req: &ForecastRequest) -> Result<reqwest::RequestBuilder, ClientError> {
        let base = self
            .forecast_base_url
            .as_deref()
            .ok_or(ClientError::NotConfigured("FORECAST_BASE_URL"))?;
        let builder = match self.forecast_method {
            ForecastMethod::Post => self.http.post(join_url(base, FORECAST_PATH)).json(req),
            ForecastMethod::Get => self.http.get(format!(
                "{}/{}",
                join_url(base, FORECAST_PATH),
                req.ticker
            )),
        };
        Ok(builder)
    }

    /// Runs `op` up to `attempts` times, backing off 1s, 2s, 4s... between transient failures.
    async fn with_retries<T, F, Fut>(&self, what: &'static str, op: F) -> Result<T, ClientError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let res = match tokio::time::timeout(self.timeout, op()).await {
                Ok(res) => res,
                Err(_) => Err(ClientError::Timeout(self.timeout)),
            };

            match res {
                Ok(v) => return Ok(v),
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    let backoff = Duration::from_secs(1 << (attempt - 1).min(5));
                    tracing::warn!(attempt, ?backoff, error = %err, "{what} failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn optimize_once(&self, req: &OptimizationRequest) -> Result<OptimizationResult, ClientError> {
        let url = self.optimizer_url()?;
        let res = self
            .http
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json(req)
            .send()
            .await
            .map_err(network_error)?;

        let body = read_json(res).await?;
        parse_optimization_response(body, self.weight_unit)
    }

    async fn forecast_once(&self, req: &ForecastRequest) -> Result<ForecastResult, ClientError> {
        let res = self
            .forecast_request(req)?
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(network_error)?;

        let body = read_json(res).await?;
        forecast_json::parse_forecast_response(&req.ticker, body)
    }

    async fn forecast_image_once(&self, req: &ForecastRequest) -> Result<ForecastImage, ClientError> {
        let res = self
            .forecast_request(req)?
            .header(ACCEPT, HeaderValue::from_static("image/png"))
            .send()
            .await
            .map_err(network_error)?;

        let status = res.status();
        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = res.bytes().await.map_err(network_error)?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &bytes));
        }

        // The image deployment answers errors with a 200 JSON body.
        if content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"))
        {
            let message = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .and_then(|v| v.as_object().and_then(service_error));
            return Err(match message {
                Some(m) => ClientError::Service(m),
                None => ClientError::MalformedResponse("expected an image, got JSON".to_string()),
            });
        }

        if bytes.is_empty() {
            return Err(ClientError::MalformedResponse("empty image body".to_string()));
        }

        Ok(ForecastImage {
            ticker: req.ticker.clone(),
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

#[async_trait::async_trait]
impl FinanceService for HttpServiceClient {
    async fn optimize(
        &self,
        req: &OptimizationRequest,
    ) -> Result<OptimizationResult, ClientError> {
        tracing::info!(set = ?req.set(), "requesting portfolio optimization");
        self.with_retries("optimize", || self.optimize_once(req)).await
    }

    async fn forecast(&self, req: &ForecastRequest) -> Result<ForecastResult, ClientError> {
        tracing::info!(ticker = %req.ticker, method = %self.forecast_method, "requesting forecast");
        self.with_retries("forecast", || self.forecast_once(req)).await
    }

    async fn forecast_image(&self, req: &ForecastRequest) -> Result<ForecastImage, ClientError> {
        tracing::info!(ticker = %req.ticker, "requesting forecast chart image");
        self.with_retries("forecast image", || self.forecast_image_once(req))
            .await
    }
}

async fn read_json(res: reqwest::Response) -> Result<Value, ClientError> {
    let status = res.status();
    let bytes = res.bytes().await.map_err(network_error)?;

    if !status.is_success() {
        return Err(status_error(status.as_u16(), &bytes));
    }

    serde_json::from_slice::<Value>(&bytes).map_err(|e| {
        ClientError::MalformedResponse(format!(
            "response is not valid JSON ({e}): {}",
            snippet(&bytes)
        ))
    })
}

/// Prefers the service's own `{"error": ...}` message as the body text.
fn status_error(status: u16, bytes: &[u8]) -> ClientError {
    let body = serde_json::from_slice::<Value>(bytes)
        .ok()
        .and_then(|v| v.as_object().and_then(service_error))
        .or_else(|| Some(snippet(bytes)).filter(|s| !s.is_empty()));
    ClientError::HttpStatus { status, body }
}

fn network_error(err: reqwest::Error) -> ClientError {
    ClientError::Network(err.to_string())
}

fn snippet(bytes: &[u8]) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
