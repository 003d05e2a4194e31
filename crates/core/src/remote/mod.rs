use crate::domain::forecast::{ForecastImage, ForecastRequest, ForecastResult};
use crate::domain::portfolio::{OptimizationRequest, OptimizationResult};
use std::fmt;
use std::str::FromStr;

pub mod error;
pub mod forecast_json;
pub mod http;
pub mod optimize_json;

pub use error::ClientError;

/// How the forecast deployment takes the ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastMethod {
    /// `POST {base}/forecast` with `{"ticker": ...}`.
    Post,
    /// `GET {base}/forecast/{ticker}`.
    Get,
}

impl FromStr for ForecastMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" => Ok(ForecastMethod::Post),
            "get" => Ok(ForecastMethod::Get),
            other => anyhow::bail!("unknown forecast method {other:?} (expected post|get)"),
        }
    }
}

impl fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecastMethod::Post => f.write_str("post"),
            ForecastMethod::Get => f.write_str("get"),
        }
    }
}

#[async_trait::async_trait]
pub trait FinanceService: Send + Sync {
    async fn optimize(&self, req: &OptimizationRequest)
        -> Result<OptimizationResult, ClientError>;

    async fn forecast(&self, req: &ForecastRequest) -> Result<ForecastResult, ClientError>;

    async fn forecast_image(&self, req: &ForecastRequest) -> Result<ForecastImage, ClientError>;
}
