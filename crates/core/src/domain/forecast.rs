use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub ticker: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    Actual,
    Forecast,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma20: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma50: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma200: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
}

impl Indicators {
    pub fn is_empty(&self) -> bool {
        self.sma20.is_none() && self.sma50.is_none() && self.sma200.is_none() && self.rsi.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
    pub kind: PointKind,
    #[serde(default, skip_serializing_if = "Indicators::is_empty")]
    pub indicators: Indicators,
}

/// Horizontal support/resistance level. Some deployments attach the date it was detected on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpike {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// Canonical forecast shape. Every upstream payload is adapted into this by
/// [`crate::remote::forecast_json::parse_forecast_response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub ticker: String,
    /// Reveal order: received order for flat payloads, date-merged for `real`/`predicted`.
    pub points: Vec<PricePoint>,
    pub support: Vec<PriceLevel>,
    pub resistance: Vec<PriceLevel>,
    pub volume_spikes: Vec<VolumeSpike>,
    pub forecast_start: Option<NaiveDate>,
}

impl ForecastResult {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn actual(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter().filter(|p| p.kind == PointKind::Actual)
    }

    pub fn forecast(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter().filter(|p| p.kind == PointKind::Forecast)
    }
}

/// Rendered chart returned by the image-producing forecast deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastImage {
    pub ticker: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ForecastImage {
    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

    pub fn is_png(&self) -> bool {
        self.bytes.starts_with(&Self::PNG_MAGIC)
    }
}
