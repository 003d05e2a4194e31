pub mod domain;
pub mod driver;
pub mod form;
pub mod remote;
pub mod render;
pub mod reveal;
pub mod session;
pub mod time;

pub mod config {
    use crate::domain::portfolio::WeightUnit;
    use crate::remote::ForecastMethod;
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_TIMEOUT_SECS: u64 = 120;
    const DEFAULT_ATTEMPTS: u32 = 1;
    const DEFAULT_REVEAL_DURATION_MS: u64 = 1000;
    const DEFAULT_FORECAST_SYMBOLS: &str = "QQQ,SOXX,SPY,DIA,BTC-USD";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub optimizer_base_url: Option<String>,
        pub forecast_base_url: Option<String>,
        pub forecast_method: ForecastMethod,
        pub request_timeout: Duration,
        pub request_attempts: u32,
        pub weight_unit: WeightUnit,
        pub reveal_duration: Duration,
        pub forecast_symbols: Vec<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                optimizer_base_url: None,
                forecast_base_url: None,
                forecast_method: ForecastMethod::Post,
                request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                request_attempts: DEFAULT_ATTEMPTS,
                weight_unit: WeightUnit::Percent,
                reveal_duration: Duration::from_millis(DEFAULT_REVEAL_DURATION_MS),
                forecast_symbols: parse_symbols(DEFAULT_FORECAST_SYMBOLS),
                sentry_dsn: None,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        /// Builds settings from any key lookup; `from_env` passes the process environment.
        pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
            let defaults = Self::default();
            let var = |key: &str| {
                lookup(key)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            };

            let forecast_method =
                parse_var::<ForecastMethod>("FORECAST_METHOD", var("FORECAST_METHOD"))?
                    .unwrap_or(defaults.forecast_method);

            let weight_unit = parse_var::<WeightUnit>("WEIGHT_UNIT", var("WEIGHT_UNIT"))?
                .unwrap_or(defaults.weight_unit);

            let request_timeout =
                parse_var::<u64>("REQUEST_TIMEOUT_SECS", var("REQUEST_TIMEOUT_SECS"))?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.request_timeout);
            anyhow::ensure!(
                !request_timeout.is_zero(),
                "invalid REQUEST_TIMEOUT_SECS: must be at least 1"
            );

            let request_attempts = parse_var::<u32>("REQUEST_ATTEMPTS", var("REQUEST_ATTEMPTS"))?
                .unwrap_or(defaults.request_attempts);
            anyhow::ensure!(
                request_attempts >= 1,
                "invalid REQUEST_ATTEMPTS: must be at least 1"
            );

            let reveal_duration =
                parse_var::<u64>("REVEAL_DURATION_MS", var("REVEAL_DURATION_MS"))?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.reveal_duration);

            let forecast_symbols = var("FORECAST_SYMBOLS")
                .map(|s| parse_symbols(&s))
                .unwrap_or(defaults.forecast_symbols);

            Ok(Self {
                optimizer_base_url: var("OPTIMIZER_BASE_URL"),
                forecast_base_url: var("FORECAST_BASE_URL"),
                forecast_method,
                request_timeout,
                request_attempts,
                weight_unit,
                reveal_duration,
                forecast_symbols,
                sentry_dsn: var("SENTRY_DSN"),
            })
        }

        pub fn require_optimizer_base_url(&self) -> anyhow::Result<&str> {
            self.optimizer_base_url
                .as_deref()
                .context("OPTIMIZER_BASE_URL is required")
        }

        pub fn require_forecast_base_url(&self) -> anyhow::Result<&str> {
            self.forecast_base_url
                .as_deref()
                .context("FORECAST_BASE_URL is required")
        }
    }

    fn parse_var<T>(key: &str, raw: Option<String>) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        raw.map(|s| {
            s.parse::<T>()
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("invalid {key}: {s}"))
        })
        .transpose()
    }

    fn parse_symbols(s: &str) -> Vec<String> {
        s.split(',')
            .map(|part| part.trim().to_ascii_uppercase())
            .filter(|part| !part.is_empty())
            .collect()
    }

}
