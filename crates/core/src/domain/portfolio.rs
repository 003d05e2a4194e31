use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Categorical level the optimizer accepts for every factor.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Low, Level::Medium, Level::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        match Level::ALL.into_iter().find(|l| l.as_str() == wanted) {
            Some(level) => Ok(level),
            None => anyhow::bail!(
                "unknown level {wanted:?} (expected {})",
                Level::ALL.map(Level::as_str).join("|")
            ),
        }
    }
}

/// One optimizer input. The wire name is the exact JSON key the service expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Factor {
    Per,
    DividendYield,
    Beta,
    Rsi,
    Volume,
    Volatility,
    Pe,
    Eps,
    MarketCap,
    NormPriceDiffs,
    NormPriceRanges,
    NormVolumeRatios,
    Risk,
}

const ALL_FACTORS: [Factor; 13] = [
    Factor::Per,
    Factor::DividendYield,
    Factor::Beta,
    Factor::Rsi,
    Factor::Volume,
    Factor::Volatility,
    Factor::Pe,
    Factor::Eps,
    Factor::MarketCap,
    Factor::NormPriceDiffs,
    Factor::NormPriceRanges,
    Factor::NormVolumeRatios,
    Factor::Risk,
];

impl Factor {
    pub fn wire_name(self) -> &'static str {
        match self {
            Factor::Per => "PER",
            Factor::DividendYield => "DividendYield",
            Factor::Beta => "Beta",
            Factor::Rsi => "RSI",
            Factor::Volume => "volume",
            Factor::Volatility => "Volatility",
            Factor::Pe => "pe",
            Factor::Eps => "eps",
            Factor::MarketCap => "marketCap",
            Factor::NormPriceDiffs => "norm_price_diffs",
            Factor::NormPriceRanges => "norm_price_ranges",
            Factor::NormVolumeRatios => "norm_volume_ratios",
            Factor::Risk => "risk",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Factor::Per => "PER",
            Factor::DividendYield => "Dividend Yield",
            Factor::Beta => "Beta",
            Factor::Rsi => "RSI",
            Factor::Volume => "Volume",
            Factor::Volatility => "Volatility",
            Factor::Pe => "PE Ratio",
            Factor::Eps => "EPS",
            Factor::MarketCap => "Market Cap",
            Factor::NormPriceDiffs => "Price Diffs",
            Factor::NormPriceRanges => "Price Ranges",
            Factor::NormVolumeRatios => "Volume Ratios",
            Factor::Risk => "Risk Level",
        }
    }

    /// Keyed lookup by wire name. Matching is exact first, then case-insensitive.
    pub fn from_wire(name: &str) -> Option<Factor> {
        let name = name.trim();
        ALL_FACTORS
            .iter()
            .copied()
            .find(|f| f.wire_name() == name)
            .or_else(|| {
                ALL_FACTORS
                    .iter()
                    .copied()
                    .find(|f| f.wire_name().eq_ignore_ascii_case(name))
            })
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// The factor sets the optimizer deployments accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorSet {
    Classic,
    Fundamental,
    Risk,
}

impl FactorSet {
    pub fn factors(self) -> &'static [Factor] {
        match self {
            FactorSet::Classic => &[
                Factor::Per,
                Factor::DividendYield,
                Factor::Beta,
                Factor::Rsi,
                Factor::Volume,
                Factor::Volatility,
            ],
            FactorSet::Fundamental => &[
                Factor::Pe,
                Factor::Eps,
                Factor::MarketCap,
                Factor::NormPriceDiffs,
                Factor::NormPriceRanges,
                Factor::NormVolumeRatios,
            ],
            FactorSet::Risk => &[Factor::Risk],
        }
    }

    pub fn contains(self, factor: Factor) -> bool {
        self.factors().contains(&factor)
    }
}

impl FromStr for FactorSet {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" => Ok(FactorSet::Classic),
            "fundamental" => Ok(FactorSet::Fundamental),
            "risk" => Ok(FactorSet::Risk),
            other => anyhow::bail!("unknown factor set {other:?} (expected classic|fundamental|risk)"),
        }
    }
}

/// A complete set of selections, ready to be posted to `/optimize`.
///
/// Only built through [`crate::form::OptimizationForm::to_request`], so every factor of the
/// set is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationRequest {
    pub(crate) set: FactorSet,
    pub(crate) selections: Vec<(Factor, Level)>,
}

impl OptimizationRequest {
    pub fn set(&self) -> FactorSet {
        self.set
    }

    pub fn get(&self, factor: Factor) -> Option<Level> {
        self.selections
            .iter()
            .find(|(f, _)| *f == factor)
            .map(|(_, level)| *level)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Factor, Level)> + '_ {
        self.selections.iter().copied()
    }
}

impl Serialize for OptimizationRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.selections.len()))?;
        for (factor, level) in &self.selections {
            map.serialize_entry(factor.wire_name(), level)?;
        }
        map.end()
    }
}

/// Unit the optimizer uses for `optimal_portfolio` weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    /// Already in percentage points (`40.0` is 40 %).
    Percent,
    /// Fraction in `[0, 1]`; multiplied by 100 at the boundary.
    Fraction,
}

impl WeightUnit {
    pub fn to_percent(self, weight: f64) -> f64 {
        match self {
            WeightUnit::Percent => weight,
            WeightUnit::Fraction => weight * 100.0,
        }
    }
}

impl FromStr for WeightUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "percent" | "pct" => Ok(WeightUnit::Percent),
            "fraction" | "frac" => Ok(WeightUnit::Fraction),
            other => anyhow::bail!("unknown weight unit {other:?} (expected percent|fraction)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    /// Percentage points.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// In the order the service returned them.
    pub holdings: Vec<Holding>,
    pub optimized_companies: Vec<String>,
    pub expected_return: Option<f64>,
    pub expected_volatility: Option<f64>,
    pub closest_cluster: Option<String>,
}

impl OptimizationResult {
    pub fn total_weight(&self) -> f64 {
        self.holdings.iter().map(|h| h.weight).sum()
    }
}
