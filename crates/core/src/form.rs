//! Input forms: the optimizer factor selections and the forecast ticker.
//!
//! The optimizer form is a single immutable record. Every edit goes through
//! [`OptimizationForm::apply`], which returns the next form and leaves the old one intact.

use crate::domain::forecast::ForecastRequest;
use crate::domain::portfolio::{Factor, FactorSet, Level, OptimizationRequest};

const MAX_TICKER_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("all fields must be selected (missing: {})", join_factors(.0))]
    MissingFactors(Vec<Factor>),

    #[error("unknown factor {0:?}")]
    UnknownFactor(String),

    #[error("invalid level {value:?} for {factor} (expected low|medium|high)")]
    InvalidLevel { factor: Factor, value: String },

    #[error("expected NAME=LEVEL, got {0:?}")]
    MalformedAssignment(String),

    #[error("ticker must be non-empty")]
    EmptyTicker,

    #[error("invalid ticker {0:?}")]
    InvalidTicker(String),
}

fn join_factors(factors: &[Factor]) -> String {
    factors
        .iter()
        .map(|f| f.wire_name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    Set { factor: Factor, level: Level },
    Clear { factor: Factor },
    Reset,
}

impl FormAction {
    /// Parses `NAME=LEVEL`, e.g. `PER=high` or `marketCap=low`.
    pub fn parse_assignment(s: &str) -> Result<FormAction, ValidationError> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| ValidationError::MalformedAssignment(s.to_string()))?;
        let factor = Factor::from_wire(name)
            .ok_or_else(|| ValidationError::UnknownFactor(name.trim().to_string()))?;
        let level = value
            .parse::<Level>()
            .map_err(|_| ValidationError::InvalidLevel {
                factor,
                value: value.trim().to_string(),
            })?;
        Ok(FormAction::Set { factor, level })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationForm {
    set: FactorSet,
    selections: Vec<(Factor, Option<Level>)>,
    strict: bool,
}

impl OptimizationForm {
    /// Every factor starts at `medium`; unset factors fall back to `medium` on submit.
    pub fn new(set: FactorSet) -> Self {
        Self {
            set,
            selections: set
                .factors()
                .iter()
                .map(|f| (*f, Some(Level::default())))
                .collect(),
            strict: false,
        }
    }

    /// Every factor starts unset and submission requires all of them.
    pub fn blank(set: FactorSet) -> Self {
        Self {
            set,
            selections: set.factors().iter().map(|f| (*f, None)).collect(),
            strict: true,
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn set(&self) -> FactorSet {
        self.set
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn get(&self, factor: Factor) -> Option<Level> {
        self.selections
            .iter()
            .find(|(f, _)| *f == factor)
            .and_then(|(_, level)| *level)
    }

    pub fn missing(&self) -> Vec<Factor> {
        self.selections
            .iter()
            .filter(|(_, level)| level.is_none())
            .map(|(f, _)| *f)
            .collect()
    }

    pub fn apply(&self, action: FormAction) -> Self {
        let mut next = self.clone();
        match action {
            FormAction::Set { factor, level } => next.put(factor, Some(level)),
            FormAction::Clear { factor } => next.put(factor, None),
            FormAction::Reset => {
                next = if self.strict {
                    Self::blank(self.set)
                } else {
                    Self::new(self.set)
                };
            }
        }
        next
    }

    fn put(&mut self, factor: Factor, level: Option<Level>) {
        match self.selections.iter_mut().find(|(f, _)| *f == factor) {
            Some(slot) => slot.1 = level,
            None => {
                tracing::debug!(%factor, set = ?self.set, "ignoring factor outside the active set");
            }
        }
    }

    pub fn to_request(&self) -> Result<OptimizationRequest, ValidationError> {
        if self.strict {
            let missing = self.missing();
            if !missing.is_empty() {
                return Err(ValidationError::MissingFactors(missing));
            }
        }

        Ok(OptimizationRequest {
            set: self.set,
            selections: self
                .selections
                .iter()
                .map(|(f, level)| (*f, level.unwrap_or_default()))
                .collect(),
        })
    }
}

impl ForecastRequest {
    /// Trims and upper-cases the ticker, e.g. `" aapl "` becomes `AAPL`.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let ticker = raw.trim().to_ascii_uppercase();
        if ticker.is_empty() {
            return Err(ValidationError::EmptyTicker);
        }

        let valid_chars = ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
        if !valid_chars || ticker.len() > MAX_TICKER_LEN {
            return Err(ValidationError::InvalidTicker(raw.trim().to_string()));
        }

        Ok(Self { ticker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_form_submits_medium_everywhere() {
        let req = OptimizationForm::new(FactorSet::Classic).to_request().unwrap();
        assert_eq!(req.iter().count(), 6);
        assert!(req.iter().all(|(_, level)| level == Level::Medium));
    }

    #[test]
    fn strict_form_reports_every_missing_factor() {
        let form = OptimizationForm::blank(FactorSet::Fundamental)
            .apply(FormAction::Set {
                factor: Factor::Pe,
                level: Level::High,
            })
            .apply(FormAction::Set {
                factor: Factor::Eps,
                level: Level::Low,
            });

        let err = form.to_request().unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingFactors(vec![
                Factor::MarketCap,
                Factor::NormPriceDiffs,
                Factor::NormPriceRanges,
                Factor::NormVolumeRatios,
            ])
        );
        assert!(err.to_string().contains("marketCap"));
    }

    #[test]
    fn apply_leaves_previous_form_untouched() {
        let before = OptimizationForm::new(FactorSet::Classic);
        let after = before.apply(FormAction::Set {
            factor: Factor::Beta,
            level: Level::High,
        });
        assert_eq!(before.get(Factor::Beta), Some(Level::Medium));
        assert_eq!(after.get(Factor::Beta), Some(Level::High));
    }

    #[test]
    fn clearing_a_factor_falls_back_to_medium_when_lenient() {
        let form = OptimizationForm::new(FactorSet::Classic).apply(FormAction::Clear {
            factor: Factor::Rsi,
        });
        assert_eq!(form.missing(), vec![Factor::Rsi]);
        let req = form.to_request().unwrap();
        assert_eq!(req.get(Factor::Rsi), Some(Level::Medium));

        let strict = form.with_strict(true);
        assert!(strict.to_request().is_err());
    }

    #[test]
    fn foreign_factor_is_ignored() {
        let form = OptimizationForm::new(FactorSet::Classic);
        let next = form.apply(FormAction::Set {
            factor: Factor::MarketCap,
            level: Level::Low,
        });
        assert_eq!(form, next);
    }

    #[test]
    fn reset_restores_initial_state() {
        let form = OptimizationForm::blank(FactorSet::Risk).apply(FormAction::Set {
            factor: Factor::Risk,
            level: Level::High,
        });
        assert!(form.missing().is_empty());
        assert_eq!(form.apply(FormAction::Reset).missing(), vec![Factor::Risk]);
    }

    #[test]
    fn parses_assignments() {
        assert_eq!(
            FormAction::parse_assignment("DividendYield=LOW").unwrap(),
            FormAction::Set {
                factor: Factor::DividendYield,
                level: Level::Low
            }
        );
        assert!(matches!(
            FormAction::parse_assignment("PER"),
            Err(ValidationError::MalformedAssignment(_))
        ));
        assert!(matches!(
            FormAction::parse_assignment("foo=high"),
            Err(ValidationError::UnknownFactor(_))
        ));
        assert!(matches!(
            FormAction::parse_assignment("PER=huge"),
            Err(ValidationError::InvalidLevel { .. })
        ));
    }

    #[test]
    fn normalizes_and_validates_tickers() {
        assert_eq!(ForecastRequest::new(" aapl ").unwrap().ticker, "AAPL");
        assert_eq!(ForecastRequest::new("btc-usd").unwrap().ticker, "BTC-USD");
        assert_eq!(ForecastRequest::new("   "), Err(ValidationError::EmptyTicker));
        assert!(matches!(
            ForecastRequest::new("AA PL"),
            Err(ValidationError::InvalidTicker(_))
        ));
    }
}
