//! Request lifecycle: `Idle -> Submitting -> (Revealing -> Displayed | Displayed) | Failed`.
//!
//! Every request gets a generation from a shared monotonically increasing counter. Events
//! carry the generation they belong to and are dropped once a newer request has started.

use crate::domain::forecast::{ForecastResult, PricePoint};
use crate::domain::portfolio::OptimizationResult;
use crate::form::ValidationError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type Generation = u64;

/// Shared handle to the current generation. Cloning shares the counter.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter(Arc<AtomicU64>);

impl GenerationCounter {
    pub fn current(&self) -> Generation {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }

    fn advance(&self) -> Generation {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Portfolio(OptimizationResult),
    Forecast(ForecastResult),
}

impl Outcome {
    /// Number of time-series points to reveal; zero for table/pie-only results.
    pub fn series_len(&self) -> usize {
        match self {
            Outcome::Portfolio(_) => 0,
            Outcome::Forecast(f) => f.len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestState {
    #[default]
    Idle,
    Submitting,
    Revealing { outcome: Outcome, shown: usize },
    Displayed { outcome: Outcome },
    Failed { error: String },
}

impl RequestState {
    pub fn name(&self) -> &'static str {
        match self {
            RequestState::Idle => "idle",
            RequestState::Submitting => "submitting",
            RequestState::Revealing { .. } => "revealing",
            RequestState::Displayed { .. } => "displayed",
            RequestState::Failed { .. } => "failed",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            RequestState::Idle | RequestState::Displayed { .. } | RequestState::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Succeeded {
        generation: Generation,
        outcome: Outcome,
    },
    Failed {
        generation: Generation,
        error: String,
    },
    /// The first `count` points of the series are now visible.
    Revealed { generation: Generation, count: usize },
}

impl Event {
    pub fn generation(&self) -> Generation {
        match self {
            Event::Succeeded { generation, .. }
            | Event::Failed { generation, .. }
            | Event::Revealed { generation, .. } => *generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmitError {
    #[error("a request is already in flight")]
    InFlight,

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Next state for `event`, or `None` when the event does not apply to `state`.
pub fn reduce(state: &RequestState, event: Event) -> Option<RequestState> {
    match (state, event) {
        (RequestState::Submitting, Event::Succeeded { outcome, .. }) => {
            Some(if outcome.series_len() == 0 {
                RequestState::Displayed { outcome }
            } else {
                RequestState::Revealing { outcome, shown: 0 }
            })
        }
        (RequestState::Submitting, Event::Failed { error, .. }) => {
            Some(RequestState::Failed { error })
        }
        (RequestState::Revealing { outcome, shown }, Event::Revealed { count, .. }) => {
            let total = outcome.series_len();
            let shown = count.clamp(*shown, total);
            Some(if shown == total {
                RequestState::Displayed {
                    outcome: outcome.clone(),
                }
            } else {
                RequestState::Revealing {
                    outcome: outcome.clone(),
                    shown,
                }
            })
        }
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct Session {
    counter: GenerationCounter,
    state: RequestState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self) -> GenerationCounter {
        self.counter.clone()
    }

    pub fn generation(&self) -> Generation {
        self.counter.current()
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, RequestState::Submitting)
    }

    /// Form submission. Refused while a request is in flight; allowed during a reveal,
    /// which it supersedes.
    pub fn submit(&mut self) -> Result<Generation, SubmitError> {
        if self.is_busy() {
            return Err(SubmitError::InFlight);
        }
        Ok(self.supersede())
    }

    /// Starts a new request unconditionally, e.g. when navigating to another ticker.
    pub fn supersede(&mut self) -> Generation {
        let generation = self.counter.advance();
        tracing::debug!(generation, from = self.state.name(), "request submitted");
        self.state = RequestState::Submitting;
        generation
    }

    /// Invalidates everything outstanding and returns to idle.
    pub fn cancel(&mut self) {
        let generation = self.counter.advance();
        tracing::debug!(generation, from = self.state.name(), "request cancelled");
        self.state = RequestState::Idle;
    }

    /// Applies `event` if it belongs to the current generation. Returns whether state changed.
    pub fn apply(&mut self, event: Event) -> bool {
        let current = self.counter.current();
        if event.generation() != current {
            tracing::debug!(
                event_generation = event.generation(),
                current,
                "ignoring stale event"
            );
            return false;
        }

        match reduce(&self.state, event) {
            Some(next) => {
                tracing::debug!(
                    generation = current,
                    from = self.state.name(),
                    to = next.name(),
                    "state transition"
                );
                self.state = next;
                true
            }
            None => false,
        }
    }

    /// Forecast points currently on screen: a prefix during the reveal, all once displayed.
    pub fn visible_points(&self) -> &[PricePoint] {
        match &self.state {
            RequestState::Revealing {
                outcome: Outcome::Forecast(f),
                shown,
            } => &f.points[..*shown],
            RequestState::Displayed {
                outcome: Outcome::Forecast(f),
            } => &f.points,
            _ => &[],
        }
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match &self.state {
            RequestState::Revealing { outcome, .. } | RequestState::Displayed { outcome } => {
                Some(outcome)
            }
            _ => None,
        }
    }
}
