//! Wires a [`Session`], a [`FinanceService`] and a [`Revealer`] together.
//!
//! Network calls run as spawned tasks that report back through the event channel, so a
//! superseded call can be aborted and its late answer is dropped by generation.

use crate::domain::forecast::ForecastRequest;
use crate::form::OptimizationForm;
use crate::remote::FinanceService;
use crate::reveal::Revealer;
use crate::session::{Event, Generation, Outcome, RequestState, Session, SubmitError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct Driver {
    service: Arc<dyn FinanceService>,
    session: Session,
    revealer: Revealer,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    request: Option<JoinHandle<()>>,
}

impl Driver {
    pub fn new(service: Arc<dyn FinanceService>, reveal_duration: Duration) -> Self {
        let session = Session::new();
        let revealer = Revealer::new(session.counter(), reveal_duration);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            service,
            session,
            revealer,
            events_tx,
            events_rx,
            request: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> &RequestState {
        self.session.state()
    }

    /// Validates the form and posts it. Nothing is sent when validation fails or a request
    /// is already in flight.
    pub fn submit_optimization(&mut self, form: &OptimizationForm) -> Result<Generation, SubmitError> {
        if self.session.is_busy() {
            return Err(SubmitError::InFlight);
        }
        let req = form.to_request()?;
        let generation = self.session.submit()?;
        self.revealer.cancel();

        let service = Arc::clone(&self.service);
        self.spawn_request(generation, async move {
            service.optimize(&req).await.map(Outcome::Portfolio)
        });
        Ok(generation)
    }

    /// Requests a forecast, superseding whatever is in flight or being revealed.
    pub fn show_forecast(&mut self, req: ForecastRequest) -> Generation {
        let generation = self.session.supersede();
        self.revealer.cancel();

        let service = Arc::clone(&self.service);
        self.spawn_request(generation, async move {
            service.forecast(&req).await.map(Outcome::Forecast)
        });
        generation
    }

    /// Drops every outstanding request and reveal, e.g. when leaving the page.
    pub fn cancel(&mut self) {
        self.abort_request();
        self.revealer.cancel();
        self.session.cancel();
    }

    fn spawn_request<F>(&mut self, generation: Generation, call: F)
    where
        F: std::future::Future<Output = Result<Outcome, crate::remote::ClientError>>
            + Send
            + 'static,
    {
        self.abort_request();
        let tx = self.events_tx.clone();
        self.request = Some(tokio::spawn(async move {
            let event = match call.await {
                Ok(outcome) => Event::Succeeded { generation, outcome },
                Err(err) => {
                    tracing::warn!(generation, error = %err, "service request failed");
                    Event::Failed {
                        generation,
                        error: err.to_string(),
                    }
                }
            };
            let _ = tx.send(event);
        }));
    }

    fn abort_request(&mut self) {
        if let Some(task) = self.request.take() {
            task.abort();
        }
    }

    /// Waits for the next event that changes state and returns the new state.
    ///
    /// Returns `None` when the session is settled and nothing is outstanding.
    pub async fn next(&mut self) -> Option<&RequestState> {
        loop {
            if self.session.state().is_settled() {
                return None;
            }
            let event = self.events_rx.recv().await?;
            if !self.session.apply(event) {
                continue;
            }

            if let RequestState::Revealing { outcome, shown: 0 } = self.session.state() {
                let count = outcome.series_len();
                self.revealer
                    .start(self.session.generation(), count, self.events_tx.clone());
            }
            return Some(self.session.state());
        }
    }

    /// Drives the current request to `Displayed`, `Failed` or `Idle`.
    pub async fn settle(&mut self) -> &RequestState {
        while self.next().await.is_some() {}
        self.session.state()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.abort_request();
    }
}
