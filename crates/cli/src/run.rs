use crate::display;
use anyhow::Context;
use finoptima_core::config::Settings;
use finoptima_core::domain::forecast::{ForecastRequest, ForecastResult};
use finoptima_core::driver::Driver;
use finoptima_core::form::OptimizationForm;
use finoptima_core::remote::http::HttpServiceClient;
use finoptima_core::remote::FinanceService;
use finoptima_core::render::portfolio::{self, RowOrder};
use finoptima_core::session::{Outcome, RequestState};
use finoptima_core::time::elapsed::format_elapsed;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const PROGRESS_EVERY: Duration = Duration::from_secs(1);

fn client(settings: &Settings) -> anyhow::Result<Arc<dyn FinanceService>> {
    Ok(Arc::new(HttpServiceClient::from_settings(settings)?))
}

pub async fn optimize(
    settings: &Settings,
    form: &OptimizationForm,
    sort_by_weight: bool,
) -> anyhow::Result<()> {
    let mut out = std::io::stdout();
    writeln!(out, "{}", display::selections_table(form))?;

    let mut driver = Driver::new(client(settings)?, settings.reveal_duration);
    let generation = driver.submit_optimization(form)?;
    tracing::info!(
        generation,
        set = ?form.set(),
        strict = form.is_strict(),
        "optimization submitted"
    );

    let outcome = drive(&mut driver, &mut out, true).await?;
    let Outcome::Portfolio(result) = outcome else {
        anyhow::bail!("optimizer answered with a forecast");
    };

    let order = if sort_by_weight {
        RowOrder::WeightDesc
    } else {
        RowOrder::Insertion
    };
    let table = portfolio::weight_table(&result, order);
    writeln!(out, "{}", display::weight_table(&table))?;
    writeln!(out, "{}", display::pie_legend(&portfolio::pie_slices(&result)))?;
    if let Some(metrics) = display::metrics(&portfolio::metrics(&result)) {
        writeln!(out, "{metrics}")?;
    }
    if result.optimized_companies.len() != result.holdings.len() {
        writeln!(out, "Optimized companies: {}", result.optimized_companies.join(", "))?;
    }
    Ok(())
}

pub async fn forecast(settings: &Settings, raw_ticker: &str) -> anyhow::Result<()> {
    let req = ForecastRequest::new(raw_ticker)?;
    let ticker = req.ticker.clone();
    let mut driver = Driver::new(client(settings)?, settings.reveal_duration);
    let generation = driver.show_forecast(req);
    tracing::info!(generation, %ticker, "forecast requested");

    let mut out = std::io::stdout();
    writeln!(out, "{ticker} price forecast")?;
    let outcome = drive(&mut driver, &mut out, true).await?;
    let Outcome::Forecast(result) = outcome else {
        anyhow::bail!("forecast service answered with a portfolio");
    };

    if result.is_empty() {
        writeln!(out, "No price data for {ticker}")?;
    }
    if let Some(footer) = display::forecast_footer(&result) {
        writeln!(out, "{footer}")?;
    }
    Ok(())
}

pub async fn forecast_image(settings: &Settings, raw_ticker: &str, path: &Path) -> anyhow::Result<()> {
    let req = ForecastRequest::new(raw_ticker)?;
    let client = client(settings)?;

    let started = Instant::now();
    let image = client.forecast_image(&req).await?;
    if !image.is_png() {
        tracing::warn!(
            ticker = %image.ticker,
            content_type = image.content_type.as_deref().unwrap_or("-"),
            "forecast image is not a PNG"
        );
    }

    std::fs::write(path, &image.bytes)
        .with_context(|| format!("failed to write chart to {}", path.display()))?;
    tracing::info!(
        ticker = %image.ticker,
        bytes = image.bytes.len(),
        elapsed = %format_elapsed(started.elapsed()),
        path = %path.display(),
        "forecast chart saved"
    );
    Ok(())
}

/// Runs the current request to completion, printing revealed chart rows to `out` as they
/// appear and, with `progress`, the elapsed time to stderr while waiting for the service.
async fn drive<W: Write>(driver: &mut Driver, out: &mut W, progress: bool) -> anyhow::Result<Outcome> {
    let started = Instant::now();
    let mut ticks = interval_at(started + PROGRESS_EVERY, PROGRESS_EVERY);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut waiting = true;
    let mut printed = 0usize;
    let mut domain = None;

    loop {
        tokio::select! {
            state = async { driver.next().await.cloned() } => {
                let state = match state {
                    Some(state) => state,
                    None => driver.state().clone(),
                };
                if waiting && !matches!(state, RequestState::Submitting) {
                    waiting = false;
                    if progress {
                        eprintln!();
                    }
                }

                match state {
                    RequestState::Revealing { outcome: Outcome::Forecast(result), shown } => {
                        let domain = *domain.get_or_insert_with(|| chart_domain(&result));
                        printed = print_rows(out, &result, printed, shown, domain)?;
                    }
                    RequestState::Displayed { outcome } => {
                        if let Outcome::Forecast(result) = &outcome {
                            let domain = *domain.get_or_insert_with(|| chart_domain(result));
                            print_rows(out, result, printed, result.len(), domain)?;
                        }
                        tracing::info!(elapsed = %format_elapsed(started.elapsed()), "request displayed");
                        return Ok(outcome);
                    }
                    RequestState::Failed { error } => {
                        anyhow::bail!("request failed: {error}");
                    }
                    RequestState::Idle => anyhow::bail!("request was cancelled"),
                    RequestState::Submitting | RequestState::Revealing { .. } => {}
                }
            }
            _ = ticks.tick(), if waiting && progress => {
                eprint!("\rWaiting for service... {}", format_elapsed(started.elapsed()));
            }
        }
    }
}

fn chart_domain(result: &ForecastResult) -> (f64, f64) {
    display::chart_domain(result).unwrap_or((0.0, 0.0))
}

fn print_rows<W: Write>(
    out: &mut W,
    result: &ForecastResult,
    from: usize,
    to: usize,
    domain: (f64, f64),
) -> anyhow::Result<usize> {
    let to = to.min(result.points.len());
    for point in result.points.iter().take(to).skip(from) {
        writeln!(out, "{}", display::chart_row(point, domain))?;
    }
    Ok(to.max(from))
}
