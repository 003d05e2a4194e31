use clap::{Parser, Subcommand};
use finoptima_core::domain::portfolio::FactorSet;
use finoptima_core::form::{FormAction, OptimizationForm};
use finoptima_core::remote::ForecastMethod;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod display;
mod run;

#[derive(Debug, Parser)]
#[command(name = "finoptima", about = "Portfolio optimization and price forecast client")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask the optimizer for a portfolio matching the selected factor levels.
    Optimize {
        /// Factor set the optimizer deployment expects (classic|fundamental|risk).
        #[arg(long, default_value = "classic")]
        set: FactorSet,

        /// Require every factor to be given explicitly instead of defaulting to medium.
        #[arg(long)]
        strict: bool,

        /// Factor selection as NAME=LEVEL, e.g. `--factor PER=high`. Repeatable.
        #[arg(long = "factor", value_name = "NAME=LEVEL")]
        factors: Vec<String>,

        /// List holdings by weight, largest first, instead of service order.
        #[arg(long)]
        sort_by_weight: bool,
    },

    /// Forecast a ticker's price and draw the chart progressively.
    Forecast {
        ticker: String,

        /// Save the image variant's rendered chart to this path instead.
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,

        /// Override FORECAST_METHOD (post|get).
        #[arg(long)]
        method: Option<ForecastMethod>,
    },

    /// List the symbols offered on the forecast picker.
    Symbols,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = finoptima_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let res = match args.command {
        Command::Optimize {
            set,
            strict,
            factors,
            sort_by_weight,
        } => {
            settings.require_optimizer_base_url()?;
            let form = build_form(set, strict, &factors)?;
            run::optimize(&settings, &form, sort_by_weight).await
        }
        Command::Forecast {
            ticker,
            image,
            method,
        } => {
            settings.require_forecast_base_url()?;
            if let Some(method) = method {
                settings.forecast_method = method;
            }
            match image {
                Some(path) => run::forecast_image(&settings, &ticker, &path).await,
                None => run::forecast(&settings, &ticker).await,
            }
        }
        Command::Symbols => {
            for symbol in &settings.forecast_symbols {
                println!("{symbol}");
            }
            Ok(())
        }
    };

    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %err, "command failed");
    }
    res
}

fn build_form(set: FactorSet, strict: bool, assignments: &[String]) -> anyhow::Result<OptimizationForm> {
    let mut form = if strict {
        OptimizationForm::blank(set)
    } else {
        OptimizationForm::new(set)
    };

    for raw in assignments {
        let action = FormAction::parse_assignment(raw)?;
        if let FormAction::Set { factor, .. } = action {
            anyhow::ensure!(
                set.contains(factor),
                "factor {factor} is not part of the {set:?} set (expected one of: {})",
                set.factors()
                    .iter()
                    .map(|f| f.wire_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        form = form.apply(action);
    }

    Ok(form)
}

fn init_sentry(settings: &finoptima_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
