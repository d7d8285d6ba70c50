//! marketsync: product page client over the sync core.

mod handlers;
mod print;

use std::{process, sync::Arc};

use marketsync::{
    application::error::AppError,
    cache::CacheConfig,
    config::{self, Command},
    infra::{http::HttpTransport, telemetry},
    sync::SyncClient,
};
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(source = report.source, error = %report.chain(), "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(source = report.source, error = %report.chain(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let transport = HttpTransport::new(settings.api.base_url.as_str(), settings.api.timeout)?;
    let client = SyncClient::new(Arc::new(transport), CacheConfig::from(&settings.cache));
    let sweeper = client.spawn_sweeper();

    let result = match cli_args.command {
        Command::Product(args) => handlers::product(&client, &settings, args.command).await,
    };

    sweeper.abort();
    result
}
