use std::time::Duration;

use marketsync::{
    application::{ProductPage, error::AppError},
    config::{ProductCommand, Settings},
    domain::ProductToggle,
    sync::{SubscriptionState, SyncClient},
};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::print;

pub async fn product(
    client: &SyncClient,
    settings: &Settings,
    command: ProductCommand,
) -> Result<(), AppError> {
    match command {
        ProductCommand::Show { id } => show(client, settings, &id).await,
        ProductCommand::Like { id } => toggle(client, settings, &id, ProductToggle::Favorite).await,
        ProductCommand::Reserve { id } => {
            toggle(client, settings, &id, ProductToggle::Reservation).await
        }
        ProductCommand::Watch {
            id,
            refresh_seconds,
        } => watch(client, settings, &id, refresh_seconds).await,
    }
}

fn mount(client: &SyncClient, settings: &Settings, id: &str) -> ProductPage {
    ProductPage::mount(
        client.clone(),
        settings.routes.clone(),
        settings.cache.reconcile,
        Some(id),
    )
}

async fn show(client: &SyncClient, settings: &Settings, id: &str) -> Result<(), AppError> {
    let mut page = mount(client, settings, id);
    let (detail_state, _) = page.settle().await;

    if page.detail().is_none() {
        return Err(not_loaded(id, &detail_state));
    }
    print::page(&page)
}

async fn toggle(
    client: &SyncClient,
    settings: &Settings,
    id: &str,
    toggle: ProductToggle,
) -> Result<(), AppError> {
    let mut page = mount(client, settings, id);
    let (detail_state, _) = page.settle().await;
    if page.detail().is_none() {
        warn!(
            product_id = id,
            state = detail_state.label(),
            "No snapshot to update optimistically"
        );
    }

    let pending = page.toggle(toggle);
    print::toggle(&page, toggle, "optimistic", None)?;

    let response = pending
        .await
        .map_err(|err| AppError::unexpected(format!("toggle task failed: {err}")))??;
    print::toggle(&page, toggle, "settled", Some(&response))
}

async fn watch(
    client: &SyncClient,
    settings: &Settings,
    id: &str,
    refresh_seconds: Option<u64>,
) -> Result<(), AppError> {
    let mut page = mount(client, settings, id);
    let mut refresh = refresh_interval(refresh_seconds).await;

    page.settle().await;
    print::page(&page)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(product_id = id, "Interrupted; stopping watch");
                return Ok(());
            }
            _ = page.detail_subscription().changed() => {
                print::page(&page)?;
            }
            _ = next_tick(&mut refresh) => {
                let _ = page.detail_subscription().revalidate();
            }
        }
    }
}

async fn refresh_interval(seconds: Option<u64>) -> Option<Interval> {
    let seconds = seconds.filter(|seconds| *seconds > 0)?;
    let mut interval = tokio::time::interval(Duration::from_secs(seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // Skip the first immediate tick
    Some(interval)
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn not_loaded(id: &str, state: &SubscriptionState) -> AppError {
    let reason = match state.error() {
        Some(err) => err.to_string(),
        None => format!("detail is {}", state.label()),
    };
    AppError::not_loaded(id, reason)
}
