//! Fish and bear example binary
//!
//! Mounts a provider over the persisted fish/bear store, runs a few actions
//! and prints the state and metrics along the way. Run it twice to see the
//! persisted counts come back.

use anyhow::Context as _;
use fish_bear::{BEAR, FISH, global_store};
use serde_json::json;
use slicestore_runtime::InitStoreState;
use slicestore_runtime::metrics::MetricsExporter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fish_bear=debug,slicestore_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut metrics = MetricsExporter::new();
    metrics.install().context("installing metrics recorder")?;

    println!("=== Fish and Bear: composed slices ===\n");

    let context = global_store();
    let provider = context.provider(Some(
        InitStoreState::new()
            .with(&FISH, json!({ "count": 10 }))
            .with(&BEAR, json!({ "count": 2 })),
    ));

    let persist = provider
        .store()
        .persist()
        .context("persistence is configured for the global store")?;
    persist.wait_for_hydration().await?;
    tracing::info!(name = persist.name(), version = persist.version(), "Store hydrated");

    let _render = provider.render_on_change(|state| {
        let fish = state.get(&FISH).map_or(0, |fish| fish.count);
        let bear = state.get(&BEAR).map_or(0, |bear| bear.count);
        println!("fish: {fish}, bear: {bear}");
    });

    println!("\n>>> fish.decrement(1)");
    provider.scope(|| -> anyhow::Result<()> {
        let store = context.use_store()?;
        store.actions(&FISH)?.decrement(1);
        Ok(())
    })?;

    println!("\n>>> bear.increment(1)");
    provider.store().actions(&BEAR)?.increment(1);

    persist.flush().await?;
    println!("\nPersisted under `{}` at version {}", persist.name(), persist.version());

    if let Some(rendered) = metrics.render() {
        println!("\n=== Metrics ===\n{rendered}");
    }

    Ok(())
}
