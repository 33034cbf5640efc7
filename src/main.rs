use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use stayline::compactor;
use stayline::config::Config;
use stayline::engine::Engine;
use stayline::feed::BookingFeed;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    stayline::observability::init_tracing("stayline=info", config.log_json);
    stayline::observability::init_metrics(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let journal_path = config.journal_path();
    let engine = Arc::new(
        Engine::new(journal_path.clone(), Arc::new(BookingFeed::new()))
            .with_context(|| format!("opening {}", journal_path.display()))?,
    );

    info!("stayline journal keeper started");
    info!("  journal: {}", journal_path.display());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));
    for property in engine.properties().await {
        let bookings = engine.bookings(property.id).await?;
        let active = bookings.iter().filter(|b| b.is_active()).count();
        info!(
            "  property {}: {} bookings ({} active)",
            property.id,
            bookings.len(),
            active
        );
    }

    let compactor_task = tokio::spawn(compactor::run_compactor(
        engine.clone(),
        config.compact_threshold,
        config.compact_interval,
    ));

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await?;
        }
        anyhow::Ok(())
    };
    shutdown.await?;

    info!("shutdown signal received, compacting journal");
    compactor_task.abort();
    engine.compact_journal().await?;
    info!("stayline stopped");
    Ok(())
}
