//! Background journal maintenance.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::Engine;

const COMPACT_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically rewrites the journal as a snapshot once enough appends have
/// accumulated since the last compaction. Runs for the life of the engine.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut tick = tokio::time::interval(COMPACT_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        let appends = engine.journal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        tracing::info!(appends, "compacting journal");
        match engine.compact_journal().await {
            Ok(()) => tracing::info!("journal compaction complete"),
            Err(e) => tracing::warn!(error = %e, "journal compaction failed"),
        }
    }
}
