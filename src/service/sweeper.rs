//! Background housekeeping: purges expired threads and drops idle sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::db::TranscriptStore;
use crate::service::session::SessionRegistry;

pub async fn sweep_once(
    store: &dyn TranscriptStore,
    sessions: &SessionRegistry,
    session_idle_limit: chrono::Duration,
) {
    match store.purge_expired().await {
        Ok(0) => {}
        Ok(n) => info!(purged = n, "Expired threads removed"),
        Err(e) => error!("Expiry sweep failed: {e}"),
    }
    let evicted = sessions.evict_idle(session_idle_limit).await;
    if evicted > 0 {
        let remaining = sessions.len().await;
        info!(evicted, remaining, "Idle sessions dropped");
    }
}

pub fn spawn(
    store: Arc<dyn TranscriptStore>,
    sessions: SessionRegistry,
    every: Duration,
    session_idle_limit: chrono::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            sweep_once(store.as_ref(), &sessions, session_idle_limit).await;
        }
    })
}
