//! Periodic eviction of idle conversations.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::{SharedConversationStore, UserLocks};

/// Run one eviction pass. Returns the number of conversations removed.
pub async fn sweep_once(
    store: &SharedConversationStore,
    locks: &UserLocks,
    ttl: chrono::Duration,
) -> usize {
    let removed = store.lock().await.sweep(Utc::now(), ttl);
    let pruned = locks.prune();
    if removed > 0 {
        info!("Evicted {} idle conversation(s)", removed);
    }
    debug!("Sweep done: {} removed, {} lock entries pruned", removed, pruned);
    removed
}

/// Spawn the sweeper. The first pass runs one `interval` after start; the
/// task exits when `cancel` fires.
pub fn spawn_sweeper(
    store: SharedConversationStore,
    locks: Arc<UserLocks>,
    interval: Duration,
    ttl: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    sweep_once(&store, &locks, ttl).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{shared, MemoryConversationStore};

    #[tokio::test]
    async fn test_sweep_once_evicts_idle() {
        let store = shared(MemoryConversationStore::new());
        let locks = UserLocks::new();
        {
            let mut guard = store.lock().await;
            guard.get_or_create("old", Utc::now() - chrono::Duration::seconds(7200));
            guard.get_or_create("fresh", Utc::now());
        }

        let removed = sweep_once(&store, &locks, chrono::Duration::seconds(3600)).await;
        assert_eq!(removed, 1);
        let guard = store.lock().await;
        assert!(guard.get("old").is_none());
        assert!(guard.get("fresh").is_some());
    }

    #[tokio::test]
    async fn test_sweep_once_prunes_unheld_locks() {
        let store = shared(MemoryConversationStore::new());
        let locks = UserLocks::new();
        drop(locks.acquire("a").await);
        let _held = locks.acquire("b").await;

        sweep_once(&store, &locks, chrono::Duration::seconds(3600)).await;
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_runs_on_interval() {
        let store = shared(MemoryConversationStore::new());
        store
            .lock()
            .await
            .get_or_create("u", Utc::now() - chrono::Duration::seconds(7200));

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(
            store.clone(),
            Arc::new(UserLocks::new()),
            Duration::from_secs(600),
            Duration::from_secs(3600),
            cancel.clone(),
        );

        // Nothing happens before the first interval elapses
        tokio::time::sleep(Duration::from_secs(599)).await;
        assert_eq!(store.lock().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.lock().await.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
