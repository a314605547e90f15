//! Orphaned-block resolution. A block number recorded with more than one
//! distinct hash had a reorg under it; one of the hashes is stale and its
//! events need removing. Resolution is eventually consistent: candidates are
//! re-verified against the chain on an increasing delay ladder instead of
//! synchronously, so ingestion never waits on reorg handling.

use {
    crate::storage::EventStoring,
    alloy_primitives::B256,
    anyhow::Result,
    std::{sync::Arc, time::Duration},
};

/// Canonical-hash lookup against the chain.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BlockFetching: Send + Sync {
    /// The hash of the block currently at this number, if the chain has one.
    async fn block_hash(&self, block_number: u64) -> Result<Option<B256>>;
}

const RECHECK_DELAYS: &[Duration] = &[
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(10 * 60),
    Duration::from_secs(60 * 60),
];

pub struct OrphanWatcher {
    store: Arc<dyn EventStoring>,
    chain: Arc<dyn BlockFetching>,
}

impl OrphanWatcher {
    pub fn new(store: Arc<dyn EventStoring>, chain: Arc<dyn BlockFetching>) -> Self {
        Self { store, chain }
    }

    /// Scans for duplicate-hash candidates and spawns one recheck task per
    /// candidate. Returns immediately; the tasks resolve on their own
    /// schedule.
    pub async fn check(&self) -> Result<()> {
        let duplicates = self.store.duplicate_blocks().await?;
        for (block_number, hashes) in duplicates {
            tracing::debug!(block_number, hashes = hashes.len(), "orphan candidate");
            let store = self.store.clone();
            let chain = self.chain.clone();
            tokio::spawn(async move {
                if let Err(err) = recheck(store.as_ref(), chain.as_ref(), block_number).await {
                    tracing::warn!(?err, block_number, "orphan recheck failed");
                }
            });
        }
        Ok(())
    }
}

/// Walks one candidate down the delay ladder. Every step re-reads the stored
/// hashes: the candidate may have been resolved by an earlier watcher run or
/// by a later sync in the meantime.
async fn recheck(
    store: &dyn EventStoring,
    chain: &dyn BlockFetching,
    block_number: u64,
) -> Result<()> {
    for delay in RECHECK_DELAYS {
        tokio::time::sleep(*delay).await;
        let hashes = store.block_hashes(block_number).await?;
        if hashes.len() < 2 {
            return Ok(());
        }
        // The chain may not have settled on a canonical block yet; try again
        // after the next delay.
        let Some(canonical) = chain.block_hash(block_number).await? else {
            continue;
        };
        if !hashes.contains(&canonical) {
            continue;
        }
        for hash in hashes {
            if hash != canonical {
                tracing::info!(block_number, orphaned = %hash, "removing orphaned block");
                store.remove_events(block_number, hash).await?;
            }
        }
        return Ok(());
    }
    tracing::warn!(block_number, "orphan candidate unresolved after all rechecks");
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::storage::MockEventStoring,
        maplit::btreemap,
        std::sync::Mutex,
    };

    #[tokio::test(start_paused = true)]
    async fn removes_the_stale_hash_and_keeps_the_canonical_one() {
        let canonical = B256::repeat_byte(0x01);
        let stale = B256::repeat_byte(0x02);

        let mut store = MockEventStoring::new();
        store
            .expect_duplicate_blocks()
            .return_once(move || Ok(btreemap! { 100 => vec![canonical, stale] }));
        store
            .expect_block_hashes()
            .returning(move |_| Ok(vec![canonical, stale]));
        let removed = Arc::new(Mutex::new(Vec::new()));
        let sink = removed.clone();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let done_tx = Mutex::new(Some(done_tx));
        store
            .expect_remove_events()
            .returning(move |number, hash| {
                sink.lock().unwrap().push((number, hash));
                if let Some(done) = done_tx.lock().unwrap().take() {
                    done.send(()).unwrap();
                }
                Ok(())
            });

        let mut chain = MockBlockFetching::new();
        chain
            .expect_block_hash()
            .returning(move |_| Ok(Some(canonical)));

        let watcher = OrphanWatcher::new(Arc::new(store), Arc::new(chain));
        watcher.check().await.unwrap();

        // Paused time fast-forwards through the first recheck delay.
        done_rx.await.unwrap();
        assert_eq!(*removed.lock().unwrap(), [(100, stale)]);
    }

    #[tokio::test(start_paused = true)]
    async fn resolved_candidates_are_left_alone() {
        let hash = B256::repeat_byte(0x01);

        let mut store = MockEventStoring::new();
        store
            .expect_duplicate_blocks()
            .return_once(move || Ok(btreemap! { 100 => vec![hash, B256::repeat_byte(0x02)] }));
        // By recheck time only one hash remains: nothing to do, and neither
        // the chain lookup nor event removal may run.
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let seen_tx = Mutex::new(Some(seen_tx));
        store.expect_block_hashes().returning(move |_| {
            if let Some(seen) = seen_tx.lock().unwrap().take() {
                seen.send(()).unwrap();
            }
            Ok(vec![hash])
        });

        let chain = MockBlockFetching::new();
        let watcher = OrphanWatcher::new(Arc::new(store), Arc::new(chain));
        watcher.check().await.unwrap();
        seen_rx.await.unwrap();
    }
}
