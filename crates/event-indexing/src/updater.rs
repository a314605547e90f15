//! Range ingestion. A range's logs are fetched, normalized in strict log
//! order and persisted in one transaction; block bookkeeping and trigger
//! dispatch only happen for real-time syncs. Any error leaves the database
//! untouched for the range and the caller retries the whole range.

use {
    crate::{
        attribution::{self, Routers, TransactionFetching},
        normalizer::{Normalizer, OnChainData, OrderResolving},
        parser::{BlockRange, RawLog},
        registry::Registry,
        storage::EventStoring,
        triggers::TriggerDispatching,
    },
    alloy_primitives::B256,
    anyhow::{Context as _, Result, ensure},
    futures::stream::{self, StreamExt, TryStreamExt},
    std::sync::Arc,
    tracing::instrument,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RangeInclusive<T: Ord> {
    start: T,
    end: T,
}

impl<T: Ord> RangeInclusive<T> {
    pub fn try_new(start: T, end: T) -> Result<Self> {
        ensure!(end >= start, "end has to be bigger or equal to start");
        Ok(Self { start, end })
    }

    pub fn start(&self) -> &T {
        &self.start
    }

    pub fn end(&self) -> &T {
        &self.end
    }
}

/// Retrieves raw logs and block metadata from a node. Transport is external
/// collaboration; the updater only cares that logs arrive in (block, log
/// index) order.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LogRetrieving: Send + Sync {
    /// All logs of the range, ordered by block number and log index.
    async fn logs(&self, range: &RangeInclusive<u64>) -> Result<Vec<RawLog>>;

    async fn block_timestamp(&self, block_number: u64) -> Result<u64>;
}

/// How many ranges may have their logs in flight at once during a backfill.
/// Processing stays strictly sequential regardless.
const CONCURRENT_RANGE_FETCHES: usize = 5;

pub struct EventUpdater {
    registry: Registry,
    routers: Routers,
    log_retriever: Arc<dyn LogRetrieving>,
    transactions: Arc<dyn TransactionFetching>,
    orders: Arc<dyn OrderResolving>,
    store: Arc<dyn EventStoring>,
    triggers: Arc<dyn TriggerDispatching>,
}

impl EventUpdater {
    pub fn new(
        registry: Registry,
        routers: Routers,
        log_retriever: Arc<dyn LogRetrieving>,
        transactions: Arc<dyn TransactionFetching>,
        orders: Arc<dyn OrderResolving>,
        store: Arc<dyn EventStoring>,
        triggers: Arc<dyn TriggerDispatching>,
    ) -> Self {
        Self {
            registry,
            routers,
            log_retriever,
            transactions,
            orders,
            store,
            triggers,
        }
    }

    /// Ingests one block range. `backfill` skips the real-time side effects
    /// (block bookkeeping for reorg detection and trigger dispatch) while
    /// still persisting idempotently.
    #[instrument(skip(self), fields(from = range.start, to = range.end))]
    pub async fn sync_range(&self, range: &RangeInclusive<u64>, backfill: bool) -> Result<()> {
        let logs = self
            .log_retriever
            .logs(range)
            .await
            .context("failed to retrieve logs")?;
        self.process_logs(range, logs, backfill).await
    }

    /// Ingests many consecutive ranges, prefetching their logs with bounded
    /// concurrency while processing stays strictly ordered.
    pub async fn backfill_ranges(&self, ranges: Vec<RangeInclusive<u64>>) -> Result<()> {
        let mut fetched = stream::iter(ranges)
            .map(|range| async move {
                let logs = self.log_retriever.logs(&range).await?;
                Ok::<_, anyhow::Error>((range, logs))
            })
            .buffered(CONCURRENT_RANGE_FETCHES);
        while let Some((range, logs)) = fetched.try_next().await? {
            self.process_logs(&range, logs, true).await?;
        }
        Ok(())
    }

    async fn process_logs(
        &self,
        range: &RangeInclusive<u64>,
        logs: Vec<RawLog>,
        backfill: bool,
    ) -> Result<()> {
        let block_range = BlockRange {
            from_block: range.start,
            from_timestamp: self.log_retriever.block_timestamp(range.start).await?,
            to_block: range.end,
            to_timestamp: self.log_retriever.block_timestamp(range.end).await?,
        };
        // The auxiliary transaction lookups have no mutual ordering
        // dependency; only the fold over logs does.
        let tx_infos =
            attribution::prefetch(self.transactions.as_ref(), &self.registry, &logs).await?;

        let normalizer = Normalizer::new(&self.registry, self.orders.as_ref(), &self.routers);
        let data = normalizer.normalize(&logs, &block_range, &tx_infos).await?;
        track_block_range(&format!("range_{}", range.end - range.start + 1));
        track_events(&data);
        tracing::debug!(
            logs = logs.len(),
            events = data.events.len(),
            backfill,
            "normalized range",
        );

        let blocks = processed_blocks(&logs);
        self.store.append_events(data.events.clone()).await?;
        if backfill {
            return Ok(());
        }
        self.store.record_blocks(&blocks).await?;
        self.dispatch_triggers(&data).await
    }

    async fn dispatch_triggers(&self, data: &OnChainData) -> Result<()> {
        if !data.fills.is_empty() {
            self.triggers.enqueue_fills(&data.fills).await?;
        }
        if !data.orders.is_empty() {
            self.triggers.enqueue_order_updates(&data.orders).await?;
        }
        if !data.makers.is_empty() {
            self.triggers.enqueue_maker_updates(&data.makers).await?;
        }
        if !data.mints.is_empty() {
            self.triggers.enqueue_mints(&data.mints).await?;
        }
        if !data.activities.is_empty() {
            self.triggers.enqueue_activities(&data.activities).await?;
        }
        Ok(())
    }
}

/// The distinct blocks a range's logs were observed in, for reorg
/// bookkeeping. Only blocks that actually emitted logs matter; an orphaned
/// empty block has no effects to reverse.
fn processed_blocks(logs: &[RawLog]) -> Vec<(u64, B256)> {
    let mut blocks: Vec<(u64, B256)> = logs
        .iter()
        .map(|log| (log.block_number, log.block_hash))
        .collect();
    blocks.sort();
    blocks.dedup();
    blocks
}

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "event_updater")]
struct Metrics {
    /// Tracks how many blocks were processed in each synced range.
    #[metric(labels("range"))]
    block_ranges: prometheus::IntCounterVec,

    /// Number of canonical events produced, by event kind.
    #[metric(labels("kind"))]
    events: prometheus::IntCounterVec,
}

fn track_block_range(range: &str) {
    Metrics::instance(observe::metrics::get_storage_registry())
        .expect("unexpected error getting metrics instance")
        .block_ranges
        .with_label_values(&[range])
        .inc();
}

fn track_events(data: &OnChainData) {
    let metrics = Metrics::instance(observe::metrics::get_storage_registry())
        .expect("unexpected error getting metrics instance");
    for (_, event) in &data.events {
        use model::events::CanonicalEvent::*;
        let kind = match event {
            Fill(_) => "fill",
            PartialFill(_) => "partial_fill",
            Cancel(_) => "cancel",
            NonceCancel(_) => "nonce_cancel",
            BulkCancel(_) => "bulk_cancel",
            Transfer(_) => "transfer",
            Approval(_) => "approval",
        };
        metrics.events.with_label_values(&[kind]).inc();
    }
}
