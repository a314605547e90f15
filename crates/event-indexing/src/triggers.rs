//! Queue-shaped downstream collaborators. The updater forwards derived
//! trigger records here after a range has been persisted; the receiving
//! queues deduplicate on each record's `context` string, so redelivery after
//! a retried range is harmless.

use {
    anyhow::Result,
    model::triggers::{ActivityInfo, FillInfo, MakerInfo, MintInfo, OrderInfo},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TriggerDispatching: Send + Sync {
    /// Fill accounting.
    async fn enqueue_fills(&self, fills: &[FillInfo]) -> Result<()>;

    /// Order-status recomputation keyed by order id.
    async fn enqueue_order_updates(&self, orders: &[OrderInfo]) -> Result<()>;

    /// Order-status recomputation keyed by maker (balance or approval
    /// changes).
    async fn enqueue_maker_updates(&self, makers: &[MakerInfo]) -> Result<()>;

    /// Metadata indexing for newly minted tokens.
    async fn enqueue_mints(&self, mints: &[MintInfo]) -> Result<()>;

    /// Activity recording.
    async fn enqueue_activities(&self, activities: &[ActivityInfo]) -> Result<()>;
}
