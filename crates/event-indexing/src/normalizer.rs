//! The fold over a range's logs: classify, dispatch to the per-protocol
//! handler, accumulate canonical events and derived triggers.

use {
    crate::{
        attribution::{self, Routers, TxInfo},
        context::TxContext,
        handlers,
        parser::{self, BlockRange, RawLog},
        registry::{EventKind, Registry},
    },
    alloy_primitives::{Address, B256, U256},
    anyhow::{Context as _, Result},
    model::{
        events::{CanonicalEvent, EventIndex},
        order::ProtocolKind,
        triggers::{ActivityInfo, FillInfo, MakerInfo, MintInfo, OrderInfo},
    },
    std::collections::HashMap,
};

/// An order resolved from externally-owned order state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedOrder {
    pub id: String,
    /// The authoritative stored unit price.
    pub price: U256,
}

/// Lookup capability against stored order state, injected so tests can
/// substitute an in-memory fixture for the real store.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OrderResolving: Send + Sync {
    /// Best-effort resolution of a (maker, nonce) pair to a stored order,
    /// for protocols whose fill events carry no order id.
    async fn find_by_maker_nonce(
        &self,
        kind: ProtocolKind,
        maker: Address,
        nonce: U256,
    ) -> Result<Option<ResolvedOrder>>;

    /// Stored unit price of a pool order, if it is currently fillable.
    async fn pool_price(&self, order_id: &str) -> Result<Option<U256>>;
}

/// Everything one ingestion produces: canonical events in log order plus the
/// derived trigger records for downstream queues.
#[derive(Debug, Default)]
pub struct OnChainData {
    pub events: Vec<(EventIndex, CanonicalEvent)>,
    pub fills: Vec<FillInfo>,
    pub orders: Vec<OrderInfo>,
    pub makers: Vec<MakerInfo>,
    pub mints: Vec<MintInfo>,
    pub activities: Vec<ActivityInfo>,
}

/// Shared handler environment: resolution capabilities plus the transaction
/// infos prefetched for the range.
pub(crate) struct Env<'a> {
    pub orders: &'a dyn OrderResolving,
    pub routers: &'a Routers,
    pub tx_infos: &'a HashMap<B256, TxInfo>,
}

impl Env<'_> {
    pub(crate) fn resolve_taker(
        &self,
        tx_hash: B256,
        event_taker: Address,
    ) -> (Address, Option<String>) {
        attribution::resolve_taker(self.routers, self.tx_infos.get(&tx_hash), event_taker)
    }
}

pub struct Normalizer<'a> {
    registry: &'a Registry,
    orders: &'a dyn OrderResolving,
    routers: &'a Routers,
}

impl<'a> Normalizer<'a> {
    pub fn new(
        registry: &'a Registry,
        orders: &'a dyn OrderResolving,
        routers: &'a Routers,
    ) -> Self {
        Self {
            registry,
            orders,
            routers,
        }
    }

    /// Folds over the logs in strict order. Any handler error aborts the
    /// whole batch: triggers for already-processed events may otherwise be
    /// dispatched for a range that was only partially persisted.
    pub async fn normalize(
        &self,
        logs: &[RawLog],
        range: &BlockRange,
        tx_infos: &HashMap<B256, TxInfo>,
    ) -> Result<OnChainData> {
        let env = Env {
            orders: self.orders,
            routers: self.routers,
            tx_infos,
        };
        let mut out = OnChainData::default();
        let mut ctx = TxContext::default();
        for log in logs {
            ctx.enter(log.tx_hash);
            let Some(entry) = self.registry.classify(log) else {
                continue;
            };
            let base = parser::base_event_params(log, range);
            self.dispatch(entry.kind, log, base, &env, &mut ctx, &mut out)
                .await
                .with_context(|| {
                    format!(
                        "handling {:?} log {} of transaction {:#x}",
                        entry.kind, log.log_index, log.tx_hash,
                    )
                })?;
        }
        Ok(out)
    }

    async fn dispatch(
        &self,
        kind: EventKind,
        log: &RawLog,
        base: EventIndex,
        env: &Env<'_>,
        ctx: &mut TxContext,
        out: &mut OnChainData,
    ) -> Result<()> {
        match kind {
            EventKind::Erc20Transfer => handlers::erc20::transfer(log, base, ctx, out),
            EventKind::Erc20Deposit => handlers::erc20::deposit(log, base, ctx, out),
            EventKind::Erc20Withdrawal => handlers::erc20::withdrawal(log, base, ctx, out),
            EventKind::Erc721Transfer => handlers::erc721::transfer(log, base, ctx, out),
            EventKind::Erc721LikeTransfer => handlers::erc721::like_transfer(log, base, ctx, out),
            EventKind::NftApprovalForAll => handlers::erc721::approval_for_all(log, base, out),
            EventKind::Erc1155TransferSingle => {
                handlers::erc1155::transfer_single(log, base, ctx, out)
            }
            EventKind::Erc1155TransferBatch => {
                handlers::erc1155::transfer_batch(log, base, ctx, out)
            }
            EventKind::SeaportOrderFulfilled => {
                handlers::seaport::order_fulfilled(log, base, env, out)
            }
            EventKind::SeaportOrderCancelled => handlers::seaport::order_cancelled(log, base, out),
            EventKind::SeaportCounterIncremented => {
                handlers::seaport::counter_incremented(log, base, out)
            }
            EventKind::LooksRareTakerAsk => {
                handlers::looks_rare::taker_ask(log, base, env, ctx, out)
            }
            EventKind::LooksRareTakerBid => {
                handlers::looks_rare::taker_bid(log, base, env, ctx, out)
            }
            EventKind::LooksRareCancelAllOrders => {
                handlers::looks_rare::cancel_all_orders(log, base, out)
            }
            EventKind::LooksRareCancelMultipleOrders => {
                handlers::looks_rare::cancel_multiple_orders(log, base, out)
            }
            EventKind::ZeroexV4Erc721OrderFilled => {
                handlers::zeroex_v4::erc721_order_filled(log, base, env, out).await
            }
            EventKind::ZeroexV4Erc1155OrderFilled => {
                handlers::zeroex_v4::erc1155_order_filled(log, base, env, out).await
            }
            EventKind::ZeroexV4Erc721OrderCancelled => {
                handlers::zeroex_v4::erc721_order_cancelled(log, base, out)
            }
            EventKind::ZeroexV4Erc1155OrderCancelled => {
                handlers::zeroex_v4::erc1155_order_cancelled(log, base, out)
            }
            EventKind::WyvernV23OrdersMatched => {
                handlers::wyvern_v23::orders_matched(log, base, env, ctx, out)
            }
            EventKind::WyvernV23NonceIncremented => {
                handlers::wyvern_v23::nonce_incremented(log, base, out)
            }
            EventKind::SudoswapSwapIn => {
                handlers::sudoswap::swap_nft_in(log, base, env, ctx, out).await
            }
            EventKind::SudoswapSwapOut => {
                handlers::sudoswap::swap_nft_out(log, base, env, ctx, out).await
            }
        }
    }
}
