//! Sudoswap pair swaps carry an empty payload. The traded asset comes from
//! the adjacent NFT transfer, the price from the stored pool order (pools
//! are repriced off-chain after every swap). Swaps against unknown pools are
//! skipped like unmatched logs.

use {
    crate::{
        context::TxContext,
        normalizer::{Env, OnChainData},
        parser::RawLog,
    },
    alloy_primitives::Address,
    anyhow::Result,
    model::{
        events::{EventIndex, Fill},
        order::{OrderSide, ProtocolKind, pool_order_id},
    },
};

/// Someone sold an NFT into the pool, filling the pool's standing bid.
pub(crate) async fn swap_nft_in(
    log: &RawLog,
    base: EventIndex,
    env: &Env<'_>,
    ctx: &TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    swap(log, base, env, ctx, out, OrderSide::Buy).await
}

/// Someone bought an NFT out of the pool, filling the pool's listing.
pub(crate) async fn swap_nft_out(
    log: &RawLog,
    base: EventIndex,
    env: &Env<'_>,
    ctx: &TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    swap(log, base, env, ctx, out, OrderSide::Sell).await
}

async fn swap(
    log: &RawLog,
    base: EventIndex,
    env: &Env<'_>,
    ctx: &TxContext,
    out: &mut OnChainData,
    side: OrderSide,
) -> Result<()> {
    let pool = log.address;
    let Some((_, transfer)) = ctx.preceding_nft_transfer(log.log_index) else {
        return Ok(());
    };
    let transfer = transfer.clone();
    // The adjacent transfer must actually move the token in or out of the
    // pool, otherwise it belongs to something else in the same transaction.
    let counterparty = match side {
        OrderSide::Buy if transfer.to == pool => transfer.from,
        OrderSide::Sell if transfer.from == pool => transfer.to,
        _ => return Ok(()),
    };
    let order_id = pool_order_id(ProtocolKind::Sudoswap, pool, side);
    let Some(price) = env.orders.pool_price(&order_id).await? else {
        return Ok(());
    };
    let (taker, fill_source) = env.resolve_taker(base.tx_hash, counterparty);
    // Pool orders never close; every swap is a partial fill of the pool's
    // standing order.
    super::push_fill(
        base,
        Fill {
            kind: ProtocolKind::Sudoswap,
            order_id: Some(order_id),
            side,
            maker: pool,
            taker,
            contract: transfer.contract,
            token_id: transfer.token_id.unwrap_or_default(),
            quantity: transfer.amount,
            price,
            currency: Address::ZERO,
            fill_source,
        },
        true,
        out,
    );
    Ok(())
}
