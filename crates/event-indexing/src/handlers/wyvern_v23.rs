//! Wyvern-style fill events name neither the traded asset nor the payment
//! token. Both are reconstructed positionally: the asset from the NFT
//! transfer emitted by the immediately preceding log, the payment token from
//! any ERC-20 movement earlier in the transaction (native currency
//! otherwise).

use {
    crate::{
        abi,
        context::TxContext,
        normalizer::{Env, OnChainData},
        parser::RawLog,
    },
    alloy_primitives::{Address, B256},
    anyhow::Result,
    model::{
        events::{BulkCancel, CanonicalEvent, EventIndex, Fill},
        order::{OrderSide, ProtocolKind, order_id_from_hash},
    },
};

pub(crate) fn orders_matched(
    log: &RawLog,
    base: EventIndex,
    env: &Env<'_>,
    ctx: &TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::wyvern_v23::OrdersMatched = super::decode(log)?;
    // Without an adjacent single-token transfer the fill cannot be
    // associated with an asset and is skipped.
    let Some((_, transfer)) = ctx.preceding_nft_transfer(log.log_index) else {
        return Ok(());
    };
    let transfer = transfer.clone();
    let Some(price) = event.price.checked_div(transfer.amount) else {
        return Ok(());
    };
    let currency = ctx.erc20_transfer().unwrap_or(Address::ZERO);
    let (taker, fill_source) = env.resolve_taker(base.tx_hash, event.taker);

    // A match settles up to two orders at once; both sides reference the
    // same traded asset, with distinct batch indexes.
    let mut batch_index = 1;
    for (order_hash, side) in [
        (event.buyHash, OrderSide::Buy),
        (event.sellHash, OrderSide::Sell),
    ] {
        if order_hash == B256::ZERO {
            continue;
        }
        super::push_fill(
            base.with_batch_index(batch_index),
            Fill {
                kind: ProtocolKind::WyvernV23,
                order_id: Some(order_id_from_hash(order_hash)),
                side,
                maker: event.maker,
                taker,
                contract: transfer.contract,
                token_id: transfer.token_id.unwrap_or_default(),
                quantity: transfer.amount,
                price,
                currency,
                fill_source: fill_source.clone(),
            },
            false,
            out,
        );
        batch_index += 1;
    }
    Ok(())
}

pub(crate) fn nonce_incremented(
    log: &RawLog,
    base: EventIndex,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::wyvern_v23::NonceIncremented = super::decode(log)?;
    out.events.push((
        base,
        CanonicalEvent::BulkCancel(BulkCancel {
            kind: ProtocolKind::WyvernV23,
            maker: event.maker,
            min_nonce: event.newNonce,
        }),
    ));
    Ok(())
}
