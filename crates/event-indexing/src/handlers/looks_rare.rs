use {
    crate::{
        abi,
        context::TxContext,
        normalizer::{Env, OnChainData},
        parser::RawLog,
    },
    alloy_primitives::{Address, B256, U256},
    anyhow::Result,
    model::{
        events::{BulkCancel, CanonicalEvent, EventIndex, Fill, NonceCancel},
        order::{OrderSide, ProtocolKind, order_id_from_hash},
        triggers::{MakerInfo, MakerTrigger},
    },
};

/// A taker accepted a bid: the maker's buy order got filled.
pub(crate) fn taker_ask(
    log: &RawLog,
    base: EventIndex,
    env: &Env<'_>,
    ctx: &TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::looks_rare::TakerAsk = super::decode(log)?;
    fill(
        FillParams {
            side: OrderSide::Buy,
            order_hash: event.orderHash,
            nonce: event.orderNonce,
            maker: event.maker,
            taker: event.taker,
            currency: event.currency,
            collection: event.collection,
            token_id: event.tokenId,
            amount: event.amount,
            price: event.price,
        },
        base,
        env,
        ctx,
        out,
    )
}

/// A taker bought a listing: the maker's sell order got filled.
pub(crate) fn taker_bid(
    log: &RawLog,
    base: EventIndex,
    env: &Env<'_>,
    ctx: &TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::looks_rare::TakerBid = super::decode(log)?;
    fill(
        FillParams {
            side: OrderSide::Sell,
            order_hash: event.orderHash,
            nonce: event.orderNonce,
            maker: event.maker,
            taker: event.taker,
            currency: event.currency,
            collection: event.collection,
            token_id: event.tokenId,
            amount: event.amount,
            price: event.price,
        },
        base,
        env,
        ctx,
        out,
    )
}

struct FillParams {
    side: OrderSide,
    order_hash: B256,
    nonce: U256,
    maker: Address,
    taker: Address,
    currency: Address,
    collection: Address,
    token_id: U256,
    amount: U256,
    price: U256,
}

fn fill(
    params: FillParams,
    base: EventIndex,
    env: &Env<'_>,
    ctx: &TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    // The event reports the total paid; fills are recorded per unit.
    let Some(price) = params.price.checked_div(params.amount) else {
        return Ok(());
    };
    let (taker, fill_source) = env.resolve_taker(base.tx_hash, params.taker);
    super::push_fill(
        base,
        Fill {
            kind: ProtocolKind::LooksRare,
            order_id: Some(order_id_from_hash(params.order_hash)),
            side: params.side,
            maker: params.maker,
            taker,
            contract: params.collection,
            token_id: params.token_id,
            quantity: params.amount,
            price,
            currency: params.currency,
            fill_source,
        },
        false,
        out,
    );

    // A maker may have signed several orders under this nonce but only one of
    // them is fillable; the fill invalidates all of its siblings.
    out.events.push((
        base,
        CanonicalEvent::NonceCancel(NonceCancel {
            kind: ProtocolKind::LooksRare,
            maker: params.maker,
            nonce: params.nonce,
        }),
    ));

    // An ERC-20 moving in the same transaction means the maker's currency
    // approval towards the exchange may have changed.
    if let Some(contract) = ctx.erc20_transfer() {
        out.makers.push(MakerInfo {
            context: format!("{:#x}-buy-approval", base.tx_hash),
            maker: params.maker,
            trigger: MakerTrigger::BuyApproval { contract },
        });
    }
    Ok(())
}

pub(crate) fn cancel_all_orders(
    log: &RawLog,
    base: EventIndex,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::looks_rare::CancelAllOrders = super::decode(log)?;
    out.events.push((
        base,
        CanonicalEvent::BulkCancel(BulkCancel {
            kind: ProtocolKind::LooksRare,
            maker: event.user,
            min_nonce: event.newMinNonce,
        }),
    ));
    Ok(())
}

pub(crate) fn cancel_multiple_orders(
    log: &RawLog,
    base: EventIndex,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::looks_rare::CancelMultipleOrders = super::decode(log)?;
    for (i, nonce) in event.orderNonces.iter().enumerate() {
        out.events.push((
            base.with_batch_index(i as u64 + 1),
            CanonicalEvent::NonceCancel(NonceCancel {
                kind: ProtocolKind::LooksRare,
                maker: event.user,
                nonce: *nonce,
            }),
        ));
    }
    Ok(())
}
