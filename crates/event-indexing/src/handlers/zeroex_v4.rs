//! 0x-style protocols only expose a (maker, nonce) pair on-chain. Fills are
//! resolved against stored orders to recover the order id and the
//! authoritative price: the on-chain amount is net of fees, the stored price
//! is not. When no match exists the fee-exclusive on-chain price is recorded
//! as-is.

use {
    crate::{
        abi,
        normalizer::{Env, OnChainData},
        parser::RawLog,
    },
    alloy_primitives::U256,
    anyhow::Result,
    model::{
        events::{CanonicalEvent, EventIndex, Fill, NonceCancel},
        order::{OrderSide, ProtocolKind},
    },
};

// TradeDirection: 0 = the maker sells the NFT, 1 = the maker bids on it.
const DIRECTION_SELL: u8 = 0;

pub(crate) async fn erc721_order_filled(
    log: &RawLog,
    base: EventIndex,
    env: &Env<'_>,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::zeroex_v4::ERC721OrderFilled = super::decode(log)?;
    let kind = ProtocolKind::ZeroexV4Erc721;
    let resolved = env
        .orders
        .find_by_maker_nonce(kind, event.maker, event.nonce)
        .await?;
    let (order_id, price) = match resolved {
        Some(order) => (Some(order.id), order.price),
        None => (None, event.erc20TokenAmount),
    };
    let (taker, fill_source) = env.resolve_taker(base.tx_hash, event.taker);
    super::push_fill(
        base,
        Fill {
            kind,
            order_id,
            side: side_of(event.direction),
            maker: event.maker,
            taker,
            contract: event.erc721Token,
            token_id: event.erc721TokenId,
            quantity: U256::from(1),
            price,
            currency: event.erc20Token,
            fill_source,
        },
        false,
        out,
    );
    // An erc721 order is consumed whole, which invalidates every sibling
    // signed under the same nonce.
    out.events.push((
        base,
        CanonicalEvent::NonceCancel(NonceCancel {
            kind,
            maker: event.maker,
            nonce: event.nonce,
        }),
    ));
    Ok(())
}

pub(crate) async fn erc1155_order_filled(
    log: &RawLog,
    base: EventIndex,
    env: &Env<'_>,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::zeroex_v4::ERC1155OrderFilled = super::decode(log)?;
    let kind = ProtocolKind::ZeroexV4Erc1155;
    let quantity = U256::from(event.erc1155FillAmount);
    let resolved = env
        .orders
        .find_by_maker_nonce(kind, event.maker, event.nonce)
        .await?;
    let (order_id, price) = match resolved {
        Some(order) => (Some(order.id), order.price),
        None => {
            let Some(price) = event.erc20FillAmount.checked_div(quantity) else {
                return Ok(());
            };
            (None, price)
        }
    };
    let (taker, fill_source) = env.resolve_taker(base.tx_hash, event.taker);
    // Erc1155 orders fill in pieces; the order stays open and the nonce
    // stays valid for the remainder.
    super::push_fill(
        base,
        Fill {
            kind,
            order_id,
            side: side_of(event.direction),
            maker: event.maker,
            taker,
            contract: event.erc1155Token,
            token_id: event.erc1155TokenId,
            quantity,
            price,
            currency: event.erc20Token,
            fill_source,
        },
        true,
        out,
    );
    Ok(())
}

fn side_of(direction: u8) -> OrderSide {
    if direction == DIRECTION_SELL {
        OrderSide::Sell
    } else {
        OrderSide::Buy
    }
}

pub(crate) fn erc721_order_cancelled(
    log: &RawLog,
    base: EventIndex,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::zeroex_v4::ERC721OrderCancelled = super::decode(log)?;
    out.events.push((
        base,
        CanonicalEvent::NonceCancel(NonceCancel {
            kind: ProtocolKind::ZeroexV4Erc721,
            maker: event.maker,
            nonce: event.nonce,
        }),
    ));
    Ok(())
}

pub(crate) fn erc1155_order_cancelled(
    log: &RawLog,
    base: EventIndex,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::zeroex_v4::ERC1155OrderCancelled = super::decode(log)?;
    out.events.push((
        base,
        CanonicalEvent::NonceCancel(NonceCancel {
            kind: ProtocolKind::ZeroexV4Erc1155,
            maker: event.maker,
            nonce: event.nonce,
        }),
    ));
    Ok(())
}
