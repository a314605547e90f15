use {
    crate::{
        abi,
        normalizer::{Env, OnChainData},
        parser::RawLog,
    },
    alloy_primitives::{Address, U256},
    anyhow::Result,
    model::{
        events::{BulkCancel, Cancel, CanonicalEvent, EventIndex, Fill},
        order::{OrderSide, ProtocolKind, order_id_from_hash},
        triggers::{OrderInfo, OrderTrigger},
    },
};

// Seaport item types. Criteria-based items (4, 5) cannot be attributed to a
// concrete token and are not handled.
const ITEM_NATIVE: u8 = 0;
const ITEM_ERC20: u8 = 1;
const ITEM_ERC721: u8 = 2;
const ITEM_ERC1155: u8 = 3;

struct FillDetails {
    side: OrderSide,
    contract: Address,
    token_id: U256,
    quantity: U256,
    currency: Address,
    total: U256,
    partial: bool,
}

pub(crate) fn order_fulfilled(
    log: &RawLog,
    base: EventIndex,
    env: &Env<'_>,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::seaport::OrderFulfilled = super::decode(log)?;
    let Some(details) = fill_details(&event) else {
        // Criteria items, bundles and other exotic shapes are skipped.
        return Ok(());
    };
    // Division by zero means a malformed log; skip rather than poison the batch.
    let Some(price) = details.total.checked_div(details.quantity) else {
        return Ok(());
    };
    let (taker, fill_source) = env.resolve_taker(base.tx_hash, event.recipient);
    super::push_fill(
        base,
        Fill {
            kind: ProtocolKind::Seaport,
            order_id: Some(order_id_from_hash(event.orderHash)),
            side: details.side,
            maker: event.offerer,
            taker,
            contract: details.contract,
            token_id: details.token_id,
            quantity: details.quantity,
            price,
            currency: details.currency,
            fill_source,
        },
        details.partial,
        out,
    );
    Ok(())
}

/// The traded asset and payment of a fulfillment. A listing offers the NFT
/// and collects currency considerations (fees included); a bid offers the
/// currency in full and collects the NFT among the considerations.
fn fill_details(event: &abi::seaport::OrderFulfilled) -> Option<FillDetails> {
    let offer = event.offer.first()?;
    match offer.itemType {
        ITEM_ERC721 | ITEM_ERC1155 => {
            let payments: Vec<_> = event
                .consideration
                .iter()
                .filter(|item| matches!(item.itemType, ITEM_NATIVE | ITEM_ERC20))
                .collect();
            let total = payments.iter().map(|item| item.amount).sum();
            Some(FillDetails {
                side: OrderSide::Sell,
                contract: offer.token,
                token_id: offer.identifier,
                quantity: offer.amount,
                currency: payments.first()?.token,
                total,
                partial: offer.itemType == ITEM_ERC1155,
            })
        }
        ITEM_NATIVE | ITEM_ERC20 => {
            let nft = event
                .consideration
                .iter()
                .find(|item| matches!(item.itemType, ITEM_ERC721 | ITEM_ERC1155))?;
            Some(FillDetails {
                side: OrderSide::Buy,
                contract: nft.token,
                token_id: nft.identifier,
                quantity: nft.amount,
                currency: offer.token,
                total: offer.amount,
                partial: nft.itemType == ITEM_ERC1155,
            })
        }
        _ => None,
    }
}

pub(crate) fn order_cancelled(log: &RawLog, base: EventIndex, out: &mut OnChainData) -> Result<()> {
    let event: abi::seaport::OrderCancelled = super::decode(log)?;
    let order_id = order_id_from_hash(event.orderHash);
    out.orders.push(OrderInfo {
        context: format!("cancelled-{order_id}"),
        id: order_id.clone(),
        trigger: OrderTrigger::Cancel,
    });
    out.events.push((
        base,
        CanonicalEvent::Cancel(Cancel {
            kind: ProtocolKind::Seaport,
            order_id,
        }),
    ));
    Ok(())
}

pub(crate) fn counter_incremented(
    log: &RawLog,
    base: EventIndex,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::seaport::CounterIncremented = super::decode(log)?;
    out.events.push((
        base,
        CanonicalEvent::BulkCancel(BulkCancel {
            kind: ProtocolKind::Seaport,
            maker: event.offerer,
            min_nonce: event.newCounter,
        }),
    ));
    Ok(())
}
