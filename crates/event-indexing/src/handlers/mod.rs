//! Per-protocol normalization handlers. Each handler is a pure function of
//! the decoded log, the transaction context and the prefetched auxiliary
//! data; everything they produce goes into the [`OnChainData`] accumulator.

pub mod erc1155;
pub mod erc20;
pub mod erc721;
pub mod looks_rare;
pub mod seaport;
pub mod sudoswap;
pub mod wyvern_v23;
pub mod zeroex_v4;

use {
    crate::{context::TxContext, normalizer::OnChainData, parser::RawLog},
    alloy_primitives::Address,
    alloy_sol_types::SolEvent,
    anyhow::Result,
    model::{
        events::{CanonicalEvent, EventIndex, Fill, Transfer},
        triggers::{ActivityInfo, ActivityKind, FillInfo, MakerInfo, MakerTrigger, MintInfo, OrderInfo, OrderTrigger},
    },
};

pub(crate) fn decode<E: SolEvent>(log: &RawLog) -> Result<E> {
    Ok(E::decode_raw_log(log.topics.iter().copied(), &log.data)?)
}

/// Emits an NFT transfer with every derived record: balance-change triggers
/// per side, a mint trigger when minted, an activity entry and the context
/// update needed for positional lookback.
pub(crate) fn push_nft_transfer(
    index: EventIndex,
    transfer: Transfer,
    ctx: &mut TxContext,
    out: &mut OnChainData,
) {
    let token_id = transfer.token_id.unwrap_or_default();
    // One context per (tx, contract, token, owner) so the queue handles the
    // same balance only once per transaction.
    let prefix = format!("{:#x}-{:#x}-{token_id}", index.tx_hash, transfer.contract);
    for owner in [transfer.from, transfer.to] {
        if owner == Address::ZERO {
            continue;
        }
        out.makers.push(MakerInfo {
            context: format!("{prefix}-{owner:#x}-sell-balance"),
            maker: owner,
            trigger: MakerTrigger::SellBalance {
                contract: transfer.contract,
                token_id,
            },
        });
    }
    let kind = if transfer.is_mint() {
        out.mints.push(MintInfo {
            contract: transfer.contract,
            token_id,
        });
        ActivityKind::Mint
    } else {
        ActivityKind::Transfer
    };
    out.activities.push(ActivityInfo {
        context: activity_context(kind, &index),
        kind,
        contract: transfer.contract,
        token_id,
        tx_hash: index.tx_hash,
    });
    ctx.observe_nft_transfer(index, transfer.clone());
    out.events.push((index, CanonicalEvent::Transfer(transfer)));
}

/// Emits a fill with its order-status, fill-accounting and activity records.
pub(crate) fn push_fill(index: EventIndex, fill: Fill, partial: bool, out: &mut OnChainData) {
    let context = match &fill.order_id {
        Some(id) => {
            out.orders.push(OrderInfo {
                context: format!("filled-{id}"),
                id: id.clone(),
                trigger: OrderTrigger::Sale,
            });
            id.clone()
        }
        // Unresolved fills still need accounting; key them by coordinates.
        None => format!("{:#x}-{}-{}", index.tx_hash, index.log_index, index.batch_index),
    };
    out.fills.push(FillInfo {
        context,
        order_id: fill.order_id.clone(),
        side: fill.side,
        contract: fill.contract,
        token_id: fill.token_id,
        amount: fill.quantity,
        price: fill.price,
        timestamp: index.timestamp,
    });
    out.activities.push(ActivityInfo {
        context: activity_context(ActivityKind::Sale, &index),
        kind: ActivityKind::Sale,
        contract: fill.contract,
        token_id: fill.token_id,
        tx_hash: index.tx_hash,
    });
    let event = if partial {
        CanonicalEvent::PartialFill(fill)
    } else {
        CanonicalEvent::Fill(fill)
    };
    out.events.push((index, event));
}

fn activity_context(kind: ActivityKind, index: &EventIndex) -> String {
    let kind = match kind {
        ActivityKind::Sale => "sale",
        ActivityKind::Transfer => "transfer",
        ActivityKind::Mint => "mint",
    };
    format!(
        "{kind}-{:#x}-{}-{}",
        index.tx_hash, index.log_index, index.batch_index,
    )
}
