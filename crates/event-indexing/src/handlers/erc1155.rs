use {
    crate::{abi, context::TxContext, normalizer::OnChainData, parser::RawLog},
    anyhow::Result,
    model::events::{EventIndex, TokenKind, Transfer},
};

pub(crate) fn transfer_single(
    log: &RawLog,
    base: EventIndex,
    ctx: &mut TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::erc1155::TransferSingle = super::decode(log)?;
    super::push_nft_transfer(
        base,
        Transfer {
            token: TokenKind::Erc1155,
            contract: log.address,
            from: event.from,
            to: event.to,
            token_id: Some(event.tokenId),
            amount: event.amount,
        },
        ctx,
        out,
    );
    Ok(())
}

/// Bundled transfers fan out into one event per (tokenId, amount) pair, each
/// with its own batch index so the idempotency key stays unique.
pub(crate) fn transfer_batch(
    log: &RawLog,
    base: EventIndex,
    ctx: &mut TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::erc1155::TransferBatch = super::decode(log)?;
    let count = event.tokenIds.len().min(event.amounts.len());
    for i in 0..count {
        super::push_nft_transfer(
            base.with_batch_index(i as u64 + 1),
            Transfer {
                token: TokenKind::Erc1155,
                contract: log.address,
                from: event.from,
                to: event.to,
                token_id: Some(event.tokenIds[i]),
                amount: event.amounts[i],
            },
            ctx,
            out,
        );
    }
    Ok(())
}
