use {
    crate::{abi, context::TxContext, normalizer::OnChainData, parser::RawLog},
    anyhow::Result,
    model::{
        events::{Approval, CanonicalEvent, EventIndex, TokenKind, Transfer},
        triggers::{MakerInfo, MakerTrigger},
    },
};

pub(crate) fn transfer(
    log: &RawLog,
    base: EventIndex,
    ctx: &mut TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::erc721::Transfer = super::decode(log)?;
    super::push_nft_transfer(
        base,
        Transfer {
            token: TokenKind::Erc721,
            contract: log.address,
            from: event.from,
            to: event.to,
            token_id: Some(event.tokenId),
            amount: alloy_primitives::U256::from(1),
        },
        ctx,
        out,
    );
    Ok(())
}

pub(crate) fn like_transfer(
    log: &RawLog,
    base: EventIndex,
    ctx: &mut TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::erc721_like::Transfer = super::decode(log)?;
    super::push_nft_transfer(
        base,
        Transfer {
            token: TokenKind::Erc721,
            contract: log.address,
            from: event.from,
            to: event.to,
            token_id: Some(event.tokenId),
            amount: alloy_primitives::U256::from(1),
        },
        ctx,
        out,
    );
    Ok(())
}

pub(crate) fn approval_for_all(
    log: &RawLog,
    base: EventIndex,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::erc721::ApprovalForAll = super::decode(log)?;
    // Approvals are rechecked individually, so the context is per on-chain
    // event rather than per transaction.
    out.makers.push(MakerInfo {
        context: format!(
            "{:#x}-{:#x}-{}-{:#x}-sell-approval",
            base.tx_hash, log.address, base.log_index, event.owner,
        ),
        maker: event.owner,
        trigger: MakerTrigger::SellApproval {
            contract: log.address,
            operator: event.operator,
            approved: event.approved,
        },
    });
    out.events.push((
        base,
        CanonicalEvent::Approval(Approval {
            contract: log.address,
            owner: event.owner,
            operator: event.operator,
            approved: event.approved,
        }),
    ));
    Ok(())
}
