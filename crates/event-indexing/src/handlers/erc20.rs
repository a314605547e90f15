use {
    crate::{abi, context::TxContext, normalizer::OnChainData, parser::RawLog},
    alloy_primitives::{Address, U256},
    anyhow::Result,
    model::{
        events::{CanonicalEvent, EventIndex, TokenKind, Transfer},
        triggers::{MakerInfo, MakerTrigger},
    },
};

pub(crate) fn transfer(
    log: &RawLog,
    base: EventIndex,
    ctx: &mut TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::erc20::Transfer = super::decode(log)?;
    push_ft_transfer(log.address, event.from, event.to, event.amount, base, ctx, out);
    Ok(())
}

/// Wrapping native currency mints wrapped tokens out of nowhere; modeled as
/// a transfer from the zero address so deposits count towards the balance.
pub(crate) fn deposit(
    log: &RawLog,
    base: EventIndex,
    ctx: &mut TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::erc20::Deposit = super::decode(log)?;
    push_ft_transfer(log.address, Address::ZERO, event.to, event.amount, base, ctx, out);
    Ok(())
}

pub(crate) fn withdrawal(
    log: &RawLog,
    base: EventIndex,
    ctx: &mut TxContext,
    out: &mut OnChainData,
) -> Result<()> {
    let event: abi::erc20::Withdrawal = super::decode(log)?;
    push_ft_transfer(log.address, event.from, Address::ZERO, event.amount, base, ctx, out);
    Ok(())
}

fn push_ft_transfer(
    contract: Address,
    from: Address,
    to: Address,
    amount: U256,
    index: EventIndex,
    ctx: &mut TxContext,
    out: &mut OnChainData,
) {
    ctx.observe_erc20_transfer(contract);
    let prefix = format!("{:#x}-{contract:#x}", index.tx_hash);
    for owner in [from, to] {
        if owner == Address::ZERO {
            continue;
        }
        out.makers.push(MakerInfo {
            context: format!("{prefix}-{owner:#x}-buy-balance"),
            maker: owner,
            trigger: MakerTrigger::BuyBalance { contract },
        });
    }
    out.events.push((
        index,
        CanonicalEvent::Transfer(Transfer {
            token: TokenKind::Erc20,
            contract,
            from,
            to,
            token_id: None,
            amount,
        }),
    ));
}
