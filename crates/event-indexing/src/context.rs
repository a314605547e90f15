//! Transaction-scoped lookback state, threaded through the fold over a log
//! range as an explicit accumulator.
//!
//! Legacy fill events omit the traded asset (and sometimes the payment
//! token) entirely; those handlers reconstruct them positionally from the
//! transfer logs observed earlier in the same transaction.

use {
    alloy_primitives::{Address, B256},
    model::events::{EventIndex, Transfer},
};

#[derive(Debug, Default)]
pub struct TxContext {
    tx_hash: B256,
    erc20_contracts: Vec<Address>,
    last_nft_transfer: Option<(EventIndex, Transfer)>,
}

impl TxContext {
    /// Clears the accumulator when processing crosses into a new transaction.
    /// Must be called for every log before it is handled.
    pub fn enter(&mut self, tx_hash: B256) {
        if self.tx_hash != tx_hash {
            *self = Self {
                tx_hash,
                ..Default::default()
            };
        }
    }

    pub fn observe_erc20_transfer(&mut self, contract: Address) {
        self.erc20_contracts.push(contract);
    }

    pub fn observe_nft_transfer(&mut self, index: EventIndex, transfer: Transfer) {
        self.last_nft_transfer = Some((index, transfer));
    }

    /// The ERC-20 contract that moved funds earlier in this transaction, if
    /// any. Used to recover the payment token for fills that do not name it
    /// and to trigger currency approval rechecks.
    pub fn erc20_transfer(&self) -> Option<Address> {
        self.erc20_contracts.last().copied()
    }

    /// The NFT transfer emitted by the immediately preceding log of the same
    /// transaction, but only if that log produced exactly one transfer.
    /// Multi-item logs cannot be associated with a single-token fill.
    pub fn preceding_nft_transfer(&self, log_index: u64) -> Option<&(EventIndex, Transfer)> {
        let (index, _) = self.last_nft_transfer.as_ref()?;
        (index.log_index + 1 == log_index && index.batch_index == 1)
            .then_some(self.last_nft_transfer.as_ref())?
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        alloy_primitives::U256,
        model::events::TokenKind,
    };

    fn transfer() -> Transfer {
        Transfer {
            token: TokenKind::Erc721,
            contract: Address::repeat_byte(0x22),
            from: Address::repeat_byte(0x33),
            to: Address::repeat_byte(0x44),
            token_id: Some(U256::from(7)),
            amount: U256::from(1),
        }
    }

    #[test]
    fn lookback_requires_adjacent_single_transfer() {
        let mut ctx = TxContext::default();
        ctx.enter(B256::repeat_byte(1));
        let index = EventIndex {
            log_index: 10,
            batch_index: 1,
            ..Default::default()
        };
        ctx.observe_nft_transfer(index, transfer());

        assert!(ctx.preceding_nft_transfer(11).is_some());
        // Not adjacent.
        assert!(ctx.preceding_nft_transfer(12).is_none());

        // A batched transfer cannot be associated.
        ctx.observe_nft_transfer(index.with_batch_index(2), transfer());
        assert!(ctx.preceding_nft_transfer(11).is_none());
    }

    #[test]
    fn entering_a_new_transaction_clears_state() {
        let mut ctx = TxContext::default();
        ctx.enter(B256::repeat_byte(1));
        ctx.observe_erc20_transfer(Address::repeat_byte(0xee));
        assert!(ctx.erc20_transfer().is_some());

        // Same transaction keeps the state.
        ctx.enter(B256::repeat_byte(1));
        assert!(ctx.erc20_transfer().is_some());

        ctx.enter(B256::repeat_byte(2));
        assert!(ctx.erc20_transfer().is_none());
    }
}
