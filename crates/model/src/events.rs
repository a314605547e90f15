use {
    crate::order::{OrderSide, ProtocolKind},
    alloy_primitives::{Address, B256, U256},
};

/// On-chain coordinates of a canonical event.
///
/// `(block_hash, tx_hash, log_index, batch_index)` uniquely identifies an
/// event; re-ingesting the same tuple must be a no-op. `batch_index` starts at
/// 1 and only exceeds it for logs that fan out into multiple events (erc1155
/// batch transfers, two-sided matches, multi-nonce cancels).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EventIndex {
    pub block: u64,
    pub block_hash: B256,
    pub tx_hash: B256,
    pub log_index: u64,
    pub batch_index: u64,
    pub timestamp: u64,
}

impl EventIndex {
    pub fn with_batch_index(mut self, batch_index: u64) -> Self {
        self.batch_index = batch_index;
        self
    }
}

/// A normalized, protocol-agnostic record derived from a raw chain log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CanonicalEvent {
    Fill(Fill),
    /// A fill of an order that remains partially open afterwards
    /// (erc1155-style quantities).
    PartialFill(Fill),
    Cancel(Cancel),
    NonceCancel(NonceCancel),
    BulkCancel(BulkCancel),
    Transfer(Transfer),
    Approval(Approval),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fill {
    pub kind: ProtocolKind,
    /// Some protocols only expose a (maker, nonce) pair on-chain; when
    /// resolution against stored orders fails this stays `None`.
    pub order_id: Option<String>,
    pub side: OrderSide,
    pub maker: Address,
    pub taker: Address,
    pub contract: Address,
    pub token_id: U256,
    pub quantity: U256,
    /// Unit price in the smallest denomination of `currency`.
    pub price: U256,
    /// Zero address for the native token.
    pub currency: Address,
    /// Attribution of routed fills to the aggregator that mediated them.
    pub fill_source: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cancel {
    pub kind: ProtocolKind,
    pub order_id: String,
}

/// Invalidates every order of the maker signed under the given nonce.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NonceCancel {
    pub kind: ProtocolKind,
    pub maker: Address,
    pub nonce: U256,
}

/// Invalidates every order of the maker with a nonce below the new minimum.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BulkCancel {
    pub kind: ProtocolKind,
    pub maker: Address,
    pub min_nonce: U256,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TokenKind {
    Erc20,
    Erc721,
    Erc1155,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transfer {
    pub token: TokenKind,
    pub contract: Address,
    pub from: Address,
    pub to: Address,
    /// `None` for fungible transfers.
    pub token_id: Option<U256>,
    pub amount: U256,
}

impl Transfer {
    pub fn is_mint(&self) -> bool {
        self.from == Address::ZERO
    }
}

/// Operator approval over a whole collection (`ApprovalForAll`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Approval {
    pub contract: Address,
    pub owner: Address,
    pub operator: Address,
    pub approved: bool,
}
