//! Derived trigger records pushed to queue-shaped downstream collaborators
//! after a batch of canonical events has been persisted.
//!
//! Every trigger carries a `context` string the receiving queue uses for
//! deduplication, so emitting the same trigger for several events of one
//! transaction is harmless.

use {
    crate::order::OrderSide,
    alloy_primitives::{Address, B256, U256},
};

/// Fill accounting input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FillInfo {
    pub context: String,
    pub order_id: Option<String>,
    pub side: OrderSide,
    pub contract: Address,
    pub token_id: U256,
    pub amount: U256,
    pub price: U256,
    pub timestamp: u64,
}

/// Order-status recomputation keyed by order id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderInfo {
    pub context: String,
    pub id: String,
    pub trigger: OrderTrigger,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OrderTrigger {
    Sale,
    Cancel,
}

/// Order-status recomputation keyed by maker, caused by a balance or
/// approval change observed on chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MakerInfo {
    pub context: String,
    pub maker: Address,
    pub trigger: MakerTrigger,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MakerTrigger {
    /// The maker's NFT balance changed; sell orders need revalidation.
    SellBalance { contract: Address, token_id: U256 },
    /// The maker's fungible balance changed; buy orders need revalidation.
    BuyBalance { contract: Address },
    /// The maker's collection-wide operator approval changed.
    SellApproval {
        contract: Address,
        operator: Address,
        approved: bool,
    },
    /// An ERC-20 moved in the same transaction as a sale; the maker's
    /// currency approval towards the exchange needs a recheck.
    BuyApproval { contract: Address },
}

/// Metadata indexing input for newly minted tokens.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MintInfo {
    pub contract: Address,
    pub token_id: U256,
}

/// Activity feed input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActivityInfo {
    pub context: String,
    pub kind: ActivityKind,
    pub contract: Address,
    pub token_id: U256,
    pub tx_hash: B256,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActivityKind {
    Sale,
    Transfer,
    Mint,
}
