//! Read-only query surface over persisted order, balance and approval state.
//! The planner only ever reads; mutation is the exclusive responsibility of
//! the ingestion pipeline and of downstream order-status recomputation.

use {
    alloy_primitives::{Address, U256},
    anyhow::{Context as _, Result},
    bigdecimal::BigDecimal,
    database::{byte_array::ByteArray, events, nft_balances, orders, tokens},
    model::{
        events::TokenKind,
        order::{OrderSide, ProtocolKind},
    },
    number::conversions::{big_decimal_to_u256, u256_to_big_decimal},
    serde::{Deserialize, Serialize},
};

/// A (contract, token id) pair.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TokenRef {
    pub contract: Address,
    pub token_id: U256,
}

impl std::fmt::Display for TokenRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}:{}", self.contract, self.token_id)
    }
}

/// A fee or royalty recipient with an absolute per-unit amount.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Fee {
    pub recipient: Address,
    pub amount: U256,
}

/// In-memory view of a stored order, as the planner consumes it.
#[derive(Clone, Debug)]
pub struct Order {
    pub id: String,
    pub kind: ProtocolKind,
    pub maker: Address,
    pub contract: Address,
    pub token_id: U256,
    pub token_kind: TokenKind,
    /// Unit price in the smallest denomination of `currency`.
    pub price: U256,
    pub currency: Address,
    pub quantity_remaining: U256,
    /// Total built-in fees in basis points of the unit price.
    pub fee_bps: u32,
    /// Per-unit royalties missing from the built-in fees.
    pub missing_royalties: Vec<Fee>,
    /// Raw protocol payload as submitted to the order codec.
    pub raw_data: serde_json::Value,
    /// Domain of the orderbook the order was sourced from.
    pub source: Option<String>,
}

/// Read access to the order book and its surrounding state. Injected so
/// planner tests can run against an in-memory fixture.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OrderBook: Send + Sync {
    /// Price-sorted candidates on the given side of the book for a token,
    /// best first: fillable, approved, open to the taker and not explicitly
    /// excluded. `normalize_royalties` orders by the royalty-normalized
    /// effective value instead of the raw one.
    async fn candidates(
        &self,
        side: OrderSide,
        token: TokenRef,
        taker: Address,
        excluded: &[String],
        normalize_royalties: bool,
    ) -> Result<Vec<Order>>;

    /// Validates an explicitly requested order against a token, quantity and
    /// taker. `allow_inactive` skips the fillability and approval checks.
    async fn order_by_id(
        &self,
        id: &str,
        side: OrderSide,
        token: TokenRef,
        quantity: U256,
        taker: Address,
        allow_inactive: bool,
    ) -> Result<Option<Order>>;

    /// Fungible balance of an owner in the given currency.
    async fn ft_balance(&self, currency: Address, owner: Address) -> Result<U256>;

    /// How many units of the token the owner holds.
    async fn nft_balance(&self, token: TokenRef, owner: Address) -> Result<U256>;

    /// Flagged status of a token; `None` for tokens that are not known at
    /// all.
    async fn token_flagged(&self, token: TokenRef) -> Result<Option<bool>>;

    /// Whether the owner granted collection-wide approval to the operator.
    async fn nft_approved(
        &self,
        contract: Address,
        owner: Address,
        operator: Address,
    ) -> Result<bool>;
}

#[derive(Clone)]
pub struct Postgres {
    pub pool: sqlx::PgPool,
}

#[async_trait::async_trait]
impl OrderBook for Postgres {
    async fn candidates(
        &self,
        side: OrderSide,
        token: TokenRef,
        taker: Address,
        excluded: &[String],
        normalize_royalties: bool,
    ) -> Result<Vec<Order>> {
        let mut connection = self.pool.acquire().await?;
        let contract = address_into(token.contract);
        let token_id = u256_to_big_decimal(&token.token_id);
        let taker = address_into(taker);
        let rows = match side {
            OrderSide::Buy => {
                orders::bid_candidates(
                    &mut connection,
                    &contract,
                    &token_id,
                    &taker,
                    excluded,
                    normalize_royalties,
                )
                .await?
            }
            OrderSide::Sell => {
                orders::listing_candidates(
                    &mut connection,
                    &contract,
                    &token_id,
                    &taker,
                    excluded,
                    normalize_royalties,
                )
                .await?
            }
        };
        rows.iter().map(order_from).collect()
    }

    async fn order_by_id(
        &self,
        id: &str,
        side: OrderSide,
        token: TokenRef,
        quantity: U256,
        taker: Address,
        allow_inactive: bool,
    ) -> Result<Option<Order>> {
        let mut connection = self.pool.acquire().await?;
        let row = orders::single_order(
            &mut connection,
            id,
            order_side_into(side),
            &address_into(token.contract),
            &u256_to_big_decimal(&token.token_id),
            &u256_to_big_decimal(&quantity),
            &address_into(taker),
            allow_inactive,
        )
        .await?;
        row.as_ref().map(order_from).transpose()
    }

    async fn ft_balance(&self, currency: Address, owner: Address) -> Result<U256> {
        let mut connection = self.pool.acquire().await?;
        let balance = events::ft_balance_of(
            &mut connection,
            &address_into(currency),
            &address_into(owner),
        )
        .await?;
        balance_into(&balance)
    }

    async fn nft_balance(&self, token: TokenRef, owner: Address) -> Result<U256> {
        let mut connection = self.pool.acquire().await?;
        let balance = nft_balances::balance_of(
            &mut connection,
            &address_into(token.contract),
            &u256_to_big_decimal(&token.token_id),
            &address_into(owner),
        )
        .await?;
        balance_into(&balance)
    }

    async fn token_flagged(&self, token: TokenRef) -> Result<Option<bool>> {
        let mut connection = self.pool.acquire().await?;
        Ok(tokens::is_flagged(
            &mut connection,
            &address_into(token.contract),
            &u256_to_big_decimal(&token.token_id),
        )
        .await?)
    }

    async fn nft_approved(
        &self,
        contract: Address,
        owner: Address,
        operator: Address,
    ) -> Result<bool> {
        let mut connection = self.pool.acquire().await?;
        let approved = events::latest_nft_approval(
            &mut connection,
            &address_into(contract),
            &address_into(owner),
            &address_into(operator),
        )
        .await?;
        Ok(approved.unwrap_or(false))
    }
}

fn address_into(address: Address) -> database::Address {
    ByteArray(address.into_array())
}

fn address_from(address: &database::Address) -> Address {
    Address::from(address.0)
}

/// A stored balance can transiently go negative while a reorg is being
/// resolved; planning treats that as empty rather than failing.
fn balance_into(balance: &BigDecimal) -> Result<U256> {
    if balance < &BigDecimal::from(0) {
        return Ok(U256::ZERO);
    }
    big_decimal_to_u256(balance).context("stored balance out of range")
}

fn order_from(row: &orders::Order) -> Result<Order> {
    Ok(Order {
        id: row.id.clone(),
        kind: protocol_kind_from(row.kind),
        maker: address_from(&row.maker),
        contract: address_from(&row.contract),
        token_id: big_decimal_to_u256(&row.token_id).context("token id out of range")?,
        token_kind: match row.token_kind {
            orders::TokenKind::Erc721 => TokenKind::Erc721,
            orders::TokenKind::Erc1155 => TokenKind::Erc1155,
        },
        price: big_decimal_to_u256(&row.price).context("stored price out of range")?,
        currency: address_from(&row.currency),
        quantity_remaining: big_decimal_to_u256(&row.quantity_remaining)
            .context("quantity out of range")?,
        fee_bps: u32::try_from(row.fee_bps).context("negative fee bps")?,
        missing_royalties: match &row.missing_royalties {
            Some(value) => {
                serde_json::from_value(value.clone()).context("malformed missing royalties")?
            }
            None => Vec::new(),
        },
        raw_data: row.raw_data.clone(),
        source: row.source.clone(),
    })
}

fn protocol_kind_from(kind: orders::OrderKind) -> ProtocolKind {
    match kind {
        orders::OrderKind::Seaport => ProtocolKind::Seaport,
        orders::OrderKind::LooksRare => ProtocolKind::LooksRare,
        orders::OrderKind::ZeroexV4Erc721 => ProtocolKind::ZeroexV4Erc721,
        orders::OrderKind::ZeroexV4Erc1155 => ProtocolKind::ZeroexV4Erc1155,
        orders::OrderKind::WyvernV23 => ProtocolKind::WyvernV23,
        orders::OrderKind::Sudoswap => ProtocolKind::Sudoswap,
        orders::OrderKind::Nftx => ProtocolKind::Nftx,
        orders::OrderKind::Blur => ProtocolKind::Blur,
    }
}

fn order_side_into(side: OrderSide) -> orders::OrderSide {
    match side {
        OrderSide::Buy => orders::OrderSide::Buy,
        OrderSide::Sell => orders::OrderSide::Sell,
    }
}
