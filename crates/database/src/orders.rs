//! Read and status-transition queries over the externally-owned `orders`
//! table. Order creation is the responsibility of order ingestion; this crate
//! only consults rows and applies cancellation transitions that are derived
//! from on-chain events.

use {
    crate::{Address, PgTransaction},
    bigdecimal::BigDecimal,
    sqlx::PgConnection,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, sqlx::Type)]
#[sqlx(type_name = "OrderKind", rename_all = "kebab-case")]
pub enum OrderKind {
    Seaport,
    LooksRare,
    ZeroexV4Erc721,
    ZeroexV4Erc1155,
    #[sqlx(rename = "wyvern-v2.3")]
    WyvernV23,
    Sudoswap,
    Nftx,
    Blur,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "OrderSide", rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "TokenKind", rename_all = "lowercase")]
pub enum TokenKind {
    Erc721,
    Erc1155,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "FillabilityStatus", rename_all = "kebab-case")]
pub enum FillabilityStatus {
    Fillable,
    NoBalance,
    NoApproval,
    Filled,
    Cancelled,
    Expired,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "ApprovalStatus", rename_all = "kebab-case")]
pub enum ApprovalStatus {
    Approved,
    NoApproval,
}

/// Full `orders` row. Inserted by order ingestion (and test fixtures); the
/// planner and the normalizer only read subsets of it.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Order {
    pub id: String,
    pub kind: OrderKind,
    pub side: OrderSide,
    pub maker: Address,
    /// Optional counterparty allow-list. Unset or zero means open to anyone.
    pub taker: Option<Address>,
    pub contract: Address,
    pub token_id: BigDecimal,
    pub token_kind: TokenKind,
    /// Unit price in the smallest denomination of `currency`.
    pub price: BigDecimal,
    /// Effective per-unit value after built-in fees; used for ordering.
    pub value: BigDecimal,
    /// Like `value` but with missing royalties charged on top.
    pub normalized_value: Option<BigDecimal>,
    pub currency: Address,
    /// Signing nonce for protocols that cancel by (maker, nonce).
    pub nonce: Option<BigDecimal>,
    pub quantity_remaining: BigDecimal,
    pub fillability_status: FillabilityStatus,
    pub approval_status: ApprovalStatus,
    /// Total built-in fees in basis points of the unit price.
    pub fee_bps: i32,
    /// `[{"recipient": "0x..", "amount": ".."}]` per-unit royalty additions.
    pub missing_royalties: Option<serde_json::Value>,
    /// Raw protocol payload as submitted to the order codec.
    pub raw_data: serde_json::Value,
    /// Domain of the orderbook the order was sourced from.
    pub source: Option<String>,
}

const CANDIDATE_COLUMNS: &str = "\
    id, kind, side, maker, taker, contract, token_id, token_kind, price, value, \
    normalized_value, currency, nonce, quantity_remaining, fillability_status, \
    approval_status, fee_bps, missing_royalties, raw_data, source";

const ZERO_ADDRESS: Address = crate::byte_array::ByteArray([0u8; 20]);

/// Price-sorted bid candidates for a token: fillable, approved, open to the
/// given taker and not explicitly excluded. `normalize_royalties` switches the
/// ordering to the royalty-normalized effective value.
pub async fn bid_candidates(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
    taker: &Address,
    excluded: &[String],
    normalize_royalties: bool,
) -> Result<Vec<Order>, sqlx::Error> {
    const QUERY: &str = const_format::formatcp!(
        "SELECT {CANDIDATE_COLUMNS} FROM orders \
         WHERE contract = $1 AND token_id = $2 AND side = 'buy' \
           AND fillability_status = 'fillable' AND approval_status = 'approved' \
           AND (taker IS NULL OR taker = $3 OR taker = $4) \
           AND id <> ALL($5) ",
    );
    const BY_VALUE: &str = const_format::concatcp!(QUERY, "ORDER BY value DESC");
    const BY_NORMALIZED_VALUE: &str = const_format::concatcp!(
        QUERY,
        "ORDER BY COALESCE(normalized_value, value) DESC",
    );
    sqlx::query_as(if normalize_royalties {
        BY_NORMALIZED_VALUE
    } else {
        BY_VALUE
    })
    .bind(contract)
    .bind(token_id)
    .bind(ZERO_ADDRESS)
    .bind(taker)
    .bind(excluded)
    .fetch_all(ex)
    .await
}

/// Price-sorted listing candidates, ascending. The sell-side dual of
/// [`bid_candidates`].
pub async fn listing_candidates(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
    taker: &Address,
    excluded: &[String],
    normalize_royalties: bool,
) -> Result<Vec<Order>, sqlx::Error> {
    const QUERY: &str = const_format::formatcp!(
        "SELECT {CANDIDATE_COLUMNS} FROM orders \
         WHERE contract = $1 AND token_id = $2 AND side = 'sell' \
           AND fillability_status = 'fillable' AND approval_status = 'approved' \
           AND (taker IS NULL OR taker = $3 OR taker = $4) \
           AND id <> ALL($5) ",
    );
    const BY_VALUE: &str = const_format::concatcp!(QUERY, "ORDER BY value ASC");
    const BY_NORMALIZED_VALUE: &str = const_format::concatcp!(
        QUERY,
        "ORDER BY COALESCE(normalized_value, value) ASC",
    );
    sqlx::query_as(if normalize_royalties {
        BY_NORMALIZED_VALUE
    } else {
        BY_VALUE
    })
    .bind(contract)
    .bind(token_id)
    .bind(ZERO_ADDRESS)
    .bind(taker)
    .bind(excluded)
    .fetch_all(ex)
    .await
}

/// Validates an explicitly requested order against a token and quantity.
/// `allow_inactive` skips the fillability and approval checks so callers can
/// plan against orders that are expected to become active.
pub async fn single_order(
    ex: &mut PgConnection,
    id: &str,
    side: OrderSide,
    contract: &Address,
    token_id: &BigDecimal,
    quantity: &BigDecimal,
    taker: &Address,
    allow_inactive: bool,
) -> Result<Option<Order>, sqlx::Error> {
    const QUERY: &str = const_format::formatcp!(
        "SELECT {CANDIDATE_COLUMNS} FROM orders \
         WHERE id = $1 AND side = $2 AND contract = $3 AND token_id = $4 \
           AND quantity_remaining >= $5 \
           AND (taker IS NULL OR taker = $6 OR taker = $7) ",
    );
    const ACTIVE_ONLY: &str = const_format::concatcp!(
        QUERY,
        "AND fillability_status = 'fillable' AND approval_status = 'approved'",
    );
    sqlx::query_as(if allow_inactive { QUERY } else { ACTIVE_ONLY })
        .bind(id)
        .bind(side)
        .bind(contract)
        .bind(token_id)
        .bind(quantity)
        .bind(ZERO_ADDRESS)
        .bind(taker)
        .fetch_optional(ex)
        .await
}

/// Best-effort resolution of a (maker, nonce) pair to a stored order, for
/// protocols whose fill events carry no order id. Returns the id and the
/// authoritative stored price.
pub async fn find_by_maker_nonce(
    ex: &mut PgConnection,
    maker: &Address,
    nonce: &BigDecimal,
    kind: OrderKind,
) -> Result<Option<(String, BigDecimal)>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT id, price FROM orders \
        WHERE maker = $1 AND nonce = $2 AND kind = $3 \
        LIMIT 1";
    sqlx::query_as(QUERY)
        .bind(maker)
        .bind(nonce)
        .bind(kind)
        .fetch_optional(ex)
        .await
}

/// Current stored price of a (pool) order, if it is still fillable.
pub async fn fillable_price(
    ex: &mut PgConnection,
    id: &str,
) -> Result<Option<BigDecimal>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT price FROM orders \
        WHERE id = $1 AND fillability_status = 'fillable'";
    sqlx::query_scalar(QUERY).bind(id).fetch_optional(ex).await
}

pub async fn mark_cancelled_by_id(ex: &mut PgConnection, id: &str) -> Result<u64, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE orders SET fillability_status = 'cancelled' \
        WHERE id = $1 AND fillability_status <> 'filled'";
    sqlx::query(QUERY)
        .bind(id)
        .execute(ex)
        .await
        .map(|result| result.rows_affected())
}

/// Cancels every order of the maker signed under the given nonce. A fill of
/// one order under a nonce invalidates all of its siblings, so this runs for
/// explicit nonce cancels and as a side effect of nonce-matched fills.
pub async fn mark_cancelled_by_nonce(
    ex: &mut PgConnection,
    maker: &Address,
    nonce: &BigDecimal,
    kind: OrderKind,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE orders SET fillability_status = 'cancelled' \
        WHERE maker = $1 AND nonce = $2 AND kind = $3 \
          AND fillability_status <> 'filled'";
    sqlx::query(QUERY)
        .bind(maker)
        .bind(nonce)
        .bind(kind)
        .execute(ex)
        .await
        .map(|result| result.rows_affected())
}

pub async fn mark_cancelled_below_nonce(
    ex: &mut PgConnection,
    maker: &Address,
    min_nonce: &BigDecimal,
    kind: OrderKind,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE orders SET fillability_status = 'cancelled' \
        WHERE maker = $1 AND nonce < $2 AND kind = $3 \
          AND fillability_status <> 'filled'";
    sqlx::query(QUERY)
        .bind(maker)
        .bind(min_nonce)
        .bind(kind)
        .execute(ex)
        .await
        .map(|result| result.rows_affected())
}

pub async fn fillability_status(
    ex: &mut PgConnection,
    id: &str,
) -> Result<Option<FillabilityStatus>, sqlx::Error> {
    const QUERY: &str = "SELECT fillability_status FROM orders WHERE id = $1";
    sqlx::query_scalar(QUERY).bind(id).fetch_optional(ex).await
}

/// Inserts a full order row. Used by order ingestion and test fixtures.
pub async fn insert(ex: &mut PgTransaction<'_>, order: &Order) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO orders (\
            id, kind, side, maker, taker, contract, token_id, token_kind, \
            price, value, normalized_value, currency, nonce, quantity_remaining, \
            fillability_status, approval_status, fee_bps, missing_royalties, \
            raw_data, source) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
            $15, $16, $17, $18, $19, $20) \
        ON CONFLICT (id) DO NOTHING";
    sqlx::query(QUERY)
        .bind(&order.id)
        .bind(order.kind)
        .bind(order.side)
        .bind(order.maker)
        .bind(order.taker)
        .bind(order.contract)
        .bind(&order.token_id)
        .bind(order.token_kind)
        .bind(&order.price)
        .bind(&order.value)
        .bind(&order.normalized_value)
        .bind(order.currency)
        .bind(&order.nonce)
        .bind(&order.quantity_remaining)
        .bind(order.fillability_status)
        .bind(order.approval_status)
        .bind(order.fee_bps)
        .bind(&order.missing_royalties)
        .bind(&order.raw_data)
        .bind(&order.source)
        .execute(&mut **ex)
        .await?;
    Ok(())
}

#[cfg(test)]
pub fn test_order(id: &str) -> Order {
    Order {
        id: id.to_string(),
        kind: OrderKind::Seaport,
        side: OrderSide::Buy,
        maker: crate::byte_array::ByteArray([0x11; 20]),
        taker: None,
        contract: crate::byte_array::ByteArray([0x22; 20]),
        token_id: 1.into(),
        token_kind: TokenKind::Erc721,
        price: 100.into(),
        value: 100.into(),
        normalized_value: None,
        currency: ZERO_ADDRESS,
        nonce: None,
        quantity_remaining: 1.into(),
        fillability_status: FillabilityStatus::Fillable,
        approval_status: ApprovalStatus::Approved,
        fee_bps: 0,
        missing_royalties: None,
        raw_data: serde_json::Value::Null,
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use {super::*, sqlx::Connection};

    #[tokio::test]
    #[ignore]
    async fn postgres_bid_candidates_filters_and_sorts() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let contract = crate::byte_array::ByteArray([0x22; 20]);
        let token_id = BigDecimal::from(7);
        let taker = crate::byte_array::ByteArray([0x99; 20]);

        let mut cheap = test_order("cheap");
        cheap.value = 50.into();
        let mut rich = test_order("rich");
        rich.value = 200.into();
        let mut cancelled = test_order("cancelled");
        cancelled.fillability_status = FillabilityStatus::Cancelled;
        let mut private = test_order("private");
        private.taker = Some(crate::byte_array::ByteArray([0x77; 20]));
        for mut order in [cheap, rich, cancelled, private] {
            order.token_id = token_id.clone();
            insert(&mut db, &order).await.unwrap();
        }

        let candidates = bid_candidates(&mut db, &contract, &token_id, &taker, &[], false)
            .await
            .unwrap();
        let ids = candidates.iter().map(|o| o.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["rich", "cheap"]);

        // The taker named in a private order does see it.
        let private_taker = crate::byte_array::ByteArray([0x77; 20]);
        let candidates =
            bid_candidates(&mut db, &contract, &token_id, &private_taker, &[], false)
                .await
                .unwrap();
        assert_eq!(candidates.len(), 3);

        // Exclusions drop explicitly named ids.
        let candidates = bid_candidates(
            &mut db,
            &contract,
            &token_id,
            &taker,
            &["rich".to_string()],
            false,
        )
        .await
        .unwrap();
        let ids = candidates.iter().map(|o| o.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["cheap"]);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_nonce_cancellation_cascades() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let maker = crate::byte_array::ByteArray([0x11; 20]);
        for id in ["a", "b", "c"] {
            let mut order = test_order(id);
            order.kind = OrderKind::LooksRare;
            order.nonce = Some(5.into());
            insert(&mut db, &order).await.unwrap();
        }
        let mut other_nonce = test_order("d");
        other_nonce.kind = OrderKind::LooksRare;
        other_nonce.nonce = Some(6.into());
        insert(&mut db, &other_nonce).await.unwrap();

        let cancelled =
            mark_cancelled_by_nonce(&mut db, &maker, &BigDecimal::from(5), OrderKind::LooksRare)
                .await
                .unwrap();
        assert_eq!(cancelled, 3);
        assert_eq!(
            fillability_status(&mut db, "d").await.unwrap(),
            Some(FillabilityStatus::Fillable),
        );
    }
}
