//! Idempotent, reorg-aware persistence of canonical events.
//!
//! Every event table is keyed by `(block_hash, tx_hash, log_index,
//! batch_index)` and inserted with `ON CONFLICT DO NOTHING`, so re-ingesting
//! a block range is a no-op. Transfer insertion maintains the materialized
//! `nft_balances` table; [`remove`] deletes a block's rows and reverses
//! exactly the balance deltas they introduced.

use {
    crate::{Address, BlockHash, PgTransaction, TransactionHash, nft_balances, orders},
    bigdecimal::BigDecimal,
    sqlx::PgConnection,
    tracing::instrument,
};

#[derive(Clone, Debug)]
pub enum Event {
    Fill(Fill),
    Cancel(Cancel),
    NonceCancel(NonceCancel),
    BulkCancel(BulkCancel),
    NftTransfer(NftTransfer),
    FtTransfer(FtTransfer),
    NftApproval(NftApproval),
}

#[derive(Clone, Debug)]
pub struct Fill {
    pub kind: orders::OrderKind,
    pub order_id: Option<String>,
    pub side: orders::OrderSide,
    pub maker: Address,
    pub taker: Address,
    pub contract: Address,
    pub token_id: BigDecimal,
    pub amount: BigDecimal,
    pub price: BigDecimal,
    pub currency: Address,
    pub fill_source: Option<String>,
    /// The order stays partially open after this fill.
    pub is_partial: bool,
}

#[derive(Clone, Debug)]
pub struct Cancel {
    pub kind: orders::OrderKind,
    pub order_id: String,
}

#[derive(Clone, Debug)]
pub struct NonceCancel {
    pub kind: orders::OrderKind,
    pub maker: Address,
    pub nonce: BigDecimal,
}

#[derive(Clone, Debug)]
pub struct BulkCancel {
    pub kind: orders::OrderKind,
    pub maker: Address,
    pub min_nonce: BigDecimal,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct NftTransfer {
    pub kind: orders::TokenKind,
    pub contract: Address,
    #[sqlx(rename = "from_address")]
    pub from: Address,
    #[sqlx(rename = "to_address")]
    pub to: Address,
    pub token_id: BigDecimal,
    pub amount: BigDecimal,
}

#[derive(Clone, Debug)]
pub struct FtTransfer {
    pub contract: Address,
    pub from: Address,
    pub to: Address,
    pub amount: BigDecimal,
}

#[derive(Clone, Debug)]
pub struct NftApproval {
    pub contract: Address,
    pub owner: Address,
    pub operator: Address,
    pub approved: bool,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EventIndex {
    pub block_number: i64,
    pub block_hash: BlockHash,
    pub tx_hash: TransactionHash,
    pub log_index: i64,
    pub batch_index: i64,
    pub timestamp: i64,
}

const EVENT_TABLES: &[&str] = &[
    "fill_events",
    "cancel_events",
    "nonce_cancel_events",
    "bulk_cancel_events",
    "nft_transfer_events",
    "ft_transfer_events",
    "nft_approval_events",
];

pub async fn last_block(ex: &mut PgConnection) -> Result<i64, sqlx::Error> {
    const QUERY: &str = "\
        SELECT GREATEST( \
            (SELECT COALESCE(MAX(block_number), 0) FROM fill_events), \
            (SELECT COALESCE(MAX(block_number), 0) FROM cancel_events), \
            (SELECT COALESCE(MAX(block_number), 0) FROM nonce_cancel_events), \
            (SELECT COALESCE(MAX(block_number), 0) FROM bulk_cancel_events), \
            (SELECT COALESCE(MAX(block_number), 0) FROM nft_transfer_events), \
            (SELECT COALESCE(MAX(block_number), 0) FROM ft_transfer_events), \
            (SELECT COALESCE(MAX(block_number), 0) FROM nft_approval_events));";
    sqlx::query_scalar(QUERY).fetch_one(ex).await
}

/// Persists a batch of events.
///
/// Fills are written before cancels regardless of log order: a cancel event
/// for an order that was simultaneously filled in the same range must not
/// suppress the fill's side effects. Within each class the caller's order is
/// preserved.
#[instrument(skip_all, fields(events = events.len()))]
pub async fn append(
    ex: &mut PgTransaction<'_>,
    events: &[(EventIndex, Event)],
) -> Result<(), sqlx::Error> {
    let mut ordered: Vec<&(EventIndex, Event)> = events.iter().collect();
    ordered.sort_by_key(|(_, event)| match event {
        Event::Fill(_) => 0,
        Event::Cancel(_) | Event::NonceCancel(_) | Event::BulkCancel(_) => 1,
        _ => 2,
    });
    for (index, event) in ordered {
        match event {
            Event::Fill(event) => insert_fill(ex, index, event).await?,
            Event::Cancel(event) => insert_cancel(ex, index, event).await?,
            Event::NonceCancel(event) => insert_nonce_cancel(ex, index, event).await?,
            Event::BulkCancel(event) => insert_bulk_cancel(ex, index, event).await?,
            Event::NftTransfer(event) => insert_nft_transfer(ex, index, event).await?,
            Event::FtTransfer(event) => insert_ft_transfer(ex, index, event).await?,
            Event::NftApproval(event) => insert_nft_approval(ex, index, event).await?,
        }
    }
    Ok(())
}

/// Deletes all events tied to exactly this block and reverses the balance
/// deltas its transfers introduced. Used for orphaned blocks.
#[instrument(skip(ex, block_hash))]
pub async fn remove(
    ex: &mut PgTransaction<'_>,
    block_number: i64,
    block_hash: &BlockHash,
) -> Result<(), sqlx::Error> {
    const TRANSFERS: &str = "\
        SELECT kind, contract, from_address, to_address, token_id, amount \
        FROM nft_transfer_events \
        WHERE block_number = $1 AND block_hash = $2";
    let transfers: Vec<NftTransfer> = sqlx::query_as(TRANSFERS)
        .bind(block_number)
        .bind(block_hash)
        .fetch_all(&mut **ex)
        .await?;
    for transfer in &transfers {
        apply_balance_deltas(ex, transfer, true).await?;
    }

    for table in EVENT_TABLES {
        let query = format!("DELETE FROM {table} WHERE block_number = $1 AND block_hash = $2;");
        sqlx::query(&query)
            .bind(block_number)
            .bind(block_hash)
            .execute(&mut **ex)
            .await?;
    }
    Ok(())
}

async fn insert_fill(
    ex: &mut PgConnection,
    index: &EventIndex,
    event: &Fill,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO fill_events (\
            block_number, block_hash, tx_hash, log_index, batch_index, timestamp, \
            kind, order_id, side, maker, taker, contract, token_id, amount, price, \
            currency, fill_source, is_partial) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
        ON CONFLICT DO NOTHING;";
    sqlx::query(QUERY)
        .bind(index.block_number)
        .bind(index.block_hash)
        .bind(index.tx_hash)
        .bind(index.log_index)
        .bind(index.batch_index)
        .bind(index.timestamp)
        .bind(event.kind)
        .bind(&event.order_id)
        .bind(event.side)
        .bind(event.maker)
        .bind(event.taker)
        .bind(event.contract)
        .bind(&event.token_id)
        .bind(&event.amount)
        .bind(&event.price)
        .bind(event.currency)
        .bind(&event.fill_source)
        .bind(event.is_partial)
        .execute(ex)
        .await?;
    Ok(())
}

async fn insert_cancel(
    ex: &mut PgConnection,
    index: &EventIndex,
    event: &Cancel,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO cancel_events (\
            block_number, block_hash, tx_hash, log_index, batch_index, timestamp, \
            kind, order_id) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
        ON CONFLICT DO NOTHING;";
    let inserted = sqlx::query(QUERY)
        .bind(index.block_number)
        .bind(index.block_hash)
        .bind(index.tx_hash)
        .bind(index.log_index)
        .bind(index.batch_index)
        .bind(index.timestamp)
        .bind(event.kind)
        .bind(&event.order_id)
        .execute(&mut *ex)
        .await?
        .rows_affected();
    if inserted > 0 {
        orders::mark_cancelled_by_id(ex, &event.order_id).await?;
    }
    Ok(())
}

async fn insert_nonce_cancel(
    ex: &mut PgConnection,
    index: &EventIndex,
    event: &NonceCancel,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO nonce_cancel_events (\
            block_number, block_hash, tx_hash, log_index, batch_index, timestamp, \
            kind, maker, nonce) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
        ON CONFLICT DO NOTHING;";
    let inserted = sqlx::query(QUERY)
        .bind(index.block_number)
        .bind(index.block_hash)
        .bind(index.tx_hash)
        .bind(index.log_index)
        .bind(index.batch_index)
        .bind(index.timestamp)
        .bind(event.kind)
        .bind(event.maker)
        .bind(&event.nonce)
        .execute(&mut *ex)
        .await?
        .rows_affected();
    if inserted > 0 {
        orders::mark_cancelled_by_nonce(ex, &event.maker, &event.nonce, event.kind).await?;
    }
    Ok(())
}

async fn insert_bulk_cancel(
    ex: &mut PgConnection,
    index: &EventIndex,
    event: &BulkCancel,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO bulk_cancel_events (\
            block_number, block_hash, tx_hash, log_index, batch_index, timestamp, \
            kind, maker, min_nonce) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
        ON CONFLICT DO NOTHING;";
    let inserted = sqlx::query(QUERY)
        .bind(index.block_number)
        .bind(index.block_hash)
        .bind(index.tx_hash)
        .bind(index.log_index)
        .bind(index.batch_index)
        .bind(index.timestamp)
        .bind(event.kind)
        .bind(event.maker)
        .bind(&event.min_nonce)
        .execute(&mut *ex)
        .await?
        .rows_affected();
    if inserted > 0 {
        orders::mark_cancelled_below_nonce(ex, &event.maker, &event.min_nonce, event.kind)
            .await?;
    }
    Ok(())
}

async fn insert_nft_transfer(
    ex: &mut PgTransaction<'_>,
    index: &EventIndex,
    event: &NftTransfer,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO nft_transfer_events (\
            block_number, block_hash, tx_hash, log_index, batch_index, timestamp, \
            kind, contract, from_address, to_address, token_id, amount) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
        ON CONFLICT DO NOTHING;";
    let inserted = sqlx::query(QUERY)
        .bind(index.block_number)
        .bind(index.block_hash)
        .bind(index.tx_hash)
        .bind(index.log_index)
        .bind(index.batch_index)
        .bind(index.timestamp)
        .bind(event.kind)
        .bind(event.contract)
        .bind(event.from)
        .bind(event.to)
        .bind(&event.token_id)
        .bind(&event.amount)
        .execute(&mut **ex)
        .await?
        .rows_affected();
    // Only rows that were actually inserted may move balances, otherwise
    // re-ingesting a range would double them.
    if inserted > 0 {
        apply_balance_deltas(ex, event, false).await?;
    }
    Ok(())
}

async fn apply_balance_deltas(
    ex: &mut PgTransaction<'_>,
    transfer: &NftTransfer,
    reverse: bool,
) -> Result<(), sqlx::Error> {
    let zero = crate::byte_array::ByteArray([0u8; 20]);
    let (from_delta, to_delta) = if reverse {
        (transfer.amount.clone(), -transfer.amount.clone())
    } else {
        (-transfer.amount.clone(), transfer.amount.clone())
    };
    if transfer.from != zero {
        nft_balances::upsert_delta(ex, &transfer.contract, &transfer.token_id, &transfer.from, &from_delta)
            .await?;
    }
    if transfer.to != zero {
        nft_balances::upsert_delta(ex, &transfer.contract, &transfer.token_id, &transfer.to, &to_delta)
            .await?;
    }
    Ok(())
}

async fn insert_ft_transfer(
    ex: &mut PgConnection,
    index: &EventIndex,
    event: &FtTransfer,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO ft_transfer_events (\
            block_number, block_hash, tx_hash, log_index, batch_index, timestamp, \
            contract, from_address, to_address, amount) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
        ON CONFLICT DO NOTHING;";
    sqlx::query(QUERY)
        .bind(index.block_number)
        .bind(index.block_hash)
        .bind(index.tx_hash)
        .bind(index.log_index)
        .bind(index.batch_index)
        .bind(index.timestamp)
        .bind(event.contract)
        .bind(event.from)
        .bind(event.to)
        .bind(&event.amount)
        .execute(ex)
        .await?;
    Ok(())
}

async fn insert_nft_approval(
    ex: &mut PgConnection,
    index: &EventIndex,
    event: &NftApproval,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO nft_approval_events (\
            block_number, block_hash, tx_hash, log_index, batch_index, timestamp, \
            contract, owner, operator, approved) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
        ON CONFLICT DO NOTHING;";
    sqlx::query(QUERY)
        .bind(index.block_number)
        .bind(index.block_hash)
        .bind(index.tx_hash)
        .bind(index.log_index)
        .bind(index.batch_index)
        .bind(index.timestamp)
        .bind(event.contract)
        .bind(event.owner)
        .bind(event.operator)
        .bind(event.approved)
        .execute(ex)
        .await?;
    Ok(())
}

/// Latest collection-wide approval of an owner towards an operator, if any
/// was ever observed.
pub async fn latest_nft_approval(
    ex: &mut PgConnection,
    contract: &Address,
    owner: &Address,
    operator: &Address,
) -> Result<Option<bool>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT approved FROM nft_approval_events \
        WHERE contract = $1 AND owner = $2 AND operator = $3 \
        ORDER BY block_number DESC, log_index DESC \
        LIMIT 1";
    sqlx::query_scalar(QUERY)
        .bind(contract)
        .bind(owner)
        .bind(operator)
        .fetch_optional(ex)
        .await
}

/// Net fungible balance of an owner, as observed through ingested transfer
/// events. Wrapped-native deposits and withdrawals count because they are
/// recorded as transfers from and to the zero address.
pub async fn ft_balance_of(
    ex: &mut PgConnection,
    contract: &Address,
    owner: &Address,
) -> Result<BigDecimal, sqlx::Error> {
    const QUERY: &str = "\
        SELECT COALESCE(SUM( \
            CASE WHEN to_address = $2 THEN amount ELSE -amount END), 0) \
        FROM ft_transfer_events \
        WHERE contract = $1 AND (to_address = $2 OR from_address = $2)";
    sqlx::query_scalar(QUERY)
        .bind(contract)
        .bind(owner)
        .fetch_one(ex)
        .await
}

#[cfg(test)]
mod tests {
    use {super::*, crate::byte_array::ByteArray, sqlx::Connection};

    fn index(block: i64, log_index: i64, batch_index: i64) -> EventIndex {
        EventIndex {
            block_number: block,
            block_hash: ByteArray([block as u8; 32]),
            tx_hash: ByteArray([0xaa; 32]),
            log_index,
            batch_index,
            timestamp: 1_700_000_000,
        }
    }

    fn transfer(from: ByteArray<20>, to: ByteArray<20>, amount: i32) -> Event {
        Event::NftTransfer(NftTransfer {
            kind: orders::TokenKind::Erc1155,
            contract: ByteArray([0x22; 20]),
            from,
            to,
            token_id: 7.into(),
            amount: amount.into(),
        })
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_append_is_idempotent() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let owner = ByteArray([0x33; 20]);
        let batch = [(index(1, 0, 1), transfer(ByteArray([0u8; 20]), owner, 3))];
        for _ in 0..2 {
            append(&mut db, &batch).await.unwrap();
        }

        assert_eq!(last_block(&mut db).await.unwrap(), 1);
        let amount = nft_balances::balance_of(&mut db, &ByteArray([0x22; 20]), &7.into(), &owner)
            .await
            .unwrap();
        assert_eq!(amount, BigDecimal::from(3));
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM nft_transfer_events")
            .fetch_one(&mut *db)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_remove_reverses_balance_deltas() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let (alice, bob) = (ByteArray([0x33; 20]), ByteArray([0x44; 20]));
        append(
            &mut db,
            &[
                (index(1, 0, 1), transfer(ByteArray([0u8; 20]), alice, 5)),
                (index(2, 0, 1), transfer(alice, bob, 2)),
            ],
        )
        .await
        .unwrap();

        let contract = ByteArray([0x22; 20]);
        let token_id = BigDecimal::from(7);
        let alice_balance = nft_balances::balance_of(&mut db, &contract, &token_id, &alice)
            .await
            .unwrap();
        let bob_balance = nft_balances::balance_of(&mut db, &contract, &token_id, &bob)
            .await
            .unwrap();
        assert_eq!(alice_balance, BigDecimal::from(3));
        assert_eq!(bob_balance, BigDecimal::from(2));

        remove(&mut db, 2, &ByteArray([2u8; 32])).await.unwrap();
        let alice_balance = nft_balances::balance_of(&mut db, &contract, &token_id, &alice)
            .await
            .unwrap();
        let bob_balance = nft_balances::balance_of(&mut db, &contract, &token_id, &bob)
            .await
            .unwrap();
        assert_eq!(alice_balance, BigDecimal::from(5));
        assert_eq!(bob_balance, BigDecimal::from(0));
        assert_eq!(last_block(&mut db).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_nonce_cancel_transitions_sibling_orders() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let maker = ByteArray([0x11; 20]);
        for id in ["sibling-1", "sibling-2"] {
            let mut order = orders::test_order(id);
            order.kind = orders::OrderKind::LooksRare;
            order.nonce = Some(5.into());
            orders::insert(&mut db, &order).await.unwrap();
        }

        append(
            &mut db,
            &[(
                index(1, 0, 1),
                Event::NonceCancel(NonceCancel {
                    kind: orders::OrderKind::LooksRare,
                    maker,
                    nonce: 5.into(),
                }),
            )],
        )
        .await
        .unwrap();

        for id in ["sibling-1", "sibling-2"] {
            assert_eq!(
                orders::fillability_status(&mut db, id).await.unwrap(),
                Some(orders::FillabilityStatus::Cancelled),
            );
        }
    }
}
