//! Materialized `(contract, token_id, owner) -> amount` balances, updated
//! transactionally alongside NFT transfer event insertion and removal.

use {crate::Address, bigdecimal::BigDecimal, sqlx::PgConnection};

pub async fn upsert_delta(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
    owner: &Address,
    delta: &BigDecimal,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO nft_balances (contract, token_id, owner, amount) \
        VALUES ($1, $2, $3, $4) \
        ON CONFLICT (contract, token_id, owner) \
        DO UPDATE SET amount = nft_balances.amount + EXCLUDED.amount;";
    sqlx::query(QUERY)
        .bind(contract)
        .bind(token_id)
        .bind(owner)
        .bind(delta)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn balance_of(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
    owner: &Address,
) -> Result<BigDecimal, sqlx::Error> {
    const QUERY: &str = "\
        SELECT COALESCE( \
            (SELECT amount FROM nft_balances \
             WHERE contract = $1 AND token_id = $2 AND owner = $3), \
            0);";
    sqlx::query_scalar(QUERY)
        .bind(contract)
        .bind(token_id)
        .bind(owner)
        .fetch_one(ex)
        .await
}

/// Owner of at least `quantity` units of the token, if any. Needed when
/// filling order kinds that require knowing the current holder.
pub async fn any_owner_with_quantity(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
    quantity: &BigDecimal,
) -> Result<Option<Address>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT owner FROM nft_balances \
        WHERE contract = $1 AND token_id = $2 AND amount >= $3 \
        LIMIT 1";
    sqlx::query_scalar(QUERY)
        .bind(contract)
        .bind(token_id)
        .bind(quantity)
        .fetch_optional(ex)
        .await
}

#[cfg(test)]
mod tests {
    use {super::*, crate::byte_array::ByteArray, sqlx::Connection};

    #[tokio::test]
    #[ignore]
    async fn postgres_deltas_accumulate() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let contract = ByteArray([0x22; 20]);
        let owner = ByteArray([0x33; 20]);
        let token_id = BigDecimal::from(7);

        assert_eq!(
            balance_of(&mut db, &contract, &token_id, &owner).await.unwrap(),
            BigDecimal::from(0),
        );
        upsert_delta(&mut db, &contract, &token_id, &owner, &3.into())
            .await
            .unwrap();
        upsert_delta(&mut db, &contract, &token_id, &owner, &(-1).into())
            .await
            .unwrap();
        assert_eq!(
            balance_of(&mut db, &contract, &token_id, &owner).await.unwrap(),
            BigDecimal::from(2),
        );
    }
}
