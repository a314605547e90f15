//! Reads over the externally-owned `tokens` table. Token ingestion owns the
//! rows; the planner only consults the flagged status.

use {crate::Address, bigdecimal::BigDecimal, sqlx::PgConnection};

/// Flagged status of a token. `None` means the token is not known at all,
/// which callers treat differently from an unflagged token.
pub async fn is_flagged(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
) -> Result<Option<bool>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT is_flagged FROM tokens \
        WHERE contract = $1 AND token_id = $2";
    sqlx::query_scalar(QUERY)
        .bind(contract)
        .bind(token_id)
        .fetch_optional(ex)
        .await
}

/// Inserts a token row. Used by token ingestion and test fixtures.
pub async fn insert(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
    is_flagged: bool,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO tokens (contract, token_id, is_flagged) \
        VALUES ($1, $2, $3) \
        ON CONFLICT (contract, token_id) DO UPDATE SET is_flagged = EXCLUDED.is_flagged";
    sqlx::query(QUERY)
        .bind(contract)
        .bind(token_id)
        .bind(is_flagged)
        .execute(ex)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, crate::byte_array::ByteArray, sqlx::Connection};

    #[tokio::test]
    #[ignore]
    async fn postgres_flagged_status_round_trips() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let contract = ByteArray([0x22; 20]);
        let token_id = BigDecimal::from(7);
        assert_eq!(is_flagged(&mut db, &contract, &token_id).await.unwrap(), None);

        insert(&mut db, &contract, &token_id, false).await.unwrap();
        assert_eq!(
            is_flagged(&mut db, &contract, &token_id).await.unwrap(),
            Some(false),
        );

        insert(&mut db, &contract, &token_id, true).await.unwrap();
        assert_eq!(
            is_flagged(&mut db, &contract, &token_id).await.unwrap(),
            Some(true),
        );
    }
}
