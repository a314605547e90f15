//! Cache of processed blocks, used to detect duplicate hashes for the same
//! block number (orphan candidates after a reorg).

use {crate::BlockHash, sqlx::PgConnection, std::collections::BTreeMap};

pub async fn insert(
    ex: &mut PgConnection,
    block_number: i64,
    block_hash: &BlockHash,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO blocks (block_number, block_hash) \
        VALUES ($1, $2) \
        ON CONFLICT DO NOTHING;";
    sqlx::query(QUERY)
        .bind(block_number)
        .bind(block_hash)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn delete(
    ex: &mut PgConnection,
    block_number: i64,
    block_hash: &BlockHash,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "DELETE FROM blocks WHERE block_number = $1 AND block_hash = $2;";
    sqlx::query(QUERY)
        .bind(block_number)
        .bind(block_hash)
        .execute(ex)
        .await?;
    Ok(())
}

/// Block numbers that map to more than one distinct hash. Each of these has
/// at least one orphaned block that needs its events removed.
pub async fn duplicate_hashes(
    ex: &mut PgConnection,
) -> Result<BTreeMap<i64, Vec<BlockHash>>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT block_number, block_hash FROM blocks \
        WHERE block_number IN ( \
            SELECT block_number FROM blocks \
            GROUP BY block_number \
            HAVING COUNT(*) > 1) \
        ORDER BY block_number, block_hash;";
    let rows: Vec<(i64, BlockHash)> = sqlx::query_as(QUERY).fetch_all(ex).await?;
    let mut result: BTreeMap<i64, Vec<BlockHash>> = BTreeMap::new();
    for (number, hash) in rows {
        result.entry(number).or_default().push(hash);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use {super::*, crate::byte_array::ByteArray, sqlx::Connection};

    #[tokio::test]
    #[ignore]
    async fn postgres_duplicate_hash_detection() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        insert(&mut db, 100, &ByteArray([1u8; 32])).await.unwrap();
        insert(&mut db, 100, &ByteArray([1u8; 32])).await.unwrap();
        insert(&mut db, 101, &ByteArray([2u8; 32])).await.unwrap();
        assert!(duplicate_hashes(&mut db).await.unwrap().is_empty());

        insert(&mut db, 100, &ByteArray([3u8; 32])).await.unwrap();
        let duplicates = duplicate_hashes(&mut db).await.unwrap();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(
            duplicates[&100],
            vec![ByteArray([1u8; 32]), ByteArray([3u8; 32])],
        );

        delete(&mut db, 100, &ByteArray([3u8; 32])).await.unwrap();
        assert!(duplicate_hashes(&mut db).await.unwrap().is_empty());
    }
}
