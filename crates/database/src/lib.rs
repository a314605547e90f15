pub mod blocks;
pub mod byte_array;
pub mod events;
pub mod nft_balances;
pub mod orders;
pub mod tokens;

use {byte_array::ByteArray, sqlx::Executor};

// Design:
//
// Functions that execute multiple statements should take `&mut PgTransaction`
// to indicate this and to ensure that the whole function succeeds or fails
// together. Functions that execute a single statement should take `&mut
// PgConnection`. We usually call the parameter `ex` for `Executor` which is
// the trait whose methods we use to run queries.
// This scheme allows callers to decide whether they want to use the function
// as part of a bigger transaction or standalone. Note that PgTransaction
// implements Deref to PgConnection. Callers do need to take care of calling
// `commit` on the transaction.
//
// For tests a useful pattern is to start a transaction at the beginning of
// the test, use it for all queries and never commit it. When the uncommitted
// transaction gets dropped it is rolled back. This allows postgres tests to
// run in parallel and makes clearing all tables at the beginning of a test
// obsolete.

pub type PgTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

pub type Address = ByteArray<20>;
pub type TransactionHash = ByteArray<32>;
pub type BlockHash = ByteArray<32>;

/// The names of the tables this crate writes to.
pub const TABLES: &[&str] = &[
    "fill_events",
    "cancel_events",
    "nonce_cancel_events",
    "bulk_cancel_events",
    "nft_transfer_events",
    "ft_transfer_events",
    "nft_approval_events",
    "nft_balances",
    "orders",
    "tokens",
    "blocks",
];

/// Delete all data in the database. Only used by tests.
#[allow(non_snake_case)]
pub async fn clear_DANGER_(ex: &mut PgTransaction<'_>) -> sqlx::Result<()> {
    for table in TABLES {
        ex.execute(format!("TRUNCATE {table};").as_str()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        sqlx::{Connection, PgConnection},
    };

    #[tokio::test]
    #[ignore]
    async fn postgres_clear() {
        let mut con = PgConnection::connect("postgresql://").await.unwrap();
        let mut con = con.begin().await.unwrap();
        clear_DANGER_(&mut con).await.unwrap();
    }
}
