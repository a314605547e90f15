//! Persistence boundary of the pipeline. [`EventStoring`] gives the updater
//! and the orphan watcher freedom in how and where events are stored; the
//! [`Postgres`] implementation maps canonical events onto the database
//! crate's rows.

use {
    crate::normalizer::{OrderResolving, ResolvedOrder},
    alloy_primitives::{Address, B256, U256},
    anyhow::{Context, Result},
    database::{byte_array::ByteArray, events, orders},
    model::{
        events::{CanonicalEvent, EventIndex, TokenKind},
        order::{OrderSide, ProtocolKind},
    },
    number::conversions::{big_decimal_to_u256, u256_to_big_decimal},
    std::collections::BTreeMap,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EventStoring: Send + Sync {
    /// Persists a batch of events idempotently, in one transaction.
    async fn append_events(&self, events: Vec<(EventIndex, CanonicalEvent)>) -> Result<()>;

    /// Deletes all events of exactly this block and reverses their derived
    /// balance effects.
    async fn remove_events(&self, block_number: u64, block_hash: B256) -> Result<()>;

    /// Records processed block hashes for reorg detection.
    async fn record_blocks(&self, blocks: &[(u64, B256)]) -> Result<()>;

    /// Block numbers that were recorded with more than one distinct hash.
    async fn duplicate_blocks(&self) -> Result<BTreeMap<u64, Vec<B256>>>;

    /// All hashes currently recorded for a block number.
    async fn block_hashes(&self, block_number: u64) -> Result<Vec<B256>>;

    async fn last_event_block(&self) -> Result<u64>;
}

#[derive(Clone)]
pub struct Postgres {
    pub pool: sqlx::PgPool,
}

#[async_trait::async_trait]
impl EventStoring for Postgres {
    async fn append_events(&self, events: Vec<(EventIndex, CanonicalEvent)>) -> Result<()> {
        let rows: Vec<_> = events
            .iter()
            .map(|(index, event)| Ok((event_index_into(index)?, event_into(event))))
            .collect::<Result<_>>()?;
        let mut transaction = self.pool.begin().await?;
        events::append(&mut transaction, &rows).await?;
        transaction.commit().await?;
        Ok(())
    }

    async fn remove_events(&self, block_number: u64, block_hash: B256) -> Result<()> {
        let hash = ByteArray(block_hash.0);
        let mut transaction = self.pool.begin().await?;
        events::remove(&mut transaction, i64::try_from(block_number)?, &hash).await?;
        database::blocks::delete(&mut transaction, i64::try_from(block_number)?, &hash).await?;
        transaction.commit().await?;
        Ok(())
    }

    async fn record_blocks(&self, blocks: &[(u64, B256)]) -> Result<()> {
        let mut connection = self.pool.acquire().await?;
        for (number, hash) in blocks {
            database::blocks::insert(
                &mut connection,
                i64::try_from(*number)?,
                &ByteArray(hash.0),
            )
            .await?;
        }
        Ok(())
    }

    async fn duplicate_blocks(&self) -> Result<BTreeMap<u64, Vec<B256>>> {
        let mut connection = self.pool.acquire().await?;
        let duplicates = database::blocks::duplicate_hashes(&mut connection).await?;
        duplicates
            .into_iter()
            .map(|(number, hashes)| {
                Ok((
                    u64::try_from(number)?,
                    hashes.into_iter().map(|hash| B256::from(hash.0)).collect(),
                ))
            })
            .collect()
    }

    async fn block_hashes(&self, block_number: u64) -> Result<Vec<B256>> {
        Ok(self
            .duplicate_blocks()
            .await?
            .remove(&block_number)
            .unwrap_or_default())
    }

    async fn last_event_block(&self) -> Result<u64> {
        let mut connection = self.pool.acquire().await?;
        let block = events::last_block(&mut connection).await?;
        Ok(u64::try_from(block)?)
    }
}

#[async_trait::async_trait]
impl OrderResolving for Postgres {
    async fn find_by_maker_nonce(
        &self,
        kind: ProtocolKind,
        maker: Address,
        nonce: U256,
    ) -> Result<Option<ResolvedOrder>> {
        let mut connection = self.pool.acquire().await?;
        let resolved = orders::find_by_maker_nonce(
            &mut connection,
            &address_into(maker),
            &u256_to_big_decimal(&nonce),
            order_kind_into(kind),
        )
        .await?;
        resolved
            .map(|(id, price)| {
                Ok(ResolvedOrder {
                    id,
                    price: big_decimal_to_u256(&price).context("stored price out of range")?,
                })
            })
            .transpose()
    }

    async fn pool_price(&self, order_id: &str) -> Result<Option<U256>> {
        let mut connection = self.pool.acquire().await?;
        let price = orders::fillable_price(&mut connection, order_id).await?;
        price
            .map(|price| big_decimal_to_u256(&price).context("stored price out of range"))
            .transpose()
    }
}

pub fn order_kind_into(kind: ProtocolKind) -> orders::OrderKind {
    match kind {
        ProtocolKind::Seaport => orders::OrderKind::Seaport,
        ProtocolKind::LooksRare => orders::OrderKind::LooksRare,
        ProtocolKind::ZeroexV4Erc721 => orders::OrderKind::ZeroexV4Erc721,
        ProtocolKind::ZeroexV4Erc1155 => orders::OrderKind::ZeroexV4Erc1155,
        ProtocolKind::WyvernV23 => orders::OrderKind::WyvernV23,
        ProtocolKind::Sudoswap => orders::OrderKind::Sudoswap,
        ProtocolKind::Nftx => orders::OrderKind::Nftx,
        ProtocolKind::Blur => orders::OrderKind::Blur,
    }
}

fn order_side_into(side: OrderSide) -> orders::OrderSide {
    match side {
        OrderSide::Buy => orders::OrderSide::Buy,
        OrderSide::Sell => orders::OrderSide::Sell,
    }
}

fn address_into(address: Address) -> database::Address {
    ByteArray(address.into_array())
}

fn event_index_into(index: &EventIndex) -> Result<events::EventIndex> {
    Ok(events::EventIndex {
        block_number: i64::try_from(index.block)?,
        block_hash: ByteArray(index.block_hash.0),
        tx_hash: ByteArray(index.tx_hash.0),
        log_index: i64::try_from(index.log_index)?,
        batch_index: i64::try_from(index.batch_index)?,
        timestamp: i64::try_from(index.timestamp)?,
    })
}

fn event_into(event: &CanonicalEvent) -> events::Event {
    match event {
        CanonicalEvent::Fill(fill) => events::Event::Fill(fill_into(fill, false)),
        CanonicalEvent::PartialFill(fill) => events::Event::Fill(fill_into(fill, true)),
        CanonicalEvent::Cancel(cancel) => events::Event::Cancel(events::Cancel {
            kind: order_kind_into(cancel.kind),
            order_id: cancel.order_id.clone(),
        }),
        CanonicalEvent::NonceCancel(cancel) => events::Event::NonceCancel(events::NonceCancel {
            kind: order_kind_into(cancel.kind),
            maker: address_into(cancel.maker),
            nonce: u256_to_big_decimal(&cancel.nonce),
        }),
        CanonicalEvent::BulkCancel(cancel) => events::Event::BulkCancel(events::BulkCancel {
            kind: order_kind_into(cancel.kind),
            maker: address_into(cancel.maker),
            min_nonce: u256_to_big_decimal(&cancel.min_nonce),
        }),
        CanonicalEvent::Transfer(transfer) => match transfer.token {
            TokenKind::Erc20 => events::Event::FtTransfer(events::FtTransfer {
                contract: address_into(transfer.contract),
                from: address_into(transfer.from),
                to: address_into(transfer.to),
                amount: u256_to_big_decimal(&transfer.amount),
            }),
            TokenKind::Erc721 | TokenKind::Erc1155 => {
                events::Event::NftTransfer(events::NftTransfer {
                    kind: match transfer.token {
                        TokenKind::Erc721 => orders::TokenKind::Erc721,
                        _ => orders::TokenKind::Erc1155,
                    },
                    contract: address_into(transfer.contract),
                    from: address_into(transfer.from),
                    to: address_into(transfer.to),
                    token_id: u256_to_big_decimal(&transfer.token_id.unwrap_or_default()),
                    amount: u256_to_big_decimal(&transfer.amount),
                })
            }
        },
        CanonicalEvent::Approval(approval) => events::Event::NftApproval(events::NftApproval {
            contract: address_into(approval.contract),
            owner: address_into(approval.owner),
            operator: address_into(approval.operator),
            approved: approval.approved,
        }),
    }
}

fn fill_into(fill: &model::events::Fill, is_partial: bool) -> events::Fill {
    events::Fill {
        kind: order_kind_into(fill.kind),
        order_id: fill.order_id.clone(),
        side: order_side_into(fill.side),
        maker: address_into(fill.maker),
        taker: address_into(fill.taker),
        contract: address_into(fill.contract),
        token_id: u256_to_big_decimal(&fill.token_id),
        amount: u256_to_big_decimal(&fill.quantity),
        price: u256_to_big_decimal(&fill.price),
        currency: address_into(fill.currency),
        fill_source: fill.fill_source.clone(),
        is_partial,
    }
}
