//! Fill source attribution. Fills executed through a known aggregation
//! router name the router as taker on-chain; the true taker is the
//! transaction sender, and the fill gets attributed to the router's domain.

use {
    crate::{
        parser::RawLog,
        registry::{EventKind, Registry},
    },
    alloy_primitives::{Address, B256},
    anyhow::Result,
    futures::future,
    std::collections::{HashMap, HashSet},
};

#[derive(Clone, Copy, Debug, Default)]
pub struct TxInfo {
    pub from: Address,
    pub to: Option<Address>,
}

/// Resolves a transaction's sender and recipient. The lookups have no mutual
/// ordering dependency, so the updater issues them concurrently across the
/// logs of a range before the sequential fold starts.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TransactionFetching: Send + Sync {
    async fn transaction_info(&self, tx_hash: B256) -> Result<TxInfo>;
}

/// Known router contracts keyed by address, mapping to the fill source
/// domain attributed to fills they mediate.
pub type Routers = HashMap<Address, String>;

/// Fetches transaction infos for every log that can produce a fill. All
/// lookups must succeed; a missing transaction would finalize a fill with an
/// unresolved taker, so the whole batch fails instead.
pub async fn prefetch(
    fetcher: &dyn TransactionFetching,
    registry: &Registry,
    logs: &[RawLog],
) -> Result<HashMap<B256, TxInfo>> {
    let mut seen = HashSet::new();
    let hashes: Vec<B256> = logs
        .iter()
        .filter(|log| {
            registry
                .classify(log)
                .is_some_and(|entry| emits_fills(entry.kind))
        })
        .map(|log| log.tx_hash)
        .filter(|hash| seen.insert(*hash))
        .collect();
    let infos =
        future::try_join_all(hashes.iter().map(|hash| fetcher.transaction_info(*hash))).await?;
    Ok(hashes.into_iter().zip(infos).collect())
}

fn emits_fills(kind: EventKind) -> bool {
    matches!(
        kind,
        EventKind::SeaportOrderFulfilled
            | EventKind::LooksRareTakerAsk
            | EventKind::LooksRareTakerBid
            | EventKind::ZeroexV4Erc721OrderFilled
            | EventKind::ZeroexV4Erc1155OrderFilled
            | EventKind::WyvernV23OrdersMatched
            | EventKind::SudoswapSwapIn
            | EventKind::SudoswapSwapOut
    )
}

/// The true taker of a fill and its source attribution. When the transaction
/// went through a registered router the event-level taker is the router
/// contract, not the wallet that initiated the fill.
pub fn resolve_taker(
    routers: &Routers,
    tx_info: Option<&TxInfo>,
    event_taker: Address,
) -> (Address, Option<String>) {
    let routed = tx_info.and_then(|info| {
        let source = routers.get(&info.to?)?;
        Some((info.from, Some(source.clone())))
    });
    routed.unwrap_or((event_taker, None))
}

#[cfg(test)]
mod tests {
    use {super::*, maplit::hashmap};

    #[test]
    fn routed_fills_attribute_the_sender() {
        let router = Address::repeat_byte(0xaa);
        let routers = hashmap! { router => "aggregator.example".to_string() };
        let wallet = Address::repeat_byte(0x01);

        let (taker, source) = resolve_taker(
            &routers,
            Some(&TxInfo {
                from: wallet,
                to: Some(router),
            }),
            router,
        );
        assert_eq!(taker, wallet);
        assert_eq!(source.as_deref(), Some("aggregator.example"));
    }

    #[test]
    fn direct_fills_keep_the_event_taker() {
        let routers = Routers::default();
        let wallet = Address::repeat_byte(0x01);
        let (taker, source) = resolve_taker(
            &routers,
            Some(&TxInfo {
                from: Address::repeat_byte(0x02),
                to: Some(Address::repeat_byte(0x03)),
            }),
            wallet,
        );
        assert_eq!(taker, wallet);
        assert_eq!(source, None);
    }
}
