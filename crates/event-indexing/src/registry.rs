//! Static table mapping (topic hash, topic count, optional contract
//! allowlist) to a decoder. Classification returns at most one entry; the
//! combination of topic, arity and allowlist is unique by construction.

use {
    crate::{abi, parser::RawLog},
    alloy_primitives::{Address, B256},
    alloy_sol_types::SolEvent,
    std::collections::HashSet,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    Erc20Transfer,
    Erc20Deposit,
    Erc20Withdrawal,
    Erc721Transfer,
    Erc721LikeTransfer,
    NftApprovalForAll,
    Erc1155TransferSingle,
    Erc1155TransferBatch,
    SeaportOrderFulfilled,
    SeaportOrderCancelled,
    SeaportCounterIncremented,
    LooksRareTakerAsk,
    LooksRareTakerBid,
    LooksRareCancelAllOrders,
    LooksRareCancelMultipleOrders,
    ZeroexV4Erc721OrderFilled,
    ZeroexV4Erc1155OrderFilled,
    ZeroexV4Erc721OrderCancelled,
    ZeroexV4Erc1155OrderCancelled,
    WyvernV23OrdersMatched,
    WyvernV23NonceIncremented,
    SudoswapSwapIn,
    SudoswapSwapOut,
}

#[derive(Clone, Debug)]
pub struct EventData {
    pub kind: EventKind,
    pub topic: B256,
    pub num_topics: usize,
    /// Restricts matching to these emitters. Used to disambiguate entries
    /// that collide on (topic, arity), like erc20 transfers and punk-style
    /// unindexed erc721 transfers.
    pub addresses: Option<HashSet<Address>>,
}

/// Deployment-specific addresses the registry needs to know about.
#[derive(Clone, Debug, Default)]
pub struct RegistryConfig {
    /// The wrapped native token; its deposit/withdrawal events count as
    /// fungible transfers.
    pub weth: Address,
    /// Collections emitting erc721 transfers with unindexed arguments.
    pub erc721_like: HashSet<Address>,
}

pub struct Registry {
    entries: Vec<EventData>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        let entry = |kind, topic, num_topics| EventData {
            kind,
            topic,
            num_topics,
            addresses: None,
        };
        let restricted = |kind, topic, num_topics, addresses| EventData {
            kind,
            topic,
            num_topics,
            addresses: Some(addresses),
        };
        let weth = HashSet::from([config.weth]);
        let entries = vec![
            entry(EventKind::Erc20Transfer, abi::erc20::Transfer::SIGNATURE_HASH, 3),
            restricted(
                EventKind::Erc20Deposit,
                abi::erc20::Deposit::SIGNATURE_HASH,
                2,
                weth.clone(),
            ),
            restricted(
                EventKind::Erc20Withdrawal,
                abi::erc20::Withdrawal::SIGNATURE_HASH,
                2,
                weth,
            ),
            entry(EventKind::Erc721Transfer, abi::erc721::Transfer::SIGNATURE_HASH, 4),
            restricted(
                EventKind::Erc721LikeTransfer,
                abi::erc721_like::Transfer::SIGNATURE_HASH,
                3,
                config.erc721_like,
            ),
            entry(
                EventKind::NftApprovalForAll,
                abi::erc721::ApprovalForAll::SIGNATURE_HASH,
                3,
            ),
            entry(
                EventKind::Erc1155TransferSingle,
                abi::erc1155::TransferSingle::SIGNATURE_HASH,
                4,
            ),
            entry(
                EventKind::Erc1155TransferBatch,
                abi::erc1155::TransferBatch::SIGNATURE_HASH,
                4,
            ),
            entry(
                EventKind::SeaportOrderFulfilled,
                abi::seaport::OrderFulfilled::SIGNATURE_HASH,
                3,
            ),
            entry(
                EventKind::SeaportOrderCancelled,
                abi::seaport::OrderCancelled::SIGNATURE_HASH,
                3,
            ),
            entry(
                EventKind::SeaportCounterIncremented,
                abi::seaport::CounterIncremented::SIGNATURE_HASH,
                2,
            ),
            entry(
                EventKind::LooksRareTakerAsk,
                abi::looks_rare::TakerAsk::SIGNATURE_HASH,
                4,
            ),
            entry(
                EventKind::LooksRareTakerBid,
                abi::looks_rare::TakerBid::SIGNATURE_HASH,
                4,
            ),
            entry(
                EventKind::LooksRareCancelAllOrders,
                abi::looks_rare::CancelAllOrders::SIGNATURE_HASH,
                2,
            ),
            entry(
                EventKind::LooksRareCancelMultipleOrders,
                abi::looks_rare::CancelMultipleOrders::SIGNATURE_HASH,
                2,
            ),
            entry(
                EventKind::ZeroexV4Erc721OrderFilled,
                abi::zeroex_v4::ERC721OrderFilled::SIGNATURE_HASH,
                1,
            ),
            entry(
                EventKind::ZeroexV4Erc1155OrderFilled,
                abi::zeroex_v4::ERC1155OrderFilled::SIGNATURE_HASH,
                1,
            ),
            entry(
                EventKind::ZeroexV4Erc721OrderCancelled,
                abi::zeroex_v4::ERC721OrderCancelled::SIGNATURE_HASH,
                1,
            ),
            entry(
                EventKind::ZeroexV4Erc1155OrderCancelled,
                abi::zeroex_v4::ERC1155OrderCancelled::SIGNATURE_HASH,
                1,
            ),
            entry(
                EventKind::WyvernV23OrdersMatched,
                abi::wyvern_v23::OrdersMatched::SIGNATURE_HASH,
                4,
            ),
            entry(
                EventKind::WyvernV23NonceIncremented,
                abi::wyvern_v23::NonceIncremented::SIGNATURE_HASH,
                2,
            ),
            entry(EventKind::SudoswapSwapIn, abi::sudoswap::SwapNFTInPair::SIGNATURE_HASH, 1),
            entry(
                EventKind::SudoswapSwapOut,
                abi::sudoswap::SwapNFTOutPair::SIGNATURE_HASH,
                1,
            ),
        ];
        debug_assert!(unrestricted_entries_are_unique(&entries));
        Self { entries }
    }

    /// Finds the entry matching the log's leading topic, arity and emitter.
    /// `None` is not an error; unknown logs are simply not ours to handle.
    ///
    /// An allowlisted entry takes precedence over an unrestricted one with
    /// the same topic and arity, which is the only way identical signatures
    /// (erc20 vs punk-style erc721 transfers) can be told apart.
    pub fn classify(&self, log: &RawLog) -> Option<&EventData> {
        let topic = log.topics.first()?;
        let matching = |entry: &&EventData| {
            entry.topic == *topic && entry.num_topics == log.topics.len()
        };
        self.entries
            .iter()
            .filter(matching)
            .find(|entry| {
                entry
                    .addresses
                    .as_ref()
                    .is_some_and(|addresses| addresses.contains(&log.address))
            })
            .or_else(|| {
                self.entries
                    .iter()
                    .filter(matching)
                    .find(|entry| entry.addresses.is_none())
            })
    }
}

fn unrestricted_entries_are_unique(entries: &[EventData]) -> bool {
    let unrestricted: Vec<_> = entries
        .iter()
        .filter(|entry| entry.addresses.is_none())
        .map(|entry| (entry.topic, entry.num_topics))
        .collect();
    let unique: HashSet<_> = unrestricted.iter().copied().collect();
    unrestricted.len() == unique.len()
}

#[cfg(test)]
mod tests {
    use {super::*, alloy_primitives::Bytes};

    fn log(address: Address, topics: Vec<B256>) -> RawLog {
        RawLog {
            address,
            topics,
            data: Bytes::new(),
            ..Default::default()
        }
    }

    fn test_registry() -> Registry {
        Registry::new(RegistryConfig {
            weth: Address::repeat_byte(0xee),
            erc721_like: HashSet::from([Address::repeat_byte(0xcc)]),
        })
    }

    #[test]
    fn disambiguates_transfers_by_arity() {
        let registry = test_registry();
        let topic = abi::erc20::Transfer::SIGNATURE_HASH;
        let filler = B256::repeat_byte(1);

        let erc20 = log(Address::repeat_byte(0x01), vec![topic, filler, filler]);
        assert_eq!(registry.classify(&erc20).unwrap().kind, EventKind::Erc20Transfer);

        let erc721 = log(Address::repeat_byte(0x01), vec![topic, filler, filler, filler]);
        assert_eq!(
            registry.classify(&erc721).unwrap().kind,
            EventKind::Erc721Transfer,
        );
    }

    #[test]
    fn allowlisted_entry_wins_over_identical_signature() {
        let registry = test_registry();
        // Punk-style transfers share topic and arity with erc20 transfers;
        // only the emitter address can tell them apart.
        let topic = abi::erc721_like::Transfer::SIGNATURE_HASH;
        assert_eq!(topic, abi::erc20::Transfer::SIGNATURE_HASH);
        let filler = B256::repeat_byte(1);

        let from_allowlisted =
            log(Address::repeat_byte(0xcc), vec![topic, filler, filler]);
        assert_eq!(
            registry.classify(&from_allowlisted).unwrap().kind,
            EventKind::Erc721LikeTransfer,
        );

        let from_unknown = log(Address::repeat_byte(0x01), vec![topic, filler, filler]);
        assert_eq!(
            registry.classify(&from_unknown).unwrap().kind,
            EventKind::Erc20Transfer,
        );
    }

    #[test]
    fn deposit_restricted_to_wrapped_native_token() {
        let registry = test_registry();
        let topic = abi::erc20::Deposit::SIGNATURE_HASH;
        let filler = B256::repeat_byte(1);

        let weth = log(Address::repeat_byte(0xee), vec![topic, filler]);
        assert_eq!(registry.classify(&weth).unwrap().kind, EventKind::Erc20Deposit);

        let other = log(Address::repeat_byte(0x01), vec![topic, filler]);
        assert!(registry.classify(&other).is_none());
    }

    #[test]
    fn unknown_topics_are_skipped() {
        let registry = test_registry();
        let unknown = log(Address::repeat_byte(0x01), vec![B256::repeat_byte(0xff)]);
        assert!(registry.classify(&unknown).is_none());
    }
}
