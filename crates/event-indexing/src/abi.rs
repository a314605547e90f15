//! Event declarations for every log shape the registry knows how to decode.
//! The `sol!` expansions provide both the topic hashes (`SIGNATURE_HASH`) and
//! the typed decoders, so no hand-maintained hex constants can drift out of
//! sync with the signatures.
//!
//! The modules are split per contract family because several events share a
//! name (most prominently `Transfer`).

pub mod erc20 {
    alloy_sol_types::sol! {
        event Transfer(address indexed from, address indexed to, uint256 amount);
        event Deposit(address indexed to, uint256 amount);
        event Withdrawal(address indexed from, uint256 amount);
    }
}

pub mod erc721 {
    alloy_sol_types::sol! {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
        event ApprovalForAll(address indexed owner, address indexed operator, bool approved);
    }
}

/// Non-standard collections (punk-style) emit `Transfer` with an unindexed
/// token id, which makes the log indistinguishable from an erc20 transfer by
/// topic and arity alone. The registry claims these by contract allowlist.
pub mod erc721_like {
    alloy_sol_types::sol! {
        event Transfer(address indexed from, address indexed to, uint256 tokenId);
    }
}

pub mod erc1155 {
    alloy_sol_types::sol! {
        event TransferSingle(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256 tokenId,
            uint256 amount
        );
        event TransferBatch(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256[] tokenIds,
            uint256[] amounts
        );
    }
}

pub mod seaport {
    alloy_sol_types::sol! {
        struct SpentItem {
            uint8 itemType;
            address token;
            uint256 identifier;
            uint256 amount;
        }

        struct ReceivedItem {
            uint8 itemType;
            address token;
            uint256 identifier;
            uint256 amount;
            address recipient;
        }

        event OrderFulfilled(
            bytes32 orderHash,
            address indexed offerer,
            address indexed zone,
            address recipient,
            SpentItem[] offer,
            ReceivedItem[] consideration
        );
        event OrderCancelled(bytes32 orderHash, address indexed offerer, address indexed zone);
        event CounterIncremented(uint256 newCounter, address indexed offerer);
    }
}

pub mod looks_rare {
    alloy_sol_types::sol! {
        event TakerAsk(
            bytes32 orderHash,
            uint256 orderNonce,
            address indexed taker,
            address indexed maker,
            address indexed strategy,
            address currency,
            address collection,
            uint256 tokenId,
            uint256 amount,
            uint256 price
        );
        event TakerBid(
            bytes32 orderHash,
            uint256 orderNonce,
            address indexed taker,
            address indexed maker,
            address indexed strategy,
            address currency,
            address collection,
            uint256 tokenId,
            uint256 amount,
            uint256 price
        );
        event CancelAllOrders(address indexed user, uint256 newMinNonce);
        event CancelMultipleOrders(address indexed user, uint256[] orderNonces);
    }
}

pub mod zeroex_v4 {
    alloy_sol_types::sol! {
        event ERC721OrderFilled(
            uint8 direction,
            address maker,
            address taker,
            uint256 nonce,
            address erc20Token,
            uint256 erc20TokenAmount,
            address erc721Token,
            uint256 erc721TokenId,
            address matcher
        );
        event ERC1155OrderFilled(
            uint8 direction,
            address maker,
            address taker,
            uint256 nonce,
            address erc20Token,
            uint256 erc20FillAmount,
            address erc1155Token,
            uint256 erc1155TokenId,
            uint128 erc1155FillAmount,
            address matcher
        );
        event ERC721OrderCancelled(address maker, uint256 nonce);
        event ERC1155OrderCancelled(address maker, uint256 nonce);
    }
}

pub mod wyvern_v23 {
    alloy_sol_types::sol! {
        event OrdersMatched(
            bytes32 buyHash,
            bytes32 sellHash,
            address indexed maker,
            address indexed taker,
            uint256 price,
            bytes32 indexed metadata
        );
        event NonceIncremented(address indexed maker, uint256 newNonce);
    }
}

/// Sudoswap pair swaps carry no payload at all; the traded asset and the
/// price are reconstructed from adjacent transfer logs and the stored pool
/// order respectively.
pub mod sudoswap {
    alloy_sol_types::sol! {
        event SwapNFTInPair();
        event SwapNFTOutPair();
    }
}
