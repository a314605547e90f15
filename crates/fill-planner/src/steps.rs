//! Converts an allocation path into the ordered, deduplicated list of
//! actions the caller executes progressively: authentication, approvals or
//! permits, then the final fill transaction.

use {
    crate::{
        order_book::OrderBook,
        planner::{Allocation, PlanOptions},
    },
    alloy_primitives::{Address, U256},
    anyhow::Result,
    model::order::{OrderSide, ProtocolKind},
    serde::Serialize,
    serde_json::json,
    std::collections::HashMap,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    Auth,
    NftApproval,
    CurrencyApproval,
    Permit,
    Sale,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Signature,
    Transaction,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Complete,
    Incomplete,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepItem {
    pub status: StepStatus,
    pub data: serde_json::Value,
    /// Indexes into the path of the allocations this item serves.
    pub order_indexes: Vec<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Step {
    pub id: StepId,
    pub action: &'static str,
    pub description: &'static str,
    pub kind: StepKind,
    pub items: Vec<StepItem>,
}

/// Builds the step plan for a path. Steps keep a fixed relative order so a
/// caller polling the plan never sees indexes shift; a step is only dropped
/// when nothing in the batch could ever need it.
pub(crate) async fn assemble(
    book: &dyn OrderBook,
    book_side: OrderSide,
    path: &[Allocation],
    taker: Address,
    operators: &HashMap<ProtocolKind, Address>,
    options: &PlanOptions,
) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    push_auth_step(&mut steps, path, taker);
    match book_side {
        // Filling bids: the taker hands over NFTs.
        OrderSide::Buy => {
            push_nft_approvals(book, &mut steps, path, taker, operators, options).await?
        }
        // Filling listings: the taker pays currency.
        OrderSide::Sell => push_currency_approvals(&mut steps, path, operators),
    }
    push_sale_step(&mut steps, book_side, path, taker, options);
    Ok(steps
        .into_iter()
        .filter(|step| !step.items.is_empty())
        .collect())
}

/// EOA-only protocols gate everything behind an authentication challenge;
/// the step leads the plan whenever one of them is part of the batch.
fn push_auth_step(steps: &mut Vec<Step>, path: &[Allocation], taker: Address) {
    let order_indexes: Vec<usize> = path
        .iter()
        .enumerate()
        .filter(|(_, allocation)| allocation.kind.requires_eoa())
        .map(|(index, _)| index)
        .collect();
    if order_indexes.is_empty() {
        return;
    }
    steps.push(Step {
        id: StepId::Auth,
        action: "Sign in",
        description: "Some of the exchanges in this fill require an authentication signature",
        kind: StepKind::Signature,
        items: vec![StepItem {
            status: StepStatus::Incomplete,
            data: json!({ "kind": "auth-challenge", "taker": taker }),
            order_indexes,
        }],
    });
}

/// One approval per (collection, operator) the taker has not granted yet,
/// according to the ingested approval events. With `force_permit` the
/// missing approvals collapse into a single permit signature instead.
async fn push_nft_approvals(
    book: &dyn OrderBook,
    steps: &mut Vec<Step>,
    path: &[Allocation],
    taker: Address,
    operators: &HashMap<ProtocolKind, Address>,
    options: &PlanOptions,
) -> Result<()> {
    let mut items = Vec::new();
    for (index, allocation) in path.iter().enumerate() {
        let Some(operator) = operators.get(&allocation.kind) else {
            continue;
        };
        if book
            .nft_approved(allocation.contract, taker, *operator)
            .await?
        {
            continue;
        }
        items.push(StepItem {
            status: StepStatus::Incomplete,
            data: json!({
                "kind": "nft-approval",
                "contract": allocation.contract,
                "owner": taker,
                "operator": operator,
            }),
            order_indexes: vec![index],
        });
    }
    let items = dedup_items(items);
    if items.is_empty() {
        return Ok(());
    }
    if options.force_permit {
        let contracts: Vec<Address> = items
            .iter()
            .filter_map(|item| serde_json::from_value(item.data["contract"].clone()).ok())
            .collect();
        let order_indexes = items
            .into_iter()
            .flat_map(|item| item.order_indexes)
            .collect();
        steps.push(Step {
            id: StepId::Permit,
            action: "Sign permits",
            description: "Sign a permit for accessing the tokens in your wallet",
            kind: StepKind::Signature,
            items: vec![StepItem {
                status: StepStatus::Incomplete,
                data: json!({ "kind": "nft-permit", "owner": taker, "contracts": contracts }),
                order_indexes,
            }],
        });
    } else {
        steps.push(Step {
            id: StepId::NftApproval,
            action: "Approve NFT contract",
            description: "Each NFT collection you want to trade requires a one-time approval \
                          transaction",
            kind: StepKind::Transaction,
            items,
        });
    }
    Ok(())
}

/// One approval per (currency, operator), covering the total amount routed
/// through that pair. The native currency needs no approval, and allowances
/// are not indexed on-chain, so the items are always reported incomplete.
fn push_currency_approvals(
    steps: &mut Vec<Step>,
    path: &[Allocation],
    operators: &HashMap<ProtocolKind, Address>,
) {
    let mut items = Vec::new();
    for (index, allocation) in path.iter().enumerate() {
        if allocation.currency == Address::ZERO {
            continue;
        }
        let Some(operator) = operators.get(&allocation.kind) else {
            continue;
        };
        items.push(StepItem {
            status: StepStatus::Incomplete,
            data: json!({
                "kind": "currency-approval",
                "currency": allocation.currency,
                "operator": operator,
            }),
            order_indexes: vec![index],
        });
    }
    let mut items = dedup_items(items);
    for item in &mut items {
        let amount: U256 = item
            .order_indexes
            .iter()
            .map(|index| path[*index].quote)
            .sum();
        item.data["amount"] = json!(amount);
    }
    steps.push(Step {
        id: StepId::CurrencyApproval,
        action: "Approve exchange contract",
        description: "A one-time setup transaction to enable trading",
        kind: StepKind::Transaction,
        items,
    });
}

/// The final fill transaction: one item executing the whole path. The
/// payload goes to the order codec and router for transaction construction.
fn push_sale_step(
    steps: &mut Vec<Step>,
    book_side: OrderSide,
    path: &[Allocation],
    taker: Address,
    options: &PlanOptions,
) {
    let (action, description) = match book_side {
        OrderSide::Buy => (
            "Accept offers",
            "To sell these items you must confirm the transaction and pay the gas fee",
        ),
        OrderSide::Sell => (
            "Confirm purchase",
            "To purchase these items you must confirm the transaction and pay the gas fee",
        ),
    };
    let mut data = json!({
        "kind": "sale",
        "taker": taker,
        "orders": path
            .iter()
            .map(|allocation| {
                json!({
                    "id": allocation.order_id,
                    "protocol": allocation.kind,
                    "quantity": allocation.quantity,
                    "unitPrice": allocation.unit_price,
                    "currency": allocation.currency,
                    "rawData": allocation.raw_data,
                })
            })
            .collect::<Vec<_>>(),
        "feesOnTop": options.fees_on_top,
    });
    if book_side == OrderSide::Sell {
        data["buyInCurrency"] = json!(buy_in_currency(path, options));
    }
    steps.push(Step {
        id: StepId::Sale,
        action,
        description,
        kind: StepKind::Transaction,
        items: vec![StepItem {
            status: StepStatus::Incomplete,
            data,
            order_indexes: (0..path.len()).collect(),
        }],
    });
}

/// The currency the taker pays with: an explicit override, the currency
/// shared by the whole path, or the native token when the path mixes
/// currencies.
fn buy_in_currency(path: &[Allocation], options: &PlanOptions) -> Address {
    if let Some(currency) = options.currency {
        return currency;
    }
    let first = path.first().map(|a| a.currency).unwrap_or_default();
    if path.iter().all(|a| a.currency == first) {
        first
    } else {
        Address::ZERO
    }
}

/// Merges items whose payload is structurally identical, concatenating
/// their order-index attributions. The first occurrence keeps its position
/// so item identity stays stable between polls.
fn dedup_items(items: Vec<StepItem>) -> Vec<StepItem> {
    let mut out: Vec<StepItem> = Vec::new();
    for item in items {
        match out
            .iter_mut()
            .find(|existing| existing.data == item.data && existing.status == item.status)
        {
            Some(existing) => existing.order_indexes.extend(item.order_indexes),
            None => out.push(item),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::order_book::MockOrderBook,
        maplit::hashmap,
        model::events::TokenKind,
    };

    fn allocation(id: &str, kind: ProtocolKind, contract: Address, currency: Address) -> Allocation {
        Allocation {
            order_id: id.to_string(),
            kind,
            maker: Address::repeat_byte(0x11),
            contract,
            token_id: U256::from(7),
            token_kind: TokenKind::Erc721,
            quantity: U256::from(1),
            unit_price: U256::from(100),
            currency,
            source: None,
            quote: U256::from(100),
            fees: Vec::new(),
            raw_data: serde_json::Value::Null,
        }
    }

    fn seaport_operator() -> HashMap<ProtocolKind, Address> {
        hashmap! { ProtocolKind::Seaport => Address::repeat_byte(0x0f) }
    }

    #[tokio::test]
    async fn shared_collection_approvals_are_merged() {
        let contract = Address::repeat_byte(0x22);
        let weth = Address::repeat_byte(0xee);
        let path = [
            allocation("a", ProtocolKind::Seaport, contract, weth),
            allocation("b", ProtocolKind::Seaport, contract, weth),
        ];
        let mut book = MockOrderBook::new();
        book.expect_nft_approved().returning(|_, _, _| Ok(false));

        let steps = assemble(
            &book,
            OrderSide::Buy,
            &path,
            Address::repeat_byte(0x99),
            &seaport_operator(),
            &PlanOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].id, StepId::NftApproval);
        assert_eq!(steps[0].items.len(), 1);
        assert_eq!(steps[0].items[0].order_indexes, [0, 1]);
        assert_eq!(steps[1].id, StepId::Sale);
    }

    #[tokio::test]
    async fn granted_approvals_are_omitted() {
        let path = [allocation(
            "a",
            ProtocolKind::Seaport,
            Address::repeat_byte(0x22),
            Address::repeat_byte(0xee),
        )];
        let mut book = MockOrderBook::new();
        book.expect_nft_approved().returning(|_, _, _| Ok(true));

        let steps = assemble(
            &book,
            OrderSide::Buy,
            &path,
            Address::repeat_byte(0x99),
            &seaport_operator(),
            &PlanOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].id, StepId::Sale);
    }

    #[tokio::test]
    async fn force_permit_replaces_missing_approvals_with_one_signature() {
        let path = [
            allocation(
                "a",
                ProtocolKind::Seaport,
                Address::repeat_byte(0x22),
                Address::repeat_byte(0xee),
            ),
            allocation(
                "b",
                ProtocolKind::Seaport,
                Address::repeat_byte(0x23),
                Address::repeat_byte(0xee),
            ),
        ];
        let mut book = MockOrderBook::new();
        book.expect_nft_approved().returning(|_, _, _| Ok(false));

        let options = PlanOptions {
            force_permit: true,
            ..Default::default()
        };
        let steps = assemble(
            &book,
            OrderSide::Buy,
            &path,
            Address::repeat_byte(0x99),
            &seaport_operator(),
            &options,
        )
        .await
        .unwrap();

        assert_eq!(steps[0].id, StepId::Permit);
        assert_eq!(steps[0].kind, StepKind::Signature);
        assert_eq!(steps[0].items.len(), 1);
        assert_eq!(steps[0].items[0].order_indexes, [0, 1]);
    }

    #[tokio::test]
    async fn auth_leads_the_plan_when_an_eoa_only_kind_is_present() {
        let path = [
            allocation(
                "a",
                ProtocolKind::Blur,
                Address::repeat_byte(0x22),
                Address::ZERO,
            ),
            allocation(
                "b",
                ProtocolKind::Seaport,
                Address::repeat_byte(0x22),
                Address::ZERO,
            ),
        ];
        let book = MockOrderBook::new();

        let steps = assemble(
            &book,
            OrderSide::Sell,
            &path,
            Address::repeat_byte(0x99),
            &HashMap::new(),
            &PlanOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(steps[0].id, StepId::Auth);
        assert_eq!(steps[0].items[0].order_indexes, [0]);
        assert_eq!(steps.last().unwrap().id, StepId::Sale);
    }

    #[tokio::test]
    async fn currency_approvals_cover_the_merged_amount() {
        let weth = Address::repeat_byte(0xee);
        let contract = Address::repeat_byte(0x22);
        let mut first = allocation("a", ProtocolKind::Seaport, contract, weth);
        first.quote = U256::from(100);
        let mut second = allocation("b", ProtocolKind::Seaport, contract, weth);
        second.quote = U256::from(250);
        // Native-currency fills need no approval at all.
        let third = allocation("c", ProtocolKind::LooksRare, contract, Address::ZERO);
        let book = MockOrderBook::new();

        let steps = assemble(
            &book,
            OrderSide::Sell,
            &[first, second, third],
            Address::repeat_byte(0x99),
            &seaport_operator(),
            &PlanOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(steps[0].id, StepId::CurrencyApproval);
        assert_eq!(steps[0].items.len(), 1);
        assert_eq!(steps[0].items[0].order_indexes, [0, 1]);
        assert_eq!(steps[0].items[0].data["amount"], json!(U256::from(350)));
    }

    #[tokio::test]
    async fn mixed_currencies_fall_back_to_the_native_token() {
        let contract = Address::repeat_byte(0x22);
        let path = [
            allocation("a", ProtocolKind::LooksRare, contract, Address::repeat_byte(0xee)),
            allocation("b", ProtocolKind::LooksRare, contract, Address::ZERO),
        ];
        let book = MockOrderBook::new();

        let steps = assemble(
            &book,
            OrderSide::Sell,
            &path,
            Address::repeat_byte(0x99),
            &HashMap::new(),
            &PlanOptions::default(),
        )
        .await
        .unwrap();

        let sale = steps.last().unwrap();
        assert_eq!(sale.items[0].data["buyInCurrency"], json!(Address::ZERO));
    }
}
