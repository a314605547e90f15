//! The fill-path planner. For each requested item it walks stored orders
//! (or validates an explicitly named one), keeps per-call simulation state
//! so that several allocations cannot over-commit one maker, and reprices
//! pool orders from their ladder per consumed unit.

use {
    crate::{
        order_book::{Fee, Order, OrderBook, TokenRef},
        steps::{self, Step},
    },
    alloy_primitives::{Address, U256},
    anyhow::{Context as _, Result},
    model::order::{OrderSide, ProtocolKind, pool_order_id},
    serde::Deserialize,
    std::collections::HashMap,
    tracing::instrument,
};

/// One requested item of a fill intent.
#[derive(Clone, Debug)]
pub struct FillItem {
    pub token: TokenRef,
    pub quantity: U256,
    pub via: FillVia,
}

/// How an item wants to be filled.
#[derive(Clone, Debug, Default)]
pub enum FillVia {
    /// Greedily consume the best available orders for the token.
    #[default]
    BestAvailable,
    /// Fill one specific stored order.
    Order(String),
    /// Fill a raw, unindexed order payload.
    Raw(RawOrder),
}

/// An order that was never posted to the order book. Only pool orders can
/// be synthesized from their payload alone; everything else would need the
/// order codec to post it first.
#[derive(Clone, Debug)]
pub struct RawOrder {
    pub kind: ProtocolKind,
    pub data: serde_json::Value,
}

#[derive(Clone, Debug, Default)]
pub struct PlanOptions {
    /// Skip failing items instead of aborting the whole request.
    pub partial: bool,
    /// Only compute the path; no execution steps.
    pub only_path: bool,
    /// Charge missing royalties on top and sort candidates by the
    /// royalty-normalized effective value.
    pub normalize_royalties: bool,
    /// Skip order kinds that can only be filled directly from an EOA.
    pub exclude_eoa: bool,
    /// Do not skip inactive orders when filling via explicit order ids.
    pub allow_inactive_order_ids: bool,
    /// Order ids to leave out of candidate selection.
    pub exclude_order_ids: Vec<String>,
    /// Payment currency override when filling listings.
    pub currency: Option<Address>,
    /// Global fees charged on top of the whole fill.
    pub fees_on_top: Vec<Fee>,
    /// Replace missing sell-side NFT approvals with a single permit
    /// signature.
    pub force_permit: bool,
    /// Fill flagged tokens even on protocols that normally refuse them.
    pub allow_flagged: bool,
}

/// Typed, caller-visible planning failures. Outside `partial` mode the
/// first of these aborts the whole request; in `partial` mode they are
/// collected per item instead.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ExecuteError {
    #[error("unknown token {0}")]
    UnknownToken(TokenRef),
    #[error("order {0} not found or not fillable")]
    OrderNotFillable(String),
    #[error("token {0} is flagged")]
    TokenFlagged(TokenRef),
    #[error("taker cannot fill own orders")]
    SelfFill,
    #[error("unable to fill requested quantity for token {0}")]
    QuantityUnavailable(TokenRef),
    #[error("raw {0} orders cannot be synthesized without the order codec")]
    UnsupportedRawOrder(ProtocolKind),
    #[error("no available orders")]
    NoAvailableOrders,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Execute(#[from] ExecuteError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A planning failure attributed to one requested item.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ItemError {
    /// Index into the requested items.
    pub item: usize,
    pub error: ExecuteError,
}

/// One (order, quantity, price) assignment. The path's insertion order is
/// the execution and display order.
#[derive(Clone, Debug)]
pub struct Allocation {
    pub order_id: String,
    pub kind: ProtocolKind,
    pub maker: Address,
    pub contract: Address,
    pub token_id: U256,
    pub token_kind: model::events::TokenKind,
    pub quantity: U256,
    pub unit_price: U256,
    pub currency: Address,
    pub source: Option<String>,
    /// Net proceeds when filling bids, gross cost when filling listings,
    /// for the whole allocation.
    pub quote: U256,
    /// The royalty additions applied on top of the built-in fees.
    pub fees: Vec<Fee>,
    /// Raw protocol payload for the order codec.
    pub raw_data: serde_json::Value,
}

#[derive(Debug, Default)]
pub struct Plan {
    pub path: Vec<Allocation>,
    pub errors: Vec<ItemError>,
    pub steps: Vec<Step>,
}

/// The payload shared by pool orders: the pool address and its per-unit
/// price ladder, refreshed off-chain after every swap.
#[derive(Debug, Deserialize)]
struct PoolParams {
    pool: Address,
    prices: Vec<U256>,
}

/// Which stock an allocation depletes. Bid makers pay with fungible funds;
/// listing makers deliver the token itself.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
enum BalanceScope {
    Currency(Address),
    Token(TokenRef),
}

/// Depletion state owned by a single planning call, so concurrent requests
/// cannot interfere with each other.
#[derive(Default)]
struct Simulation {
    maker_balances: HashMap<(Address, BalanceScope), U256>,
    /// Units already taken per pool; indexes into the pool's price ladder.
    pool_cursors: HashMap<Address, usize>,
    /// Quantity already allocated per order id across all items.
    quantity_filled: HashMap<String, U256>,
}

pub struct Planner<'a> {
    book: &'a dyn OrderBook,
    /// The exchange operator contract per protocol, used as approval target
    /// in the step plan.
    operators: HashMap<ProtocolKind, Address>,
}

impl<'a> Planner<'a> {
    pub fn new(book: &'a dyn OrderBook, operators: HashMap<ProtocolKind, Address>) -> Self {
        Self { book, operators }
    }

    /// Plans a sell: the taker accepts bids.
    pub async fn plan_sell(
        &self,
        items: &[FillItem],
        taker: Address,
        options: &PlanOptions,
    ) -> Result<Plan, PlanError> {
        self.plan(OrderSide::Buy, items, taker, options).await
    }

    /// Plans a buy: the taker fills listings.
    pub async fn plan_buy(
        &self,
        items: &[FillItem],
        taker: Address,
        options: &PlanOptions,
    ) -> Result<Plan, PlanError> {
        self.plan(OrderSide::Sell, items, taker, options).await
    }

    /// `book_side` is the side of the *orders* being consumed, which is the
    /// opposite of what the taker does.
    #[instrument(skip_all, fields(items = items.len(), %taker))]
    async fn plan(
        &self,
        book_side: OrderSide,
        items: &[FillItem],
        taker: Address,
        options: &PlanOptions,
    ) -> Result<Plan, PlanError> {
        let mut simulation = Simulation::default();
        let mut path = Vec::new();
        let mut errors = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let result = self
                .plan_item(book_side, item, taker, options, &mut simulation, &mut path)
                .await;
            match result {
                Ok(()) => (),
                Err(PlanError::Execute(error)) if options.partial => {
                    tracing::debug!(item = index, %error, "skipping item");
                    errors.push(ItemError { item: index, error });
                }
                Err(error) => {
                    track_outcome("error");
                    return Err(error);
                }
            }
        }
        if path.is_empty() {
            track_outcome("empty");
            return Err(ExecuteError::NoAvailableOrders.into());
        }

        let steps = if options.only_path {
            Vec::new()
        } else {
            steps::assemble(self.book, book_side, &path, taker, &self.operators, options).await?
        };
        track_outcome("success");
        Ok(Plan {
            path,
            errors,
            steps,
        })
    }

    async fn plan_item(
        &self,
        book_side: OrderSide,
        item: &FillItem,
        taker: Address,
        options: &PlanOptions,
        simulation: &mut Simulation,
        path: &mut Vec<Allocation>,
    ) -> Result<(), PlanError> {
        let flagged = self
            .book
            .token_flagged(item.token)
            .await?
            .ok_or(ExecuteError::UnknownToken(item.token))?;
        match &item.via {
            FillVia::Raw(raw) => {
                if !raw.kind.is_pool() {
                    return Err(ExecuteError::UnsupportedRawOrder(raw.kind).into());
                }
                // A pool order's id is a pure function of its payload, so a
                // raw pool order reduces to an explicit-id fill.
                let params: PoolParams = serde_json::from_value(raw.data.clone())
                    .context("malformed pool order payload")?;
                let id = pool_order_id(raw.kind, params.pool, book_side);
                self.fill_order_id(&id, book_side, item, taker, flagged, options, simulation, path)
                    .await
            }
            FillVia::Order(id) => {
                self.fill_order_id(id, book_side, item, taker, flagged, options, simulation, path)
                    .await
            }
            FillVia::BestAvailable => {
                self.fill_best_available(book_side, item, taker, flagged, options, simulation, path)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn fill_order_id(
        &self,
        id: &str,
        book_side: OrderSide,
        item: &FillItem,
        taker: Address,
        flagged: bool,
        options: &PlanOptions,
        simulation: &mut Simulation,
        path: &mut Vec<Allocation>,
    ) -> Result<(), PlanError> {
        let order = self
            .book
            .order_by_id(
                id,
                book_side,
                item.token,
                item.quantity,
                taker,
                options.allow_inactive_order_ids,
            )
            .await?
            .ok_or_else(|| ExecuteError::OrderNotFillable(id.to_string()))?;
        if order.maker == taker {
            return Err(ExecuteError::SelfFill.into());
        }
        if options.exclude_eoa && order.kind.requires_eoa() {
            return Err(ExecuteError::OrderNotFillable(id.to_string()).into());
        }
        if flagged && order.kind.disallows_flagged() && !options.allow_flagged {
            return Err(ExecuteError::TokenFlagged(item.token).into());
        }
        let allocated = self
            .allocate(book_side, &order, item.token, item.quantity, options, simulation, path)
            .await?;
        if allocated < item.quantity {
            return Err(ExecuteError::QuantityUnavailable(item.token).into());
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn fill_best_available(
        &self,
        book_side: OrderSide,
        item: &FillItem,
        taker: Address,
        flagged: bool,
        options: &PlanOptions,
        simulation: &mut Simulation,
        path: &mut Vec<Allocation>,
    ) -> Result<(), PlanError> {
        let candidates = self
            .book
            .candidates(
                book_side,
                item.token,
                taker,
                &options.exclude_order_ids,
                options.normalize_royalties,
            )
            .await?;
        let mut remaining = item.quantity;
        // Distinguishes "everything belonged to the taker" from genuine
        // unavailability when the quantity cannot be met.
        let mut own_orders_only = !candidates.is_empty();
        for order in &candidates {
            if remaining.is_zero() {
                break;
            }
            if order.maker == taker {
                continue;
            }
            own_orders_only = false;
            if options.exclude_eoa && order.kind.requires_eoa() {
                continue;
            }
            if flagged && order.kind.disallows_flagged() && !options.allow_flagged {
                continue;
            }
            let allocated = self
                .allocate(book_side, order, item.token, remaining, options, simulation, path)
                .await?;
            remaining -= allocated;
        }
        if !remaining.is_zero() {
            return Err(if own_orders_only {
                ExecuteError::SelfFill
            } else {
                ExecuteError::QuantityUnavailable(item.token)
            }
            .into());
        }
        Ok(())
    }

    /// Allocates up to `requested` units of one order, bounded by the
    /// order's unfilled quantity and the maker's simulated balance. Returns
    /// how much was actually taken; zero means the order is exhausted for
    /// this call.
    #[allow(clippy::too_many_arguments)]
    async fn allocate(
        &self,
        book_side: OrderSide,
        order: &Order,
        token: TokenRef,
        requested: U256,
        options: &PlanOptions,
        simulation: &mut Simulation,
        path: &mut Vec<Allocation>,
    ) -> Result<U256, PlanError> {
        let already = simulation
            .quantity_filled
            .get(&order.id)
            .copied()
            .unwrap_or_default();
        let available = order.quantity_remaining.saturating_sub(already);
        let requested = requested.min(available);
        if requested.is_zero() {
            return Ok(U256::ZERO);
        }

        if order.kind.is_pool() {
            // Pools have no maker balance to deplete; their limit is the
            // length of the price ladder.
            let allocated =
                self.allocate_pool(book_side, order, token, requested, options, simulation, path)?;
            simulation
                .quantity_filled
                .insert(order.id.clone(), already + allocated);
            return Ok(allocated);
        }

        let scope = match book_side {
            OrderSide::Buy => BalanceScope::Currency(order.currency),
            OrderSide::Sell => BalanceScope::Token(token),
        };
        let key = (order.maker, scope);
        let balance = match simulation.maker_balances.get(&key) {
            Some(balance) => *balance,
            None => match book_side {
                OrderSide::Buy => self.book.ft_balance(order.currency, order.maker).await?,
                OrderSide::Sell => self.book.nft_balance(token, order.maker).await?,
            },
        };
        // A bid maker can only pay for `balance / price` units; a listing
        // maker can only deliver what they hold.
        let affordable = match book_side {
            OrderSide::Buy if order.price.is_zero() => requested,
            OrderSide::Buy => balance.checked_div(order.price).unwrap_or_default(),
            OrderSide::Sell => balance,
        };
        let quantity = requested.min(affordable);
        if quantity.is_zero() {
            return Ok(U256::ZERO);
        }

        let depleted = match book_side {
            OrderSide::Buy => order.price.saturating_mul(quantity),
            OrderSide::Sell => quantity,
        };
        simulation
            .maker_balances
            .insert(key, balance.saturating_sub(depleted));
        simulation
            .quantity_filled
            .insert(order.id.clone(), already + quantity);
        push_allocation(book_side, order, token, quantity, order.price, options, path);
        Ok(quantity)
    }

    /// Pool allocations are emitted one unit at a time so every unit takes
    /// the next rung of the pool's price ladder; an exhausted ladder means
    /// the pool has nothing left at any price.
    #[allow(clippy::too_many_arguments)]
    fn allocate_pool(
        &self,
        book_side: OrderSide,
        order: &Order,
        token: TokenRef,
        requested: U256,
        options: &PlanOptions,
        simulation: &mut Simulation,
        path: &mut Vec<Allocation>,
    ) -> Result<U256, PlanError> {
        let params: PoolParams = serde_json::from_value(order.raw_data.clone())
            .context("malformed pool order payload")?;
        let mut allocated = U256::ZERO;
        while allocated < requested {
            let cursor = simulation
                .pool_cursors
                .get(&params.pool)
                .copied()
                .unwrap_or_default();
            let Some(price) = params.prices.get(cursor) else {
                break;
            };
            simulation.pool_cursors.insert(params.pool, cursor + 1);
            push_allocation(book_side, order, token, U256::from(1), *price, options, path);
            allocated += U256::from(1);
        }
        Ok(allocated)
    }
}

fn push_allocation(
    book_side: OrderSide,
    order: &Order,
    token: TokenRef,
    quantity: U256,
    unit_price: U256,
    options: &PlanOptions,
    path: &mut Vec<Allocation>,
) {
    let royalties = if options.normalize_royalties {
        order.missing_royalties.clone()
    } else {
        Vec::new()
    };
    let royalty_total: U256 = royalties.iter().map(|fee| fee.amount).sum();
    let quote = match book_side {
        // Net proceeds: the built-in fees and the charged royalties come
        // out of the maker's bid.
        OrderSide::Buy => {
            let fee = unit_price.saturating_mul(U256::from(order.fee_bps)) / U256::from(10_000);
            unit_price
                .saturating_sub(fee)
                .saturating_sub(royalty_total)
                .saturating_mul(quantity)
        }
        // Gross cost: the charged royalties go on top of the listing price.
        OrderSide::Sell => unit_price.saturating_add(royalty_total).saturating_mul(quantity),
    };
    path.push(Allocation {
        order_id: order.id.clone(),
        kind: order.kind,
        maker: order.maker,
        contract: token.contract,
        token_id: token.token_id,
        token_kind: order.token_kind,
        quantity,
        unit_price,
        currency: order.currency,
        source: order.source.clone(),
        quote,
        fees: royalties,
        raw_data: order.raw_data.clone(),
    });
}

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "fill_planner")]
struct Metrics {
    /// Outcomes of planning calls.
    #[metric(labels("outcome"))]
    plans: prometheus::IntCounterVec,
}

fn track_outcome(outcome: &str) {
    Metrics::instance(observe::metrics::get_storage_registry())
        .expect("unexpected error getting metrics instance")
        .plans
        .with_label_values(&[outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::order_book::MockOrderBook,
        model::events::TokenKind,
        serde_json::json,
    };

    fn token() -> TokenRef {
        TokenRef {
            contract: Address::repeat_byte(0x22),
            token_id: U256::from(7),
        }
    }

    fn bid(id: &str, maker: Address, price: u64, quantity: u64) -> Order {
        Order {
            id: id.to_string(),
            kind: ProtocolKind::Seaport,
            maker,
            contract: Address::repeat_byte(0x22),
            token_id: U256::from(7),
            token_kind: TokenKind::Erc721,
            price: U256::from(price),
            currency: Address::repeat_byte(0xee),
            quantity_remaining: U256::from(quantity),
            fee_bps: 0,
            missing_royalties: Vec::new(),
            raw_data: serde_json::Value::Null,
            source: None,
        }
    }

    fn pool_bid(pool: Address, prices: &[u64], quantity: u64) -> Order {
        Order {
            kind: ProtocolKind::Sudoswap,
            maker: pool,
            currency: Address::ZERO,
            quantity_remaining: U256::from(quantity),
            raw_data: json!({
                "pool": pool,
                "prices": prices.iter().map(|price| U256::from(*price)).collect::<Vec<_>>(),
            }),
            ..bid(
                &model::order::pool_order_id(ProtocolKind::Sudoswap, pool, OrderSide::Buy),
                pool,
                0,
                quantity,
            )
        }
    }

    fn item(quantity: u64) -> FillItem {
        FillItem {
            token: token(),
            quantity: U256::from(quantity),
            via: FillVia::BestAvailable,
        }
    }

    fn not_flagged(book: &mut MockOrderBook) {
        book.expect_token_flagged().returning(|_| Ok(Some(false)));
    }

    fn path_only() -> PlanOptions {
        PlanOptions {
            only_path: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn pool_units_walk_the_price_ladder_in_order() {
        let pool = Address::repeat_byte(0xab);
        let mut book = MockOrderBook::new();
        not_flagged(&mut book);
        book.expect_candidates()
            .returning(move |_, _, _, _, _| Ok(vec![pool_bid(pool, &[100, 110, 120], 3)]));
        // Pools are exempt from maker balance simulation; any balance read
        // would fail the test.

        let planner = Planner::new(&book, HashMap::new());
        let taker = Address::repeat_byte(0x99);
        let plan = planner
            .plan_sell(&[item(3)], taker, &path_only())
            .await
            .unwrap();

        let prices: Vec<_> = plan.path.iter().map(|a| a.unit_price).collect();
        assert_eq!(prices, [U256::from(100), U256::from(110), U256::from(120)]);
        assert!(plan.path.iter().all(|a| a.quantity == U256::from(1)));
    }

    #[tokio::test]
    async fn pool_ladder_shorter_than_request_exhausts_the_pool() {
        let pool = Address::repeat_byte(0xab);
        let mut book = MockOrderBook::new();
        not_flagged(&mut book);
        book.expect_candidates()
            .returning(move |_, _, _, _, _| Ok(vec![pool_bid(pool, &[100, 110], 5)]));

        let planner = Planner::new(&book, HashMap::new());
        let taker = Address::repeat_byte(0x99);
        let options = PlanOptions {
            partial: true,
            ..path_only()
        };
        let plan = planner.plan_sell(&[item(3)], taker, &options).await.unwrap();

        assert_eq!(plan.path.len(), 2);
        assert_eq!(
            plan.errors,
            [ItemError {
                item: 0,
                error: ExecuteError::QuantityUnavailable(token()),
            }],
        );
    }

    #[tokio::test]
    async fn allocations_never_overdraw_the_makers_balance() {
        let maker = Address::repeat_byte(0x11);
        let mut book = MockOrderBook::new();
        not_flagged(&mut book);
        book.expect_candidates().returning(move |_, _, _, _, _| {
            Ok(vec![bid("a", maker, 100, 1), bid("b", maker, 100, 1)])
        });
        // Enough for one unit at price 100, not for two.
        book.expect_ft_balance()
            .times(1)
            .returning(|_, _| Ok(U256::from(150)));

        let planner = Planner::new(&book, HashMap::new());
        let taker = Address::repeat_byte(0x99);
        let options = PlanOptions {
            partial: true,
            ..path_only()
        };
        let plan = planner.plan_sell(&[item(2)], taker, &options).await.unwrap();

        assert_eq!(plan.path.len(), 1);
        assert_eq!(plan.path[0].order_id, "a");
        assert_eq!(plan.path[0].quantity, U256::from(1));
        assert_eq!(
            plan.errors,
            [ItemError {
                item: 0,
                error: ExecuteError::QuantityUnavailable(token()),
            }],
        );
    }

    #[tokio::test]
    async fn takers_own_orders_are_never_allocated() {
        let taker = Address::repeat_byte(0x99);
        let other = Address::repeat_byte(0x11);
        let mut book = MockOrderBook::new();
        not_flagged(&mut book);
        book.expect_candidates().returning(move |_, _, _, _, _| {
            Ok(vec![bid("own", taker, 200, 1), bid("other", other, 100, 1)])
        });
        book.expect_ft_balance().returning(|_, _| Ok(U256::from(1_000)));

        let planner = Planner::new(&book, HashMap::new());
        let plan = planner
            .plan_sell(&[item(1)], taker, &path_only())
            .await
            .unwrap();

        assert_eq!(plan.path.len(), 1);
        assert_eq!(plan.path[0].order_id, "other");
        assert!(plan.path.iter().all(|a| a.maker != taker));
    }

    #[tokio::test]
    async fn shortfall_from_own_orders_alone_is_a_self_fill_error() {
        let taker = Address::repeat_byte(0x99);
        let mut book = MockOrderBook::new();
        not_flagged(&mut book);
        book.expect_candidates()
            .returning(move |_, _, _, _, _| Ok(vec![bid("own", taker, 200, 1)]));

        let planner = Planner::new(&book, HashMap::new());
        let result = planner.plan_sell(&[item(1)], taker, &path_only()).await;
        assert!(matches!(
            result,
            Err(PlanError::Execute(ExecuteError::SelfFill)),
        ));
    }

    #[tokio::test]
    async fn flagged_tokens_skip_protocols_that_refuse_them() {
        let maker = Address::repeat_byte(0x11);
        let mut book = MockOrderBook::new();
        book.expect_token_flagged().returning(|_| Ok(Some(true)));
        book.expect_candidates().returning(move |_, _, _, _, _| {
            let mut looks_rare = bid("lr", maker, 90, 1);
            looks_rare.kind = ProtocolKind::LooksRare;
            // The better-priced seaport bid refuses flagged tokens.
            Ok(vec![bid("sea", maker, 100, 1), looks_rare])
        });
        book.expect_ft_balance().returning(|_, _| Ok(U256::from(1_000)));

        let planner = Planner::new(&book, HashMap::new());
        let taker = Address::repeat_byte(0x99);
        let plan = planner
            .plan_sell(&[item(1)], taker, &path_only())
            .await
            .unwrap();
        assert_eq!(plan.path.len(), 1);
        assert_eq!(plan.path[0].order_id, "lr");
    }

    #[tokio::test]
    async fn explicit_order_ids_validate_against_the_store() {
        let mut book = MockOrderBook::new();
        not_flagged(&mut book);
        book.expect_order_by_id()
            .withf(|id, _, _, _, _, allow_inactive| id == "missing" && !allow_inactive)
            .returning(|_, _, _, _, _, _| Ok(None));

        let planner = Planner::new(&book, HashMap::new());
        let taker = Address::repeat_byte(0x99);
        let items = [FillItem {
            via: FillVia::Order("missing".to_string()),
            ..item(1)
        }];
        let result = planner.plan_sell(&items, taker, &path_only()).await;
        assert!(matches!(
            result,
            Err(PlanError::Execute(ExecuteError::OrderNotFillable(id))) if id == "missing",
        ));
    }

    #[tokio::test]
    async fn raw_pool_orders_reduce_to_their_synthesized_id() {
        let pool = Address::repeat_byte(0xab);
        let expected_id = model::order::pool_order_id(
            ProtocolKind::Sudoswap,
            pool,
            OrderSide::Buy,
        );
        let mut book = MockOrderBook::new();
        not_flagged(&mut book);
        {
            let expected_id = expected_id.clone();
            book.expect_order_by_id()
                .withf(move |id, _, _, _, _, _| id == expected_id)
                .returning(move |_, _, _, _, _, _| Ok(Some(pool_bid(pool, &[100], 1))));
        }

        let planner = Planner::new(&book, HashMap::new());
        let taker = Address::repeat_byte(0x99);
        let items = [FillItem {
            via: FillVia::Raw(RawOrder {
                kind: ProtocolKind::Sudoswap,
                data: json!({ "pool": pool, "prices": [U256::from(100)] }),
            }),
            ..item(1)
        }];
        let plan = planner.plan_sell(&items, taker, &path_only()).await.unwrap();
        assert_eq!(plan.path[0].order_id, expected_id);
    }

    #[tokio::test]
    async fn raw_orders_of_posted_kinds_are_rejected() {
        let mut book = MockOrderBook::new();
        not_flagged(&mut book);

        let planner = Planner::new(&book, HashMap::new());
        let taker = Address::repeat_byte(0x99);
        let items = [FillItem {
            via: FillVia::Raw(RawOrder {
                kind: ProtocolKind::Seaport,
                data: json!({}),
            }),
            ..item(1)
        }];
        let result = planner.plan_sell(&items, taker, &path_only()).await;
        assert!(matches!(
            result,
            Err(PlanError::Execute(ExecuteError::UnsupportedRawOrder(
                ProtocolKind::Seaport,
            ))),
        ));
    }

    #[tokio::test]
    async fn unknown_tokens_fail_the_item() {
        let mut book = MockOrderBook::new();
        book.expect_token_flagged().returning(|_| Ok(None));

        let planner = Planner::new(&book, HashMap::new());
        let taker = Address::repeat_byte(0x99);
        let result = planner.plan_sell(&[item(1)], taker, &path_only()).await;
        assert!(matches!(
            result,
            Err(PlanError::Execute(ExecuteError::UnknownToken(_))),
        ));
    }

    #[tokio::test]
    async fn buy_side_caps_at_the_makers_token_holdings() {
        let maker = Address::repeat_byte(0x11);
        let mut book = MockOrderBook::new();
        not_flagged(&mut book);
        book.expect_candidates().returning(move |side, _, _, _, _| {
            assert_eq!(side, OrderSide::Sell);
            // Two listings for three units total, but the maker only holds
            // two.
            Ok(vec![bid("a", maker, 100, 2), bid("b", maker, 120, 1)])
        });
        book.expect_nft_balance()
            .times(1)
            .returning(|_, _| Ok(U256::from(2)));

        let planner = Planner::new(&book, HashMap::new());
        let taker = Address::repeat_byte(0x99);
        let options = PlanOptions {
            partial: true,
            ..path_only()
        };
        let plan = planner.plan_buy(&[item(3)], taker, &options).await.unwrap();

        let total: U256 = plan.path.iter().map(|a| a.quantity).sum();
        assert_eq!(total, U256::from(2));
        assert_eq!(plan.errors.len(), 1);
    }

    #[tokio::test]
    async fn royalties_are_charged_when_normalizing() {
        let maker = Address::repeat_byte(0x11);
        let mut book = MockOrderBook::new();
        not_flagged(&mut book);
        book.expect_candidates().returning(move |_, _, _, _, _| {
            let mut order = bid("a", maker, 1_000, 1);
            order.fee_bps = 250;
            order.missing_royalties = vec![Fee {
                recipient: Address::repeat_byte(0x77),
                amount: U256::from(50),
            }];
            Ok(vec![order])
        });
        book.expect_ft_balance().returning(|_, _| Ok(U256::from(10_000)));

        let planner = Planner::new(&book, HashMap::new());
        let taker = Address::repeat_byte(0x99);

        let plan = planner
            .plan_sell(&[item(1)], taker, &path_only())
            .await
            .unwrap();
        // Only the built-in fee applies without normalization.
        assert_eq!(plan.path[0].quote, U256::from(975));

        let options = PlanOptions {
            normalize_royalties: true,
            ..path_only()
        };
        let plan = planner.plan_sell(&[item(1)], taker, &options).await.unwrap();
        assert_eq!(plan.path[0].quote, U256::from(925));
        assert_eq!(plan.path[0].fees.len(), 1);
    }
}
