//! Fill-path planning engine: selects and orders eligible order-book entries
//! for a buy or sell intent, simulates maker balance and quantity depletion
//! across candidate orders, reprices dynamically-priced pool orders per unit
//! and assembles the resulting execution step plan.

pub mod order_book;
pub mod planner;
pub mod steps;

pub use {
    order_book::{Fee, Order, OrderBook, TokenRef},
    planner::{
        Allocation, ExecuteError, FillItem, FillVia, ItemError, Plan, PlanError, PlanOptions,
        Planner, RawOrder,
    },
    steps::{Step, StepId, StepItem, StepKind, StepStatus},
};
