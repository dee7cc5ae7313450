//! # mgx-engine
//!
//! The grid reconciliation engine — the core of the MGX grid system.
//!
//! Two components are specified together because neither is correct without
//! the other:
//!
//! - [`tracker::OrderTracker`] — the single source of truth for in-flight and
//!   active orders. It is the only component permitted to mutate order state;
//!   it translates feed events into forward-only status transitions and emits
//!   domain events.
//! - [`reconciler::GridReconciler`] — the control loop. It reads tracker
//!   state and the latest price, computes the target grid, diffs it against
//!   actual state, and drives cancel/place operations under the slot budget.
//!
//! [`engine::GridEngine`] wires them to a price/event feed and an
//! [`gateway::OrderGateway`] implementation, spawning the consumer and timer
//! tasks. The gateway is a trait so tests (and paper trading) can substitute
//! a fake.

pub mod engine;
pub mod gateway;
pub mod grid;
pub mod reconciler;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::GridEngine;
pub use gateway::{BatchItem, OrderGateway};
