//! Application lifecycle engine for the POS financing marketplace.
//!
//! A business submits one financing application that multiple banks may
//! purchase, inspect, and bid on within bounded time windows. This crate
//! owns the status lifecycle of those applications: the pure state machine,
//! the deadline-driven background monitor, the drift-correcting status
//! reconciler, and the per-purchase revenue collection ledger.

pub mod audit;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod revenue;
pub mod router;
pub mod telemetry;
