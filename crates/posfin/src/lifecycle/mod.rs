//! Application lifecycle: the state machine, the transactional executor, the
//! deadline monitor, and the status reconciler.

pub mod domain;
pub mod executor;
pub mod machine;
pub mod memory;
pub mod monitor;
pub mod reconciler;
pub mod store;

pub use domain::{
    ApplicationId, ApplicationSnapshot, ApplicationStatus, BankId, DataIntegrityIssue,
    OfferRecord, OfferStatus, PurchaseRecord, Transition, TransitionActor, TransitionTrigger,
};
pub use executor::{EngineError, ExecutionOutcome, TransitionExecutor};
pub use machine::{decide, integrity_check};
pub use memory::{ApplicationSeed, InMemoryMarketStore};
pub use monitor::{CycleSummary, SweepSummary, TransitionMonitor};
pub use reconciler::{
    ReconciliationError, ReconciliationSummary, StatusReconciler, ValidatedStatus,
};
pub use store::{LifecycleStore, StatusBreakdownRow, StatusUpdate, StoreError, UnitOfWork};
