//! Sync orchestration: persistence contract, runs, scheduling.

mod fallback;
mod memory;
mod orchestrator;
mod roster;
mod scheduler;
mod store;

pub use fallback::{FallbackError, FallbackSource, FallbackSummary};
pub use memory::InMemoryStore;
pub use orchestrator::{
    CompanyOutcome, DEFAULT_JURISDICTION, DEFAULT_MAX_ITERATIONS, DEFAULT_STALE_ATTEMPT_AFTER,
    OrchestratorSettings, SkipReason, SyncOrchestrator, SyncSummary, TickReport,
};
pub use roster::{RosterError, RosterStore, load_roster_file, load_roster_str};
pub use scheduler::{DEFAULT_TICK_INTERVAL, Scheduler, SchedulerError};
pub use store::{
    AttemptOutcome, AttemptStatus, CertificateBundle, Company, Direction, InsertOutcome,
    InvoiceRecord, InvoiceStatus, StoreError, SyncAttempt, SyncMethod, SyncStore,
};
