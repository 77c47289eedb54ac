//! Queue Orchestrator (§4.6): admission, the explicit job state machine, the
//! safe-replace upload protocol, retention cleanup, and the three worker
//! lanes that drive jobs through their phases.

pub mod cleanup;
pub mod safe_replace;
pub mod state;
mod worker;

pub use cleanup::{CleanupReport, run_cleanup};
pub use safe_replace::{SafeReplaceInput, SafeReplaceOutcome, safe_replace};
pub use state::{InvalidTransition, Transition};
pub use worker::QueueOrchestrator;
