//! Core business logic services.

mod builder;
mod config;
mod planner;
mod refresh;
mod scanner;
mod sequencer;
mod sweep;

pub use builder::TransactionBuilder;
pub use config::{DEFAULT_MAX_BATCH_SIZE, DEFAULT_RENT_EXEMPT_RESERVE, SweepConfig, SweepSplit};
pub use planner::{BatchPlanner, ScanOrder, TokenPriority};
pub use refresh::{BalanceRefresher, RefreshedBalances};
pub use scanner::BalanceScanner;
pub use sequencer::{SequencerConfig, SubmissionSequencer};
pub use sweep::{SweepRequest, SweepService};
