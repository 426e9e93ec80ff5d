mod balance_index;
mod ledger;
mod submitter;

pub use balance_index::*;
pub use ledger::*;
pub use submitter::*;
