// Transfer engine: the transactional core of the ledger.
//
// - `store`: the ledger store traits adapters implement
// - `executor`: all-or-nothing unit-of-work runner
// - `lock_order`: deterministic lock acquisition order
// - `transfer`: the transfer orchestrator

mod error;
mod executor;
mod lock_order;
mod store;
mod transfer;

pub use error::*;
pub use executor::*;
pub use lock_order::*;
pub use store::*;
pub use transfer::*;
