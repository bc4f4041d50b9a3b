//! Ledger core: exposure math, odds derivation, and the round lifecycle
//! from placement through settlement, cancellation and reversal.

pub mod calculator;
pub mod odds;
pub mod ledger;
pub mod rounds;
pub mod placement;
pub mod settlement;
pub mod cancellation;
pub mod reversal;
pub mod dispatch;

pub use dispatch::{Command, Reply};
pub use ledger::{CreditOp, Ledger, SharedLedger};
pub use odds::OddsSpec;
