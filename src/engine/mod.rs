//! Business rules of the SACCO ledger.
//!
//! Everything in here is synchronous and free of I/O. Settings and stored
//! records are passed in; the repository persists whatever comes back.

pub mod allocation;
pub mod amortization;
pub mod dividends;
pub mod guarantee;
pub mod money;
pub mod shares;
pub mod statement;
