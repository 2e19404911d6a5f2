//! Core ledger types and logic.

pub mod config_validation;
pub mod error;
pub mod ledger;
pub mod ledger_entry;
pub mod page;
pub mod strategy;
