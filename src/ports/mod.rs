pub mod config_port;
pub mod entry_source_port;
pub mod ledger_port;
pub mod ownership_port;
