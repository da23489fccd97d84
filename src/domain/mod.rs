//! Domain layer: ledger entities, amount bookkeeping and the ports through
//! which storage and gateway plugins are reached.

pub mod credit;
pub mod extended_data;
pub mod graph;
pub mod ids;
pub mod instruction;
pub mod ledger;
pub mod money;
pub mod payment;
pub mod plugin;
pub mod ports;
pub mod transaction;
