//! Application layer orchestrating the ledger operations.
//!
//! `PluginController` is the entry point: it serializes work per payment
//! instruction, drives the ledger and hands transactions to the gateway
//! plugins resolved through the `PluginRegistry`.

pub mod controller;
pub mod locks;
pub mod registry;
pub mod result;
