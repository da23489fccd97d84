//! Adapters behind the domain ports: storage backends and the sandbox
//! gateway.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sandbox;
