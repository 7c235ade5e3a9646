//! Adapters behind the domain ports: record stores, the payment ledger,
//! in-memory catalogs and clocks.

pub mod clock;
pub mod in_memory;
pub mod ledger;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
