//! Application layer: order validation, pricing, machine allocation, the
//! order lifecycle and the reconciliation sweep.
//!
//! `LaundryEngine` wires these pieces to the domain ports and is the only
//! type a host needs to construct.

pub mod aggregator;
pub mod allocator;
pub mod engine;
pub mod lifecycle;
pub mod pricing;
pub mod scheduler;
pub mod validator;
