//! Domain types and the ports the application layer talks through.

pub mod machine;
pub mod money;
pub mod order;
pub mod payment;
pub mod ports;
pub mod user;
