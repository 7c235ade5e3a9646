//! File formats spoken by the host binary: CSV seed catalogs in, JSON lines
//! of commands in, JSON lines of outcomes out.

pub mod csv;
pub mod json;
