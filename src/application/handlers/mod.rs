//! Request handlers, grouped by module.

pub mod billing;
