//! Shared helpers: binary bootstrap, reconnect backoff, clocks.

pub mod bootstrap;
pub mod retry;
pub mod time;
