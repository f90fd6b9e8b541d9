//! rigbus - control plane for a multi-process simulation rig
//!
//! Worker processes exchange topic-addressed binary messages through a
//! relay, a supervisor keeps them alive, and a record/replay pair captures
//! every bus message into session shards and plays sessions back with their
//! original timing.

pub mod block;
pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod process;
pub mod proto;
pub mod recorder;
pub mod replay;
pub mod topics;
pub mod utils;
