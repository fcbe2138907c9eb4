//! Host-facing command contract and stdio bridge for frontends.

pub mod channel;
pub mod contract;
pub mod stdio;
