//! Carousel Backend Library
//!
//! Epoch-based depeg insurance engine: markets, premium/collateral vaults
//! with deposit and rollover queues, and oracle-driven epoch resolution.

pub mod protocol;
pub mod telemetry;

pub use protocol::{Protocol, ProtocolConfig, ProtocolError, ProtocolSetup};
