// =============================================================================
// EdgeMiner — bar series reconciliation, indicator frames and setup recording
// =============================================================================

pub mod error;
pub mod indicators;
pub mod market_data;
pub mod notification;
pub mod reconcile;
pub mod runtime_config;
pub mod session;
pub mod setup;
pub mod source;
pub mod types;
