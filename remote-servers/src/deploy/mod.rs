//! Deployment bookkeeping

pub mod debug;
pub mod fsm;
pub mod log_manager;
pub mod registry;
