//! Application lifecycle

pub mod options;
pub mod state;

pub use options::{AppOptions, LifecycleOptions};
pub use state::App;
