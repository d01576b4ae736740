pub mod config;
pub mod error;
pub mod logging;

pub mod executor;
pub mod model;
pub mod network;
pub mod notifier;
pub mod queue;
pub mod size_guard;
