// src/lib.rs

pub mod config;
pub mod core;

// Re-export
pub use crate::core::realtime::{ChannelEvent, ChannelRegistry};
pub use crate::core::session::SessionManager;
